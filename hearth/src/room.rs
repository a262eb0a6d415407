use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    admission::{self, Admission},
    apply::{ApplyEngine, RoomUpdate},
    codec::{Namespace, RoomOp},
    config::RoomConfig,
    constants::UPDATE_CHANNEL_CAPACITY,
    error::{RoomError, RoomResult},
    keys::{DiscoveryKey, LogKey, WriterKey},
    oplog::{LogKeys, OperationLog},
    pairing::Pairing,
    proto::room::{Event, User, Writer},
    session::{EventQuery, EventRecord, Session, UserRecord},
    storage::{LocalWriter, Storage},
    swarm::Swarm,
};

/// Where a [Room] is in its life. Rooms move strictly forward through
/// these states; a closed room can't be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Opening,
    Open,
    Closing,
    Closed,
}

/// Collects the outcome of each teardown step without stopping at the
/// first failure.
#[derive(Default)]
struct Teardown {
    first_error: Option<RoomError>,
}

impl Teardown {
    fn step(&mut self, name: &str, result: RoomResult<()>) {
        if let Err(e) = result {
            error!("Failed to close {}: {}", name, e);
            self.first_error.get_or_insert(e);
        }
    }

    fn finish(self) -> RoomResult<()> {
        self.first_error.map_or(Ok(()), Err)
    }
}

/// A replicated multi-writer room.
///
/// The room owns its collaborators: `S` provides the writer core, log and
/// view stores, `D` finds other peers and `P` runs the pairing handshake.
pub struct Room<S: Storage, D: Swarm, P: Pairing> {
    config: RoomConfig,
    namespace: Namespace,
    storage: S,
    swarm: D,
    pairing: P,
    lifecycle: watch::Sender<Lifecycle>,
    /// Fired by [Room::close] to abandon an in-flight open.
    cancel: CancellationToken,
    /// Held for the duration of an open, so teardown never races it.
    opening: Mutex<()>,
    local: Mutex<Option<S::Local>>,
    session: RwLock<Option<Arc<Session<S::Log, S::View>>>>,
    admission: RwLock<Option<Arc<Admission<S::Log, S::View>>>>,
    member: Mutex<Option<P::Member>>,
    updates: broadcast::Sender<RoomUpdate>,
}

impl<S: Storage, D: Swarm, P: Pairing> Room<S, D, P> {
    pub fn new(config: RoomConfig, storage: S, swarm: D, pairing: P) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Created);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            namespace: Namespace::new(config.namespace.clone()),
            config,
            storage,
            swarm,
            pairing,
            lifecycle,
            cancel: CancellationToken::new(),
            opening: Mutex::new(()),
            local: Mutex::new(None),
            session: RwLock::new(None),
            admission: RwLock::new(None),
            member: Mutex::new(None),
            updates,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn watch_lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Receive a [RoomUpdate] after every applied batch.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }

    /// Open the room. Resolves once the local writer is writable, which for
    /// a joining peer means once a member has admitted it. Calling this on
    /// a room that is already opening waits for that open to finish.
    pub async fn ready(&self) -> RoomResult<()> {
        let start = self.lifecycle.send_if_modified(|state| {
            if *state == Lifecycle::Created {
                *state = Lifecycle::Opening;
                true
            } else {
                false
            }
        });
        if !start {
            return self.wait_open().await;
        }

        let guard = self.opening.lock().await;
        info!(
            "Opening room {} in {}",
            self.namespace.as_str(),
            self.config.storage.display()
        );
        let opened = tokio::select! {
            opened = self.open() => opened,
            _ = self.cancel.cancelled() => Err(RoomError::Closed),
        };
        drop(guard);

        match opened {
            Ok(()) => {
                let open = self.lifecycle.send_if_modified(|state| {
                    if *state == Lifecycle::Opening {
                        *state = Lifecycle::Open;
                        true
                    } else {
                        false
                    }
                });
                if open {
                    info!("Room open");
                    Ok(())
                } else {
                    Err(RoomError::Closed)
                }
            }
            Err(e) => {
                error!("Failed to open room: {}", e);
                // whatever was opened is released; the room is unusable now
                if let Err(close) = self.close().await {
                    error!("Failed to release a partially opened room: {}", close);
                }
                Err(e)
            }
        }
    }

    async fn wait_open(&self) -> RoomResult<()> {
        let mut lifecycle = self.lifecycle.subscribe();
        let state = *lifecycle
            .wait_for(|state| *state != Lifecycle::Opening)
            .await
            .map_err(|_| RoomError::Closed)?;
        match state {
            Lifecycle::Open => Ok(()),
            Lifecycle::Created => Err(RoomError::NotOpen),
            Lifecycle::Opening | Lifecycle::Closing | Lifecycle::Closed => Err(RoomError::Closed),
        }
    }

    async fn open(&self) -> RoomResult<()> {
        self.storage.ready().await.map_err(RoomError::storage)?;

        let bootstrap = match &self.config.invite {
            Some(invite) => self.join(invite).await?,
            None => None,
        };

        let views = Arc::new(self.storage.open_views().await.map_err(RoomError::storage)?);
        let engine = Arc::new(ApplyEngine::new(
            &self.namespace,
            Arc::clone(&views),
            self.updates.clone(),
        ));
        let log = self
            .storage
            .open_log(bootstrap, engine)
            .await
            .map_err(RoomError::storage)?;
        let session = Arc::new(Session::new(self.namespace.clone(), Arc::new(log), views));
        *self.session.write().await = Some(Arc::clone(&session));
        let log = session.log();
        info!("Opened log {}", log.key());

        // a joining peer can only see its own admission once it replicates
        self.swarm
            .join(log.discovery_key())
            .await
            .map_err(RoomError::swarm)?;

        let mut writable = log.writable();
        if !*writable.borrow() {
            info!("Waiting to become writable");
            writable
                .wait_for(|writable| *writable)
                .await
                .map_err(|_| RoomError::Closed)?;
        }

        let admission = Arc::new(Admission::new(Arc::clone(&session), self.config.invite_ttl));
        let member = self
            .pairing
            .add_member(log.discovery_key(), admission.clone())
            .await
            .map_err(RoomError::pairing)?;
        *self.member.lock().await = Some(member);
        *self.admission.write().await = Some(admission);
        Ok(())
    }

    /// Redeem the configured invite, unless the local writer has written
    /// before, in which case it was admitted in an earlier run.
    async fn join(&self, invite: &str) -> RoomResult<Option<LogKeys>> {
        let local = self.storage.open_local().await.map_err(RoomError::storage)?;
        let (key, length) = (local.key(), local.length());
        *self.local.lock().await = Some(local);

        let keys = if length > 0 {
            info!("Skipped joining, writer {} has {} entries", key, length);
            None
        } else {
            info!("Joining with writer {}", key);
            Some(admission::join(&self.pairing, invite, key, self.config.join_timeout).await?)
        };

        if let Some(local) = self.local.lock().await.take() {
            local.close().await.map_err(RoomError::storage)?;
        }
        Ok(keys)
    }

    /// Release everything the room holds, in order: the pairing member, the
    /// local writer used for joining, the log and views, pairing, discovery
    /// and storage. Every step runs even if an earlier one fails; the first
    /// failure is returned. An open in flight is abandoned.
    pub async fn close(&self) -> RoomResult<()> {
        let start = self.lifecycle.send_if_modified(|state| match state {
            Lifecycle::Closing | Lifecycle::Closed => false,
            _ => {
                *state = Lifecycle::Closing;
                true
            }
        });
        if !start {
            let mut lifecycle = self.lifecycle.subscribe();
            let _ = lifecycle.wait_for(|state| *state == Lifecycle::Closed).await;
            return Ok(());
        }

        info!("Closing room");
        self.cancel.cancel();
        let _opening = self.opening.lock().await;

        let mut teardown = Teardown::default();
        if let Some(member) = self.member.lock().await.take() {
            let closed = self.pairing.close_member(member).await;
            teardown.step("pairing member", closed.map_err(RoomError::pairing));
        }
        if let Some(local) = self.local.lock().await.take() {
            teardown.step("local writer", local.close().await.map_err(RoomError::storage));
        }
        self.admission.write().await.take();
        if let Some(session) = self.session.write().await.take() {
            teardown.step("log", session.close().await);
        }
        teardown.step("pairing", self.pairing.close().await.map_err(RoomError::pairing));
        teardown.step("discovery", self.swarm.destroy().await.map_err(RoomError::swarm));
        teardown.step("storage", self.storage.close().await.map_err(RoomError::storage));

        self.lifecycle.send_replace(Lifecycle::Closed);
        info!("Room closed");
        teardown.finish()
    }

    fn check_open(&self) -> RoomResult<()> {
        let state = *self.lifecycle.borrow();
        match state {
            Lifecycle::Open => Ok(()),
            Lifecycle::Created | Lifecycle::Opening => Err(RoomError::NotOpen),
            Lifecycle::Closing | Lifecycle::Closed => Err(RoomError::Closed),
        }
    }

    async fn session(&self) -> RoomResult<Arc<Session<S::Log, S::View>>> {
        self.check_open()?;
        self.session.read().await.clone().ok_or(RoomError::NotOpen)
    }

    async fn admission(&self) -> RoomResult<Arc<Admission<S::Log, S::View>>> {
        self.check_open()?;
        self.admission.read().await.clone().ok_or(RoomError::NotOpen)
    }

    pub async fn key(&self) -> RoomResult<LogKey> {
        Ok(self.session().await?.log().key())
    }

    pub async fn discovery_key(&self) -> RoomResult<DiscoveryKey> {
        Ok(self.session().await?.log().discovery_key())
    }

    pub async fn local_key(&self) -> RoomResult<WriterKey> {
        Ok(self.session().await?.log().local_key())
    }

    pub async fn is_writable(&self) -> RoomResult<bool> {
        let session = self.session().await?;
        let writable = *session.log().writable().borrow();
        Ok(writable)
    }

    pub async fn add_user(&self, id: impl Into<String>, info: &Value) -> RoomResult<()> {
        let session = self.session().await?;
        session.append(RoomOp::AddUser(User::new(id, info))).await
    }

    pub async fn del_user(&self, id: impl Into<String>) -> RoomResult<()> {
        let session = self.session().await?;
        session.append(RoomOp::DelUser(User::id_only(id))).await
    }

    pub async fn add_event(&self, id: impl Into<String>, data: &Value) -> RoomResult<()> {
        let session = self.session().await?;
        session.append(RoomOp::AddEvent(Event::new(id, data))).await
    }

    pub async fn del_event(&self, id: impl Into<String>) -> RoomResult<()> {
        let session = self.session().await?;
        session.append(RoomOp::DelEvent(Event::id_only(id))).await
    }

    /// Admit a writer directly, without a pairing handshake.
    pub async fn add_writer(&self, key: WriterKey) -> RoomResult<()> {
        let session = self.session().await?;
        session
            .append(RoomOp::AddWriter(Writer { key: key.to_vec() }))
            .await
    }

    /// The z-base-32 token of the room's live invite, created if needed.
    pub async fn create_invite(&self) -> RoomResult<String> {
        self.admission().await?.create_invite(&self.pairing).await
    }

    pub async fn delete_invite(&self) -> RoomResult<()> {
        self.admission().await?.delete_invite().await
    }

    pub async fn get_users(&self) -> RoomResult<Vec<UserRecord>> {
        self.session().await?.users().await
    }

    pub async fn get_events(&self, query: &EventQuery) -> RoomResult<Vec<EventRecord>> {
        self.session().await?.events(query).await
    }

    pub async fn get_writers(&self) -> RoomResult<Vec<WriterKey>> {
        self.session().await?.writers().await
    }
}

impl<S: Storage, D: Swarm, P: Pairing> Drop for Room<S, D, P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use anyhow::Result;
    use serde_json::json;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        mock::{
            MockError, MockLocalWriter, MockLog, MockNetwork, MockPairing, MockRoom, MockStorage,
            MockSwarm,
        },
        oplog::Apply,
        persistence::{mock::MemoryViewStore, Views},
    };

    #[derive(Debug, thiserror::Error)]
    #[error("{0} refused to close")]
    struct CloseRefused(&'static str);

    /// Discovery which can't be torn down.
    struct StuckSwarm(MockSwarm);

    #[async_trait::async_trait]
    impl Swarm for StuckSwarm {
        type Error = CloseRefused;

        async fn join(&self, topic: DiscoveryKey) -> Result<(), Self::Error> {
            self.0.join(topic).await.map_err(|_| CloseRefused("swarm"))
        }

        async fn destroy(&self) -> Result<(), Self::Error> {
            Err(CloseRefused("swarm"))
        }
    }

    /// Mock storage counting close attempts, each of which fails.
    struct CountingStorage {
        inner: MockStorage,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Storage for CountingStorage {
        type Error = MockError;
        type Local = MockLocalWriter;
        type Log = MockLog;
        type View = MemoryViewStore;

        async fn ready(&self) -> Result<(), Self::Error> {
            self.inner.ready().await
        }

        async fn open_local(&self) -> Result<Self::Local, Self::Error> {
            self.inner.open_local().await
        }

        async fn open_views(&self) -> Result<Views<Self::View>, Self::Error> {
            self.inner.open_views().await
        }

        async fn open_log(
            &self,
            bootstrap: Option<LogKeys>,
            apply: Arc<dyn Apply>,
        ) -> Result<Self::Log, Self::Error> {
            self.inner.open_log(bootstrap, apply).await
        }

        async fn close(&self) -> Result<(), Self::Error> {
            self.inner.close().await?;
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(MockError::Closed)
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    async fn host(network: &MockNetwork, name: &str) -> Result<(Arc<MockRoom>, String)> {
        let room = Arc::new(network.room(RoomConfig::new(name)));
        room.ready().await?;
        let invite = room.create_invite().await?;
        Ok((room, invite))
    }

    async fn users_reach(room: &MockRoom, count: usize) -> Result<()> {
        timeout(WAIT, async {
            while room.get_users().await?.len() < count {
                sleep(Duration::from_millis(10)).await;
            }
            Ok::<(), anyhow::Error>(())
        })
        .await?
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() -> Result<()> {
        let network = MockNetwork::new();
        let room = network.room(RoomConfig::new("a"));
        assert!(matches!(room.get_users().await, Err(RoomError::NotOpen)));
        assert!(matches!(room.add_user("u", &json!({})).await, Err(RoomError::NotOpen)));

        room.ready().await?;
        assert_eq!(room.lifecycle(), Lifecycle::Open);
        // a second ready on an open room is a no-op
        room.ready().await?;
        assert!(room.is_writable().await?);

        room.close().await?;
        assert_eq!(room.lifecycle(), Lifecycle::Closed);
        assert!(matches!(room.get_users().await, Err(RoomError::Closed)));
        assert!(matches!(room.ready().await, Err(RoomError::Closed)));
        // closing twice is fine
        room.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_local_reads_see_local_writes() -> Result<()> {
        let network = MockNetwork::new();
        let room = network.room(RoomConfig::new("a"));
        room.ready().await?;
        let mut updates = room.subscribe();

        room.add_user("u1", &json!({"hello": "world"})).await?;
        room.add_user("u1", &json!({"hello": "again"})).await?;
        room.add_event("e1", &json!(1)).await?;
        room.add_event("e0", &json!(2)).await?;

        let users = room.get_users().await?;
        assert_eq!(
            users,
            vec![UserRecord {
                id: "u1".into(),
                info: json!({"hello": "again"}),
            }]
        );
        // newest first, regardless of id order
        let events = room.get_events(&EventQuery::default()).await?;
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e0", "e1"]);
        let ranged = room.get_events(&EventQuery::default().gt("e0")).await?;
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].data, json!(1));

        room.del_event("e1").await?;
        room.del_user("u1").await?;
        assert!(room.get_users().await?.is_empty());
        assert_eq!(room.get_events(&EventQuery::default()).await?.len(), 1);

        assert_eq!(updates.recv().await?, RoomUpdate::Update);
        room.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_invite_admits_peer() -> Result<()> {
        let network = MockNetwork::new();
        let (a, invite) = host(&network, "a").await?;
        // the same token until it's deleted
        assert_eq!(a.create_invite().await?, invite);

        let b = network.room(RoomConfig::new("b").with_invite(invite));
        timeout(WAIT, b.ready()).await??;
        assert!(b.is_writable().await?);
        assert_eq!(b.key().await?, a.key().await?);
        assert_eq!(a.get_writers().await?, vec![b.local_key().await?]);

        a.add_user("u1", &json!({"hello": "world"})).await?;
        b.add_user("u2", &json!({"from": "b"})).await?;
        users_reach(&b, 2).await?;
        users_reach(&a, 2).await?;
        assert_eq!(a.get_users().await?, b.get_users().await?);

        b.close().await?;
        a.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_close_abandons_join() -> Result<()> {
        let network = MockNetwork::new();
        let (a, invite) = host(&network, "a").await?;
        a.delete_invite().await?;

        // nobody will confirm a deleted invite
        let b = Arc::new(network.room(RoomConfig::new("b").with_invite(invite)));
        let opening = tokio::spawn({
            let b = Arc::clone(&b);
            async move { b.ready().await }
        });
        let mut lifecycle = b.watch_lifecycle();
        timeout(WAIT, lifecycle.wait_for(|s| *s == Lifecycle::Opening)).await??;
        sleep(Duration::from_millis(50)).await;

        timeout(WAIT, b.close()).await??;
        let opened = timeout(WAIT, opening).await??;
        assert!(matches!(opened, Err(RoomError::Closed)));
        assert_eq!(b.lifecycle(), Lifecycle::Closed);
        assert!(a.get_writers().await?.is_empty());
        a.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_close_continues_past_failures() -> Result<()> {
        let network = MockNetwork::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let storage = CountingStorage {
            inner: MockStorage::new(network.clone(), "a"),
            closes: Arc::clone(&closes),
        };
        let swarm = StuckSwarm(MockSwarm::new(network.clone(), "a", Vec::new()));
        let room = Room::new(RoomConfig::new("a"), storage, swarm, MockPairing::new(network.clone()));
        room.ready().await?;
        let topic = room.discovery_key().await?;
        assert_eq!(network.members(&topic).len(), 1);

        // discovery fails first, storage after it; the first failure is reported
        let err = room.close().await.unwrap_err();
        assert!(matches!(err, RoomError::Swarm(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(network.members(&topic).is_empty());
        assert_eq!(room.lifecycle(), Lifecycle::Closed);
        assert!(matches!(room.get_users().await, Err(RoomError::Closed)));
        Ok(())
    }

    #[tokio::test]
    async fn test_join_timeout_closes_room() -> Result<()> {
        let network = MockNetwork::new();
        let (a, invite) = host(&network, "a").await?;
        a.delete_invite().await?;

        let config = RoomConfig::new("b")
            .with_invite(invite)
            .with_join_timeout(Duration::from_millis(100));
        let b = network.room(config);
        assert!(matches!(b.ready().await, Err(RoomError::JoinTimeout)));
        assert_eq!(b.lifecycle(), Lifecycle::Closed);
        a.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_skips_joining() -> Result<()> {
        let network = MockNetwork::new();
        let (a, invite) = host(&network, "a").await?;

        let b = network.room(RoomConfig::new("b").with_invite(invite.clone()));
        timeout(WAIT, b.ready()).await??;
        b.add_user("u2", &json!(null)).await?;
        let key = b.key().await?;
        b.close().await?;

        // the invite is gone, but b has written before and needs no handshake
        a.delete_invite().await?;
        let b = network.room(RoomConfig::new("b").with_invite(invite));
        timeout(WAIT, b.ready()).await??;
        assert_eq!(b.key().await?, key);
        users_reach(&b, 1).await?;

        b.close().await?;
        a.close().await?;
        Ok(())
    }
}
