//! Invite management and both sides of the pairing handshake.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    codec::RoomOp,
    error::{RoomError, RoomResult},
    keys::WriterKey,
    oplog::{LogKeys, OperationLog},
    pairing::{MemberRequest, Pairing, RequestHandler},
    persistence::ViewStore,
    proto::room::{Invite, Writer},
    session::Session,
    util::{expires_in, is_expired, now_millis},
};

/// Answers pairing requests on behalf of an open room and manages the
/// room's invite.
pub(crate) struct Admission<L, V> {
    session: Arc<Session<L, V>>,
    invite_ttl: Duration,
    /// Serializes invite creation so that concurrent callers share one.
    invite_lock: Mutex<()>,
}

impl<L: OperationLog, V: ViewStore> Admission<L, V> {
    pub fn new(session: Arc<Session<L, V>>, invite_ttl: Duration) -> Self {
        Self {
            session,
            invite_ttl,
            invite_lock: Mutex::new(()),
        }
    }

    /// Return the live invite, creating one if there is none. Expired
    /// invites are removed along the way.
    pub async fn create_invite<P: Pairing>(&self, pairing: &P) -> RoomResult<String> {
        let _guard = self.invite_lock.lock().await;
        let now = now_millis();
        let mut live = None;
        for invite in self.session.invites().await? {
            if is_expired(invite.expires, now) {
                debug!("Removing expired invite");
                self.session.append(RoomOp::DelInvite(invite)).await?;
            } else if live.is_none() {
                live = Some(invite);
            }
        }
        if let Some(invite) = live {
            return Ok(z32::encode(&invite.invite));
        }

        let invite = pairing
            .create_invite(&self.session.log().key(), expires_in(self.invite_ttl))
            .await
            .map_err(RoomError::pairing)?;
        let token = z32::encode(&invite.invite);
        self.session.append(RoomOp::AddInvite(invite)).await?;
        info!("Created invite");
        Ok(token)
    }

    /// Delete the oldest stored invite, expired or not.
    pub async fn delete_invite(&self) -> RoomResult<()> {
        let _guard = self.invite_lock.lock().await;
        match self.session.invites().await?.into_iter().next() {
            Some(invite) => {
                self.session.append(RoomOp::DelInvite(invite)).await?;
                info!("Deleted invite");
            }
            None => debug!("No invite to delete"),
        }
        Ok(())
    }

    /// Returns whether the request was admitted. Requests for unknown or
    /// expired invites are ignored without a response.
    async fn admit<R: MemberRequest>(&self, mut request: R) -> RoomResult<bool> {
        let invite = match self.session.invite(request.invite_id()).await? {
            Some(invite) if invite.id == request.invite_id() => invite,
            _ => {
                debug!("Ignoring pairing request for an unknown invite");
                return Ok(false);
            }
        };
        if is_expired(invite.expires, now_millis()) {
            debug!("Ignoring pairing request for an expired invite");
            return Ok(false);
        }

        request.open(&invite.public_key).map_err(RoomError::pairing)?;
        let key = WriterKey::try_from(request.user_data())?;
        self.session
            .append(RoomOp::AddWriter(Writer { key: key.to_vec() }))
            .await?;

        let log = self.session.log();
        request
            .confirm(LogKeys {
                key: log.key(),
                encryption_key: log.encryption_key(),
            })
            .await
            .map_err(RoomError::pairing)?;
        info!("Admitted writer {}", key);
        Ok(true)
    }
}

#[async_trait]
impl<L, V, R> RequestHandler<R> for Admission<L, V>
where
    L: OperationLog,
    V: ViewStore,
    R: MemberRequest,
{
    async fn on_request(&self, request: R) {
        if let Err(e) = self.admit(request).await {
            warn!("Pairing handshake failed: {}", e);
        }
    }
}

/// Redeem `invite` for the keys of an existing room, offering `local` as
/// the writer to admit.
pub(crate) async fn join<P: Pairing>(
    pairing: &P,
    invite: &str,
    local: WriterKey,
    limit: Option<Duration>,
) -> RoomResult<LogKeys> {
    let token = z32::decode(invite.as_bytes()).map_err(|e| RoomError::InvalidInvite(e.to_string()))?;
    let candidate = pairing.add_candidate(&token, local);
    let keys = match limit {
        Some(limit) => tokio::time::timeout(limit, candidate)
            .await
            .map_err(|_| RoomError::JoinTimeout)?,
        None => candidate.await,
    }
    .map_err(RoomError::pairing)?;
    info!("Admitted to room {}", keys.key);
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        apply::ApplyEngine,
        codec::Namespace,
        constants::{DEFAULT_INVITE_TTL, UPDATE_CHANNEL_CAPACITY},
        keys::LogKey,
        mock::{MockLog, MockNetwork, MockPairing, MockStorage},
        pairing::{invite, PairingError},
        persistence::{mock::MemoryViewStore, Views},
        proto::pairing::PairingRequest,
        storage::Storage,
    };

    /// A request driven directly against the handler, recording what the
    /// member did with it.
    struct DirectRequest {
        request: PairingRequest,
        opened: bool,
        confirmed: Arc<StdMutex<Option<LogKeys>>>,
    }

    #[async_trait]
    impl MemberRequest for DirectRequest {
        type Error = PairingError;

        fn invite_id(&self) -> &[u8] {
            &self.request.invite_id
        }

        fn user_data(&self) -> &[u8] {
            &self.request.user_data
        }

        fn open(&mut self, public_key: &[u8]) -> Result<(), Self::Error> {
            invite::open_request(&self.request, public_key)?;
            self.opened = true;
            Ok(())
        }

        async fn confirm(self, keys: LogKeys) -> Result<(), Self::Error> {
            assert!(self.opened);
            *self.confirmed.lock().unwrap() = Some(keys);
            Ok(())
        }
    }

    async fn admission(ttl: Duration) -> Admission<MockLog, MemoryViewStore> {
        let network = MockNetwork::new();
        let storage = MockStorage::new(network, "admission");
        storage.ready().await.unwrap();
        let views = Arc::new(Views::new(MemoryViewStore::new(), MemoryViewStore::new()));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let engine = Arc::new(ApplyEngine::new(&Namespace::default(), Arc::clone(&views), updates));
        let log = storage.open_log(None, engine).await.unwrap();
        let session = Session::new(Namespace::default(), Arc::new(log), views);
        Admission::new(Arc::new(session), ttl)
    }

    fn direct_request(token: &str, writer: WriterKey) -> (DirectRequest, Arc<StdMutex<Option<LogKeys>>>) {
        let token = invite::decode_token(&z32::decode(token.as_bytes()).unwrap()).unwrap();
        let confirmed = Arc::new(StdMutex::new(None));
        let request = DirectRequest {
            request: invite::candidate_request(&token, &writer).unwrap(),
            opened: false,
            confirmed: Arc::clone(&confirmed),
        };
        (request, confirmed)
    }

    #[tokio::test]
    async fn test_create_invite_is_stable() {
        let admission = admission(DEFAULT_INVITE_TTL).await;
        let pairing = MockPairing::new(MockNetwork::new());
        let first = admission.create_invite(&pairing).await.unwrap();
        let second = admission.create_invite(&pairing).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(admission.session.invites().await.unwrap().len(), 1);

        admission.delete_invite().await.unwrap();
        assert!(admission.session.invites().await.unwrap().is_empty());
        let third = admission.create_invite(&pairing).await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_expired_invite_is_replaced() {
        let admission = admission(Duration::ZERO).await;
        let pairing = MockPairing::new(MockNetwork::new());
        let first = admission.create_invite(&pairing).await.unwrap();
        let second = admission.create_invite(&pairing).await.unwrap();
        assert_ne!(first, second);
        // the expired invite was removed, the fresh one has expired already
        assert_eq!(admission.session.invites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_expired_invite() {
        let admission = admission(Duration::ZERO).await;
        let pairing = MockPairing::new(MockNetwork::new());
        admission.create_invite(&pairing).await.unwrap();
        let invites = admission.session.invites().await.unwrap();
        assert_eq!(invites.len(), 1);
        assert!(is_expired(invites[0].expires, now_millis()));

        admission.delete_invite().await.unwrap();
        assert!(admission.session.invites().await.unwrap().is_empty());
        // nothing left, so this is a no-op
        admission.delete_invite().await.unwrap();
    }

    #[tokio::test]
    async fn test_admits_matching_request() {
        let admission = admission(DEFAULT_INVITE_TTL).await;
        let pairing = MockPairing::new(MockNetwork::new());
        let token = admission.create_invite(&pairing).await.unwrap();
        let joiner = WriterKey::generate();
        let (request, confirmed) = direct_request(&token, joiner);

        assert!(admission.admit(request).await.unwrap());
        let keys = confirmed.lock().unwrap().unwrap();
        assert_eq!(keys.key, admission.session.log().key());
        assert_eq!(admission.session.writers().await.unwrap(), vec![joiner]);
    }

    #[tokio::test]
    async fn test_rejects_unknown_invite() {
        let admission = admission(DEFAULT_INVITE_TTL).await;
        let pairing = MockPairing::new(MockNetwork::new());
        admission.create_invite(&pairing).await.unwrap();
        // an invite for the same room which was never stored
        let stray = invite::create_invite(&admission.session.log().key(), i64::MAX);
        let (request, confirmed) = direct_request(&z32::encode(&stray.invite), WriterKey::generate());

        assert!(!admission.admit(request).await.unwrap());
        assert!(confirmed.lock().unwrap().is_none());
        assert!(admission.session.writers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_deleted_invite() {
        let admission = admission(DEFAULT_INVITE_TTL).await;
        let pairing = MockPairing::new(MockNetwork::new());
        let token = admission.create_invite(&pairing).await.unwrap();
        admission.delete_invite().await.unwrap();
        let (request, confirmed) = direct_request(&token, WriterKey::generate());

        assert!(!admission.admit(request).await.unwrap());
        assert!(confirmed.lock().unwrap().is_none());
        assert!(admission.session.writers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forged_request_fails_open() {
        let admission = admission(DEFAULT_INVITE_TTL).await;
        let pairing = MockPairing::new(MockNetwork::new());
        let token = admission.create_invite(&pairing).await.unwrap();
        let (mut request, confirmed) = direct_request(&token, WriterKey::generate());
        request.request.user_data = WriterKey::generate().to_vec();

        assert!(matches!(admission.admit(request).await, Err(RoomError::Pairing(_))));
        assert!(confirmed.lock().unwrap().is_none());
        assert!(admission.session.writers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_rejects_bad_invite() {
        let pairing = MockPairing::new(MockNetwork::new());
        let err = join(&pairing, "not z32 !!", WriterKey::generate(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidInvite(_)));
    }

    #[tokio::test]
    async fn test_join_times_out_without_members() {
        let pairing = MockPairing::new(MockNetwork::new());
        let stray = invite::create_invite(&LogKey::generate(), i64::MAX);
        let err = join(
            &pairing,
            &z32::encode(&stray.invite),
            WriterKey::generate(),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RoomError::JoinTimeout));
    }
}
