use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{error::MockError, network::MockNetwork};
use crate::{
    keys::{EncryptionKey, LogKey, WriterKey},
    oplog::{Apply, LogHandle, LogKeys, Node, OperationLog},
};

struct Cursor {
    /// Index of the next node to apply.
    next: usize,
    writers: BTreeSet<WriterKey>,
    halted: bool,
}

/// One peer's view of a shared log.
struct Replica {
    network: MockNetwork,
    peer: String,
    keys: LogKeys,
    local: WriterKey,
    apply: Arc<dyn Apply>,
    cursor: Mutex<Cursor>,
    writable: watch::Sender<bool>,
}

impl Replica {
    /// Apply every node this peer can currently see. Holding the cursor
    /// lock for the whole pass keeps the apply engine single threaded.
    async fn update(&self) -> Result<(), MockError> {
        let mut cursor = self.cursor.lock().await;
        if cursor.halted {
            return Err(MockError::Halted);
        }
        let topic = self.keys.key.discovery_key();

        loop {
            let pending = self.network.nodes_from(&self.keys.key, cursor.next);
            if pending.is_empty() {
                return Ok(());
            }
            let replicating = self.network.is_joined(&self.peer, &topic);

            let mut batch: Vec<Node> = Vec::new();
            let mut blocked = false;
            let mut skipped = false;
            for node in pending {
                if !replicating && node.writer != self.local {
                    blocked = true;
                    break;
                }
                if !cursor.writers.contains(&node.writer) {
                    if batch.is_empty() {
                        debug!("Skipping node {} from unknown writer {}", node.seq, node.writer);
                        cursor.next += 1;
                        skipped = true;
                        continue;
                    }
                    // the batch so far may admit this writer
                    break;
                }
                batch.push(node);
            }

            if batch.is_empty() {
                if blocked || !skipped {
                    return Ok(());
                }
                continue;
            }

            let mut handle = LogHandle::default();
            if let Err(e) = self.apply.apply(&batch, &mut handle).await {
                error!("{} stopped applying {}: {}", self.peer, self.keys.key, e);
                cursor.halted = true;
                return Err(e.into());
            }
            cursor.next += batch.len();
            for writer in handle.writers() {
                if cursor.writers.insert(*writer) {
                    info!("{} sees writer {} admitted", self.peer, writer);
                }
            }
            let writable = cursor.writers.contains(&self.local);
            self.writable.send_if_modified(|current| {
                let changed = *current != writable;
                *current = writable;
                changed
            });

            if blocked {
                return Ok(());
            }
        }
    }
}

/// A shared log as seen by one peer of a [MockNetwork].
///
/// Nodes authored by other writers are applied only while the peer has
/// joined the log's topic. `append` applies everything deliverable before
/// returning, so a peer reads its own writes.
pub struct MockLog {
    replica: Arc<Replica>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl MockLog {
    pub(crate) async fn open(
        network: MockNetwork,
        peer: String,
        local: WriterKey,
        keys: LogKeys,
        apply: Arc<dyn Apply>,
    ) -> Result<Self, MockError> {
        let (_, bootstrap) = network
            .log_info(&keys.key)
            .ok_or(MockError::UnknownLog(keys.key))?;
        let mut length = network
            .watch_log(&keys.key)
            .ok_or(MockError::UnknownLog(keys.key))?;
        let (writable, _) = watch::channel(bootstrap == local);
        let replica = Arc::new(Replica {
            network,
            peer,
            keys,
            local,
            apply,
            cursor: Mutex::new(Cursor {
                next: 0,
                writers: BTreeSet::from([bootstrap]),
                halted: false,
            }),
            writable,
        });
        replica.update().await?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_replica = Arc::clone(&replica);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    changed = length.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Err(e) = task_replica.update().await {
                            error!("Replication stopped: {}", e);
                            break;
                        }
                    }
                }
            }
            debug!("{} stopped replicating {}", task_replica.peer, task_replica.keys.key);
        });

        Ok(Self {
            replica,
            cancel,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl OperationLog for MockLog {
    type Error = MockError;

    fn key(&self) -> LogKey {
        self.replica.keys.key
    }

    fn encryption_key(&self) -> EncryptionKey {
        self.replica.keys.encryption_key
    }

    fn local_key(&self) -> WriterKey {
        self.replica.local
    }

    fn writable(&self) -> watch::Receiver<bool> {
        self.replica.writable.subscribe()
    }

    async fn append(&self, value: Bytes) -> Result<(), Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MockError::Closed);
        }
        if !*self.replica.writable.borrow() {
            return Err(MockError::NotWritable(self.replica.local));
        }
        self.replica
            .network
            .append(&self.replica.keys.key, self.replica.local, value)?;
        self.replica.update().await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
        Ok(())
    }
}

impl Drop for MockLog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::apply::ApplyError;

    /// Records applied nodes, admitting the writer named in any node whose
    /// value is a 32 byte key.
    #[derive(Default)]
    struct Recorder {
        applied: StdMutex<Vec<u64>>,
        fail_at: Option<u64>,
    }

    #[async_trait]
    impl Apply for Recorder {
        async fn apply(&self, nodes: &[Node], log: &mut LogHandle) -> Result<(), ApplyError> {
            for node in nodes {
                if Some(node.seq) == self.fail_at {
                    return Err(ApplyError::Flush {
                        view: "document",
                        reason: "disk full".into(),
                    });
                }
                if let Ok(key) = WriterKey::try_from(node.value.as_ref()) {
                    log.add_writer(key);
                }
            }
            self.applied
                .lock()
                .unwrap()
                .extend(nodes.iter().map(|node| node.seq));
            Ok(())
        }
    }

    impl Recorder {
        fn applied(&self) -> Vec<u64> {
            self.applied.lock().unwrap().clone()
        }
    }

    async fn open(network: &MockNetwork, peer: &str, keys: LogKeys, apply: Arc<Recorder>) -> MockLog {
        let (local, _) = network.disk(peer);
        MockLog::open(network.clone(), peer.to_owned(), local, keys, apply)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_writer_is_writable() {
        let network = MockNetwork::new();
        let (writer, _) = network.disk("a");
        let keys = network.create_log(writer);
        let recorder = Arc::new(Recorder::default());
        let log = open(&network, "a", keys, Arc::clone(&recorder)).await;

        assert!(*log.writable().borrow());
        log.append(Bytes::from_static(b"one")).await.unwrap();
        log.append(Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(recorder.applied(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_unadmitted_append_fails() {
        let network = MockNetwork::new();
        let (writer, _) = network.disk("a");
        let keys = network.create_log(writer);
        let log = open(&network, "b", keys, Arc::default()).await;

        assert!(!*log.writable().borrow());
        assert!(matches!(
            log.append(Bytes::from_static(b"x")).await,
            Err(MockError::NotWritable(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_nodes_wait_for_topic() {
        let network = MockNetwork::new();
        let (a, _) = network.disk("a");
        let (b, _) = network.disk("b");
        let keys = network.create_log(a);
        let log_a = open(&network, "a", keys, Arc::default()).await;
        let recorder = Arc::new(Recorder::default());
        let log_b = open(&network, "b", keys, Arc::clone(&recorder)).await;

        log_a.append(Bytes::copy_from_slice(b.as_bytes())).await.unwrap();
        tokio::task::yield_now().await;
        assert!(recorder.applied().is_empty());

        let mut writable = log_b.writable();
        network.join_topic("b", keys.key.discovery_key());
        tokio::time::timeout(std::time::Duration::from_secs(5), writable.wait_for(|w| *w))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorder.applied(), vec![0]);
        log_b.append(Bytes::from_static(b"from b")).await.unwrap();
        assert_eq!(recorder.applied(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_unknown_writer_nodes_are_skipped() {
        let network = MockNetwork::new();
        let (a, _) = network.disk("a");
        let keys = network.create_log(a);
        let stranger = WriterKey::generate();
        network
            .append(&keys.key, stranger, Bytes::from_static(b"forged"))
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let log = open(&network, "a", keys, Arc::clone(&recorder)).await;
        network.join_topic("a", keys.key.discovery_key());
        log.append(Bytes::from_static(b"real")).await.unwrap();
        assert_eq!(recorder.applied(), vec![1]);
    }

    #[tokio::test]
    async fn test_apply_failure_halts() {
        let network = MockNetwork::new();
        let (a, _) = network.disk("a");
        let keys = network.create_log(a);
        let recorder = Arc::new(Recorder {
            fail_at: Some(1),
            ..Default::default()
        });
        let log = open(&network, "a", keys, Arc::clone(&recorder)).await;
        log.append(Bytes::from_static(b"ok")).await.unwrap();
        assert!(matches!(
            log.append(Bytes::from_static(b"bad")).await,
            Err(MockError::Apply(_))
        ));
        assert!(matches!(
            log.append(Bytes::from_static(b"after")).await,
            Err(MockError::Halted)
        ));
        assert_eq!(recorder.applied(), vec![0]);
    }
}
