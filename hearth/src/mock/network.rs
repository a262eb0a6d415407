use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{error::MockError, pairing::MockRequest};
use crate::{
    keys::{DiscoveryKey, EncryptionKey, LogKey, WriterKey},
    oplog::{LogKeys, Node},
};

struct SharedLog {
    encryption_key: EncryptionKey,
    bootstrap: WriterKey,
    nodes: Vec<Node>,
    /// Wakes replicas whenever the log grows or a peer joins its topic.
    length: watch::Sender<usize>,
}

struct Disk {
    writer: WriterKey,
    log: Option<LogKey>,
}

#[derive(Default)]
struct NetworkState {
    logs: HashMap<LogKey, SharedLog>,
    disks: HashMap<String, Disk>,
    topics: HashMap<DiscoveryKey, HashSet<String>>,
    members: HashMap<DiscoveryKey, Vec<(u64, mpsc::UnboundedSender<MockRequest>)>>,
    next_member: u64,
}

/// Shared state behind every mock collaborator.
#[derive(Clone)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
    members_changed: Arc<watch::Sender<u64>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    pub fn new() -> Self {
        let (members_changed, _) = watch::channel(0);
        Self {
            state: Default::default(),
            members_changed: Arc::new(members_changed),
        }
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The writer key of `peer`'s disk and the log it last opened, creating
    /// the disk on first use.
    pub(crate) fn disk(&self, peer: &str) -> (WriterKey, Option<LogKey>) {
        let mut state = self.state();
        let disk = state.disks.entry(peer.to_owned()).or_insert_with(|| {
            let writer = WriterKey::generate();
            debug!("Created disk {} with writer {}", peer, writer);
            Disk { writer, log: None }
        });
        (disk.writer, disk.log)
    }

    pub(crate) fn set_disk_log(&self, peer: &str, key: LogKey) {
        if let Some(disk) = self.state().disks.get_mut(peer) {
            disk.log = Some(key);
        }
    }

    pub(crate) fn create_log(&self, bootstrap: WriterKey) -> LogKeys {
        let keys = LogKeys {
            key: LogKey::generate(),
            encryption_key: EncryptionKey::generate(),
        };
        let (length, _) = watch::channel(0);
        self.state().logs.insert(
            keys.key,
            SharedLog {
                encryption_key: keys.encryption_key,
                bootstrap,
                nodes: Vec::new(),
                length,
            },
        );
        debug!("Created log {} bootstrapped by {}", keys.key, bootstrap);
        keys
    }

    /// Encryption key and bootstrap writer of a log.
    pub(crate) fn log_info(&self, key: &LogKey) -> Option<(EncryptionKey, WriterKey)> {
        self.state()
            .logs
            .get(key)
            .map(|log| (log.encryption_key, log.bootstrap))
    }

    pub(crate) fn watch_log(&self, key: &LogKey) -> Option<watch::Receiver<usize>> {
        self.state().logs.get(key).map(|log| log.length.subscribe())
    }

    pub(crate) fn append(&self, key: &LogKey, writer: WriterKey, value: Bytes) -> Result<u64, MockError> {
        let mut state = self.state();
        let log = state.logs.get_mut(key).ok_or(MockError::UnknownLog(*key))?;
        let seq = log.nodes.len() as u64;
        log.nodes.push(Node { seq, writer, value });
        log.length.send_replace(log.nodes.len());
        Ok(seq)
    }

    pub(crate) fn nodes_from(&self, key: &LogKey, from: usize) -> Vec<Node> {
        self.state()
            .logs
            .get(key)
            .map(|log| log.nodes.get(from..).unwrap_or_default().to_vec())
            .unwrap_or_default()
    }

    /// Number of nodes `writer` has appended to any log.
    pub(crate) fn writer_length(&self, writer: &WriterKey) -> u64 {
        self.state()
            .logs
            .values()
            .flat_map(|log| log.nodes.iter())
            .filter(|node| node.writer == *writer)
            .count() as u64
    }

    pub(crate) fn join_topic(&self, peer: &str, topic: DiscoveryKey) {
        let mut state = self.state();
        state.topics.entry(topic).or_default().insert(peer.to_owned());
        for (key, log) in &state.logs {
            if key.discovery_key() == topic {
                log.length.send_modify(|_| {});
            }
        }
    }

    pub(crate) fn leave_topics(&self, peer: &str) {
        for peers in self.state().topics.values_mut() {
            peers.remove(peer);
        }
    }

    pub(crate) fn is_joined(&self, peer: &str, topic: &DiscoveryKey) -> bool {
        self.state()
            .topics
            .get(topic)
            .map_or(false, |peers| peers.contains(peer))
    }

    pub(crate) fn add_member(&self, topic: DiscoveryKey, requests: mpsc::UnboundedSender<MockRequest>) -> u64 {
        let id = {
            let mut state = self.state();
            let id = state.next_member;
            state.next_member += 1;
            state.members.entry(topic).or_default().push((id, requests));
            id
        };
        self.members_changed.send_replace(id);
        id
    }

    pub(crate) fn remove_member(&self, id: u64) {
        for members in self.state().members.values_mut() {
            members.retain(|(member, _)| *member != id);
        }
    }

    pub(crate) fn members(&self, topic: &DiscoveryKey) -> Vec<(u64, mpsc::UnboundedSender<MockRequest>)> {
        self.state().members.get(topic).cloned().unwrap_or_default()
    }

    pub(crate) fn watch_members(&self) -> watch::Receiver<u64> {
        self.members_changed.subscribe()
    }
}
