use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use tracing::debug;

use super::{error::MockError, log::MockLog, network::MockNetwork};
use crate::{
    keys::WriterKey,
    oplog::{Apply, LogKeys},
    persistence::{mock::MemoryViewStore, Views},
    storage::{LocalWriter, Storage},
};

/// A peer's disk on a [MockNetwork]. The writer key and the opened log
/// survive reopening under the same name; views are rebuilt by replay.
pub struct MockStorage {
    network: MockNetwork,
    peer: String,
    closed: AtomicBool,
}

impl MockStorage {
    pub fn new(network: MockNetwork, peer: impl Into<String>) -> Self {
        Self {
            network,
            peer: peer.into(),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), MockError> {
        if self.closed.load(Ordering::Acquire) {
            Err(MockError::Closed)
        } else {
            Ok(())
        }
    }
}

pub struct MockLocalWriter {
    key: WriterKey,
    length: u64,
}

#[async_trait]
impl LocalWriter for MockLocalWriter {
    type Error = MockError;

    fn key(&self) -> WriterKey {
        self.key
    }

    fn length(&self) -> u64 {
        self.length
    }

    async fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[async_trait]
impl Storage for MockStorage {
    type Error = MockError;
    type Local = MockLocalWriter;
    type Log = MockLog;
    type View = MemoryViewStore;

    async fn ready(&self) -> Result<(), Self::Error> {
        self.check_open()?;
        let (writer, _) = self.network.disk(&self.peer);
        debug!("Storage {} ready with writer {}", self.peer, writer);
        Ok(())
    }

    async fn open_local(&self) -> Result<Self::Local, Self::Error> {
        self.check_open()?;
        let (key, _) = self.network.disk(&self.peer);
        Ok(MockLocalWriter {
            key,
            length: self.network.writer_length(&key),
        })
    }

    async fn open_views(&self) -> Result<Views<Self::View>, Self::Error> {
        self.check_open()?;
        Ok(Views::new(MemoryViewStore::new(), MemoryViewStore::new()))
    }

    async fn open_log(
        &self,
        bootstrap: Option<LogKeys>,
        apply: Arc<dyn Apply>,
    ) -> Result<Self::Log, Self::Error> {
        self.check_open()?;
        let (writer, existing) = self.network.disk(&self.peer);
        let keys = match (bootstrap, existing) {
            (Some(keys), _) => keys,
            (None, Some(key)) => {
                let (encryption_key, _) = self
                    .network
                    .log_info(&key)
                    .ok_or(MockError::UnknownLog(key))?;
                LogKeys { key, encryption_key }
            }
            (None, None) => self.network.create_log(writer),
        };
        self.network.set_disk_log(&self.peer, keys.key);
        MockLog::open(self.network.clone(), self.peer.clone(), writer, keys, apply).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
