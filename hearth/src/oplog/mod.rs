//! # The shared operation log
//!
//! A room is a fold over a single, totally ordered log of operations which
//! any admitted writer may append to. The log itself is a collaborator:
//! this crate only defines the contract it must honor.
//!
//! * Every peer observes the same order and hands it to an [Apply]
//!   implementation in contiguous batches.
//! * A node is only applied once its author has been admitted, either as
//!   the bootstrap writer or through an earlier `add-writer` operation.
//! * Writer admissions requested through the [LogHandle] take effect once
//!   the batch that requested them has been applied.

mod node;

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::{
    apply::ApplyError,
    keys::{DiscoveryKey, EncryptionKey, LogKey, WriterKey},
};

pub use node::{LogHandle, Node};

/// The keys a writer needs to open an existing log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogKeys {
    pub key: LogKey,
    pub encryption_key: EncryptionKey,
}

/// Folds batches of ordered nodes into the views.
#[async_trait]
pub trait Apply: Send + Sync + 'static {
    /// Apply `nodes` in order. On error nothing from the batch may be
    /// considered applied, and the log must not advance past it.
    async fn apply(&self, nodes: &[Node], log: &mut LogHandle) -> Result<(), ApplyError>;
}

/// A replicated, totally ordered, multi-writer log.
#[async_trait]
pub trait OperationLog: Send + Sync + 'static {
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;

    fn key(&self) -> LogKey;

    fn discovery_key(&self) -> DiscoveryKey {
        self.key().discovery_key()
    }

    fn encryption_key(&self) -> EncryptionKey;

    /// This peer's writer key.
    fn local_key(&self) -> WriterKey;

    /// Watch whether the local writer has been admitted.
    fn writable(&self) -> watch::Receiver<bool>;

    /// Append an encoded operation. Fails if the local writer has not been
    /// admitted. Once this returns, the local node has been applied.
    async fn append(&self, value: Bytes) -> Result<(), Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;
}
