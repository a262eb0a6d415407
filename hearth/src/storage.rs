//! The storage collaborator: a per-peer directory holding the local writer
//! core, the replicated log and the view stores.

use std::{error::Error, sync::Arc};

use async_trait::async_trait;

use crate::{
    keys::WriterKey,
    oplog::{Apply, LogKeys, OperationLog},
    persistence::{ViewStore, Views},
};

/// This peer's own writer core, opened before the log to decide whether a
/// pairing handshake is needed.
#[async_trait]
pub trait LocalWriter: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    fn key(&self) -> WriterKey;

    /// Number of nodes this writer has ever appended.
    fn length(&self) -> u64;

    async fn close(self) -> Result<(), Self::Error>;
}

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;
    type Local: LocalWriter;
    type Log: OperationLog;
    type View: ViewStore;

    async fn ready(&self) -> Result<(), Self::Error>;

    async fn open_local(&self) -> Result<Self::Local, Self::Error>;

    async fn open_views(&self) -> Result<Views<Self::View>, Self::Error>;

    /// Open the log. `bootstrap` carries the keys of an existing log
    /// received through pairing. Without it, the log previously opened in
    /// this storage is reopened, or a new one is created with the local
    /// writer as its bootstrap writer.
    async fn open_log(
        &self,
        bootstrap: Option<LogKeys>,
        apply: Arc<dyn Apply>,
    ) -> Result<Self::Log, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;
}
