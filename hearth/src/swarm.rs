//! The discovery collaborator.

use std::error::Error;

use async_trait::async_trait;

use crate::keys::DiscoveryKey;

/// Finds and connects to other peers of a room and replicates storage with
/// them.
#[async_trait]
pub trait Swarm: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    /// Announce and look up peers under `topic`. Returns once the topic has
    /// been joined; connections are made in the background.
    async fn join(&self, topic: DiscoveryKey) -> Result<(), Self::Error>;

    /// Leave every topic and drop every connection.
    async fn destroy(&self) -> Result<(), Self::Error>;
}
