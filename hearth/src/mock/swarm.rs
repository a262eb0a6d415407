use async_trait::async_trait;
use tracing::info;

use super::{error::MockError, network::MockNetwork};
use crate::{keys::DiscoveryKey, swarm::Swarm};

/// Discovery on a [MockNetwork]. Every peer of the network is reachable, so
/// the bootstrap list is only reported.
pub struct MockSwarm {
    network: MockNetwork,
    peer: String,
    bootstrap: Vec<String>,
}

impl MockSwarm {
    pub fn new(network: MockNetwork, peer: impl Into<String>, bootstrap: Vec<String>) -> Self {
        Self {
            network,
            peer: peer.into(),
            bootstrap,
        }
    }
}

#[async_trait]
impl Swarm for MockSwarm {
    type Error = MockError;

    async fn join(&self, topic: DiscoveryKey) -> Result<(), Self::Error> {
        info!(
            "{} joining topic {} via {} bootstrap nodes",
            self.peer,
            topic,
            self.bootstrap.len()
        );
        self.network.join_topic(&self.peer, topic);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), Self::Error> {
        self.network.leave_topics(&self.peer);
        Ok(())
    }
}
