//! In-process collaborators.
//!
//! A [MockNetwork] plays the part of a local testnet: it holds every shared
//! log, every peer's disk, the discovery topics peers have joined and the
//! pairing members listening on them. Rooms built from the same network can
//! find and pair with each other; rooms on different networks can't.
//!
//! Replication is modelled by gating delivery: a peer applies nodes written
//! by other writers only while it has joined the log's topic.

mod error;
mod log;
mod network;
mod pairing;
mod storage;
mod swarm;

pub use error::MockError;
pub use log::MockLog;
pub use network::MockNetwork;
pub use pairing::{MockMember, MockPairing, MockRequest};
pub use storage::{MockLocalWriter, MockStorage};
pub use swarm::MockSwarm;

use crate::{Room, RoomConfig};

/// A room running entirely on a [MockNetwork].
pub type MockRoom = Room<MockStorage, MockSwarm, MockPairing>;

impl MockNetwork {
    /// Build a room whose disk is identified by `config.storage`.
    pub fn room(&self, config: RoomConfig) -> MockRoom {
        let peer = config.storage.to_string_lossy().into_owned();
        let storage = MockStorage::new(self.clone(), peer.clone());
        let swarm = MockSwarm::new(self.clone(), peer, config.bootstrap.clone());
        let pairing = MockPairing::new(self.clone());
        Room::new(config, storage, swarm, pairing)
    }
}
