//! # Hearth
//!
//! Hearth is a replicated, multi-writer room. Every peer of a room appends
//! operations to one shared, totally ordered log, and every peer folds that
//! log into the same materialized views: a document view of users, invites
//! and writers, and an event view of feed style events.
//!
//! New peers join by redeeming an invite. A member of the room verifies the
//! request, admits the candidate's writer key through the log and hands the
//! candidate the log's keys. From then on both peers can write.
//!
//! ## Getting Started
//!
//! A [Room] is generic over its collaborators: [Storage] (the writer core,
//! log and view stores), [Swarm] (peer discovery) and [Pairing] (the invite
//! handshake). The `mocks` feature provides in-process implementations of
//! all three on a shared `MockNetwork`.
//!
//! ``` no_run
//! use hearth::{EventQuery, Pairing, Room, RoomResult, Storage, Swarm};
//! use serde_json::json;
//!
//! async fn host<S: Storage, D: Swarm, P: Pairing>(room: Room<S, D, P>) -> RoomResult<()> {
//!     room.ready().await?;
//!
//!     // hand this to a peer, who opens its own room with it
//!     let invite = room.create_invite().await?;
//!     println!("{invite}");
//!
//!     room.add_user("user1", &json!({"hello": "world"})).await?;
//!     room.add_event("2024-01-01T00:00:00Z", &json!({"kind": "joined"})).await?;
//!
//!     for user in room.get_users().await? {
//!         println!("{} {}", user.id, user.info);
//!     }
//!     let newest = room.get_events(&EventQuery::default().limit(Some(10))).await?;
//!     println!("{} events", newest.len());
//!
//!     room.close().await
//! }
//! ```
//!
//! ### Determinism
//!
//! Views are written only by the apply engine, and only from the ordered
//! log. Operation handlers are pure functions of their payload, so any two
//! peers which have applied the same prefix of the log read the same
//! records. An operation which can't be decoded halts the peer rather than
//! being skipped.
//!
//! ## Crate feature flags
//!
//! - `sqlite`: A view store backed by sqlite. Enabled by default.
//! - `mocks`: In-process collaborators for tests and demos.

pub mod apply;
pub mod codec;
pub(crate) mod constants;
pub mod keys;
pub mod oplog;
pub mod pairing;
pub mod persistence;
pub mod proto;
pub mod router;
pub mod storage;
pub mod swarm;

mod admission;
mod config;
mod error;
#[cfg(any(test, feature = "mocks"))]
pub mod mock;
mod room;
mod session;
mod util;

pub use apply::RoomUpdate;
pub use config::RoomConfig;
pub use error::{BoxError, RoomError, RoomResult};
pub use keys::{DiscoveryKey, EncryptionKey, LogKey, WriterKey};
pub use oplog::{LogKeys, OperationLog};
pub use pairing::Pairing;
pub use persistence::{
    KeyRange, Mutation, Order, Query, Record, RecordStream, View, ViewBatch, ViewStore, Views,
};
pub use room::{Lifecycle, Room};
pub use session::{EventQuery, EventRecord, UserRecord};
pub use storage::Storage;
pub use swarm::Swarm;
