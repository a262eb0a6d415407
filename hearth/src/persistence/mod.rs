//! # Materialized views
//!
//! A room projects its log into two views. The document view holds the
//! writers, invites and users collections, and the event view holds the
//! events collection. Both are folds of the same ordered log, so every peer
//! which has applied the same prefix reads the same records.
//!
//! ## Storage
//!
//! Views sit on a [ViewStore]. Two are provided:
//!
//! * [SqliteViewStore](sqlite::SqliteViewStore) keeps records in a single
//!   `view_records` table and commits each flush in one transaction.
//! * [MemoryViewStore](mock::MemoryViewStore) keeps records in a
//!   `BTreeMap`, for tests and the in-process network.
//!
//! ## Writes
//!
//! Handlers never write to a store directly. They stage [Mutation]s in a
//! [ViewBatch], and the apply engine flushes the document batch and then
//! the event batch once the whole batch of operations has been dispatched.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

mod view_store;
mod views;

pub use view_store::{KeyRange, Mutation, Order, Query, Record, RecordStream, ViewStore};
pub use views::{View, ViewBatch, Views};
