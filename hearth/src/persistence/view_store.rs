//! The storage interface behind the materialized views.

use std::{error::Error, pin::Pin};

use async_trait::async_trait;
use futures::{Stream, StreamExt};

/// A stream of records read from a [ViewStore].
pub type RecordStream<E> = Pin<Box<dyn Stream<Item = Result<Record, E>> + Send>>;

/// A keyed record. `seq` is the log sequence of the operation which last
/// wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub seq: u64,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, seq: u64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            seq,
            value: value.into(),
        }
    }
}

/// A single staged change to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert, or replace the record with the same key.
    Insert { collection: String, record: Record },
    /// Remove a record. Removing an absent key is a no-op.
    Delete { collection: String, key: Vec<u8> },
}

/// Bounds on record keys. Keys compare bytewise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub gt: Option<Vec<u8>>,
    pub gte: Option<Vec<u8>>,
    pub lt: Option<Vec<u8>>,
    pub lte: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn exact(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        Self {
            gte: Some(key.clone()),
            lte: Some(key),
            ..Default::default()
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.gt.as_deref().map_or(true, |b| key > b)
            && self.gte.as_deref().map_or(true, |b| key >= b)
            && self.lt.as_deref().map_or(true, |b| key < b)
            && self.lte.as_deref().map_or(true, |b| key <= b)
    }
}

/// Iteration order of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// By key.
    #[default]
    Key,
    /// By the sequence of the last write, ties broken by key.
    Seq,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub range: KeyRange,
    pub order: Order,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Default::default()
    }

    pub fn key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            range: KeyRange::exact(key),
            ..Default::default()
        }
    }

    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = range;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filter, order and truncate an unordered set of records. Stores which
    /// cannot push the query down use this.
    pub fn select(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|record| self.range.contains(&record.key))
            .collect();
        match self.order {
            Order::Key => selected.sort_by(|a, b| a.key.cmp(&b.key)),
            Order::Seq => selected.sort_by(|a, b| (a.seq, &a.key).cmp(&(b.seq, &b.key))),
        }
        if self.reverse {
            selected.reverse();
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// This is the interface for the storage behind a view.
///
/// Only the apply engine commits mutations. A commit is atomic: either every
/// mutation of the batch is visible to subsequent reads or none is.
#[async_trait]
pub trait ViewStore: Send + Sync + 'static {
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;

    /// Stream the records of `collection` matching `query`.
    async fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<RecordStream<Self::Error>, Self::Error>;

    /// The first record matching `query`, if any.
    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Record>, Self::Error> {
        let query = query.clone().limit(1);
        let mut records = self.find(collection, &query).await?;
        records.next().await.transpose()
    }

    /// Apply a batch of mutations atomically.
    async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), Self::Error>;

    /// Release any resources held by the store.
    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
