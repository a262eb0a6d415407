use futures::TryStreamExt;

use super::{Mutation, Query, Record, RecordStream, ViewStore};

/// Mutations staged by handlers while a batch of operations is applied.
#[derive(Debug, Default)]
pub struct ViewBatch {
    mutations: Vec<Mutation>,
}

impl ViewBatch {
    pub fn insert(&mut self, collection: &str, record: Record) {
        self.mutations.push(Mutation::Insert {
            collection: collection.to_owned(),
            record,
        });
    }

    pub fn delete(&mut self, collection: &str, key: impl Into<Vec<u8>>) {
        self.mutations.push(Mutation::Delete {
            collection: collection.to_owned(),
            key: key.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// A named, read only handle over a [ViewStore]. Writes happen solely
/// through [View::flush], which the apply engine calls once per batch.
pub struct View<V> {
    name: &'static str,
    store: V,
}

impl<V: ViewStore> View<V> {
    pub fn new(name: &'static str, store: V) -> Self {
        Self { name, store }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn find(&self, collection: &str, query: &Query) -> Result<RecordStream<V::Error>, V::Error> {
        self.store.find(collection, query).await
    }

    pub async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Record>, V::Error> {
        self.store.find_one(collection, query).await
    }

    pub async fn collect(&self, collection: &str, query: &Query) -> Result<Vec<Record>, V::Error> {
        self.store.find(collection, query).await?.try_collect().await
    }

    /// Commit a batch. Returns whether anything was written.
    pub(crate) async fn flush(&self, batch: ViewBatch) -> Result<bool, V::Error> {
        if batch.is_empty() {
            return Ok(false);
        }
        self.store.commit(batch.into_mutations()).await?;
        Ok(true)
    }

    pub async fn close(&self) -> Result<(), V::Error> {
        self.store.close().await
    }
}

/// The two projections of a room: a document view holding writers, invites
/// and users, and an event view holding events.
pub struct Views<V> {
    pub document: View<V>,
    pub event: View<V>,
}

impl<V: ViewStore> Views<V> {
    pub fn new(document: V, event: V) -> Self {
        Self {
            document: View::new("document", document),
            event: View::new("event", event),
        }
    }
}
