use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_stream::stream;
use tokio::sync::RwLock;

use crate::persistence::{
    mock::error::MockViewError, Mutation, Query, Record, RecordStream, ViewStore,
};

type Collection = BTreeMap<Vec<u8>, (u64, Vec<u8>)>;

/// An in-memory view store. Commits take the write lock for the whole
/// batch, so readers never observe half a flush.
#[derive(Debug, Default)]
pub struct MemoryViewStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    closed: AtomicBool,
}

impl MemoryViewStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn check_open(&self) -> Result<(), MockViewError> {
        if self.closed.load(Ordering::Acquire) {
            Err(MockViewError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ViewStore for MemoryViewStore {
    type Error = MockViewError;

    async fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<RecordStream<Self::Error>, Self::Error> {
        self.check_open()?;
        let records = {
            let lock = self.collections.read().await;
            let rows = lock.get(collection).into_iter().flatten();
            query.select(
                rows.map(|(key, (seq, value))| Record::new(key.clone(), *seq, value.clone())),
            )
        };
        Ok(Box::pin(stream! {
            for record in records {
                yield Ok::<_, MockViewError>(record);
            }
        }))
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), Self::Error> {
        self.check_open()?;
        let mut lock = self.collections.write().await;
        for mutation in mutations {
            match mutation {
                Mutation::Insert { collection, record } => {
                    lock.entry(collection)
                        .or_default()
                        .insert(record.key, (record.seq, record.value));
                }
                Mutation::Delete { collection, key } => {
                    if let Some(rows) = lock.get_mut(&collection) {
                        rows.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
