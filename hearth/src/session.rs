use std::sync::Arc;

use futures::TryStreamExt;
use prost::Message;
use serde_json::Value;
use tracing::trace;

use crate::{
    codec::{Collection, Namespace, RoomOp},
    constants::DEFAULT_EVENT_LIMIT,
    error::{RoomError, RoomResult},
    keys::WriterKey,
    oplog::OperationLog,
    persistence::{KeyRange, Order, Query, Record, View, ViewStore, Views},
    proto::room::{Event, Invite, User},
};

/// A user as read back from the document view.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub info: Value,
}

/// An event as read back from the event view.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub data: Value,
}

/// Feed style read of the event view. Bounds apply to event ids, results
/// are ordered by insertion. The default yields the 100 newest events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub reverse: bool,
    pub limit: Option<usize>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            reverse: true,
            limit: Some(DEFAULT_EVENT_LIMIT),
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }
}

impl EventQuery {
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn gt(mut self, id: impl Into<String>) -> Self {
        self.gt = Some(id.into());
        self
    }

    pub fn gte(mut self, id: impl Into<String>) -> Self {
        self.gte = Some(id.into());
        self
    }

    pub fn lt(mut self, id: impl Into<String>) -> Self {
        self.lt = Some(id.into());
        self
    }

    pub fn lte(mut self, id: impl Into<String>) -> Self {
        self.lte = Some(id.into());
        self
    }

    fn to_query(&self) -> Query {
        let bound = |id: &Option<String>| id.as_ref().map(|id| id.as_bytes().to_vec());
        Query {
            range: KeyRange {
                gt: bound(&self.gt),
                gte: bound(&self.gte),
                lt: bound(&self.lt),
                lte: bound(&self.lte),
            },
            order: Order::Seq,
            reverse: self.reverse,
            limit: self.limit,
        }
    }
}

fn decode<M: Message + Default>(record: &Record) -> RoomResult<M> {
    Ok(M::decode(record.value.as_slice()).map_err(crate::codec::CodecError::from)?)
}

/// The open state of a room: its log and views.
pub(crate) struct Session<L, V> {
    namespace: Namespace,
    log: Arc<L>,
    views: Arc<Views<V>>,
}

impl<L: OperationLog, V: ViewStore> Session<L, V> {
    pub fn new(namespace: Namespace, log: Arc<L>, views: Arc<Views<V>>) -> Self {
        Self {
            namespace,
            log,
            views,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Encode and append one operation.
    pub async fn append(&self, op: RoomOp) -> RoomResult<()> {
        trace!("Appending {}", self.namespace.tag(op.action()));
        self.log
            .append(op.encode(&self.namespace))
            .await
            .map_err(RoomError::log)
    }

    async fn records(&self, view: &View<V>, collection: Collection, query: &Query) -> RoomResult<Vec<Record>> {
        view.find(&self.namespace.collection(collection), query)
            .await
            .map_err(RoomError::view)?
            .try_collect()
            .await
            .map_err(RoomError::view)
    }

    /// Every invite record, oldest first.
    pub async fn invites(&self) -> RoomResult<Vec<Invite>> {
        let query = Query::all().order(Order::Seq);
        self.records(&self.views.document, Collection::Invites, &query)
            .await?
            .iter()
            .map(decode)
            .collect()
    }

    pub async fn invite(&self, id: &[u8]) -> RoomResult<Option<Invite>> {
        self.views
            .document
            .find_one(&self.namespace.collection(Collection::Invites), &Query::key(id))
            .await
            .map_err(RoomError::view)?
            .as_ref()
            .map(decode)
            .transpose()
    }

    pub async fn users(&self) -> RoomResult<Vec<UserRecord>> {
        self.records(&self.views.document, Collection::Users, &Query::all())
            .await?
            .iter()
            .map(|record| -> RoomResult<UserRecord> {
                let user: User = decode(record)?;
                Ok(UserRecord {
                    info: user.info_value()?,
                    id: user.id,
                })
            })
            .collect()
    }

    pub async fn events(&self, query: &EventQuery) -> RoomResult<Vec<EventRecord>> {
        self.records(&self.views.event, Collection::Events, &query.to_query())
            .await?
            .iter()
            .map(|record| -> RoomResult<EventRecord> {
                let event: Event = decode(record)?;
                Ok(EventRecord {
                    data: event.data_value()?,
                    id: event.id,
                })
            })
            .collect()
    }

    /// Writers admitted through `add-writer`, in admission order. The
    /// bootstrap writer is not listed.
    pub async fn writers(&self) -> RoomResult<Vec<WriterKey>> {
        let query = Query::all().order(Order::Seq);
        self.records(&self.views.document, Collection::Writers, &query)
            .await?
            .iter()
            .map(|record| -> RoomResult<WriterKey> {
                Ok(WriterKey::try_from(record.key.as_slice())?)
            })
            .collect()
    }

    /// Close the log, then both views. Every step runs; the first failure
    /// is returned.
    pub async fn close(&self) -> RoomResult<()> {
        let log = self.log.close().await.map_err(RoomError::log);
        let document = self.views.document.close().await.map_err(RoomError::view);
        let event = self.views.event.close().await.map_err(RoomError::view);
        log.and(document).and(event)
    }
}
