//! # The apply engine
//!
//! Folds ordered batches of log nodes into the document and event views.
//! For every batch the engine
//!
//! 1. dispatches each node through the [Router], in log order, staging view
//!    mutations and writer admissions in an [ApplyContext],
//! 2. flushes the document view and then the event view,
//! 3. hands writer admissions back to the log, and
//! 4. notifies subscribers with [RoomUpdate::Update], followed by
//!    [RoomUpdate::NewEvent] when the event view changed.
//!
//! A node which fails to decode or dispatch is a protocol desync. The batch
//! is abandoned before anything is flushed, and the error is returned to
//! the log, which must stop applying.

use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use prost::Message;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::{
    codec::{Action, Collection, Namespace},
    keys::WriterKey,
    oplog::{Apply, LogHandle, Node},
    persistence::{Record, ViewBatch, ViewStore, Views},
    proto::room::{Event, Invite, User, Writer},
    router::{DispatchError, Router},
};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("protocol desync at sequence {seq}: {source}")]
    Desync {
        seq: u64,
        #[source]
        source: DispatchError,
    },
    #[error("failed to flush the {view} view: {reason}")]
    Flush { view: &'static str, reason: String },
}

/// Notifications sent after each applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomUpdate {
    /// The views changed.
    Update,
    /// The event view changed.
    NewEvent,
}

/// State handed to every handler while a batch is dispatched.
#[derive(Debug, Default)]
pub struct ApplyContext {
    /// Sequence of the node being dispatched.
    pub seq: u64,
    /// Author of the node being dispatched.
    pub writer: WriterKey,
    pub document: ViewBatch,
    pub event: ViewBatch,
    pub log: LogHandle,
}

fn invalid(tag: &str, reason: impl ToString) -> DispatchError {
    DispatchError::InvalidPayload {
        tag: tag.to_owned(),
        reason: reason.to_string(),
    }
}

/// Register the handlers for every room action under `namespace`.
pub fn room_router(namespace: &Namespace) -> Router<ApplyContext> {
    let mut router = Router::new();

    let writers = namespace.collection(Collection::Writers);
    let tag = namespace.tag(Action::AddWriter);
    router.add(tag.clone(), move |writer: Writer, ctx: &mut ApplyContext| {
        let key = WriterKey::try_from(writer.key.as_slice()).map_err(|e| invalid(&tag, e))?;
        debug!("Writer {} admits {}", ctx.writer, key);
        ctx.log.add_writer(key);
        ctx.document
            .insert(&writers, Record::new(key.to_vec(), ctx.seq, writer.encode_to_vec()));
        Ok(())
    });

    let invites = namespace.collection(Collection::Invites);
    router.add(namespace.tag(Action::AddInvite), move |invite: Invite, ctx: &mut ApplyContext| {
        let value = invite.encode_to_vec();
        ctx.document.insert(&invites, Record::new(invite.id, ctx.seq, value));
        Ok(())
    });

    let invites = namespace.collection(Collection::Invites);
    router.add(namespace.tag(Action::DelInvite), move |invite: Invite, ctx: &mut ApplyContext| {
        ctx.document.delete(&invites, invite.id);
        Ok(())
    });

    let users = namespace.collection(Collection::Users);
    let tag = namespace.tag(Action::AddUser);
    router.add(tag.clone(), move |user: User, ctx: &mut ApplyContext| {
        user.info_value().map_err(|e| invalid(&tag, e))?;
        let value = user.encode_to_vec();
        ctx.document.insert(&users, Record::new(user.id, ctx.seq, value));
        Ok(())
    });

    let users = namespace.collection(Collection::Users);
    router.add(namespace.tag(Action::DelUser), move |user: User, ctx: &mut ApplyContext| {
        ctx.document.delete(&users, user.id);
        Ok(())
    });

    let events = namespace.collection(Collection::Events);
    let tag = namespace.tag(Action::AddEvent);
    router.add(tag.clone(), move |event: Event, ctx: &mut ApplyContext| {
        event.data_value().map_err(|e| invalid(&tag, e))?;
        let value = event.encode_to_vec();
        ctx.event.insert(&events, Record::new(event.id, ctx.seq, value));
        Ok(())
    });

    let events = namespace.collection(Collection::Events);
    router.add(namespace.tag(Action::DelEvent), move |event: Event, ctx: &mut ApplyContext| {
        ctx.event.delete(&events, event.id);
        Ok(())
    });

    router
}

fn flush_error<E: Error>(view: &'static str) -> impl FnOnce(E) -> ApplyError {
    move |e| ApplyError::Flush {
        view,
        reason: e.to_string(),
    }
}

pub struct ApplyEngine<V> {
    router: Router<ApplyContext>,
    views: Arc<Views<V>>,
    updates: broadcast::Sender<RoomUpdate>,
}

impl<V: ViewStore> ApplyEngine<V> {
    pub fn new(
        namespace: &Namespace,
        views: Arc<Views<V>>,
        updates: broadcast::Sender<RoomUpdate>,
    ) -> Self {
        Self {
            router: room_router(namespace),
            views,
            updates,
        }
    }

    pub async fn apply_batch(&self, nodes: &[Node], log: &mut LogHandle) -> Result<(), ApplyError> {
        let mut ctx = ApplyContext::default();
        for node in nodes {
            ctx.seq = node.seq;
            ctx.writer = node.writer;
            if let Err(source) = self.router.dispatch(&node.value, &mut ctx) {
                error!("Failed to apply node {} from {}: {}", node.seq, node.writer, source);
                return Err(ApplyError::Desync {
                    seq: node.seq,
                    source,
                });
            }
        }

        let ApplyContext {
            document,
            event,
            log: requested,
            ..
        } = ctx;
        let (documents, events) = (document.len(), event.len());
        let views = &*self.views;
        views
            .document
            .flush(document)
            .await
            .map_err(flush_error(views.document.name()))?;
        let new_events = views
            .event
            .flush(event)
            .await
            .map_err(flush_error(views.event.name()))?;
        log.merge(requested);

        debug!(
            "Applied {} nodes: {} document and {} event mutations",
            nodes.len(),
            documents,
            events
        );
        // no receivers is not an error
        let _ = self.updates.send(RoomUpdate::Update);
        if new_events {
            let _ = self.updates.send(RoomUpdate::NewEvent);
        }
        Ok(())
    }
}

#[async_trait]
impl<V: ViewStore> Apply for ApplyEngine<V> {
    async fn apply(&self, nodes: &[Node], log: &mut LogHandle) -> Result<(), ApplyError> {
        self.apply_batch(nodes, log).await
    }
}
