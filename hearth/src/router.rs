//! Tag based dispatch of decoded operations to their handlers.

use std::collections::HashMap;

use prost::Message;
use thiserror::Error;
use tracing::warn;

use crate::codec::{decode_operation, CodecError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no handler registered for {0}")]
    Unhandled(String),
    #[error("invalid {tag} payload: {reason}")]
    InvalidPayload { tag: String, reason: String },
}

type Handler<C> = Box<dyn Fn(&[u8], &mut C) -> Result<(), DispatchError> + Send + Sync>;

/// Maps operation tags to handlers which mutate a context `C`.
///
/// Handlers are synchronous and must depend only on their payload and the
/// context they are given. This keeps dispatch deterministic across peers.
pub struct Router<C> {
    handlers: HashMap<String, Handler<C>>,
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register `handler` for `tag`. The payload is decoded as `P` before the
    /// handler runs. A second registration for the same tag replaces the
    /// first.
    pub fn add<P, F>(&mut self, tag: impl Into<String>, handler: F)
    where
        P: Message + Default,
        F: Fn(P, &mut C) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        let tag = tag.into();
        let handler: Handler<C> = Box::new(move |payload, ctx| {
            let payload = P::decode(payload).map_err(CodecError::from)?;
            handler(payload, ctx)
        });
        if self.handlers.insert(tag.clone(), handler).is_some() {
            warn!("Replaced handler for {}", tag);
        }
    }

    /// Decode one operation envelope and run its handler.
    pub fn dispatch(&self, bytes: &[u8], ctx: &mut C) -> Result<(), DispatchError> {
        let op = decode_operation(bytes)?;
        let handler = self
            .handlers
            .get(&op.tag)
            .ok_or_else(|| DispatchError::Unhandled(op.tag.clone()))?;
        handler(&op.payload, ctx)
    }
}
