//! The operation codec.
//!
//! Every log entry is an [Operation](crate::proto::room::Operation)
//! envelope: a namespaced tag such as `@multiWriter/add-user` plus the
//! encoded payload record for that tag. Encoding is deterministic so that
//! every peer folds byte-identical entries.
//!
//! Tags outside the room's namespace, or unknown actions within it, are a
//! [CodecError::UnknownTag]. Malformed bytes are a [CodecError::Malformed].
//! Both are fatal to the apply engine.

mod decoder;
mod encoder;

use std::fmt;

use thiserror::Error;

use crate::{
    constants::DEFAULT_NAMESPACE,
    proto::room::{Event, Invite, User, Writer},
};

pub use decoder::decode_operation;
pub use encoder::encode_operation;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed operation: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("unknown operation tag {0}")]
    UnknownTag(String),
}

/// Every mutation a room understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    AddWriter,
    AddInvite,
    DelInvite,
    AddUser,
    DelUser,
    AddEvent,
    DelEvent,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::AddWriter,
        Action::AddInvite,
        Action::DelInvite,
        Action::AddUser,
        Action::DelUser,
        Action::AddEvent,
        Action::DelEvent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::AddWriter => "add-writer",
            Action::AddInvite => "add-invite",
            Action::DelInvite => "del-invite",
            Action::AddUser => "add-user",
            Action::DelUser => "del-user",
            Action::AddEvent => "add-event",
            Action::DelEvent => "del-event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }
}

/// Collections held by the views. Writers, invites and users live in the
/// document view, events in the event view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Writers,
    Invites,
    Users,
    Events,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Writers => "writers",
            Collection::Invites => "invites",
            Collection::Users => "users",
            Collection::Events => "events",
        }
    }
}

/// Prefix shared by the operation tags and collection names of one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tag(&self, action: Action) -> String {
        format!("@{}/{}", self.0, action.name())
    }

    pub fn collection(&self, collection: Collection) -> String {
        format!("@{}/{}", self.0, collection.name())
    }

    /// Resolve a tag produced by [Namespace::tag] back to its action.
    pub fn action(&self, tag: &str) -> Result<Action, CodecError> {
        tag.strip_prefix('@')
            .and_then(|rest| rest.strip_prefix(self.0.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(Action::from_name)
            .ok_or_else(|| CodecError::UnknownTag(tag.to_owned()))
    }
}

/// A decoded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOp {
    AddWriter(Writer),
    AddInvite(Invite),
    DelInvite(Invite),
    AddUser(User),
    DelUser(User),
    AddEvent(Event),
    DelEvent(Event),
}

impl RoomOp {
    pub fn action(&self) -> Action {
        match self {
            RoomOp::AddWriter(_) => Action::AddWriter,
            RoomOp::AddInvite(_) => Action::AddInvite,
            RoomOp::DelInvite(_) => Action::DelInvite,
            RoomOp::AddUser(_) => Action::AddUser,
            RoomOp::DelUser(_) => Action::DelUser,
            RoomOp::AddEvent(_) => Action::AddEvent,
            RoomOp::DelEvent(_) => Action::DelEvent,
        }
    }
}
