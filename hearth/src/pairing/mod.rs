//! # Blind pairing
//!
//! Admits new writers to a room in exchange for an invite.
//!
//! An invite is an ed25519 seed together with the room's discovery key. The
//! inviting peer keeps only the seed's public key and an id derived from it
//! in the document view. A candidate signs its offered writer key with the
//! seed and broadcasts the request on the room topic. Any member holding the
//! matching invite record can verify the request with
//! [MemberRequest::open], admit the writer and [MemberRequest::confirm] with
//! the room's [LogKeys](crate::oplog::LogKeys).
//!
//! Members that don't recognize the invite stay silent, so a candidate can't
//! learn which invites are valid. It simply never hears back.

pub mod invite;

use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    keys::{DiscoveryKey, KeyLengthError, LogKey, WriterKey},
    oplog::LogKeys,
    proto::room::Invite,
};

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("malformed pairing message: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("invalid invite: {0}")]
    InvalidInvite(&'static str),
    #[error(transparent)]
    Key(#[from] KeyLengthError),
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("request does not match the invite")]
    InviteMismatch,
    #[error("bad request signature")]
    BadSignature,
    #[error("request has not been opened")]
    NotOpened,
    #[error("candidate is no longer waiting")]
    CandidateGone,
    #[error("pairing is closed")]
    Closed,
}

/// An inbound request received by a member.
#[async_trait]
pub trait MemberRequest: Send + 'static {
    type Error: Error + Send + Sync + 'static;

    fn invite_id(&self) -> &[u8];

    /// The writer key offered by the candidate.
    fn user_data(&self) -> &[u8];

    /// Verify the request against the invite's stored public key. Must
    /// succeed before [MemberRequest::confirm].
    fn open(&mut self, public_key: &[u8]) -> Result<(), Self::Error>;

    /// Admit the candidate by handing it the room's keys.
    async fn confirm(self, keys: LogKeys) -> Result<(), Self::Error>;
}

/// Receives the requests addressed to a member.
#[async_trait]
pub trait RequestHandler<R: MemberRequest>: Send + Sync + 'static {
    async fn on_request(&self, request: R);
}

#[async_trait]
pub trait Pairing: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;
    type Request: MemberRequest;
    /// Handle to a registered member, released with [Pairing::close_member].
    type Member: Send + Sync + 'static;

    /// Create a fresh invite for the log identified by `key`, valid until
    /// `expires` (unix milliseconds).
    async fn create_invite(&self, key: &LogKey, expires: i64) -> Result<Invite, Self::Error>;

    /// Offer `user_data` to the members of the room the invite belongs to.
    /// Suspends until a member confirms.
    async fn add_candidate(&self, invite: &[u8], user_data: WriterKey) -> Result<LogKeys, Self::Error>;

    /// Start answering requests published under `topic`.
    async fn add_member(
        &self,
        topic: DiscoveryKey,
        handler: Arc<dyn RequestHandler<Self::Request>>,
    ) -> Result<Self::Member, Self::Error>;

    async fn close_member(&self, member: Self::Member) -> Result<(), Self::Error>;

    /// Abandon every candidate and member.
    async fn close(&self) -> Result<(), Self::Error>;
}
