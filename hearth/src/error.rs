use std::error::Error;

use thiserror::Error;

use crate::{codec::CodecError, keys::KeyLengthError};

pub type BoxError = Box<dyn Error + Send + Sync>;

pub type RoomResult<T> = Result<T, RoomError>;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room is not open")]
    NotOpen,
    #[error("room is closed")]
    Closed,
    #[error("storage error: {0}")]
    Storage(BoxError),
    #[error("log error: {0}")]
    Log(BoxError),
    #[error("view error: {0}")]
    View(BoxError),
    #[error("pairing error: {0}")]
    Pairing(BoxError),
    #[error("discovery error: {0}")]
    Swarm(BoxError),
    #[error("invalid invite: {0}")]
    InvalidInvite(String),
    #[error("timed out waiting to be admitted")]
    JoinTimeout,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Key(#[from] KeyLengthError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl RoomError {
    pub(crate) fn storage<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Storage(Box::new(error))
    }

    pub(crate) fn log<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Log(Box::new(error))
    }

    pub(crate) fn view<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::View(Box::new(error))
    }

    pub(crate) fn pairing<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Pairing(Box::new(error))
    }

    pub(crate) fn swarm<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Swarm(Box::new(error))
    }
}
