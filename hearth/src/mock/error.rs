use thiserror::Error;

use crate::{
    apply::ApplyError,
    keys::{LogKey, WriterKey},
};

#[derive(Debug, Error)]
pub enum MockError {
    #[error("log {0} is not known to the network")]
    UnknownLog(LogKey),
    #[error("writer {0} has not been admitted")]
    NotWritable(WriterKey),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("replay halted after an apply failure")]
    Halted,
    #[error("closed")]
    Closed,
}
