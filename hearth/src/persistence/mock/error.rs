use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockViewError {
    #[error("view store is closed")]
    Closed,
}
