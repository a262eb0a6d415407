use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Newtype around [sqlx::Error]
#[derive(Debug, Error)]
#[error("sqlx error: {0}")]
pub struct SqlError(#[from] sqlx::Error);

impl From<MigrateError> for SqlError {
    fn from(error: MigrateError) -> Self {
        Self(sqlx::Error::Migrate(Box::new(error)))
    }
}
