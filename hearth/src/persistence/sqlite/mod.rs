mod error;
mod view;

pub use error::SqlError;
pub use view::SqliteViewStore;

use sqlx::SqlitePool;

/// Create the `view_records` table if it doesn't exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqlError> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}
