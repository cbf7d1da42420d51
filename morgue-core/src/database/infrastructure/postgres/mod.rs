//! Postgres adapters for the queue and catalog ports.

mod catalog;
mod queue;

pub use catalog::PostgresCatalogRepository;
pub use queue::PostgresIngestionQueue;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::error::{IngestError, Result};

/// Open a connection pool and verify the server answers.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| {
            IngestError::Config(format!("Failed to connect to Postgres: {e}"))
        })?;

    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            IngestError::Internal(format!("Postgres health check failed: {e}"))
        })?;

    Ok(pool)
}

/// Apply pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    crate::MIGRATOR
        .run(pool)
        .await
        .map_err(|e| IngestError::Internal(format!("Migration failed: {e}")))
}
