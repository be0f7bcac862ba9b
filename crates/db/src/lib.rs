//! Persistence for the relay: sqlx models and repositories over
//! PostgreSQL, and the [`SharedStore`] seam used by the dispatcher and the
//! agent runtime.

pub mod models;
pub mod repositories;
pub mod store;

use relay_core::error::CoreError;
use sqlx::postgres::PgPoolOptions;

pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
pub use store::SharedStore;

pub type DbPool = sqlx::PgPool;

/// Errors surfaced by a [`SharedStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A stored row does not fit the data model.
    #[error("Store invariant violated: {0}")]
    Invariant(String),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::Invariant(err.to_string())
    }
}

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
