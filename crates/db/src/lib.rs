//! PostgreSQL persistence for the job queue and the worker registry.

pub mod models;
pub mod queue;
pub mod registry;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;

pub use queue::PgJobQueue;
pub use registry::PgWorkerRegistry;

pub type DbPool = sqlx::PgPool;

/// Primary key type for all tables.
pub type DbId = i64;

pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
