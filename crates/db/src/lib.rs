use std::str::FromStr;

use sqlx::{
    Pool, Sqlite, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

pub mod models;

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Shared handle to the SQLite pool. Cloning is cheap (the pool is an Arc).
#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    /// Connect to the database at `database_url` (created if missing) and
    /// bring the schema up to date.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        info!("database ready at {}", database_url);

        Ok(Self { pool })
    }

    /// In-memory database with migrations applied. A single connection that
    /// never gets reaped is mandatory: each `:memory:` connection is
    /// otherwise its own database.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

/// Convenience alias for test code that only needs a pool.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    Ok(DBService::new_in_memory().await?.pool)
}

/// Whether an error is the store saying "that row already exists". Schema
/// constraints are the authority on uniqueness; callers translate this into
/// their domain error instead of trusting a prior read.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
