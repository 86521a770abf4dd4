//! SQLite connection pool with WAL mode.
//!
//! Workflow transactions take the write lock with their first statement, so
//! the busy timeout is what queues concurrent writers behind each other.

use crate::config::StorageConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Create a new connection pool with WAL mode enabled.
///
/// # Arguments
/// * `db_path` - Path to the SQLite database file
/// * `storage` - Pool sizing and lock wait settings
pub async fn create_pool(db_path: &Path, storage: &StorageConfig) -> Result<DbPool, sqlx::Error> {
    let db_url = format!("sqlite:{}", db_path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // Designations and responses cascade with their request
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(storage.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(storage.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(storage.acquire_timeout_secs))
        .connect_with(connect_options)
        .await?;

    let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;

    debug_assert!(
        mode.0.to_lowercase() == "wal",
        "WAL mode should be enabled, got: {}",
        mode.0
    );

    Ok(pool)
}
