//! Database layer for SQLite storage.
//!
//! This module handles all database operations including:
//! - Connection pool management with WAL mode
//! - Schema migrations (`sqlx::migrate!`)
//! - Member lookup queries

pub mod members;
pub mod pool;

use crate::config::StorageConfig;
use sqlx::migrate::{MigrateError, Migrator};
use std::path::Path;
use thiserror::Error;

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
}

/// Embedded migrations from `src/db/migrations`, applied in version order.
static MIGRATOR: Migrator = sqlx::migrate!("./src/db/migrations");

/// Initialize the database with default storage settings.
pub async fn initialize(db_path: &Path) -> Result<pool::DbPool, DbError> {
    initialize_with(db_path, &StorageConfig::default()).await
}

/// Initialize the database: create the file if needed and run migrations.
///
/// # Arguments
/// * `db_path` - Path to the SQLite database file
/// * `storage` - Pool settings
///
/// # Returns
/// A connection pool configured with WAL mode
pub async fn initialize_with(
    db_path: &Path,
    storage: &StorageConfig,
) -> Result<pool::DbPool, DbError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = pool::create_pool(db_path, storage).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run all pending database migrations.
///
/// Applied versions are recorded in `_sqlx_migrations`; an edited migration
/// that was already applied fails with a checksum mismatch.
async fn run_migrations(pool: &pool::DbPool) -> Result<(), DbError> {
    MIGRATOR.run(pool).await?;

    log::debug!("[db] Migrations up to date ({} known)", MIGRATOR.iter().count());

    Ok(())
}
