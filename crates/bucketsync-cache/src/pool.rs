//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` for the BucketSync state database. File-backed
//! databases run in WAL mode so the sync engine, the journal and watcher
//! callbacks can read while another task writes. In-memory databases are
//! restricted to a single connection, since each SQLite memory connection
//! is its own database.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the SQLite pool and applies the schema on open
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path` and applies the schema
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the directory or connection
    /// cannot be created, or `CacheError::MigrationFailed` if the schema
    /// cannot be applied.
    pub async fn open(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to open database at {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::apply_schema(&pool).await?;
        tracing::info!(path = %db_path.display(), "State database opened");

        Ok(Self { pool })
    }

    /// Creates a fresh in-memory database
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::open`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Invalid in-memory database URL: {e}"))
            })?
            .foreign_keys(true);

        // The database lives and dies with its only connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::apply_schema(&pool).await?;
        tracing::debug!("In-memory state database ready");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        let schema = include_str!("migrations/20261001_initial.sql");
        sqlx::raw_sql(schema)
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to apply schema: {e}")))?;
        tracing::debug!("Database schema applied");
        Ok(())
    }
}
