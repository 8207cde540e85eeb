//! SQLite implementation of IStateRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! state repository port defined in bucketsync-core. It handles domain type
//! conversion at the row boundary and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type                      | SQL Type | Strategy                                   |
//! |----------------------------------|----------|--------------------------------------------|
//! | ConfigId, MappingId, JobId, ...  | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | ActivityId                       | INTEGER  | `AUTOINCREMENT` row id                     |
//! | ObjectKey                        | TEXT     | `.as_str()` / `ObjectKey::new()`           |
//! | DateTime<Utc>                    | TEXT     | RFC 3339, microseconds, `Z` suffix         |
//! | JobStatus, ActivityAction/Status | TEXT     | `Display` / `FromStr`                      |
//! | bool                             | INTEGER  | 0 / 1                                      |
//!
//! Timestamps use a fixed-width format so string comparison in SQL matches
//! chronological order.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use bucketsync_core::domain::{
    newtypes::{ActivityId, ConfigId, FileRecordId, JobId, MappingId, ObjectKey},
    ActivityAction, ActivityRecord, ActivityStatus, FileRecord, JobStatus, Mapping,
    SyncConfiguration, SyncJob,
};
use bucketsync_core::ports::{ActivityQuery, IStateRepository};

use crate::CacheError;

/// SQLite-based implementation of the state repository port
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| CacheError::SerializationError(format!("Failed to parse datetime '{s}': {e}")))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_field<T>(value: &str, what: &str) -> Result<T, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| CacheError::SerializationError(format!("Invalid {what} '{value}': {e}")))
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn configuration_from_row(row: &SqliteRow) -> Result<SyncConfiguration, CacheError> {
    let id: String = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let interval_minutes: i64 = row.try_get("interval_minutes")?;
    let is_active: bool = row.try_get("is_active")?;
    let last_sync: Option<String> = row.try_get("last_sync_timestamp")?;

    Ok(SyncConfiguration::with_id(
        parse_field::<ConfigId>(&id, "configuration id")?,
        name,
        u32::try_from(interval_minutes).unwrap_or(0),
        is_active,
        parse_optional_datetime(last_sync)?,
    ))
}

fn mapping_from_row(row: &SqliteRow) -> Result<Mapping, CacheError> {
    let id: String = row.try_get("id")?;
    let config_id: String = row.try_get("config_id")?;
    let local_path: String = row.try_get("local_path")?;
    let bucket_id: String = row.try_get("bucket_id")?;

    Ok(Mapping::with_id(
        parse_field::<MappingId>(&id, "mapping id")?,
        PathBuf::from(local_path),
        bucket_id,
        parse_field::<ConfigId>(&config_id, "configuration id")?,
    ))
}

fn job_from_row(row: &SqliteRow) -> Result<SyncJob, CacheError> {
    let id: String = row.try_get("id")?;
    let config_id: String = row.try_get("config_id")?;
    let status: String = row.try_get("status")?;
    let start_time: String = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    let files_handled: i64 = row.try_get("files_handled")?;
    let error: Option<String> = row.try_get("error")?;

    Ok(SyncJob::with_id(
        parse_field::<JobId>(&id, "job id")?,
        parse_field::<ConfigId>(&config_id, "configuration id")?,
        parse_field::<JobStatus>(&status, "job status")?,
        parse_datetime(&start_time)?,
        parse_optional_datetime(end_time)?,
        u64::try_from(files_handled).unwrap_or(0),
        error,
    ))
}

fn file_record_from_row(row: &SqliteRow) -> Result<FileRecord, CacheError> {
    let id: String = row.try_get("id")?;
    let remote_id: Option<String> = row.try_get("remote_id")?;
    let name: String = row.try_get("name")?;
    let key: String = row.try_get("key")?;
    let is_folder: bool = row.try_get("is_folder")?;
    let size: i64 = row.try_get("size")?;
    let mime_type: Option<String> = row.try_get("mime_type")?;
    let bucket_id: String = row.try_get("bucket_id")?;
    let parent_key: Option<String> = row.try_get("parent_key")?;
    let is_synced: bool = row.try_get("is_synced")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    let key = ObjectKey::new(key).map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let parent_key = parent_key
        .map(ObjectKey::new)
        .transpose()
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    Ok(FileRecord::with_id(
        parse_field::<FileRecordId>(&id, "file record id")?,
        remote_id,
        name,
        key,
        is_folder,
        u64::try_from(size).unwrap_or(0),
        mime_type,
        bucket_id,
        parent_key,
        is_synced,
        parse_optional_datetime(last_synced_at)?,
    ))
}

fn activity_from_row(row: &SqliteRow) -> Result<ActivityRecord, CacheError> {
    let id: i64 = row.try_get("id")?;
    let action: String = row.try_get("action")?;
    let file_name: String = row.try_get("file_name")?;
    let status: String = row.try_get("status")?;
    let error: Option<String> = row.try_get("error")?;
    let created_at: String = row.try_get("created_at")?;
    let synced: bool = row.try_get("synced")?;
    let sync_job_id: Option<String> = row.try_get("sync_job_id")?;
    let config_id: Option<String> = row.try_get("config_id")?;
    let bucket_id: Option<String> = row.try_get("bucket_id")?;

    let mut record = ActivityRecord::new(
        parse_field::<ActivityAction>(&action, "activity action")?,
        file_name,
        parse_field::<ActivityStatus>(&status, "activity status")?,
    )
    .with_id(ActivityId::new(id))
    .with_created_at(parse_datetime(&created_at)?)
    .with_synced(synced);

    if let Some(error) = error {
        record = record.with_error(error);
    }
    if let Some(bucket_id) = bucket_id {
        record = record.with_bucket(bucket_id);
    }
    if let Some(job_id) = sync_job_id {
        record = record.with_job(parse_field::<JobId>(&job_id, "job id")?);
    }
    if let Some(config_id) = config_id {
        record = record.with_config(parse_field::<ConfigId>(&config_id, "configuration id")?);
    }
    Ok(record)
}

fn collect<T>(
    rows: &[SqliteRow],
    map: fn(&SqliteRow) -> Result<T, CacheError>,
) -> Result<Vec<T>, CacheError> {
    rows.iter().map(map).collect()
}

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Configuration operations ---

    async fn save_configuration(
        &self,
        config: &SyncConfiguration,
    ) -> anyhow::Result<SyncConfiguration> {
        let last_sync = config.last_sync_timestamp().map(|t| format_datetime(&t));

        sqlx::query(
            "INSERT INTO sync_configurations (id, name, interval_minutes, is_active, last_sync_timestamp) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET \
                 interval_minutes = excluded.interval_minutes, \
                 is_active = excluded.is_active",
        )
        .bind(config.id().to_string())
        .bind(config.name())
        .bind(i64::from(config.interval_minutes()))
        .bind(config.is_active())
        .bind(&last_sync)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM sync_configurations WHERE name = ?")
            .bind(config.name())
            .fetch_one(&self.pool)
            .await?;
        let stored = configuration_from_row(&row)?;

        tracing::trace!(config_id = %stored.id(), name = %stored.name(), "Saved configuration");
        Ok(stored)
    }

    async fn get_configuration(&self, id: &ConfigId) -> anyhow::Result<Option<SyncConfiguration>> {
        let row = sqlx::query("SELECT * FROM sync_configurations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(configuration_from_row).transpose()?)
    }

    async fn list_configurations(&self) -> anyhow::Result<Vec<SyncConfiguration>> {
        let rows = sqlx::query("SELECT * FROM sync_configurations ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(collect(&rows, configuration_from_row)?)
    }

    async fn update_last_sync(&self, id: &ConfigId, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE sync_configurations SET last_sync_timestamp = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        tracing::trace!(config_id = %id, "Advanced last sync timestamp");
        Ok(())
    }

    // --- Mapping operations ---

    async fn save_mapping(&self, mapping: &Mapping) -> anyhow::Result<Mapping> {
        let local_path = mapping.local_path().to_string_lossy().to_string();
        let config_id = mapping.config_id().to_string();

        sqlx::query(
            "INSERT INTO mappings (id, config_id, local_path, bucket_id) VALUES (?, ?, ?, ?) \
             ON CONFLICT(config_id, local_path) DO UPDATE SET bucket_id = excluded.bucket_id",
        )
        .bind(mapping.id().to_string())
        .bind(&config_id)
        .bind(&local_path)
        .bind(mapping.bucket_id())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM mappings WHERE config_id = ? AND local_path = ?")
            .bind(&config_id)
            .bind(&local_path)
            .fetch_one(&self.pool)
            .await?;
        Ok(mapping_from_row(&row)?)
    }

    async fn list_mappings(&self, config_id: &ConfigId) -> anyhow::Result<Vec<Mapping>> {
        let rows = sqlx::query("SELECT * FROM mappings WHERE config_id = ? ORDER BY local_path ASC")
            .bind(config_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(collect(&rows, mapping_from_row)?)
    }

    async fn list_active_mappings(&self) -> anyhow::Result<Vec<Mapping>> {
        let rows = sqlx::query(
            "SELECT m.* FROM mappings m \
             JOIN sync_configurations c ON c.id = m.config_id \
             WHERE c.is_active = 1 ORDER BY m.local_path ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(collect(&rows, mapping_from_row)?)
    }

    // --- Job operations ---

    async fn save_job(&self, job: &SyncJob) -> anyhow::Result<()> {
        let id = job.id().to_string();

        sqlx::query(
            "INSERT OR REPLACE INTO sync_jobs \
             (id, config_id, status, start_time, end_time, files_handled, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(job.config_id().to_string())
        .bind(job.status().to_string())
        .bind(format_datetime(&job.start_time()))
        .bind(job.end_time().map(|t| format_datetime(&t)))
        .bind(to_i64(job.files_handled()))
        .bind(job.error())
        .execute(&self.pool)
        .await?;

        tracing::trace!(job_id = %id, status = %job.status(), "Saved sync job");
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<SyncJob>> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn list_jobs(&self, config_id: &ConfigId, limit: u32) -> anyhow::Result<Vec<SyncJob>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_jobs WHERE config_id = ? ORDER BY start_time DESC LIMIT ?",
        )
        .bind(config_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(collect(&rows, job_from_row)?)
    }

    // --- File record operations ---

    async fn upsert_file_record(&self, record: &FileRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let last_synced_at = record.last_synced_at().map(|t| format_datetime(&t));
        let parent_key = record.parent_key().map(|k| k.as_str().to_string());

        // Identity by remote id first: a renamed object keeps its row.
        if let Some(remote_id) = record.remote_id() {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM file_records WHERE bucket_id = ? AND remote_id = ?",
            )
            .bind(record.bucket_id())
            .bind(remote_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing_id) = existing {
                sqlx::query("DELETE FROM file_records WHERE bucket_id = ? AND key = ? AND id != ?")
                    .bind(record.bucket_id())
                    .bind(record.key().as_str())
                    .bind(&existing_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    "UPDATE file_records SET name = ?, key = ?, is_folder = ?, size = ?, \
                     mime_type = ?, parent_key = ?, is_synced = ?, last_synced_at = ? \
                     WHERE id = ?",
                )
                .bind(record.name())
                .bind(record.key().as_str())
                .bind(record.is_folder())
                .bind(to_i64(record.size()))
                .bind(record.mime_type())
                .bind(&parent_key)
                .bind(record.is_synced())
                .bind(&last_synced_at)
                .bind(&existing_id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                tracing::trace!(key = %record.key(), remote_id, "Updated file record by remote id");
                return Ok(());
            }
        }

        sqlx::query(
            "INSERT INTO file_records \
             (id, remote_id, name, key, is_folder, size, mime_type, bucket_id, parent_key, is_synced, last_synced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(bucket_id, key) DO UPDATE SET \
                 remote_id = COALESCE(excluded.remote_id, file_records.remote_id), \
                 name = excluded.name, \
                 is_folder = excluded.is_folder, \
                 size = excluded.size, \
                 mime_type = excluded.mime_type, \
                 parent_key = excluded.parent_key, \
                 is_synced = excluded.is_synced, \
                 last_synced_at = excluded.last_synced_at",
        )
        .bind(record.id().to_string())
        .bind(record.remote_id())
        .bind(record.name())
        .bind(record.key().as_str())
        .bind(record.is_folder())
        .bind(to_i64(record.size()))
        .bind(record.mime_type())
        .bind(record.bucket_id())
        .bind(&parent_key)
        .bind(record.is_synced())
        .bind(&last_synced_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::trace!(bucket_id = %record.bucket_id(), key = %record.key(), "Upserted file record");
        Ok(())
    }

    async fn get_file_record(
        &self,
        bucket_id: &str,
        key: &str,
    ) -> anyhow::Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM file_records WHERE bucket_id = ? AND key = ?")
            .bind(bucket_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(file_record_from_row).transpose()?)
    }

    async fn list_file_records(
        &self,
        bucket_id: &str,
        prefix: Option<&str>,
    ) -> anyhow::Result<Vec<FileRecord>> {
        let rows = match prefix {
            Some(prefix) => {
                sqlx::query(
                    "SELECT * FROM file_records WHERE bucket_id = ? AND key LIKE ? ESCAPE '\\' \
                     ORDER BY key ASC",
                )
                .bind(bucket_id)
                .bind(like_prefix(prefix))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM file_records WHERE bucket_id = ? ORDER BY key ASC")
                    .bind(bucket_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(collect(&rows, file_record_from_row)?)
    }

    async fn delete_file_record(&self, bucket_id: &str, key: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM file_records WHERE bucket_id = ? AND key = ?")
            .bind(bucket_id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        tracing::trace!(bucket_id, key, "Deleted file record");
        Ok(result.rows_affected() > 0)
    }

    async fn delete_file_records_with_prefix(
        &self,
        bucket_id: &str,
        prefix: &str,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM file_records WHERE bucket_id = ? AND key LIKE ? ESCAPE '\\'",
        )
        .bind(bucket_id)
        .bind(like_prefix(prefix))
        .execute(&self.pool)
        .await?;
        tracing::trace!(bucket_id, prefix, removed = result.rows_affected(), "Deleted file records by prefix");
        Ok(result.rows_affected())
    }

    // --- Activity operations ---

    async fn insert_activity(&self, record: &ActivityRecord) -> anyhow::Result<ActivityId> {
        let result = sqlx::query(
            "INSERT INTO activity_records \
             (action, file_name, status, error, created_at, synced, sync_job_id, config_id, bucket_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.action().as_str())
        .bind(record.file_name())
        .bind(record.status().as_str())
        .bind(record.error())
        .bind(format_datetime(&record.created_at()))
        .bind(record.is_synced())
        .bind(record.sync_job_id().map(|id| id.to_string()))
        .bind(record.config_id().map(|id| id.to_string()))
        .bind(record.bucket_id())
        .execute(&self.pool)
        .await?;

        let id = ActivityId::new(result.last_insert_rowid());
        tracing::trace!(
            activity_id = %id,
            action = %record.action(),
            status = %record.status(),
            "Inserted activity record"
        );
        Ok(id)
    }

    async fn find_recent_activity(
        &self,
        record: &ActivityRecord,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<ActivityRecord>> {
        let row = sqlx::query(
            "SELECT * FROM activity_records \
             WHERE action = ? AND file_name = ? AND status = ? AND bucket_id IS ? \
             AND sync_job_id IS ? AND config_id IS ? AND created_at >= ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(record.action().as_str())
        .bind(record.file_name())
        .bind(record.status().as_str())
        .bind(record.bucket_id())
        .bind(record.sync_job_id().map(|id| id.to_string()))
        .bind(record.config_id().map(|id| id.to_string()))
        .bind(format_datetime(&since))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(activity_from_row).transpose()?)
    }

    async fn list_unsynced_activity(&self, limit: u32) -> anyhow::Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM activity_records WHERE synced = 0 AND status != ? \
             ORDER BY id ASC LIMIT ?",
        )
        .bind(ActivityStatus::Skipped.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(collect(&rows, activity_from_row)?)
    }

    async fn mark_activity_synced(&self, ids: &[ActivityId]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE activity_records SET synced = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.as_i64());
        }
        let result = query.execute(&self.pool).await?;

        tracing::trace!(count = result.rows_affected(), "Marked activity records synced");
        Ok(result.rows_affected())
    }

    async fn list_activity(&self, query: &ActivityQuery) -> anyhow::Result<Vec<ActivityRecord>> {
        let mut sql = String::from("SELECT * FROM activity_records WHERE 1 = 1");
        if query.config_id.is_some() {
            sql.push_str(" AND config_id = ?");
        }
        if query.job_id.is_some() {
            sql.push_str(" AND sync_job_id = ?");
        }
        sql.push_str(" ORDER BY id DESC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql);
        if let Some(config_id) = &query.config_id {
            q = q.bind(config_id.to_string());
        }
        if let Some(job_id) = &query.job_id {
            q = q.bind(job_id.to_string());
        }
        if let Some(limit) = query.limit {
            q = q.bind(i64::from(limit));
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(collect(&rows, activity_from_row)?)
    }

    async fn prune_activity(&self, before: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM activity_records WHERE created_at < ? AND (synced = 1 OR status = ?)",
        )
        .bind(format_datetime(&before))
        .bind(ActivityStatus::Skipped.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(removed = result.rows_affected(), "Pruned activity records");
        Ok(result.rows_affected())
    }
}
