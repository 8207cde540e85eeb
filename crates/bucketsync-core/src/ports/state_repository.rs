//! State repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying
//! synchronization state: configurations, mappings, jobs, the file record
//! cache and the activity journal.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory fakes) and don't need domain-level classification.
//! - Every write is an upsert keyed by a stable identity, so concurrent
//!   writers (engine, journal, watcher) converge without application locks.
//! - All write operations take references to domain entities, allowing
//!   the caller to retain ownership.

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{ActivityId, ConfigId, JobId},
    ActivityRecord, FileRecord, Mapping, SyncConfiguration, SyncJob,
};

// ============================================================================
// ActivityQuery
// ============================================================================

/// Filter criteria for listing activity records
///
/// All fields are optional; when `None`, no filtering is applied for that field.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    /// Only records attributed to this configuration
    pub config_id: Option<ConfigId>,
    /// Only records attributed to this job
    pub job_id: Option<JobId>,
    /// Maximum number of records (newest first)
    pub limit: Option<u32>,
}

impl ActivityQuery {
    /// Creates a new empty query (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_id: ConfigId) -> Self {
        self.config_id = Some(config_id);
        self
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// IStateRepository trait
// ============================================================================

/// Port trait for persistent state storage
///
/// ## Implementation Notes
///
/// - `save_configuration` upserts by configuration name and must keep an
///   existing row's id and `last_sync_timestamp`.
/// - `save_mapping` upserts by (configuration, local path).
/// - `upsert_file_record` matches an existing row by (bucket, remote id)
///   when the record has a remote id, falling back to (bucket, key).
/// - Activity listing methods return newest first, except
///   `list_unsynced_activity` which returns creation order so batches
///   reach the ledger in the order they happened.
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Configuration operations ---

    /// Inserts or updates a configuration, returning the stored version
    async fn save_configuration(
        &self,
        config: &SyncConfiguration,
    ) -> anyhow::Result<SyncConfiguration>;

    /// Retrieves a configuration by id
    async fn get_configuration(&self, id: &ConfigId) -> anyhow::Result<Option<SyncConfiguration>>;

    /// Lists all configurations, active or not
    async fn list_configurations(&self) -> anyhow::Result<Vec<SyncConfiguration>>;

    /// Advances a configuration's `last_sync_timestamp`
    async fn update_last_sync(&self, id: &ConfigId, at: DateTime<Utc>) -> anyhow::Result<()>;

    // --- Mapping operations ---

    /// Inserts or updates a mapping, returning the stored version
    async fn save_mapping(&self, mapping: &Mapping) -> anyhow::Result<Mapping>;

    /// Lists the mappings owned by a configuration
    async fn list_mappings(&self, config_id: &ConfigId) -> anyhow::Result<Vec<Mapping>>;

    /// Lists mappings of every active configuration
    async fn list_active_mappings(&self) -> anyhow::Result<Vec<Mapping>>;

    // --- Job operations ---

    /// Saves a sync job (insert or update)
    async fn save_job(&self, job: &SyncJob) -> anyhow::Result<()>;

    /// Retrieves a job by id
    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<SyncJob>>;

    /// Lists jobs for a configuration, newest first
    async fn list_jobs(&self, config_id: &ConfigId, limit: u32) -> anyhow::Result<Vec<SyncJob>>;

    // --- File record operations ---

    /// Upserts a file record (see trait notes for identity rules)
    async fn upsert_file_record(&self, record: &FileRecord) -> anyhow::Result<()>;

    /// Retrieves a file record by bucket and key
    async fn get_file_record(&self, bucket_id: &str, key: &str)
        -> anyhow::Result<Option<FileRecord>>;

    /// Lists file records of a bucket whose key starts with `prefix`
    async fn list_file_records(
        &self,
        bucket_id: &str,
        prefix: Option<&str>,
    ) -> anyhow::Result<Vec<FileRecord>>;

    /// Deletes the file record at exactly `key`
    async fn delete_file_record(&self, bucket_id: &str, key: &str) -> anyhow::Result<bool>;

    /// Deletes every file record of a bucket under `prefix`
    ///
    /// Returns the number of records removed.
    async fn delete_file_records_with_prefix(
        &self,
        bucket_id: &str,
        prefix: &str,
    ) -> anyhow::Result<u64>;

    // --- Activity operations ---

    /// Inserts a journal record, returning its assigned id
    async fn insert_activity(&self, record: &ActivityRecord) -> anyhow::Result<ActivityId>;

    /// Finds the newest record describing the same event created at or after `since`
    ///
    /// Matches on action, file name, status, bucket, job and configuration.
    async fn find_recent_activity(
        &self,
        record: &ActivityRecord,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<ActivityRecord>>;

    /// Lists unsynced, ledger-bound (non-skip) records in creation order
    async fn list_unsynced_activity(&self, limit: u32) -> anyhow::Result<Vec<ActivityRecord>>;

    /// Marks records as synced
    async fn mark_activity_synced(&self, ids: &[ActivityId]) -> anyhow::Result<u64>;

    /// Lists records matching the query, newest first
    async fn list_activity(&self, query: &ActivityQuery) -> anyhow::Result<Vec<ActivityRecord>>;

    /// Deletes synced and skip records created before `before`
    ///
    /// Unsynced ledger-bound records are never removed. Returns the number
    /// of records removed.
    async fn prune_activity(&self, before: DateTime<Utc>) -> anyhow::Result<u64>;
}
