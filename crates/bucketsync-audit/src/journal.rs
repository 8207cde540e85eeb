//! ActivityJournal - write-ahead transfer journal
//!
//! Every transfer attempt is persisted locally through
//! `IStateRepository::insert_activity()` before anything is sent anywhere.
//! Unsynced records are later posted to the remote ledger in batches and
//! flipped to synced only after the ledger accepted them, so a crash or an
//! unreachable ledger never loses a record.
//!
//! ## Dedup window
//!
//! Repeating the same event (action, file name, status, bucket, job and
//! configuration) inside the window collapses into the first record. This
//! keeps noisy watcher notifications from flooding the journal. A job never
//! shares records with another job, and the same key in two buckets is two
//! events.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use bucketsync_core::{
    config::JournalConfig,
    domain::{
        is_auth_failure, newtypes::ActivityId, ActivityAction, ActivityRecord, ConfigId, JobId,
        LedgerBatch,
    },
    ports::{ActivityQuery, IRemoteAuthority, IStateRepository, TransferOutcome},
};

use crate::JournalError;

/// Tunables for [`ActivityJournal`]
#[derive(Debug, Clone)]
pub struct JournalSettings {
    pub dedup_window: Duration,
    pub retention: Duration,
    pub batch_size: u32,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self::from(&JournalConfig::default())
    }
}

impl From<&JournalConfig> for JournalSettings {
    fn from(config: &JournalConfig) -> Self {
        Self {
            dedup_window: Duration::seconds(i64::try_from(config.dedup_window_secs).unwrap_or(0)),
            retention: Duration::days(i64::from(config.retention_days)),
            batch_size: config.flush_batch_size.max(1),
        }
    }
}

/// Result of [`ActivityJournal::record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was written
    Recorded(ActivityId),
    /// An identical event inside the dedup window already exists
    Duplicate(Option<ActivityId>),
}

impl RecordOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::Duplicate(_))
    }
}

/// Summary of one [`ActivityJournal::flush`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Ledger POSTs that succeeded
    pub batches: u32,
    /// Records flipped to synced
    pub records: u64,
}

/// Job, configuration and bucket a journal entry is attributed to
#[derive(Debug, Clone, Default)]
pub struct JournalContext {
    pub job_id: Option<JobId>,
    pub config_id: Option<ConfigId>,
    pub bucket_id: Option<String>,
}

impl JournalContext {
    pub fn for_job(job_id: JobId, config_id: ConfigId) -> Self {
        Self {
            job_id: Some(job_id),
            config_id: Some(config_id),
            bucket_id: None,
        }
    }

    pub fn for_config(config_id: ConfigId) -> Self {
        Self {
            job_id: None,
            config_id: Some(config_id),
            bucket_id: None,
        }
    }

    /// Narrows the context to one bucket
    pub fn with_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = Some(bucket_id.into());
        self
    }

    fn apply(&self, mut record: ActivityRecord) -> ActivityRecord {
        if let Some(job_id) = self.job_id {
            record = record.with_job(job_id);
        }
        if let Some(config_id) = self.config_id {
            record = record.with_config(config_id);
        }
        if let Some(bucket_id) = &self.bucket_id {
            record = record.with_bucket(bucket_id.as_str());
        }
        record
    }
}

/// Write-ahead activity journal backed by the state repository
pub struct ActivityJournal {
    repo: Arc<dyn IStateRepository>,
    ledger: Option<Arc<dyn IRemoteAuthority>>,
    settings: JournalSettings,
    // Serializes the dedup lookup with the insert.
    record_lock: Mutex<()>,
    // Prevents two flushes from posting the same unsynced rows.
    flush_lock: Mutex<()>,
}

impl ActivityJournal {
    /// Creates a journal without a ledger; `flush` fails until one is attached
    pub fn new(repo: Arc<dyn IStateRepository>, settings: JournalSettings) -> Self {
        Self {
            repo,
            ledger: None,
            settings,
            record_lock: Mutex::new(()),
            flush_lock: Mutex::new(()),
        }
    }

    /// Attaches the remote ledger used by [`flush`](Self::flush)
    pub fn with_ledger(mut self, ledger: Arc<dyn IRemoteAuthority>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn settings(&self) -> &JournalSettings {
        &self.settings
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Persists a record unless the same event is inside the dedup window
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Repository` if the lookup or insert fails.
    pub async fn record(&self, record: ActivityRecord) -> Result<RecordOutcome, JournalError> {
        let _guard = self.record_lock.lock().await;

        if self.settings.dedup_window > Duration::zero() {
            let since = record.created_at() - self.settings.dedup_window;
            let existing = self
                .repo
                .find_recent_activity(&record, since)
                .await
                .map_err(|e| JournalError::Repository(format!("{e:#}")))?;
            if let Some(existing) = existing {
                tracing::debug!(
                    action = %record.action(),
                    file = %record.file_name(),
                    status = %record.status(),
                    "Duplicate activity inside dedup window"
                );
                return Ok(RecordOutcome::Duplicate(existing.id()));
            }
        }

        let id = self
            .repo
            .insert_activity(&record)
            .await
            .map_err(|e| JournalError::Repository(format!("{e:#}")))?;
        Ok(RecordOutcome::Recorded(id))
    }

    /// Like [`record`](Self::record), but logs failures instead of returning them
    pub async fn record_or_warn(&self, record: ActivityRecord) -> Option<RecordOutcome> {
        let file = record.file_name().to_string();
        match self.record(record).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, file = %file, "Failed to journal activity");
                None
            }
        }
    }

    /// Journals the terminal outcome of one transfer
    pub async fn record_outcome(
        &self,
        action: ActivityAction,
        file_name: &str,
        outcome: &TransferOutcome,
        context: &JournalContext,
    ) -> Option<RecordOutcome> {
        let record = match outcome {
            TransferOutcome::Success { .. } => ActivityRecord::success(action, file_name),
            TransferOutcome::Failed { error } => ActivityRecord::failure(action, file_name, error),
        };
        self.record_or_warn(context.apply(record)).await
    }

    /// Journals a reconciliation no-op; never forwarded to the ledger
    pub async fn record_skip(
        &self,
        action: ActivityAction,
        file_name: &str,
        context: &JournalContext,
    ) -> Option<RecordOutcome> {
        self.record_or_warn(context.apply(ActivityRecord::skipped(action, file_name)))
            .await
    }

    // ========================================================================
    // Flush and retention
    // ========================================================================

    /// Posts unsynced records to the ledger until none remain
    ///
    /// Batches are marked synced only after the ledger accepted them. On
    /// the first failed POST the remaining records stay unsynced and are
    /// retried by the next flush.
    ///
    /// # Errors
    ///
    /// - `JournalError::Unauthorized` if the ledger rejected the session
    /// - `JournalError::Ledger` for any other POST failure
    /// - `JournalError::NoLedger` if no ledger is attached
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> Result<FlushReport, JournalError> {
        let ledger = self.ledger.as_ref().ok_or(JournalError::NoLedger)?;
        let _guard = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        loop {
            let records = self
                .repo
                .list_unsynced_activity(self.settings.batch_size)
                .await
                .map_err(|e| JournalError::Repository(format!("{e:#}")))?;
            if records.is_empty() {
                break;
            }

            let batch = LedgerBatch::from_records(&records);
            if let Err(e) = ledger.post_ledger(&batch).await {
                let message = format!("{e:#}");
                tracing::warn!(
                    error = %message,
                    pending = records.len(),
                    "Ledger flush failed; records stay unsynced"
                );
                return Err(if is_auth_failure(&e) {
                    JournalError::Unauthorized(message)
                } else {
                    JournalError::Ledger(message)
                });
            }

            let ids: Vec<ActivityId> = records.iter().filter_map(ActivityRecord::id).collect();
            let marked = self
                .repo
                .mark_activity_synced(&ids)
                .await
                .map_err(|e| JournalError::Repository(format!("{e:#}")))?;

            report.batches += 1;
            report.records += marked;

            if marked == 0 || records.len() < self.settings.batch_size as usize {
                break;
            }
        }

        if report.records > 0 {
            tracing::info!(
                batches = report.batches,
                records = report.records,
                "Flushed activity journal"
            );
        }
        Ok(report)
    }

    /// Deletes synced and skip records older than the retention period
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Repository` if the delete fails.
    pub async fn prune(&self) -> Result<u64, JournalError> {
        self.prune_before(Utc::now() - self.settings.retention).await
    }

    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JournalError> {
        let removed = self
            .repo
            .prune_activity(cutoff)
            .await
            .map_err(|e| JournalError::Repository(format!("{e:#}")))?;
        if removed > 0 {
            tracing::info!(removed, "Pruned activity journal");
        }
        Ok(removed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns journal entries, newest first, optionally for one configuration
    pub async fn activity_log(
        &self,
        config_id: Option<ConfigId>,
        limit: Option<u32>,
    ) -> Result<Vec<ActivityRecord>, JournalError> {
        let mut query = ActivityQuery::new();
        query.config_id = config_id;
        query.limit = limit;
        self.repo
            .list_activity(&query)
            .await
            .map_err(|e| JournalError::Repository(format!("{e:#}")))
    }
}
