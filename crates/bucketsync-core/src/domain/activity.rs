//! Activity journal entities
//!
//! An [`ActivityRecord`] describes one transfer attempt and its outcome.
//! Records are written locally first (`synced = false`) and flipped to
//! synced once a [`LedgerBatch`] containing them has been accepted by the
//! remote ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ActivityId, ConfigId, JobId};

/// The transfer direction or operation that was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Upload,
    Download,
    Delete,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Upload => "UPLOAD",
            ActivityAction::Download => "DOWNLOAD",
            ActivityAction::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOAD" => Ok(ActivityAction::Upload),
            "DOWNLOAD" => Ok(ActivityAction::Download),
            "DELETE" => Ok(ActivityAction::Delete),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown activity action: {other}"
            ))),
        }
    }
}

/// Outcome of a transfer attempt
///
/// `Skipped` marks reconciliation no-ops (file already up to date). Skip
/// records stay local: they are never forwarded to the remote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Success,
    Failed,
    Skipped,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "SUCCESS",
            ActivityStatus::Failed => "FAILED",
            ActivityStatus::Skipped => "SKIPPED",
        }
    }

    /// Returns true if records with this status belong in the remote ledger
    pub fn is_auditable(&self) -> bool {
        !matches!(self, ActivityStatus::Skipped)
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ActivityStatus::Success),
            "FAILED" => Ok(ActivityStatus::Failed),
            "SKIPPED" => Ok(ActivityStatus::Skipped),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown activity status: {other}"
            ))),
        }
    }
}

/// A journaled transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    id: Option<ActivityId>,
    action: ActivityAction,
    file_name: String,
    status: ActivityStatus,
    error: Option<String>,
    created_at: DateTime<Utc>,
    synced: bool,
    sync_job_id: Option<JobId>,
    config_id: Option<ConfigId>,
    bucket_id: Option<String>,
}

impl ActivityRecord {
    /// Creates a new unsynced record timestamped now
    ///
    /// The `id` is assigned by the repository on insert.
    pub fn new(action: ActivityAction, file_name: impl Into<String>, status: ActivityStatus) -> Self {
        Self {
            id: None,
            action,
            file_name: file_name.into(),
            status,
            error: None,
            created_at: Utc::now(),
            synced: false,
            sync_job_id: None,
            config_id: None,
            bucket_id: None,
        }
    }

    /// Shorthand for a successful attempt
    pub fn success(action: ActivityAction, file_name: impl Into<String>) -> Self {
        Self::new(action, file_name, ActivityStatus::Success)
    }

    /// Shorthand for a failed attempt carrying its error message
    pub fn failure(
        action: ActivityAction,
        file_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(action, file_name, ActivityStatus::Failed).with_error(error)
    }

    /// Shorthand for a reconciliation no-op
    pub fn skipped(action: ActivityAction, file_name: impl Into<String>) -> Self {
        Self::new(action, file_name, ActivityStatus::Skipped)
    }

    pub fn with_id(mut self, id: ActivityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.sync_job_id = Some(job_id);
        self
    }

    pub fn with_config(mut self, config_id: ConfigId) -> Self {
        self.config_id = Some(config_id);
        self
    }

    pub fn with_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = Some(bucket_id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }

    pub fn id(&self) -> Option<ActivityId> {
        self.id
    }

    pub fn action(&self) -> ActivityAction {
        self.action
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn sync_job_id(&self) -> Option<&JobId> {
        self.sync_job_id.as_ref()
    }

    pub fn config_id(&self) -> Option<&ConfigId> {
        self.config_id.as_ref()
    }

    /// Bucket the transfer went to or came from
    pub fn bucket_id(&self) -> Option<&str> {
        self.bucket_id.as_deref()
    }

    /// Returns true if `other` describes the same event for dedup purposes
    ///
    /// Two records match when action, file name, status, bucket, job and
    /// configuration are equal. Transfers of the same key in different
    /// buckets or different jobs are distinct events.
    pub fn same_event(&self, other: &ActivityRecord) -> bool {
        self.action == other.action
            && self.file_name == other.file_name
            && self.status == other.status
            && self.bucket_id == other.bucket_id
            && self.sync_job_id == other.sync_job_id
            && self.config_id == other.config_id
    }
}

// ============================================================================
// Remote ledger payload
// ============================================================================

/// One record as posted to the remote ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub action: ActivityAction,
    pub file_name: String,
    pub status: ActivityStatus,
    pub error: Option<String>,
}

/// Aggregate counts accompanying a ledger batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

/// A batch of journal records for the remote ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatch {
    pub records: Vec<LedgerRecord>,
    pub counts: LedgerCounts,
}

impl LedgerBatch {
    /// Builds a batch from journal records, leaving out skip records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ActivityRecord>) -> Self {
        let mut batch = LedgerBatch::default();
        for record in records.into_iter().filter(|r| r.status().is_auditable()) {
            match record.status() {
                ActivityStatus::Success => batch.counts.success += 1,
                ActivityStatus::Failed => batch.counts.failed += 1,
                ActivityStatus::Skipped => {}
            }
            batch.counts.total += 1;
            batch.records.push(LedgerRecord {
                action: record.action(),
                file_name: record.file_name().to_string(),
                status: record.status(),
                error: record.error().map(str::to_string),
            });
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
