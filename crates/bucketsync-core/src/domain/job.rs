//! SyncJob domain entity
//!
//! A [`SyncJob`] records one cycle execution for one configuration. It is
//! created in the `Running` state and terminally mutated exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ConfigId, JobId};

/// Status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Cycle is in progress
    Running,
    /// Cycle finished; per-file failures may still have occurred
    Completed,
    /// Cycle aborted or a mapping could not be processed
    Failed,
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// One cycle execution for a sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    id: JobId,
    config_id: ConfigId,
    status: JobStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    files_handled: u64,
    error: Option<String>,
}

impl SyncJob {
    /// Starts a new running job for `config_id`
    pub fn start(config_id: ConfigId) -> Self {
        Self {
            id: JobId::new(),
            config_id,
            status: JobStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            files_handled: 0,
            error: None,
        }
    }

    /// Reconstructs a job from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: JobId,
        config_id: ConfigId,
        status: JobStatus,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        files_handled: u64,
        error: Option<String>,
    ) -> Self {
        Self {
            id,
            config_id,
            status,
            start_time,
            end_time,
            files_handled,
            error,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn config_id(&self) -> &ConfigId {
        &self.config_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn files_handled(&self) -> u64 {
        self.files_handled
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Marks the job as completed with the number of successful transfers
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the job already finished.
    pub fn complete(&mut self, files_handled: u64) -> Result<(), DomainError> {
        self.ensure_running(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.files_handled = files_handled;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Marks the job as failed
    ///
    /// `files_handled` still records the transfers that succeeded before
    /// the failure.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the job already finished.
    pub fn fail(&mut self, reason: impl Into<String>, files_handled: u64) -> Result<(), DomainError> {
        self.ensure_running(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.files_handled = files_handled;
        self.error = Some(reason.into());
        self.end_time = Some(Utc::now());
        Ok(())
    }

    fn ensure_running(&self, target: JobStatus) -> Result<(), DomainError> {
        if self.status.is_finished() {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }
}
