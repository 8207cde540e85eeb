//! BucketSync Sync - Bidirectional reconciliation between a local tree and buckets
//!
//! Provides:
//! - Manifest-driven reconciliation (download missing or resized files,
//!   upload local files the bucket does not list)
//! - A change watcher that uploads and deletes live edits
//! - Guard sets that keep the watcher from reacting to our own writes
//! - Timer and on-demand scheduling with authorization-expiry shutdown
//!
//! ## Modules
//!
//! - [`engine`] - One reconciliation cycle across all due configurations
//! - [`guard`] - Write-guard and in-flight path sets with RAII tokens
//! - [`progress`] - Broadcast progress stream
//! - [`scheduler`] - Interval and "sync now" triggering
//! - [`service`] - Facade exposing init/stop/force and the job and activity queries
//! - [`transfer`] - `ITransferExecutor` over presigned object storage
//! - [`watcher`] - Filesystem notifications, debouncing and live dispatch

pub mod engine;
pub mod guard;
pub mod progress;
pub mod scheduler;
pub mod service;
pub mod transfer;
pub mod watcher;

pub use engine::{CycleReport, CycleTrigger, SyncEngine};
pub use guard::PathGuards;
pub use progress::ProgressReporter;
pub use service::SyncService;
pub use transfer::TransferExecutor;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The authority rejected the session; scheduling must stop
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// The state repository failed
    #[error("State error: {0}")]
    State(String),

    /// The filesystem watcher could not be started
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// The object storage client could not be built
    #[error("Transfer setup failed: {0}")]
    Transfer(#[from] bucketsync_storage::TransferError),

    /// The service was used before `init_sync`
    #[error("Sync service is not initialized")]
    NotInitialized,

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A domain-level error propagated from bucketsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] bucketsync_core::domain::DomainError),
}

impl SyncError {
    /// Wraps a repository failure
    pub(crate) fn state(err: anyhow::Error) -> Self {
        SyncError::State(format!("{err:#}"))
    }

    /// Returns `true` when the session must be renewed
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SyncError::AuthExpired(_))
    }
}
