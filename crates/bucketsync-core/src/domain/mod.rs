//! Domain entities and business logic
//!
//! This module contains the core domain types for BucketSync:
//! - Newtypes for type-safe identifiers and validated object keys
//! - Sync configurations, mappings and per-cycle jobs
//! - The cached file records and the remote manifest they mirror
//! - Activity journal records and the remote ledger payload
//! - Storage credentials and progress events
//! - Domain-specific error types

pub mod activity;
pub mod configuration;
pub mod credentials;
pub mod errors;
pub mod file_record;
pub mod job;
pub mod manifest;
pub mod newtypes;
pub mod progress;

// Re-export commonly used types
pub use activity::{
    ActivityAction, ActivityRecord, ActivityStatus, LedgerBatch, LedgerCounts, LedgerRecord,
};
pub use configuration::{Mapping, SyncConfiguration};
pub use credentials::{BucketAccount, SessionCredentials, StorageCredentials};
pub use errors::{is_auth_failure, DomainError, RemoteError};
pub use file_record::FileRecord;
pub use job::{JobStatus, SyncJob};
pub use manifest::{Manifest, ManifestEntry, ManifestObject};
pub use newtypes::*;
pub use progress::{ProgressEvent, ProgressKind};
