//! Transfer executor port (driven/secondary port)
//!
//! One upload, download or delete of a single object. Implementations
//! resolve credentials, sign the URL, move the bytes, report progress and
//! return exactly one terminal [`TransferOutcome`].
//!
//! ## Design Notes
//!
//! - Methods do not return `Result`: every failure, including credential
//!   resolution, is folded into `TransferOutcome::Failed` so a single bad
//!   file never aborts a reconciliation pass.
//! - No internal retries. The next cycle retries naturally.

use std::path::PathBuf;

use crate::domain::ObjectKey;

/// Terminal status of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The transfer finished; `bytes` were moved
    Success { bytes: u64 },
    /// The transfer failed; the message goes to the journal
    Failed { error: String },
}

impl TransferOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        TransferOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::Failed { error } => Some(error),
        }
    }
}

/// Upload of one local file
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bucket_id: String,
    pub key: ObjectKey,
    pub local_path: PathBuf,
    pub mime_type: Option<String>,
}

/// Download of one remote object
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub bucket_id: String,
    pub key: ObjectKey,
    pub local_path: PathBuf,
    /// Manifest size, used for progress percentages
    pub expected_size: Option<u64>,
}

/// Port trait for single-object transfers
#[async_trait::async_trait]
pub trait ITransferExecutor: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> TransferOutcome;

    async fn download(&self, request: &DownloadRequest) -> TransferOutcome;

    async fn delete(&self, bucket_id: &str, key: &ObjectKey) -> TransferOutcome;
}
