//! BucketSync Storage - Remote adapters
//!
//! Provides async clients for:
//! - The central authority API (bucket manifests, bucket accounts, activity ledger)
//! - Credential resolution with encrypted secrets and environment fallback
//! - AWS Signature V4 presigned URLs for S3-compatible object storage
//! - Streaming object transfers (single PUT, multipart, GET, DELETE)
//!
//! ## Modules
//!
//! - [`client`] - Authority API HTTP client (`IRemoteAuthority`)
//! - [`credentials`] - Bucket credential resolution
//! - [`crypto`] - AES-256-GCM secret decryption (`ISecretDecryptor`)
//! - [`signing`] - SigV4 query-string presigner (`IUrlSigner`)
//! - [`object`] - Presigned-URL object client shared by transfers
//! - [`upload`] - Single-request and multipart uploads
//! - [`download`] - Streaming downloads and deletes

pub mod client;
pub mod credentials;
pub mod crypto;
pub mod download;
pub mod object;
pub mod signing;
pub mod upload;

pub use client::AuthorityClient;
pub use credentials::{CredentialError, CredentialResolver};
pub use crypto::AesGcmDecryptor;
pub use object::{ObjectClient, ProgressFn, TransferSettings};
pub use signing::SigV4Presigner;

use thiserror::Error;

/// Errors that can occur while moving bytes to or from object storage
#[derive(Debug, Error)]
pub enum TransferError {
    /// Object storage answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading the source or writing the target file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A signed URL could not be produced
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The storage response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The number of bytes written differs from what the manifest promised
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Bytes announced by the manifest
        expected: u64,
        /// Bytes actually written
        actual: u64,
    },
}

impl TransferError {
    /// Builds a status error from a response, consuming its body as the message
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            body.trim().chars().take(512).collect()
        };
        TransferError::Status {
            status: status.as_u16(),
            message,
        }
    }
}
