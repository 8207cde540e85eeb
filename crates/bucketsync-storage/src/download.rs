//! Download and delete operations for S3-compatible object storage
//!
//! Downloads stream the response body straight to the target path. If the
//! status is not a success, the stream breaks, or the byte count disagrees
//! with the manifest, the partial file is removed before the error returns.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use bucketsync_core::{domain::StorageCredentials, ports::SignedOperation};

use crate::{
    object::{ObjectClient, ProgressFn},
    TransferError,
};

/// Downloads `key` into `target`, returning the number of bytes written
///
/// Parent directories are created as needed. An existing file at `target`
/// is replaced.
///
/// # Errors
/// Returns an error on a non-success status, a broken stream, a local I/O
/// failure, or when `expected_size` is set and the written size differs
pub async fn download_to_file(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    target: &Path,
    expected_size: Option<u64>,
    progress: Option<ProgressFn>,
) -> Result<u64, TransferError> {
    let url = client.signed_url(credentials, SignedOperation::Download, key, None)?;
    let response = client.http().get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(TransferError::from_response(response).await);
    }

    let total = expected_size.or(response.content_length()).unwrap_or(0);
    debug!(key, target = %target.display(), bytes = total, "Downloading object");

    match write_body(response, target, total, progress).await {
        Ok(written) => match expected_size {
            Some(expected) if expected != written => {
                remove_partial(target).await;
                Err(TransferError::SizeMismatch {
                    expected,
                    actual: written,
                })
            }
            _ => Ok(written),
        },
        Err(e) => {
            remove_partial(target).await;
            Err(e)
        }
    }
}

async fn write_body(
    response: reqwest::Response,
    target: &Path,
    total: u64,
    progress: Option<ProgressFn>,
) -> Result<u64, TransferError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(report) = &progress {
            report(written, total.max(written));
        }
    }
    file.flush().await?;
    file.sync_all().await?;

    if written == 0 {
        if let Some(report) = &progress {
            report(0, 0);
        }
    }
    Ok(written)
}

async fn remove_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => debug!(target = %target.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(target = %target.display(), error = %e, "Failed to remove partial download"),
    }
}

/// Deletes `key`; a missing object counts as deleted
pub async fn delete_object(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
) -> Result<(), TransferError> {
    let url = client.signed_url(credentials, SignedOperation::Delete, key, None)?;
    let response = client.http().delete(url).send().await?;
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_FOUND {
        debug!(key, status = %status, "Object deleted");
        Ok(())
    } else {
        Err(TransferError::from_response(response).await)
    }
}
