//! Upload operations for S3-compatible object storage
//!
//! Provides functions for uploading local files:
//! - [`upload_file`] - Entry point; picks single or multipart by size
//! - [`upload_single`] - One streamed PUT for files up to one part
//! - [`upload_multipart`] - Parts of `part_size` bytes, a bounded number in flight
//!
//! Nothing here retries. A failed upload surfaces its error and the next
//! sync cycle picks the file up again.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use futures_util::TryStreamExt;
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG},
    Body,
};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncSeekExt},
    sync::Semaphore,
    task::JoinSet,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use bucketsync_core::{domain::StorageCredentials, ports::SignedOperation};

use crate::{
    object::{ObjectClient, ProgressFn},
    TransferError,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Multipart XML bodies
// ============================================================================

/// Response to `POST ?uploads`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateMultipartUploadResult {
    upload_id: String,
}

/// Body of `POST ?uploadId=…`
#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CompletedPart {
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

/// One slice of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartRange {
    number: u32,
    offset: u64,
    len: u64,
}

/// Splits `total` bytes into parts of at most `part_size`, numbered from 1
fn part_ranges(total: u64, part_size: u64) -> Vec<PartRange> {
    let part_size = part_size.max(1);
    let mut ranges = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < total {
        let len = part_size.min(total - offset);
        ranges.push(PartRange {
            number,
            offset,
            len,
        });
        offset += len;
        number += 1;
    }
    ranges
}

// ============================================================================
// upload_file
// ============================================================================

/// Uploads a local file to `key`, returning the number of bytes sent
///
/// # Arguments
/// * `client` - Object client carrying the signer and tunables
/// * `credentials` - Resolved bucket credentials
/// * `key` - Destination object key
/// * `path` - Local source file
/// * `content_type` - MIME type, `application/octet-stream` when `None`
/// * `progress` - Optional `(bytes_sent, total_bytes)` callback
///
/// # Errors
/// Returns an error if the file cannot be read or storage rejects any request
pub async fn upload_file(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    path: &Path,
    content_type: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<u64, TransferError> {
    let total = tokio::fs::metadata(path).await?.len();
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

    if total <= client.settings().part_size {
        upload_single(client, credentials, key, path, content_type, total, progress).await
    } else {
        upload_multipart(client, credentials, key, path, content_type, total, progress).await
    }
}

// ============================================================================
// upload_single
// ============================================================================

/// Streams a file in one PUT request
pub async fn upload_single(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    path: &Path,
    content_type: &str,
    total: u64,
    progress: Option<ProgressFn>,
) -> Result<u64, TransferError> {
    let url = client.signed_url(credentials, SignedOperation::Upload, key, Some(content_type))?;
    debug!(key, bytes = total, "Uploading object in a single request");

    let file = tokio::fs::File::open(path).await?;
    let mut sent = 0u64;
    let reporter = progress.clone();
    let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(report) = &reporter {
            report(sent, total);
        }
    });

    let response = client
        .http()
        .put(url)
        .header(CONTENT_LENGTH, total)
        .header(CONTENT_TYPE, content_type)
        .body(Body::wrap_stream(stream))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TransferError::from_response(response).await);
    }

    if total == 0 {
        if let Some(report) = &progress {
            report(0, 0);
        }
    }
    debug!(key, bytes = total, "Single upload completed");
    Ok(total)
}

// ============================================================================
// upload_multipart
// ============================================================================

/// Uploads a file as a multipart upload
///
/// 1. `POST ?uploads` returns an `UploadId`
/// 2. Each part is `PUT ?partNumber=N&uploadId=…`, at most
///    `max_concurrent_parts` in flight; the `ETag` of each is kept
/// 3. `POST ?uploadId=…` with the ordered part list completes the object
///
/// Any failure after step 1 triggers a best-effort abort so storage does not
/// keep orphaned parts.
pub async fn upload_multipart(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    path: &Path,
    content_type: &str,
    total: u64,
    progress: Option<ProgressFn>,
) -> Result<u64, TransferError> {
    let ranges = part_ranges(total, client.settings().part_size);
    info!(key, bytes = total, parts = ranges.len(), "Starting multipart upload");

    let upload_id = create_multipart(client, credentials, key, content_type).await?;

    let result = match upload_parts(
        client,
        credentials,
        key,
        path,
        &upload_id,
        ranges,
        total,
        progress,
    )
    .await
    {
        Ok(parts) => complete_multipart(client, credentials, key, &upload_id, parts).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!(key, bytes = total, "Multipart upload completed");
            Ok(total)
        }
        Err(e) => {
            abort_multipart(client, credentials, key, &upload_id).await;
            Err(e)
        }
    }
}

async fn create_multipart(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    content_type: &str,
) -> Result<String, TransferError> {
    let url = client.signed_url(
        credentials,
        SignedOperation::CreateMultipart,
        key,
        Some(content_type),
    )?;
    let response = client
        .http()
        .post(url)
        .header(CONTENT_TYPE, content_type)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(TransferError::from_response(response).await);
    }

    let body = response.text().await?;
    let parsed: InitiateMultipartUploadResult = quick_xml::de::from_str(&body)
        .map_err(|e| TransferError::InvalidResponse(format!("Missing UploadId: {e}")))?;
    debug!(key, upload_id = %parsed.upload_id, "Multipart upload created");
    Ok(parsed.upload_id)
}

#[allow(clippy::too_many_arguments)]
async fn upload_parts(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    path: &Path,
    upload_id: &str,
    ranges: Vec<PartRange>,
    total: u64,
    progress: Option<ProgressFn>,
) -> Result<Vec<CompletedPart>, TransferError> {
    let semaphore = Arc::new(Semaphore::new(client.settings().max_concurrent_parts));
    let failed = Arc::new(AtomicBool::new(false));
    let sent = Arc::new(AtomicU64::new(0));
    let mut tasks = JoinSet::new();

    for range in ranges {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| TransferError::InvalidResponse(format!("Part scheduler closed: {e}")))?;
        if failed.load(Ordering::SeqCst) {
            break;
        }

        let url = client.signed_url(
            credentials,
            SignedOperation::UploadPart {
                part_number: range.number,
                upload_id: upload_id.to_string(),
            },
            key,
            None,
        )?;
        let http = client.http().clone();
        let path = path.to_path_buf();
        let failed = failed.clone();
        let sent = sent.clone();
        let progress = progress.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let result = put_part(&http, url, &path, range).await;
            match &result {
                Ok(_) => {
                    let done = sent.fetch_add(range.len, Ordering::SeqCst) + range.len;
                    if let Some(report) = &progress {
                        report(done, total);
                    }
                }
                Err(_) => failed.store(true, Ordering::SeqCst),
            }
            result
        });
    }

    let mut parts = Vec::new();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| TransferError::InvalidResponse(format!("Part task failed: {e}")));
        match outcome.and_then(|r| r) {
            Ok(part) => parts.push(part),
            Err(e) => {
                if first_error.is_none() {
                    warn!(key, error = %e, "Multipart part failed");
                    first_error = Some(e);
                    tasks.abort_all();
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    parts.sort_by_key(|p| p.part_number);
    Ok(parts)
}

async fn put_part(
    http: &reqwest::Client,
    url: url::Url,
    path: &Path,
    range: PartRange,
) -> Result<CompletedPart, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(range.offset)).await?;
    let mut buf = Vec::with_capacity(range.len as usize);
    file.take(range.len).read_to_end(&mut buf).await?;

    let response = http
        .put(url)
        .header(CONTENT_LENGTH, buf.len())
        .body(buf)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(TransferError::from_response(response).await);
    }

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidResponse(format!("Part {} response has no ETag", range.number))
        })?;
    debug!(part = range.number, bytes = range.len, "Part uploaded");
    Ok(CompletedPart {
        part_number: range.number,
        etag,
    })
}

async fn complete_multipart(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    upload_id: &str,
    parts: Vec<CompletedPart>,
) -> Result<(), TransferError> {
    let body = quick_xml::se::to_string(&CompleteMultipartUpload { parts })
        .map_err(|e| TransferError::InvalidResponse(format!("Failed to encode part list: {e}")))?;
    let url = client.signed_url(
        credentials,
        SignedOperation::CompleteMultipart {
            upload_id: upload_id.to_string(),
        },
        key,
        None,
    )?;

    let response = client
        .http()
        .post(url)
        .header(CONTENT_TYPE, "application/xml")
        .body(body)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(TransferError::from_response(response).await);
    }

    // Completion can fail after the 200 status line has been sent.
    let text = response.text().await?;
    if text.contains("<Error>") {
        return Err(TransferError::InvalidResponse(format!(
            "Multipart completion failed: {}",
            text.trim()
        )));
    }
    Ok(())
}

async fn abort_multipart(
    client: &ObjectClient,
    credentials: &StorageCredentials,
    key: &str,
    upload_id: &str,
) {
    let url = match client.signed_url(
        credentials,
        SignedOperation::AbortMultipart {
            upload_id: upload_id.to_string(),
        },
        key,
        None,
    ) {
        Ok(url) => url,
        Err(e) => {
            warn!(key, upload_id, error = %e, "Cannot sign multipart abort");
            return;
        }
    };

    match client.http().delete(url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(key, upload_id, "Multipart upload aborted");
        }
        Ok(response) => {
            warn!(key, upload_id, status = %response.status(), "Multipart abort rejected");
        }
        Err(e) => warn!(key, upload_id, error = %e, "Multipart abort failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_ranges() {
        let ranges = part_ranges(12, 5);
        assert_eq!(
            ranges,
            vec![
                PartRange { number: 1, offset: 0, len: 5 },
                PartRange { number: 2, offset: 5, len: 5 },
                PartRange { number: 3, offset: 10, len: 2 },
            ]
        );
        assert_eq!(part_ranges(10, 5).len(), 2);
        assert!(part_ranges(0, 5).is_empty());
    }

    #[test]
    fn test_parse_initiate_result() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>photos</Bucket>
  <Key>big.bin</Key>
  <UploadId>VXBsb2FkSUQ</UploadId>
</InitiateMultipartUploadResult>"#;
        let parsed: InitiateMultipartUploadResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.upload_id, "VXBsb2FkSUQ");
    }

    #[test]
    fn test_complete_body() {
        let body = quick_xml::se::to_string(&CompleteMultipartUpload {
            parts: vec![
                CompletedPart {
                    part_number: 1,
                    etag: "etag-1".to_string(),
                },
                CompletedPart {
                    part_number: 2,
                    etag: "etag-2".to_string(),
                },
            ],
        })
        .unwrap();
        assert!(body.starts_with("<CompleteMultipartUpload>"));
        assert_eq!(body.matches("<Part>").count(), 2);
        assert!(body.contains("<PartNumber>1</PartNumber>"));
        assert!(body.contains("<ETag>etag-2</ETag>"));
    }
}
