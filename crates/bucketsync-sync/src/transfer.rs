//! Transfer executor over presigned object storage
//!
//! Implements [`ITransferExecutor`]: resolve the bucket's credentials,
//! move the bytes through [`ObjectClient`], report progress, and fold every
//! failure into a single [`TransferOutcome`]. No retries happen here; the
//! next reconciliation cycle picks up whatever is still missing.
//!
//! Downloads hold a write-guard token on the target path for the whole
//! write. The token lingers after completion so the watcher ignores the
//! notifications the write produced.

use std::sync::Arc;

use tracing::{debug, warn};

use bucketsync_core::{
    domain::{ObjectKey, ProgressEvent, ProgressKind},
    ports::{DownloadRequest, IProgressSink, ITransferExecutor, TransferOutcome, UploadRequest},
};
use bucketsync_storage::{
    download::{delete_object, download_to_file},
    upload::upload_file,
    CredentialResolver, ObjectClient,
};

use crate::{guard::PathGuards, progress::transfer_progress};

/// Single-object transfers for the engine and the watcher
pub struct TransferExecutor {
    resolver: Arc<CredentialResolver>,
    objects: ObjectClient,
    guards: PathGuards,
    progress: Arc<dyn IProgressSink>,
}

impl TransferExecutor {
    pub fn new(
        resolver: Arc<CredentialResolver>,
        objects: ObjectClient,
        guards: PathGuards,
        progress: Arc<dyn IProgressSink>,
    ) -> Self {
        Self {
            resolver,
            objects,
            guards,
            progress,
        }
    }

    fn fail(&self, action: &str, key: &ObjectKey, error: String) -> TransferOutcome {
        warn!(key = %key, error = %error, "{action} failed");
        self.progress
            .emit(ProgressEvent::error(format!("{action} failed: {error}")).with_filename(key.as_str()));
        TransferOutcome::Failed { error }
    }
}

#[async_trait::async_trait]
impl ITransferExecutor for TransferExecutor {
    async fn upload(&self, request: &UploadRequest) -> TransferOutcome {
        let credentials = match self.resolver.resolve(&request.bucket_id).await {
            Ok(credentials) => credentials,
            Err(e) => return self.fail("Upload", &request.key, e.to_string()),
        };

        let progress = transfer_progress(
            Arc::clone(&self.progress),
            ProgressKind::Upload,
            request.key.as_str(),
        );
        match upload_file(
            &self.objects,
            &credentials,
            request.key.as_str(),
            &request.local_path,
            request.mime_type.as_deref(),
            Some(progress),
        )
        .await
        {
            Ok(bytes) => {
                debug!(key = %request.key, bytes, "Upload finished");
                TransferOutcome::Success { bytes }
            }
            Err(e) => self.fail("Upload", &request.key, e.to_string()),
        }
    }

    async fn download(&self, request: &DownloadRequest) -> TransferOutcome {
        let credentials = match self.resolver.resolve(&request.bucket_id).await {
            Ok(credentials) => credentials,
            Err(e) => return self.fail("Download", &request.key, e.to_string()),
        };

        let _guard = self.guards.guard_write(&request.local_path);
        let progress = transfer_progress(
            Arc::clone(&self.progress),
            ProgressKind::Download,
            request.key.as_str(),
        );
        match download_to_file(
            &self.objects,
            &credentials,
            request.key.as_str(),
            &request.local_path,
            request.expected_size,
            Some(progress),
        )
        .await
        {
            Ok(bytes) => {
                debug!(key = %request.key, bytes, "Download finished");
                TransferOutcome::Success { bytes }
            }
            Err(e) => self.fail("Download", &request.key, e.to_string()),
        }
    }

    async fn delete(&self, bucket_id: &str, key: &ObjectKey) -> TransferOutcome {
        let credentials = match self.resolver.resolve(bucket_id).await {
            Ok(credentials) => credentials,
            Err(e) => return self.fail("Delete", key, e.to_string()),
        };

        match delete_object(&self.objects, &credentials, key.as_str()).await {
            Ok(()) => {
                debug!(bucket_id, key = %key, "Delete finished");
                TransferOutcome::Success { bytes: 0 }
            }
            Err(e) => self.fail("Delete", key, e.to_string()),
        }
    }
}
