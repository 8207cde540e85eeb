//! Signed URL port (driven/secondary port)
//!
//! Object storage is only reached through short-lived signed URLs. This
//! module describes the operations a URL can be signed for and the trait
//! that produces them.

use std::time::Duration;

use url::Url;

use crate::domain::StorageCredentials;

/// Object storage operation a URL is signed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedOperation {
    /// `GET` the object
    Download,
    /// `PUT` the whole object
    Upload,
    /// `DELETE` the object
    Delete,
    /// `POST ?uploads` to start a multipart upload
    CreateMultipart,
    /// `PUT ?partNumber=N&uploadId=..` for one part
    UploadPart { part_number: u32, upload_id: String },
    /// `POST ?uploadId=..` to assemble the parts
    CompleteMultipart { upload_id: String },
    /// `DELETE ?uploadId=..` to discard the parts
    AbortMultipart { upload_id: String },
}

impl SignedOperation {
    /// HTTP method the URL must be used with
    pub fn method(&self) -> &'static str {
        match self {
            SignedOperation::Download => "GET",
            SignedOperation::Upload | SignedOperation::UploadPart { .. } => "PUT",
            SignedOperation::Delete | SignedOperation::AbortMultipart { .. } => "DELETE",
            SignedOperation::CreateMultipart | SignedOperation::CompleteMultipart { .. } => "POST",
        }
    }

    /// Sub-resource query parameters for this operation
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            SignedOperation::CreateMultipart => vec![("uploads", String::new())],
            SignedOperation::UploadPart {
                part_number,
                upload_id,
            } => vec![
                ("partNumber", part_number.to_string()),
                ("uploadId", upload_id.clone()),
            ],
            SignedOperation::CompleteMultipart { upload_id }
            | SignedOperation::AbortMultipart { upload_id } => {
                vec![("uploadId", upload_id.clone())]
            }
            _ => Vec::new(),
        }
    }
}

/// A request for one signed URL
#[derive(Debug, Clone)]
pub struct PresignRequest {
    pub operation: SignedOperation,
    pub key: String,
    pub content_type: Option<String>,
    pub expires_in: Duration,
}

impl PresignRequest {
    pub fn new(operation: SignedOperation, key: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            operation,
            key: key.into(),
            content_type: None,
            expires_in,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Port trait producing one-time transfer URLs
pub trait IUrlSigner: Send + Sync {
    /// Signs a URL for `request` against the bucket named in `credentials`
    fn presign(&self, credentials: &StorageCredentials, request: &PresignRequest)
        -> anyhow::Result<Url>;
}
