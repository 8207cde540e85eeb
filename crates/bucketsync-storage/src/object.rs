//! Presigned-URL object client
//!
//! Every object operation is a plain HTTP request against a URL produced by
//! an [`IUrlSigner`]. [`ObjectClient`] bundles the HTTP client, the signer
//! and the transfer tunables; the operations themselves live in
//! [`crate::upload`] and [`crate::download`].

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use url::Url;

use bucketsync_core::{
    config::TransferConfig,
    domain::StorageCredentials,
    ports::{IUrlSigner, PresignRequest, SignedOperation},
};

use crate::TransferError;

/// Progress callback: `(bytes_transferred, total_bytes)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Transfer tunables
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Multipart part size; files at or below it use a single PUT
    pub part_size: u64,
    /// Parts in flight per multipart upload
    pub max_concurrent_parts: usize,
    /// Upper bound on one HTTP request, body included
    pub request_timeout: Duration,
    /// Lifetime of each signed URL
    pub url_expiry: Duration,
}

impl From<&TransferConfig> for TransferSettings {
    fn from(config: &TransferConfig) -> Self {
        Self {
            part_size: config.part_size_bytes(),
            max_concurrent_parts: config.max_concurrent_parts.max(1),
            request_timeout: config.request_timeout(),
            url_expiry: config.signed_url_expiry(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

/// HTTP client for presigned object operations
#[derive(Clone)]
pub struct ObjectClient {
    client: Client,
    signer: Arc<dyn IUrlSigner>,
    settings: TransferSettings,
}

impl ObjectClient {
    /// Creates a client with its own connection pool
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Network` if the HTTP client cannot be built.
    pub fn new(signer: Arc<dyn IUrlSigner>, settings: TransferSettings) -> Result<Self, TransferError> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self {
            client,
            signer,
            settings,
        })
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Produces a signed URL for one operation on `key`
    pub fn signed_url(
        &self,
        credentials: &StorageCredentials,
        operation: SignedOperation,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<Url, TransferError> {
        let mut request = PresignRequest::new(operation, key, self.settings.url_expiry);
        if let Some(content_type) = content_type {
            request = request.with_content_type(content_type);
        }
        self.signer
            .presign(credentials, &request)
            .map_err(|e| TransferError::Signing(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigV4Presigner;

    #[test]
    fn test_settings_from_config() {
        let settings = TransferSettings::default();
        assert_eq!(settings.part_size, 5 * 1024 * 1024);
        assert_eq!(settings.max_concurrent_parts, 4);
        assert_eq!(settings.url_expiry, Duration::from_secs(3600));
    }

    #[test]
    fn test_signed_url_uses_operation() {
        let signer = SigV4Presigner::with_endpoint("http://localhost:9000").unwrap();
        let client = ObjectClient::new(Arc::new(signer), TransferSettings::default()).unwrap();
        let creds = StorageCredentials {
            access_key: "AKIA1".to_string(),
            secret_key: "s".to_string(),
            session_token: None,
            region: "us-east-1".to_string(),
            bucket_name: "b".to_string(),
        };
        let url = client
            .signed_url(&creds, SignedOperation::CreateMultipart, "x.bin", None)
            .unwrap();
        assert_eq!(url.path(), "/b/x.bin");
        assert!(url.query().unwrap().contains("uploads="));
    }
}
