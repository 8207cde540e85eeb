//! Central authority API client
//!
//! Provides a typed HTTP client for the authority that owns bucket
//! metadata. Handles bearer authentication, cursor pagination and the
//! mapping of HTTP failures onto [`RemoteError`].
//!
//! ## Endpoints
//!
//! - `GET /buckets/{id}/objects?cursor=…` - manifest page
//! - `GET /buckets/{id}/account` - bucket account with encrypted keys
//! - `POST /activity` - activity ledger batch
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bucketsync_core::ports::IRemoteAuthority;
//! use bucketsync_storage::client::AuthorityClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = AuthorityClient::with_base_url("session-token", "https://sync.example.com/api");
//! let manifest = client.fetch_manifest("bucket-1").await?;
//! println!("{} objects", manifest.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use bucketsync_core::{
    domain::{BucketAccount, LedgerBatch, ManifestEntry, RemoteError},
    ports::IRemoteAuthority,
};

/// Default request timeout for authority calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on manifest pages, guarding against a cursor that never ends
const MAX_PAGES: usize = 10_000;

// ============================================================================
// Authority response types
// ============================================================================

/// One page of `GET /buckets/{id}/objects`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestPage {
    #[serde(default)]
    items: Vec<ManifestEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

// ============================================================================
// AuthorityClient
// ============================================================================

/// HTTP client for the central authority API
pub struct AuthorityClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// Session token sent as a bearer credential
    token: String,
}

impl AuthorityClient {
    /// Creates a client against `base_url` authenticated with `token`
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(&self.token)
    }

    /// Sends a request, classifying transport failures
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))
            .with_context(|| format!("Failed to send {what}"))
    }

    /// Converts a non-success response into a [`RemoteError`]
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            body.trim().chars().take(512).collect()
        };
        Err(RemoteError::from_status(status.as_u16(), message))
            .with_context(|| format!("{what} returned error status"))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse {what} response"))
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

#[async_trait::async_trait]
impl IRemoteAuthority for AuthorityClient {
    async fn fetch_manifest(&self, bucket_id: &str) -> Result<Vec<ManifestEntry>> {
        let path = format!("/buckets/{}/objects", encode_segment(bucket_id));
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        for page_number in 0..MAX_PAGES {
            let mut request = self.request(Method::GET, &path);
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor.as_str())]);
            }
            let response = self.send(request, "manifest request").await?;
            let response = Self::check(response, "GET manifest").await?;
            let page: ManifestPage = Self::parse(response, "manifest").await?;

            debug!(
                bucket_id,
                page = page_number,
                items = page.items.len(),
                "Fetched manifest page"
            );
            entries.extend(page.items);

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(RemoteError::InvalidResponse(format!(
                        "Manifest cursor did not advance: {next}"
                    )))
                    .context("Manifest pagination stalled");
                }
                Some(next) => cursor = Some(next),
                None => {
                    info!(bucket_id, objects = entries.len(), "Fetched remote manifest");
                    return Ok(entries);
                }
            }
        }

        Err(RemoteError::InvalidResponse(format!(
            "Manifest exceeded {MAX_PAGES} pages"
        )))
        .context("Manifest pagination did not terminate")
    }

    async fn bucket_account(&self, bucket_id: &str) -> Result<Option<BucketAccount>> {
        let path = format!("/buckets/{}/account", encode_segment(bucket_id));
        let response = self
            .send(self.request(Method::GET, &path), "account request")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(bucket_id, "No account for bucket");
            return Ok(None);
        }
        let response = Self::check(response, "GET account").await?;
        Ok(Some(Self::parse(response, "account").await?))
    }

    async fn post_ledger(&self, batch: &LedgerBatch) -> Result<()> {
        let request = self.request(Method::POST, "/activity").json(batch);
        let response = self.send(request, "ledger batch").await?;
        Self::check(response, "POST activity").await?;
        debug!(records = batch.len(), "Ledger batch accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let client = AuthorityClient::with_base_url("test-token", "http://localhost:8080/api/");
        let request = client.request(Method::GET, "/activity").build().unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/api/activity");
        let auth_header = request
            .headers()
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(auth_header, "Bearer test-token");
    }

    #[test]
    fn test_manifest_page_deserialization() {
        let json = r#"{
            "items": [
                {"id": "o1", "key": "a.txt", "size": 10, "isFolder": false, "mimeType": "text/plain"},
                {"key": "docs/", "size": 0, "isFolder": true}
            ],
            "nextCursor": "c2"
        }"#;
        let page: ManifestPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id.as_deref(), Some("o1"));
        assert!(page.items[1].is_folder);
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn test_manifest_page_without_cursor() {
        let page: ManifestPage = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_bucket_segment_is_encoded() {
        assert_eq!(encode_segment("my bucket/1"), "my%20bucket%2F1");
    }
}
