//! AWS Signature Version 4 presigned URLs
//!
//! Implements the query-string variant of SigV4 so that every object
//! operation travels as a single self-contained URL:
//!
//! 1. Build the canonical request (method, URI, sorted query, `host` header,
//!    `UNSIGNED-PAYLOAD`)
//! 2. Build the string to sign over its SHA-256 hash
//! 3. Derive the signing key from the secret, date, region and service
//! 4. Append `X-Amz-Signature` to the query string
//!
//! ## Addressing
//!
//! Without an endpoint, URLs are virtual-hosted
//! (`https://{bucket}.s3.{region}.amazonaws.com/{key}`). A configured
//! endpoint switches to path-style (`{endpoint}/{bucket}/{key}`), which is
//! what MinIO and local test servers expect.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use url::Url;

use bucketsync_core::{
    domain::StorageCredentials,
    ports::{IUrlSigner, PresignRequest},
};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Longest expiry SigV4 accepts (7 days)
pub const MAX_EXPIRY_SECS: u64 = 604_800;

/// RFC 3986 unreserved characters stay literal; everything else is encoded
const AWS_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Presigns object operations with SigV4
#[derive(Debug, Clone, Default)]
pub struct SigV4Presigner {
    endpoint: Option<Url>,
}

impl SigV4Presigner {
    /// Creates a presigner using virtual-hosted AWS URLs
    pub fn new() -> Self {
        Self { endpoint: None }
    }

    /// Creates a presigner using path-style URLs against a custom endpoint
    pub fn with_endpoint(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("Invalid storage endpoint {endpoint}: {e}"))?;
        if endpoint.host_str().is_none() {
            anyhow::bail!("Storage endpoint has no host: {endpoint}");
        }
        Ok(Self {
            endpoint: Some(endpoint),
        })
    }

    /// Presigns a request as of `now`
    pub fn presign_at(
        &self,
        credentials: &StorageCredentials,
        request: &PresignRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Url> {
        let expires = request.expires_in.as_secs().clamp(1, MAX_EXPIRY_SECS);
        let (origin, host, canonical_uri) = self.locate(credentials, &request.key)?;

        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, credentials.region, SERVICE
        );

        let mut params: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{}", credentials.access_key, scope),
            ),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), expires.to_string()),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
        ];
        if let Some(token) = &credentials.session_token {
            params.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        for (name, value) in request.operation.query_params() {
            params.push((name.to_string(), value));
        }
        params.sort();

        let canonical_query = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
            request.operation.method(),
            canonical_uri,
            canonical_query,
            host,
            UNSIGNED_PAYLOAD
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&credentials.secret_key, &date_stamp, &credentials.region)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let full = format!(
            "{}{}?{}&X-Amz-Signature={}",
            origin, canonical_uri, canonical_query, signature
        );
        Url::parse(&full).map_err(|e| anyhow::anyhow!("Failed to build signed URL: {e}"))
    }

    /// Returns (origin, host header, canonical URI) for a key
    fn locate(
        &self,
        credentials: &StorageCredentials,
        key: &str,
    ) -> anyhow::Result<(String, String, String)> {
        let encoded_key = uri_encode_path(key);
        match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .host_str()
                    .ok_or_else(|| anyhow::anyhow!("Storage endpoint has no host"))?;
                let host = match endpoint.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                let base_path = endpoint.path().trim_end_matches('/');
                let uri = format!(
                    "{}/{}/{}",
                    base_path,
                    uri_encode(&credentials.bucket_name),
                    encoded_key
                );
                Ok((format!("{}://{}", endpoint.scheme(), host), host, uri))
            }
            None => {
                let host = format!(
                    "{}.s3.{}.amazonaws.com",
                    credentials.bucket_name, credentials.region
                );
                Ok((format!("https://{host}"), host, format!("/{encoded_key}")))
            }
        }
    }
}

impl IUrlSigner for SigV4Presigner {
    fn presign(
        &self,
        credentials: &StorageCredentials,
        request: &PresignRequest,
    ) -> anyhow::Result<Url> {
        self.presign_at(credentials, request, Utc::now())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str) -> anyhow::Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("HMAC key rejected: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Encodes a query component or a single path segment
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, AWS_ENCODE_SET).to_string()
}

/// Encodes an object key, preserving `/` separators
fn uri_encode_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
