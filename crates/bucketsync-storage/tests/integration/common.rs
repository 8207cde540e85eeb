//! Shared test helpers for storage integration tests
//!
//! Provides wiremock-based mock servers for the authority API and for
//! path-style object storage. Object helpers return an `ObjectClient`
//! whose presigner points at the mock server.

use std::{sync::Arc, time::Duration};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bucketsync_core::domain::StorageCredentials;
use bucketsync_storage::{
    client::AuthorityClient, ObjectClient, SigV4Presigner, TransferSettings,
};

pub const BUCKET: &str = "photos";

/// Starts a mock authority and returns a client pointed at it
pub async fn setup_authority_mock() -> (MockServer, AuthorityClient) {
    let server = MockServer::start().await;
    let client = AuthorityClient::with_base_url("test-session-token", server.uri());
    (server, client)
}

/// Starts a mock object store; parts are `part_size` bytes
pub async fn setup_object_mock(part_size: u64) -> (MockServer, ObjectClient) {
    let server = MockServer::start().await;
    let signer = SigV4Presigner::with_endpoint(&server.uri()).expect("endpoint");
    let settings = TransferSettings {
        part_size,
        max_concurrent_parts: 2,
        request_timeout: Duration::from_secs(10),
        url_expiry: Duration::from_secs(3600),
    };
    let client = ObjectClient::new(Arc::new(signer), settings).expect("client");
    (server, client)
}

pub fn credentials() -> StorageCredentials {
    StorageCredentials {
        access_key: "AKIATESTKEY".to_string(),
        secret_key: "test-secret".to_string(),
        session_token: None,
        region: "us-east-1".to_string(),
        bucket_name: BUCKET.to_string(),
    }
}

/// Path of an object under the mock store
pub fn object_path(key: &str) -> String {
    format!("/{}/{}", BUCKET, key)
}

/// Mounts a GET for `key` returning `content`
pub async fn mount_object(server: &MockServer, key: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(object_path(key)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}
