//! Shared helpers: a mock authority plus object store on one server

use std::{path::Path, sync::Arc};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bucketsync_cache::{DatabasePool, SqliteStateRepository};
use bucketsync_core::config::{Config, ConfigBuilder, MappingEntry};

pub const BUCKET_ID: &str = "b1";
pub const BUCKET_NAME: &str = "photos";

/// Starts the mock server and mounts the bucket account for [`BUCKET_ID`]
pub async fn setup_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/buckets/{BUCKET_ID}/account")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucketName": BUCKET_NAME,
            "region": "us-east-1",
            "accessKey": "AKIATESTKEY",
            "secretKey": "test-secret"
        })))
        .mount(&server)
        .await;
    server
}

/// Mounts the manifest for [`BUCKET_ID`] as `(key, size)` pairs
pub async fn mount_manifest(server: &MockServer, files: &[(&str, u64)]) {
    let items: Vec<serde_json::Value> = files
        .iter()
        .map(|(key, size)| serde_json::json!({"key": key, "size": size, "isFolder": false}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/buckets/{BUCKET_ID}/objects")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"items": items, "nextCursor": null})),
        )
        .mount(server)
        .await;
}

/// Mounts a GET for `key` in the object store returning `content`
pub async fn mount_object(server: &MockServer, key: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(object_path(key)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

pub fn object_path(key: &str) -> String {
    format!("/{BUCKET_NAME}/{key}")
}

/// Config with one configuration mapping `<root>/b1` to [`BUCKET_ID`]
pub fn config(server: &MockServer, root: &Path) -> Config {
    ConfigBuilder::new()
        .sync_root(root.to_path_buf())
        .configuration(
            "main",
            15,
            vec![MappingEntry {
                local_path: BUCKET_ID.into(),
                bucket_id: BUCKET_ID.to_string(),
            }],
        )
        .watcher_enabled(false)
        .authority_base_url(server.uri())
        .storage_endpoint(server.uri())
        .build()
}

pub async fn repository() -> Arc<SqliteStateRepository> {
    let pool = DatabasePool::in_memory().await.expect("in-memory database");
    Arc::new(SqliteStateRepository::new(pool.pool().clone()))
}
