//! Integration tests for the authority API client

use bucketsync_core::{
    domain::{is_auth_failure, ActivityAction, ActivityRecord, LedgerBatch},
    ports::IRemoteAuthority,
};
use wiremock::{
    matchers::{header, method, path, query_param, query_param_is_missing},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_fetch_manifest_follows_cursor() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("GET"))
        .and(path("/buckets/b1/objects"))
        .and(query_param_is_missing("cursor"))
        .and(header("authorization", "Bearer test-session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"id": "o1", "key": "a.txt", "size": 10, "isFolder": false}],
            "nextCursor": "page2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/buckets/b1/objects"))
        .and(query_param("cursor", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"key": "docs/", "size": 0, "isFolder": true},
                {"key": "docs/b.txt", "size": 20, "isFolder": false, "mimeType": "text/plain"}
            ],
            "nextCursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = client.fetch_manifest("b1").await.expect("manifest");
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a.txt", "docs/", "docs/b.txt"]);
    assert_eq!(entries[2].size, 20);
}

#[tokio::test]
async fn test_fetch_manifest_unauthorized() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("GET"))
        .and(path("/buckets/b1/objects"))
        .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
        .mount(&server)
        .await;

    let err = client.fetch_manifest("b1").await.unwrap_err();
    assert!(is_auth_failure(&err));
}

#[tokio::test]
async fn test_fetch_manifest_server_error_is_not_auth() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("GET"))
        .and(path("/buckets/b1/objects"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.fetch_manifest("b1").await.unwrap_err();
    assert!(!is_auth_failure(&err));
}

#[tokio::test]
async fn test_bucket_account_found_and_missing() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("GET"))
        .and(path("/buckets/b1/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucketName": "photos",
            "region": "eu-west-1",
            "accessKey": "enc-access",
            "secretKey": "enc-secret"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/buckets/missing/account"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let account = client.bucket_account("b1").await.unwrap().expect("account");
    assert_eq!(account.bucket_name, "photos");
    assert_eq!(account.access_key, "enc-access");

    assert!(client.bucket_account("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_ledger_sends_batch() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("POST"))
        .and(path("/activity"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let records = vec![
        ActivityRecord::success(ActivityAction::Download, "a.txt"),
        ActivityRecord::failure(ActivityAction::Upload, "b.txt", "HTTP 500"),
        ActivityRecord::skipped(ActivityAction::Download, "c.txt"),
    ];
    let batch = LedgerBatch::from_records(&records);
    client.post_ledger(&batch).await.expect("ledger");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 2);
    assert_eq!(body["records"][0]["fileName"], "a.txt");
    assert_eq!(body["records"][1]["error"], "HTTP 500");
    assert_eq!(body["counts"]["total"], 2);
    assert_eq!(body["counts"]["failed"], 1);
}

#[tokio::test]
async fn test_post_ledger_forbidden_is_auth_failure() {
    let (server, client) = common::setup_authority_mock().await;

    Mock::given(method("POST"))
        .and(path("/activity"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client.post_ledger(&LedgerBatch::default()).await.unwrap_err();
    assert!(is_auth_failure(&err));
}
