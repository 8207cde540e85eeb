//! Integration tests for object uploads, downloads and deletes

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bucketsync_storage::{download, upload, ProgressFn, TransferError};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

// ============================================================================
// Download tests
// ============================================================================

#[tokio::test]
async fn test_download_writes_file() {
    let (server, client) = common::setup_object_mock(5 * 1024 * 1024).await;
    let content = b"Hello, bucket! This is test content.";
    common::mount_object(&server, "docs/b.txt", content).await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("docs").join("b.txt");
    let last = Arc::new(AtomicU64::new(0));
    let seen = last.clone();
    let progress: ProgressFn = Arc::new(move |done, _total| seen.store(done, Ordering::SeqCst));

    let written = download::download_to_file(
        &client,
        &common::credentials(),
        "docs/b.txt",
        &target,
        Some(content.len() as u64),
        Some(progress),
    )
    .await
    .expect("download");

    assert_eq!(written, content.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), content);
    assert_eq!(last.load(Ordering::SeqCst), content.len() as u64);
}

#[tokio::test]
async fn test_download_error_status_leaves_no_file() {
    let (server, client) = common::setup_object_mock(5 * 1024 * 1024).await;
    Mock::given(method("GET"))
        .and(path(common::object_path("secret.txt")))
        .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("secret.txt");
    let err = download::download_to_file(
        &client,
        &common::credentials(),
        "secret.txt",
        &target,
        None,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TransferError::Status { status: 403, .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_download_size_mismatch_removes_partial() {
    let (server, client) = common::setup_object_mock(5 * 1024 * 1024).await;
    common::mount_object(&server, "short.bin", b"12345").await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("short.bin");
    let err = download::download_to_file(
        &client,
        &common::credentials(),
        "short.bin",
        &target,
        Some(50),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        TransferError::SizeMismatch {
            expected: 50,
            actual: 5
        }
    ));
    assert!(!target.exists());
}

// ============================================================================
// Upload tests
// ============================================================================

#[tokio::test]
async fn test_single_upload_streams_body() {
    let (server, client) = common::setup_object_mock(5 * 1024 * 1024).await;
    Mock::given(method("PUT"))
        .and(path(common::object_path("notes/today.txt")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("today.txt");
    std::fs::write(&source, b"small file content").unwrap();

    let sent = upload::upload_file(
        &client,
        &common::credentials(),
        "notes/today.txt",
        &source,
        Some("text/plain"),
        None,
    )
    .await
    .expect("upload");
    assert_eq!(sent, 18);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, b"small file content");
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "text/plain"
    );
}

#[tokio::test]
async fn test_multipart_upload() {
    let (server, client) = common::setup_object_mock(5).await;
    let object = common::object_path("big.bin");

    Mock::given(method("POST"))
        .and(path(object.clone()))
        .and(query_param("uploads", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<InitiateMultipartUploadResult><Bucket>photos</Bucket><Key>big.bin</Key>\
             <UploadId>up-1</UploadId></InitiateMultipartUploadResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(object.clone()))
        .and(query_param("uploadId", "up-1"))
        .respond_with(ResponseTemplate::new(200).append_header("ETag", "\"etag\""))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(object.clone()))
        .and(query_param("uploadId", "up-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<CompleteMultipartUploadResult><Key>big.bin</Key></CompleteMultipartUploadResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.bin");
    std::fs::write(&source, b"abcdefghijkl").unwrap();

    let sent = upload::upload_file(&client, &common::credentials(), "big.bin", &source, None, None)
        .await
        .expect("multipart upload");
    assert_eq!(sent, 12);

    let requests = server.received_requests().await.unwrap();
    let mut part_bodies: Vec<(String, Vec<u8>)> = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| {
            let number = r
                .url
                .query_pairs()
                .find(|(k, _)| k == "partNumber")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            (number, r.body.clone())
        })
        .collect();
    part_bodies.sort();
    assert_eq!(
        part_bodies,
        vec![
            ("1".to_string(), b"abcde".to_vec()),
            ("2".to_string(), b"fghij".to_vec()),
            ("3".to_string(), b"kl".to_vec()),
        ]
    );

    let complete = requests
        .iter()
        .find(|r| {
            r.method.as_str() == "POST" && r.url.query_pairs().any(|(k, _)| k == "uploadId")
        })
        .unwrap();
    let body = String::from_utf8(complete.body.clone()).unwrap();
    assert_eq!(body.matches("<PartNumber>").count(), 3);
}

#[tokio::test]
async fn test_multipart_part_failure_aborts() {
    let (server, client) = common::setup_object_mock(5).await;
    let object = common::object_path("big.bin");

    Mock::given(method("POST"))
        .and(path(object.clone()))
        .and(query_param("uploads", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<InitiateMultipartUploadResult><UploadId>up-2</UploadId></InitiateMultipartUploadResult>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(object.clone()))
        .and(query_param("partNumber", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("InternalError"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(object.clone()))
        .respond_with(ResponseTemplate::new(200).append_header("ETag", "\"etag\""))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(object.clone()))
        .and(query_param("uploadId", "up-2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.bin");
    std::fs::write(&source, b"abcdefghijkl").unwrap();

    let err = upload::upload_file(&client, &common::credentials(), "big.bin", &source, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Status { status: 500, .. }));
}

// ============================================================================
// Delete tests
// ============================================================================

#[tokio::test]
async fn test_delete_treats_missing_as_deleted() {
    let (server, client) = common::setup_object_mock(5 * 1024 * 1024).await;
    Mock::given(method("DELETE"))
        .and(path(common::object_path("gone.txt")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(common::object_path("here.txt")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let creds = common::credentials();
    download::delete_object(&client, &creds, "gone.txt").await.expect("404 ok");
    download::delete_object(&client, &creds, "here.txt").await.expect("204 ok");
}
