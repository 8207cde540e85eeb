//! End-to-end cycles through `SyncService`

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use bucketsync_core::domain::{
    ActivityAction, ActivityStatus, JobStatus, ProgressKind, SessionCredentials,
};
use bucketsync_sync::{SyncError, SyncService};

use crate::common;

fn session() -> SessionCredentials {
    SessionCredentials::new("test-session-token")
}

#[tokio::test]
async fn test_sync_once_downloads_manifest_and_flushes_ledger() {
    let server = common::setup_server().await;
    common::mount_manifest(&server, &[("a.txt", 10), ("docs/b.txt", 20)]).await;
    common::mount_object(&server, "a.txt", &[b'a'; 10]).await;
    common::mount_object(&server, "docs/b.txt", &[b'b'; 20]).await;
    Mock::given(method("POST"))
        .and(path("/activity"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let service = SyncService::new(common::config(&server, tmp.path()), common::repository().await);
    let mut progress = service.subscribe();

    let report = service.sync_once(session()).await.expect("cycle");

    assert_eq!(report.jobs.len(), 1);
    let job = &report.jobs[0];
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.files_handled(), 2);
    assert_eq!(report.flushed, 2);

    let local = tmp.path().join(common::BUCKET_ID);
    assert_eq!(std::fs::read(local.join("a.txt")).unwrap(), vec![b'a'; 10]);
    assert_eq!(std::fs::metadata(local.join("docs/b.txt")).unwrap().len(), 20);

    let log = service.get_activity_log(None, None).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log
        .iter()
        .all(|r| r.action() == ActivityAction::Download && r.status() == ActivityStatus::Success));
    assert!(log.iter().all(|r| r.is_synced()));

    let jobs = service.get_sync_jobs(job.config_id(), None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id(), job.id());

    let events: Vec<_> = std::iter::from_fn(|| progress.try_recv().ok()).collect();
    let complete = events
        .iter()
        .find(|e| e.kind == ProgressKind::Complete)
        .expect("complete event");
    assert_eq!(complete.download_count, Some(2));
}

#[tokio::test]
async fn test_second_sync_once_only_skips() {
    let server = common::setup_server().await;
    common::mount_manifest(&server, &[("a.txt", 10)]).await;
    Mock::given(method("GET"))
        .and(path(common::object_path("a.txt")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 10]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/activity"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let service = SyncService::new(common::config(&server, tmp.path()), common::repository().await);

    service.sync_once(session()).await.unwrap();
    let second = service.sync_once(session()).await.unwrap();

    assert_eq!(second.jobs[0].status(), JobStatus::Completed);
    assert_eq!(second.jobs[0].files_handled(), 0);
    let skips = service
        .get_activity_log(None, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status() == ActivityStatus::Skipped)
        .count();
    assert_eq!(skips, 1);
}

#[tokio::test]
async fn test_expired_session_reports_and_stops() {
    let server = common::setup_server().await;
    Mock::given(method("GET"))
        .and(path(format!("/buckets/{}/objects", common::BUCKET_ID)))
        .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let service = SyncService::new(common::config(&server, tmp.path()), common::repository().await);

    let (tx, rx) = tokio::sync::oneshot::channel::<String>();
    let tx = std::sync::Mutex::new(Some(tx));
    service
        .init_sync(
            session(),
            Arc::new(move |reason: &str| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(reason.to_string());
                }
            }),
        )
        .await
        .unwrap();

    let reason = tokio::time::timeout(std::time::Duration::from_secs(10), rx)
        .await
        .expect("auth expiry reported")
        .unwrap();
    assert!(reason.contains("401"), "reason: {reason}");

    // Expiry alone winds the service down; no stop_sync needed.
    let mut stopped = false;
    for _ in 0..200 {
        if !service.is_running().await {
            stopped = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(stopped, "service still running after auth expiry");
    assert!(matches!(
        service.force_sync_now().await,
        Err(SyncError::NotInitialized)
    ));

    service.stop_sync().await;
    assert!(!service.is_running().await);
}
