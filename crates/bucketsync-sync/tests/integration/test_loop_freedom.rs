//! A download must never come back as an upload

use std::{sync::Arc, time::Duration};

use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

use bucketsync_audit::{ActivityJournal, JournalSettings};
use bucketsync_core::{
    domain::{Mapping, ObjectKey, SyncConfiguration},
    ports::{
        DownloadRequest, IStateRepository, ITransferExecutor, NullProgressSink,
        PlaintextDecryptor,
    },
};
use bucketsync_storage::{
    credentials::ResolverSettings, AuthorityClient, CredentialResolver, ObjectClient,
    SigV4Presigner, TransferSettings,
};
use bucketsync_sync::{watcher::ChangeEvent, watcher::WatchDispatcher, PathGuards, TransferExecutor};

use crate::common;

#[tokio::test]
async fn test_downloaded_file_is_not_uploaded_by_watcher() {
    let server = common::setup_server().await;
    common::mount_object(&server, "a.txt", b"remote bytes").await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let repo = common::repository().await;
    let configuration = repo
        .save_configuration(&SyncConfiguration::new("main", 15).unwrap())
        .await
        .unwrap();
    let root = tmp.path().join(common::BUCKET_ID);
    repo.save_mapping(&Mapping::new(&root, common::BUCKET_ID, *configuration.id()).unwrap())
        .await
        .unwrap();

    let authority = Arc::new(AuthorityClient::with_base_url("test-session-token", server.uri()));
    let resolver = Arc::new(CredentialResolver::new(
        authority,
        Arc::new(PlaintextDecryptor),
        ResolverSettings::default(),
    ));
    let signer = SigV4Presigner::with_endpoint(&server.uri()).unwrap();
    let objects = ObjectClient::new(Arc::new(signer), TransferSettings::default()).unwrap();
    let guards = PathGuards::new(Duration::from_secs(30));
    let executor = Arc::new(TransferExecutor::new(
        resolver,
        objects,
        guards.clone(),
        Arc::new(NullProgressSink),
    ));

    let target = root.join("a.txt");
    let outcome = executor
        .download(&DownloadRequest {
            bucket_id: common::BUCKET_ID.to_string(),
            key: ObjectKey::new("a.txt").unwrap(),
            local_path: target.clone(),
            expected_size: Some(12),
        })
        .await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert!(guards.is_write_guarded(&target));

    let journal = Arc::new(ActivityJournal::new(repo.clone(), JournalSettings::default()));
    let dispatcher = WatchDispatcher::new(repo, executor, journal, guards);
    dispatcher.handle(ChangeEvent::Created(target.clone())).await;
    dispatcher.handle(ChangeEvent::Modified(target)).await;
}
