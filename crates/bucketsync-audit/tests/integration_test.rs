//! Integration test: ActivityJournal → SQLite → ledger
//!
//! Uses a real in-memory SQLite database to verify the full flow:
//! transfers are journaled → IStateRepository persists them →
//! flush posts them to the ledger and marks them synced.

use std::sync::{Arc, Mutex};

use bucketsync_audit::{ActivityJournal, JournalContext, JournalSettings};
use bucketsync_cache::{pool::DatabasePool, SqliteStateRepository};
use bucketsync_core::{
    domain::{
        ActivityAction, ActivityStatus, BucketAccount, ConfigId, LedgerBatch,
        ManifestEntry, SyncConfiguration, SyncJob,
    },
    ports::{ActivityQuery, IRemoteAuthority, IStateRepository, TransferOutcome},
};

async fn make_repo() -> Arc<SqliteStateRepository> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteStateRepository::new(pool.pool().clone()))
}

#[derive(Default)]
struct RecordingLedger {
    batches: Mutex<Vec<LedgerBatch>>,
}

#[async_trait::async_trait]
impl IRemoteAuthority for RecordingLedger {
    async fn fetch_manifest(&self, _: &str) -> anyhow::Result<Vec<ManifestEntry>> {
        Ok(vec![])
    }

    async fn bucket_account(&self, _: &str) -> anyhow::Result<Option<BucketAccount>> {
        Ok(None)
    }

    async fn post_ledger(&self, batch: &LedgerBatch) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_journal_integration_with_sqlite() {
    let repo = make_repo().await;
    let ledger = Arc::new(RecordingLedger::default());
    let journal = ActivityJournal::new(
        Arc::clone(&repo) as Arc<dyn IStateRepository>,
        JournalSettings::default(),
    )
    .with_ledger(ledger.clone());

    let config = repo
        .save_configuration(&SyncConfiguration::new("photos", 15).unwrap())
        .await
        .unwrap();
    let job = SyncJob::start(*config.id());
    repo.save_job(&job).await.unwrap();
    let context = JournalContext::for_job(*job.id(), *config.id());

    journal
        .record_outcome(
            ActivityAction::Download,
            "a.txt",
            &TransferOutcome::Success { bytes: 10 },
            &context,
        )
        .await
        .unwrap();
    journal
        .record_outcome(
            ActivityAction::Upload,
            "b.txt",
            &TransferOutcome::failed("HTTP 500"),
            &context,
        )
        .await
        .unwrap();
    journal
        .record_skip(ActivityAction::Download, "c.txt", &context)
        .await
        .unwrap();

    // Journal holds all three, newest first, attributed to the job
    let by_job = repo
        .list_activity(&ActivityQuery::new().with_job(*job.id()))
        .await
        .unwrap();
    assert_eq!(by_job.len(), 3);
    assert_eq!(by_job[0].file_name(), "c.txt");

    let report = journal.flush().await.unwrap();
    assert_eq!(report.records, 2);

    let batches = ledger.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].counts.total, 2);
    assert_eq!(batches[0].counts.success, 1);
    assert_eq!(batches[0].counts.failed, 1);
    assert!(batches[0]
        .records
        .iter()
        .all(|r| r.status != ActivityStatus::Skipped));

    // A second flush has nothing left to send
    assert_eq!(journal.flush().await.unwrap().records, 0);
    assert_eq!(ledger.batches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_activity_log_is_scoped_by_configuration() {
    let repo = make_repo().await;
    let journal = ActivityJournal::new(
        Arc::clone(&repo) as Arc<dyn IStateRepository>,
        JournalSettings::default(),
    );

    let first = ConfigId::new();
    let second = ConfigId::new();
    for (config, name) in [(first, "one.txt"), (second, "two.txt"), (first, "three.txt")] {
        journal
            .record_outcome(
                ActivityAction::Upload,
                name,
                &TransferOutcome::Success { bytes: 1 },
                &JournalContext::for_config(config),
            )
            .await
            .unwrap();
    }

    let log = journal.activity_log(Some(first), None).await.unwrap();
    let names: Vec<&str> = log.iter().map(|r| r.file_name()).collect();
    assert_eq!(names, vec!["three.txt", "one.txt"]);

    let limited = journal.activity_log(None, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert!(limited[0].sync_job_id().is_none());
}
