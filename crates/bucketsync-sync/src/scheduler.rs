//! Sync scheduler - drives reconciliation cycles on a timer and on demand
//!
//! The [`SyncScheduler`] owns the loop that calls
//! [`SyncEngine::run_cycle`](super::engine::SyncEngine::run_cycle). Two
//! sources start a cycle:
//!
//! - the **tick** timer; each configuration still decides for itself
//!   whether it is due, so the tick only needs to be finer than the
//!   shortest configured interval
//! - a **forced** request through [`SchedulerHandle::request_sync`], which
//!   runs every active configuration regardless of its interval
//!
//! ## Flow
//!
//! ```text
//!  interval tick ──┐
//!                  ├──→ SyncScheduler::run ──→ SyncEngine::run_cycle
//!  request_sync ───┘            │
//!                               └── AuthExpired ──→ on_auth_expired, stop
//! ```
//!
//! An expired session stops the scheduler: nothing can succeed until the
//! host supplies fresh credentials and initializes sync again.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Notify, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    engine::{CycleTrigger, SyncEngine},
    SyncError,
};

/// Callback invoked once when the session is rejected
pub type AuthExpiredFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Why [`SyncScheduler::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    Cancelled,
    AuthExpired,
}

/// Cloneable trigger for forced cycles
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    trigger: Arc<Notify>,
}

impl SchedulerHandle {
    /// Requests an immediate cycle over every active configuration
    ///
    /// Requests made while a cycle runs are coalesced into one follow-up
    /// cycle.
    pub fn request_sync(&self) {
        info!("Forced sync requested");
        self.trigger.notify_one();
    }
}

/// Timer and trigger loop around one [`SyncEngine`]
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    tick: Duration,
    trigger: Arc<Notify>,
    on_auth_expired: Option<AuthExpiredFn>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, tick: Duration) -> Self {
        Self {
            engine,
            tick: tick.max(Duration::from_millis(1)),
            trigger: Arc::new(Notify::new()),
            on_auth_expired: None,
        }
    }

    /// Sets the callback invoked when a cycle reports an expired session
    pub fn with_auth_expired(mut self, callback: AuthExpiredFn) -> Self {
        self.on_auth_expired = Some(callback);
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            trigger: Arc::clone(&self.trigger),
        }
    }

    /// Runs cycles until cancelled or the session expires
    ///
    /// The first tick fires immediately, so a freshly started scheduler
    /// reconciles every due configuration right away.
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerExit {
        info!(tick_secs = self.tick.as_secs_f64(), "Sync scheduler starting");

        let mut timer = tokio::time::interval(self.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            let trigger = tokio::select! {
                _ = cancel.cancelled() => break SchedulerExit::Cancelled,
                _ = timer.tick() => CycleTrigger::Scheduled,
                _ = self.trigger.notified() => CycleTrigger::Forced,
            };

            match self.engine.run_cycle(trigger).await {
                Ok(report) if report.busy => debug!("Previous cycle still running"),
                Ok(report) => debug!(
                    jobs = report.jobs.len(),
                    files = report.files_handled(),
                    "Cycle finished"
                ),
                Err(SyncError::AuthExpired(reason)) => {
                    warn!(reason = %reason, "Session expired, stopping scheduler");
                    if let Some(callback) = &self.on_auth_expired {
                        callback(&reason);
                    }
                    break SchedulerExit::AuthExpired;
                }
                Err(e) => warn!(error = %e, "Sync cycle failed"),
            }
        };

        info!(exit = ?exit, "Sync scheduler stopped");
        exit
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use bucketsync_audit::{ActivityJournal, JournalSettings};
    use bucketsync_cache::{DatabasePool, SqliteStateRepository};
    use bucketsync_core::domain::{
        BucketAccount, LedgerBatch, ManifestEntry, Mapping, ObjectKey, RemoteError,
        SyncConfiguration,
    };
    use bucketsync_core::ports::{
        DownloadRequest, IRemoteAuthority, IStateRepository, ITransferExecutor,
        NullProgressSink, TransferOutcome, UploadRequest,
    };
    use tempfile::TempDir;

    use crate::guard::PathGuards;

    #[derive(Default)]
    struct CountingAuthority {
        fetches: AtomicUsize,
        expired: AtomicBool,
    }

    #[async_trait::async_trait]
    impl IRemoteAuthority for CountingAuthority {
        async fn fetch_manifest(&self, _bucket_id: &str) -> anyhow::Result<Vec<ManifestEntry>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.expired.load(Ordering::SeqCst) {
                anyhow::bail!(RemoteError::Unauthorized {
                    status: 401,
                    message: "token expired".to_string(),
                });
            }
            Ok(Vec::new())
        }

        async fn bucket_account(&self, _bucket_id: &str) -> anyhow::Result<Option<BucketAccount>> {
            Ok(None)
        }

        async fn post_ledger(&self, _batch: &LedgerBatch) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NoTransfers;

    #[async_trait::async_trait]
    impl ITransferExecutor for NoTransfers {
        async fn upload(&self, _request: &UploadRequest) -> TransferOutcome {
            TransferOutcome::failed("unexpected upload")
        }

        async fn download(&self, _request: &DownloadRequest) -> TransferOutcome {
            TransferOutcome::failed("unexpected download")
        }

        async fn delete(&self, _bucket_id: &str, _key: &ObjectKey) -> TransferOutcome {
            TransferOutcome::failed("unexpected delete")
        }
    }

    async fn engine_with_mapping(tmp: &TempDir) -> (Arc<SyncEngine>, Arc<CountingAuthority>) {
        let pool = DatabasePool::in_memory().await.unwrap();
        let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
        let config = repo
            .save_configuration(&SyncConfiguration::new("main", 15).unwrap())
            .await
            .unwrap();
        repo.save_mapping(&Mapping::new(tmp.path().join("b1"), "b1", *config.id()).unwrap())
            .await
            .unwrap();

        let authority = Arc::new(CountingAuthority::default());
        let journal = Arc::new(ActivityJournal::new(repo.clone(), JournalSettings::default()));
        let engine = Arc::new(SyncEngine::new(
            repo,
            authority.clone(),
            Arc::new(NoTransfers),
            journal,
            PathGuards::new(Duration::ZERO),
            Arc::new(NullProgressSink),
        ));
        (engine, authority)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_first_tick_runs_immediately_and_cancel_stops() {
        let tmp = TempDir::new().unwrap();
        let (engine, authority) = engine_with_mapping(&tmp).await;
        let scheduler = SyncScheduler::new(engine, Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let stop = async {
            wait_for(|| authority.fetches.load(Ordering::SeqCst) == 1).await;
            cancel.cancel();
        };
        let (exit, ()) = tokio::join!(scheduler.run(cancel.clone()), stop);
        assert_eq!(exit, SchedulerExit::Cancelled);
    }

    #[tokio::test]
    async fn test_forced_request_bypasses_interval() {
        let tmp = TempDir::new().unwrap();
        let (engine, authority) = engine_with_mapping(&tmp).await;
        let scheduler = SyncScheduler::new(engine, Duration::from_millis(20));
        let handle = scheduler.handle();
        let cancel = CancellationToken::new();

        let drive = async {
            wait_for(|| authority.fetches.load(Ordering::SeqCst) == 1).await;
            // Ticks keep firing but the 15 minute interval is not due.
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(authority.fetches.load(Ordering::SeqCst), 1);

            handle.request_sync();
            wait_for(|| authority.fetches.load(Ordering::SeqCst) == 2).await;
            cancel.cancel();
        };
        let (exit, ()) = tokio::join!(scheduler.run(cancel.clone()), drive);
        assert_eq!(exit, SchedulerExit::Cancelled);
    }

    #[tokio::test]
    async fn test_auth_expiry_stops_and_notifies() {
        let tmp = TempDir::new().unwrap();
        let (engine, authority) = engine_with_mapping(&tmp).await;
        authority.expired.store(true, Ordering::SeqCst);

        let reasons = Arc::new(StdMutex::new(Vec::<String>::new()));
        let sink = reasons.clone();
        let scheduler = SyncScheduler::new(engine, Duration::from_millis(20)).with_auth_expired(
            Arc::new(move |reason: &str| sink.lock().unwrap().push(reason.to_string())),
        );

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            scheduler.run(CancellationToken::new()),
        )
        .await
        .expect("scheduler stops on its own");

        assert_eq!(exit, SchedulerExit::AuthExpired);
        assert_eq!(reasons.lock().unwrap().len(), 1);
        assert_eq!(authority.fetches.load(Ordering::SeqCst), 1);
    }
}
