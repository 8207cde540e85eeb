//! Manifest-driven reconciliation engine
//!
//! The [`SyncEngine`] runs one cycle across every due sync configuration.
//! Each configuration gets a [`SyncJob`]; each of its mappings is reconciled
//! in two passes against the bucket's remote manifest.
//!
//! ## Cycle Flow
//!
//! 1. **Manifest**: fetch the bucket listing, drop corrupt keys, upsert the
//!    file record cache
//! 2. **Download pass**: fetch every file that is missing locally or whose
//!    size differs; matching files are journaled as skips
//! 3. **Upload pass**: walk the local root and upload every file the
//!    manifest does not list
//! 4. **Bookkeeping**: finish the job, advance `last_sync_timestamp`, then
//!    flush and prune the activity journal once per cycle
//!
//! ## Failure Isolation
//!
//! A failed transfer is journaled and counted, never raised. A failed
//! mapping (manifest fetch, unusable local root) is skipped and fails the
//! job, while the remaining mappings still run. Only an authorization
//! failure from the authority ends the cycle early, surfacing as
//! [`SyncError::AuthExpired`].

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use bucketsync_audit::{ActivityJournal, JournalContext, JournalError, RecordOutcome};
use bucketsync_core::{
    domain::{
        is_auth_failure, ActivityAction, FileRecord, Manifest, Mapping, ObjectKey, ProgressEvent,
        SyncConfiguration, SyncJob,
    },
    ports::{
        DownloadRequest, IProgressSink, IRemoteAuthority, IStateRepository, ITransferExecutor,
        TransferOutcome, UploadRequest,
    },
};

use crate::{guard::PathGuards, SyncError};

// ============================================================================
// CycleTrigger / CycleReport
// ============================================================================

/// Why a cycle was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Timer tick: only configurations whose interval elapsed run
    Scheduled,
    /// "Sync now": every active configuration runs
    Forced,
}

/// Summary of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// `true` if another cycle held the running flag and nothing ran
    pub busy: bool,
    /// Finished jobs, one per configuration processed
    pub jobs: Vec<SyncJob>,
    pub downloaded: u64,
    pub uploaded: u64,
    pub failed: u64,
    /// Journal records accepted by the ledger after the cycle
    pub flushed: u64,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

impl CycleReport {
    fn busy() -> Self {
        Self {
            busy: true,
            ..Self::default()
        }
    }

    pub fn files_handled(&self) -> u64 {
        self.downloaded + self.uploaded
    }
}

/// Per-job transfer counts
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    downloaded: u64,
    uploaded: u64,
    skipped: u64,
    failed: u64,
}

impl Tally {
    fn handled(&self) -> u64 {
        self.downloaded + self.uploaded
    }
}

// ============================================================================
// Running flag
// ============================================================================

/// Holds the engine's running flag; clears it on drop
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Reconciles local mapping roots against their buckets
pub struct SyncEngine {
    state: Arc<dyn IStateRepository>,
    authority: Arc<dyn IRemoteAuthority>,
    transfers: Arc<dyn ITransferExecutor>,
    journal: Arc<ActivityJournal>,
    guards: PathGuards,
    progress: Arc<dyn IProgressSink>,
    running: AtomicBool,
}

impl SyncEngine {
    /// Creates a new engine from its collaborators
    ///
    /// # Arguments
    /// * `state` - Repository for configurations, jobs and file records
    /// * `authority` - Source of remote manifests
    /// * `transfers` - Executor for single-object transfers
    /// * `journal` - Activity journal; its ledger is flushed after each cycle
    /// * `guards` - Guard sets shared with the change watcher
    /// * `progress` - Sink for progress events
    pub fn new(
        state: Arc<dyn IStateRepository>,
        authority: Arc<dyn IRemoteAuthority>,
        transfers: Arc<dyn ITransferExecutor>,
        journal: Arc<ActivityJournal>,
        guards: PathGuards,
        progress: Arc<dyn IProgressSink>,
    ) -> Self {
        Self {
            state,
            authority,
            transfers,
            journal,
            guards,
            progress,
            running: AtomicBool::new(false),
        }
    }

    /// Returns whether a cycle is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn guards(&self) -> &PathGuards {
        &self.guards
    }

    pub fn journal(&self) -> &Arc<ActivityJournal> {
        &self.journal
    }

    pub fn transfers(&self) -> &Arc<dyn ITransferExecutor> {
        &self.transfers
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Runs one cycle over the due configurations
    ///
    /// A request while another cycle runs returns immediately with
    /// [`CycleReport::busy`] set; requests are not queued.
    ///
    /// # Errors
    /// - `SyncError::AuthExpired` if the authority rejected the session
    ///   while fetching a manifest or flushing the journal
    /// - `SyncError::State` if the configurations cannot be listed
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleReport, SyncError> {
        let Some(_running) = RunningGuard::try_acquire(&self.running) else {
            debug!("Sync cycle already running, request ignored");
            return Ok(CycleReport::busy());
        };

        let started = Instant::now();
        let now = Utc::now();
        let mut report = CycleReport::default();

        let due: Vec<SyncConfiguration> = self
            .state
            .list_configurations()
            .await
            .map_err(SyncError::state)?
            .into_iter()
            .filter(|config| match trigger {
                CycleTrigger::Scheduled => config.is_due(now),
                CycleTrigger::Forced => config.is_active(),
            })
            .collect();

        if !due.is_empty() {
            info!(configurations = due.len(), "Starting sync cycle");
            self.progress.emit(ProgressEvent::info(format!(
                "Syncing {} configuration(s)",
                due.len()
            )));
        }

        let mut auth_error = None;
        for config in &due {
            match self.run_configuration(config, &mut report).await {
                Ok(()) => {}
                Err(e @ SyncError::AuthExpired(_)) => {
                    auth_error = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(config = config.name(), error = %e, "Configuration sync failed");
                }
            }
        }

        if auth_error.is_none() {
            match self.journal.flush().await {
                Ok(flush) => report.flushed = flush.records,
                Err(JournalError::NoLedger) => debug!("No ledger attached, journal not flushed"),
                Err(e) if e.is_unauthorized() => {
                    auth_error = Some(SyncError::AuthExpired(e.to_string()));
                }
                Err(e) => warn!(error = %e, "Journal flush failed, retrying next cycle"),
            }
        }
        if let Err(e) = self.journal.prune().await {
            warn!(error = %e, "Journal pruning failed");
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(e) = auth_error {
            self.progress.emit(ProgressEvent::error(e.to_string()));
            return Err(e);
        }

        if !due.is_empty() {
            info!(
                downloaded = report.downloaded,
                uploaded = report.uploaded,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "Sync cycle finished"
            );
            self.progress
                .emit(ProgressEvent::complete(report.downloaded, report.uploaded));
        }
        Ok(report)
    }

    /// Runs one job for `config` and appends it to `report`
    async fn run_configuration(
        &self,
        config: &SyncConfiguration,
        report: &mut CycleReport,
    ) -> Result<(), SyncError> {
        let mut job = SyncJob::start(*config.id());
        if let Err(e) = self.state.save_job(&job).await {
            self.advance_last_sync(config).await;
            return Err(SyncError::state(e));
        }

        let context = JournalContext::for_job(*job.id(), *config.id());
        let mut tally = Tally::default();
        let mut failures = Vec::new();
        let mut auth_error = None;

        match self.state.list_mappings(config.id()).await {
            Ok(mappings) => {
                for mapping in &mappings {
                    let Err(e) = self.sync_mapping(mapping, &context, &mut tally).await else {
                        continue;
                    };
                    let message = format!("{}: {e:#}", mapping.bucket_id());
                    warn!(
                        config = config.name(),
                        bucket_id = mapping.bucket_id(),
                        error = %message,
                        "Mapping skipped this cycle"
                    );
                    failures.push(message.clone());
                    if is_auth_failure(&e) {
                        auth_error = Some(message);
                        break;
                    }
                }
            }
            Err(e) => failures.push(format!("Failed to list mappings: {e:#}")),
        }

        let finished = if failures.is_empty() {
            job.complete(tally.handled())
        } else {
            job.fail(failures.join("; "), tally.handled())
        };
        if let Err(e) = finished {
            warn!(job_id = %job.id(), error = %e, "Job already finished");
        }
        if let Err(e) = self.state.save_job(&job).await {
            warn!(job_id = %job.id(), error = %e, "Failed to persist finished job");
        }
        self.advance_last_sync(config).await;

        info!(
            config = config.name(),
            job_id = %job.id(),
            status = %job.status(),
            files_handled = job.files_handled(),
            skipped = tally.skipped,
            failed = tally.failed,
            "Sync job finished"
        );

        report.downloaded += tally.downloaded;
        report.uploaded += tally.uploaded;
        report.failed += tally.failed;
        report.jobs.push(job);

        match auth_error {
            Some(message) => Err(SyncError::AuthExpired(message)),
            None => Ok(()),
        }
    }

    async fn advance_last_sync(&self, config: &SyncConfiguration) {
        if let Err(e) = self.state.update_last_sync(config.id(), Utc::now()).await {
            warn!(config = config.name(), error = %e, "Failed to advance last sync timestamp");
        }
    }

    // ========================================================================
    // Mapping reconciliation
    // ========================================================================

    /// Reconciles one mapping; downloads finish before uploads start
    async fn sync_mapping(
        &self,
        mapping: &Mapping,
        context: &JournalContext,
        tally: &mut Tally,
    ) -> Result<()> {
        let root = mapping.local_path();
        let bucket_id = mapping.bucket_id();
        let context = context.clone().with_bucket(bucket_id);

        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Local root {} is unusable", root.display()))?;

        let entries = self
            .authority
            .fetch_manifest(bucket_id)
            .await
            .with_context(|| format!("Failed to fetch manifest for bucket {bucket_id}"))?;
        let manifest = Manifest::from_entries(entries);
        for (key, reason) in manifest.rejected() {
            warn!(bucket_id, key = %key, reason = %reason, "Dropping corrupt manifest entry");
        }
        debug!(bucket_id, objects = manifest.len(), "Manifest loaded");

        self.cache_manifest(bucket_id, &manifest).await;
        self.reconcile_downloads(mapping, &manifest, &context, tally)
            .await;
        self.reconcile_uploads(mapping, &manifest, &context, tally)
            .await
    }

    async fn cache_manifest(&self, bucket_id: &str, manifest: &Manifest) {
        for object in manifest.objects() {
            let record = FileRecord::from_manifest(bucket_id, object);
            if let Err(e) = self.state.upsert_file_record(&record).await {
                warn!(bucket_id, key = %object.key, error = %e, "Failed to cache file record");
            }
        }
    }

    async fn reconcile_downloads(
        &self,
        mapping: &Mapping,
        manifest: &Manifest,
        context: &JournalContext,
        tally: &mut Tally,
    ) {
        let root = mapping.local_path();

        for folder in manifest.folders() {
            let dir = folder.key.to_local_path(root);
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!(path = %dir.display(), error = %e, "Failed to create folder");
            }
        }

        for object in manifest.files() {
            let target = object.key.to_local_path(root);
            if !needs_download(&target, object.size).await {
                trace!(key = %object.key, "Local copy up to date");
                self.journal
                    .record_skip(ActivityAction::Download, object.key.as_str(), context)
                    .await;
                tally.skipped += 1;
                continue;
            }

            let request = DownloadRequest {
                bucket_id: mapping.bucket_id().to_string(),
                key: object.key.clone(),
                local_path: target,
                expected_size: Some(object.size),
            };
            let outcome = self.transfers.download(&request).await;
            let journaled = self
                .journal
                .record_outcome(ActivityAction::Download, object.key.as_str(), &outcome, context)
                .await;
            if !outcome.is_success() {
                tally.failed += 1;
            } else if counts_as_handled(journaled) {
                tally.downloaded += 1;
            }
        }
    }

    async fn reconcile_uploads(
        &self,
        mapping: &Mapping,
        manifest: &Manifest,
        context: &JournalContext,
        tally: &mut Tally,
    ) -> Result<()> {
        let root = mapping.local_path().to_path_buf();
        let files = tokio::task::spawn_blocking(move || scan_local_files(&root))
            .await
            .context("Local scan task failed")?;

        for path in files {
            let Ok(relative) = path.strip_prefix(mapping.local_path()) else {
                continue;
            };
            let key = match ObjectKey::from_relative_path(relative) {
                Ok(key) => key,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Local file has no valid object key");
                    continue;
                }
            };
            if manifest.contains_key(key.as_str()) {
                continue;
            }
            if self.guards.is_write_guarded(&path) {
                debug!(path = %path.display(), "File is being written, upload deferred");
                continue;
            }
            let Some(_claim) = self.guards.try_acquire_in_flight(&path) else {
                debug!(path = %path.display(), "Upload already in flight");
                continue;
            };

            let mime_type = mime_guess::from_path(&path)
                .first()
                .map(|mime| mime.essence_str().to_string());
            let request = UploadRequest {
                bucket_id: mapping.bucket_id().to_string(),
                key: key.clone(),
                local_path: path.clone(),
                mime_type: mime_type.clone(),
            };
            let outcome = self.transfers.upload(&request).await;
            let journaled = self
                .journal
                .record_outcome(ActivityAction::Upload, key.as_str(), &outcome, context)
                .await;

            match outcome {
                TransferOutcome::Success { bytes } => {
                    if counts_as_handled(journaled) {
                        tally.uploaded += 1;
                    }
                    let record = FileRecord::uploaded(mapping.bucket_id(), key, bytes, mime_type);
                    if let Err(e) = self.state.upsert_file_record(&record).await {
                        warn!(path = %path.display(), error = %e, "Failed to cache uploaded file");
                    }
                }
                TransferOutcome::Failed { .. } => tally.failed += 1,
            }
        }
        Ok(())
    }
}

/// A success counts toward `files_handled` only if it left a journal record
fn counts_as_handled(journaled: Option<RecordOutcome>) -> bool {
    if matches!(journaled, Some(RecordOutcome::Recorded(_))) {
        return true;
    }
    warn!(outcome = ?journaled, "Transfer succeeded without a journal record");
    false
}

/// Size is the only change signal; timestamps are not comparable across systems
async fn needs_download(target: &Path, expected_size: u64) -> bool {
    match tokio::fs::metadata(target).await {
        Ok(meta) => !meta.is_file() || meta.len() != expected_size,
        Err(_) => true,
    }
}

/// Lists regular files below `root` in a stable order
fn scan_local_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during local scan");
                None
            }
        })
        .collect()
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use bucketsync_audit::JournalSettings;
    use bucketsync_cache::{DatabasePool, SqliteStateRepository};
    use bucketsync_core::domain::{
        ActivityStatus, BucketAccount, JobStatus, LedgerBatch, ManifestEntry, RemoteError,
    };
    use bucketsync_core::ports::{ActivityQuery, NullProgressSink};
    use tempfile::TempDir;

    // -- Fakes --

    #[derive(Default)]
    struct FakeAuthority {
        manifests: StdMutex<HashMap<String, Vec<ManifestEntry>>>,
        manifest_errors: StdMutex<HashMap<String, RemoteError>>,
        ledger: StdMutex<Vec<LedgerBatch>>,
        ledger_down: AtomicBool,
    }

    impl FakeAuthority {
        fn set_manifest(&self, bucket_id: &str, entries: Vec<ManifestEntry>) {
            self.manifests
                .lock()
                .unwrap()
                .insert(bucket_id.to_string(), entries);
        }

        fn fail_manifest(&self, bucket_id: &str, error: RemoteError) {
            self.manifest_errors
                .lock()
                .unwrap()
                .insert(bucket_id.to_string(), error);
        }

        fn ledger_records(&self) -> usize {
            self.ledger.lock().unwrap().iter().map(LedgerBatch::len).sum()
        }
    }

    #[async_trait::async_trait]
    impl IRemoteAuthority for FakeAuthority {
        async fn fetch_manifest(&self, bucket_id: &str) -> anyhow::Result<Vec<ManifestEntry>> {
            if let Some(error) = self.manifest_errors.lock().unwrap().get(bucket_id).cloned() {
                return Err(anyhow::Error::new(error).context("GET manifest returned error status"));
            }
            Ok(self
                .manifests
                .lock()
                .unwrap()
                .get(bucket_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn bucket_account(&self, _bucket_id: &str) -> anyhow::Result<Option<BucketAccount>> {
            Ok(None)
        }

        async fn post_ledger(&self, batch: &LedgerBatch) -> anyhow::Result<()> {
            if self.ledger_down.load(Ordering::SeqCst) {
                anyhow::bail!(RemoteError::Status {
                    status: 503,
                    message: "ledger unavailable".to_string(),
                });
            }
            self.ledger.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    /// Writes `expected_size` bytes for downloads; fails keys listed in `failing`
    #[derive(Default)]
    struct FakeTransfers {
        failing: StdMutex<HashSet<String>>,
        downloads: AtomicUsize,
        uploads: StdMutex<Vec<String>>,
    }

    impl FakeTransfers {
        fn fail_key(&self, key: &str) {
            self.failing.lock().unwrap().insert(key.to_string());
        }

        fn is_failing(&self, key: &ObjectKey) -> bool {
            self.failing.lock().unwrap().contains(key.as_str())
        }

        fn download_count(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        fn uploaded(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ITransferExecutor for FakeTransfers {
        async fn upload(&self, request: &UploadRequest) -> TransferOutcome {
            if self.is_failing(&request.key) {
                return TransferOutcome::failed("simulated network error");
            }
            self.uploads
                .lock()
                .unwrap()
                .push(request.key.as_str().to_string());
            let bytes = tokio::fs::metadata(&request.local_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            TransferOutcome::Success { bytes }
        }

        async fn download(&self, request: &DownloadRequest) -> TransferOutcome {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.is_failing(&request.key) {
                return TransferOutcome::failed("simulated network error");
            }
            let size = request.expected_size.unwrap_or(0) as usize;
            if let Some(parent) = request.local_path.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(&request.local_path, vec![b'x'; size])
                .await
                .unwrap();
            TransferOutcome::Success { bytes: size as u64 }
        }

        async fn delete(&self, _bucket_id: &str, _key: &ObjectKey) -> TransferOutcome {
            TransferOutcome::Success { bytes: 0 }
        }
    }

    // -- Harness --

    struct Harness {
        _tmp: TempDir,
        root: PathBuf,
        repo: Arc<SqliteStateRepository>,
        authority: Arc<FakeAuthority>,
        transfers: Arc<FakeTransfers>,
        journal: Arc<ActivityJournal>,
        engine: SyncEngine,
        config: SyncConfiguration,
    }

    impl Harness {
        fn local(&self, bucket_id: &str) -> PathBuf {
            self.root.join(bucket_id)
        }

        async fn activity_for(&self, job: &SyncJob) -> Vec<bucketsync_core::domain::ActivityRecord> {
            self.repo
                .list_activity(&ActivityQuery::new().with_job(*job.id()))
                .await
                .unwrap()
        }
    }

    async fn harness(buckets: &[&str]) -> Harness {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sync");
        let pool = DatabasePool::in_memory().await.unwrap();
        let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));

        let config = repo
            .save_configuration(&SyncConfiguration::new("main", 15).unwrap())
            .await
            .unwrap();
        for bucket_id in buckets {
            let mapping = Mapping::new(root.join(bucket_id), *bucket_id, *config.id()).unwrap();
            repo.save_mapping(&mapping).await.unwrap();
        }

        let authority = Arc::new(FakeAuthority::default());
        let transfers = Arc::new(FakeTransfers::default());
        let journal = Arc::new(
            ActivityJournal::new(repo.clone(), JournalSettings::default())
                .with_ledger(authority.clone()),
        );
        let engine = SyncEngine::new(
            repo.clone(),
            authority.clone(),
            transfers.clone(),
            journal.clone(),
            PathGuards::new(Duration::ZERO),
            Arc::new(NullProgressSink),
        );

        Harness {
            _tmp: tmp,
            root,
            repo,
            authority,
            transfers,
            journal,
            engine,
            config,
        }
    }

    // -- Tests --

    #[tokio::test]
    async fn test_end_to_end_cycle_downloads_manifest() {
        let h = harness(&["bucket1"]).await;
        h.authority.set_manifest(
            "bucket1",
            vec![
                ManifestEntry::file("a.txt", 10),
                ManifestEntry::file("docs/b.txt", 20),
            ],
        );

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        let local = h.local("bucket1");
        assert_eq!(std::fs::metadata(local.join("a.txt")).unwrap().len(), 10);
        assert_eq!(
            std::fs::metadata(local.join("docs").join("b.txt")).unwrap().len(),
            20
        );

        assert_eq!(report.jobs.len(), 1);
        let job = &report.jobs[0];
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.files_handled(), 2);

        let stored = h.repo.get_job(job.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Completed);
        assert_eq!(stored.files_handled(), 2);

        let records = h.activity_for(job).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.action() == ActivityAction::Download
            && r.status() == ActivityStatus::Success));
        assert!(h.transfers.uploaded().is_empty());
        assert_eq!(h.authority.ledger_records(), 2);
    }

    #[tokio::test]
    async fn test_second_cycle_is_idempotent() {
        let h = harness(&["bucket1"]).await;
        h.authority.set_manifest(
            "bucket1",
            vec![
                ManifestEntry::file("a.txt", 10),
                ManifestEntry::file("docs/b.txt", 20),
            ],
        );

        h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
        assert_eq!(h.transfers.download_count(), 2);

        let second = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
        assert_eq!(h.transfers.download_count(), 2);
        assert!(h.transfers.uploaded().is_empty());
        assert_eq!(second.files_handled(), 0);

        let job = &second.jobs[0];
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.files_handled(), 0);

        let records = h.activity_for(job).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status() == ActivityStatus::Skipped));
        // Skips never reach the ledger.
        assert_eq!(h.authority.ledger_records(), 2);
    }

    fn success_count(records: &[bucketsync_core::domain::ActivityRecord]) -> u64 {
        records
            .iter()
            .filter(|r| r.status() == ActivityStatus::Success)
            .count() as u64
    }

    #[tokio::test]
    async fn test_same_key_in_two_buckets_is_journaled_twice() {
        let h = harness(&["b1", "b2"]).await;
        h.authority
            .set_manifest("b1", vec![ManifestEntry::file("readme.txt", 4)]);
        h.authority
            .set_manifest("b2", vec![ManifestEntry::file("readme.txt", 4)]);

        let report = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();

        let job = &report.jobs[0];
        let records = h.activity_for(job).await;
        assert_eq!(job.files_handled(), 2);
        assert_eq!(success_count(&records), job.files_handled());

        let mut buckets: Vec<&str> = records.iter().filter_map(|r| r.bucket_id()).collect();
        buckets.sort_unstable();
        assert_eq!(buckets, vec!["b1", "b2"]);
        assert_eq!(h.authority.ledger_records(), 2);
    }

    #[tokio::test]
    async fn test_redownload_in_next_job_is_journaled() {
        let h = harness(&["bucket1"]).await;
        h.authority
            .set_manifest("bucket1", vec![ManifestEntry::file("a.txt", 10)]);

        h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
        std::fs::remove_file(h.local("bucket1").join("a.txt")).unwrap();

        // Well inside the dedup window of the first download.
        let report = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();

        let job = &report.jobs[0];
        let records = h.activity_for(job).await;
        assert_eq!(h.transfers.download_count(), 2);
        assert_eq!(job.files_handled(), 1);
        assert_eq!(success_count(&records), 1);
    }

    #[tokio::test]
    async fn test_size_mismatch_triggers_redownload() {
        let h = harness(&["bucket1"]).await;
        let local = h.local("bucket1");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("a.txt"), vec![b'o'; 100]).unwrap();
        h.authority
            .set_manifest("bucket1", vec![ManifestEntry::file("a.txt", 200)]);

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        assert_eq!(h.transfers.download_count(), 1);
        assert_eq!(std::fs::metadata(local.join("a.txt")).unwrap().len(), 200);
        assert_eq!(report.jobs[0].files_handled(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let h = harness(&["bucket1"]).await;
        h.authority.set_manifest(
            "bucket1",
            vec![
                ManifestEntry::file("1.txt", 5),
                ManifestEntry::file("2.txt", 5),
                ManifestEntry::file("3.txt", 5),
            ],
        );
        h.transfers.fail_key("2.txt");

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        let job = &report.jobs[0];
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.files_handled(), 2);
        assert_eq!(report.failed, 1);

        let records = h.activity_for(job).await;
        let mut succeeded: Vec<&str> = records
            .iter()
            .filter(|r| r.status() == ActivityStatus::Success)
            .map(|r| r.file_name())
            .collect();
        succeeded.sort_unstable();
        assert_eq!(succeeded, vec!["1.txt", "3.txt"]);

        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.status() == ActivityStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].file_name(), "2.txt");
        assert!(failed[0].error().unwrap().contains("simulated"));

        let local = h.local("bucket1");
        assert!(local.join("1.txt").exists());
        assert!(!local.join("2.txt").exists());
        assert!(local.join("3.txt").exists());
    }

    #[tokio::test]
    async fn test_journal_write_ahead_survives_ledger_outage() {
        let h = harness(&["bucket1"]).await;
        h.authority.set_manifest(
            "bucket1",
            vec![ManifestEntry::file("a.txt", 1), ManifestEntry::file("b.txt", 2)],
        );
        h.authority.ledger_down.store(true, Ordering::SeqCst);

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();
        assert_eq!(report.flushed, 0);
        assert_eq!(report.jobs[0].status(), JobStatus::Completed);

        let pending = h.repo.list_unsynced_activity(100).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| !r.is_synced()));
        assert_eq!(h.authority.ledger_records(), 0);

        h.authority.ledger_down.store(false, Ordering::SeqCst);
        let flush = h.journal.flush().await.unwrap();
        assert_eq!(flush.records, 2);

        let batches = h.authority.ledger.lock().unwrap().clone();
        let mut names: Vec<String> = batches
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.file_name.clone()))
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        assert!(h.repo.list_unsynced_activity(100).await.unwrap().is_empty());
        let all = h.repo.list_activity(&ActivityQuery::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_local_only_files_are_uploaded() {
        let h = harness(&["bucket1"]).await;
        let local = h.local("bucket1");
        std::fs::create_dir_all(local.join("notes")).unwrap();
        std::fs::write(local.join("notes").join("c.txt"), b"hello").unwrap();
        h.authority
            .set_manifest("bucket1", vec![ManifestEntry::file("a.txt", 3)]);

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        assert_eq!(h.transfers.uploaded(), vec!["notes/c.txt".to_string()]);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.jobs[0].files_handled(), 2);

        let record = h
            .repo
            .get_file_record("bucket1", "notes/c.txt")
            .await
            .unwrap()
            .expect("uploaded file cached");
        assert_eq!(record.size(), 5);
        assert!(record.is_synced());
        assert_eq!(record.mime_type(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_corrupt_recursive_keys_are_filtered() {
        let h = harness(&["bucket1"]).await;
        h.authority.set_manifest(
            "bucket1",
            vec![
                ManifestEntry::file("x/x/x/loop.txt", 4),
                ManifestEntry::file("ok.txt", 1),
            ],
        );

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        assert_eq!(h.transfers.download_count(), 1);
        assert!(!h.local("bucket1").join("x").exists());
        assert!(h
            .repo
            .get_file_record("bucket1", "x/x/x/loop.txt")
            .await
            .unwrap()
            .is_none());
        assert_eq!(report.jobs[0].status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_folder_entries_create_directories_without_journal() {
        let h = harness(&["bucket1"]).await;
        h.authority
            .set_manifest("bucket1", vec![ManifestEntry::folder("photos/")]);

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        assert!(h.local("bucket1").join("photos").is_dir());
        assert!(h.activity_for(&report.jobs[0]).await.is_empty());
        assert_eq!(h.transfers.download_count(), 0);
    }

    #[tokio::test]
    async fn test_mapping_failure_fails_job_but_other_mappings_run() {
        let h = harness(&["good", "bad"]).await;
        h.authority
            .set_manifest("good", vec![ManifestEntry::file("a.txt", 3)]);
        h.authority.fail_manifest(
            "bad",
            RemoteError::Status {
                status: 503,
                message: "unavailable".to_string(),
            },
        );

        let report = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();

        let job = &report.jobs[0];
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.files_handled(), 1);
        assert!(job.error().unwrap().contains("bad"));
        assert!(h.local("good").join("a.txt").exists());

        let config = h.repo.get_configuration(h.config.id()).await.unwrap().unwrap();
        assert!(config.last_sync_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_auth_failure_fails_job_and_returns_auth_expired() {
        let h = harness(&["bucket1"]).await;
        h.authority.fail_manifest(
            "bucket1",
            RemoteError::Unauthorized {
                status: 401,
                message: "token expired".to_string(),
            },
        );

        let err = h
            .engine
            .run_cycle(CycleTrigger::Scheduled)
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());

        let jobs = h.repo.list_jobs(h.config.id(), 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status(), JobStatus::Failed);

        let config = h.repo.get_configuration(h.config.id()).await.unwrap().unwrap();
        assert!(config.last_sync_timestamp().is_some());
        assert!(!h.engine.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_a_no_op() {
        let h = harness(&["bucket1"]).await;
        h.authority
            .set_manifest("bucket1", vec![ManifestEntry::file("a.txt", 3)]);

        {
            let _held = RunningGuard::try_acquire(&h.engine.running).unwrap();
            assert!(h.engine.is_running());
            let report = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
            assert!(report.busy);
            assert!(report.jobs.is_empty());
            assert_eq!(h.transfers.download_count(), 0);
        }

        assert!(!h.engine.is_running());
        let report = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
        assert!(!report.busy);
        assert_eq!(report.jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_cycle_respects_interval() {
        let h = harness(&["bucket1"]).await;

        let first = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();
        assert_eq!(first.jobs.len(), 1);

        let second = h.engine.run_cycle(CycleTrigger::Scheduled).await.unwrap();
        assert!(second.jobs.is_empty());

        let forced = h.engine.run_cycle(CycleTrigger::Forced).await.unwrap();
        assert_eq!(forced.jobs.len(), 1);
    }

    #[test]
    fn test_scan_local_files_lists_nested_files_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::write(tmp.path().join("a/b/one.txt"), b"1").unwrap();
        std::fs::write(tmp.path().join("two.txt"), b"2").unwrap();

        let files = scan_local_files(tmp.path());
        assert_eq!(
            files,
            vec![tmp.path().join("a/b/one.txt"), tmp.path().join("two.txt")]
        );
    }
}
