//! Change watcher: filesystem notifications to live uploads and deletes
//!
//! Three pieces, in pipeline order:
//!
//! - [`FileWatcher`] wraps the `notify` crate, turning raw OS events under
//!   the sync root into [`ChangeEvent`] values on an mpsc channel.
//! - [`DebouncedChangeQueue`] holds each path until it has been quiet for
//!   the stability period, so half-written files are never uploaded.
//! - [`WatchDispatcher`] consumes settled events. It resolves the owning
//!   mapping, consults the guard sets, and uploads or deletes the object.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher ──→ mpsc::channel ──→ WatchDispatcher::run
//!                                        │
//!                                 DebouncedChangeQueue ──→ handle()
//! ```
//!
//! ## Guard Interplay
//!
//! A path in the write-guard set was written by the synchronizer and is
//! ignored. A path already in flight is being uploaded or deleted by the
//! engine or by an earlier notification; the duplicate is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use bucketsync_audit::{ActivityJournal, JournalContext};
use bucketsync_core::{
    domain::{ActivityAction, FileRecord, Mapping, ObjectKey},
    ports::{IStateRepository, ITransferExecutor, TransferOutcome, UploadRequest},
};

use crate::guard::PathGuards;

/// Capacity of the notification channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A filesystem change under the sync root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file or directory appeared
    Created(PathBuf),
    /// A file's content or metadata changed
    Modified(PathBuf),
    /// A file or directory disappeared
    Deleted(PathBuf),
    /// A file or directory moved within the watched tree
    Renamed { old: PathBuf, new: PathBuf },
}

impl ChangeEvent {
    /// Returns the primary path; the destination for renames
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Recursive OS-native watcher feeding an mpsc channel
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// watcher.watch(Path::new("/home/user/BucketSync"))?;
/// // hand rx to WatchDispatcher::run
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a watcher and the receiver its events arrive on
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        // notify invokes the handler on its own thread, outside the runtime.
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if let Err(e) = tx.blocking_send(change) {
                            warn!(error = %e, "Dropping change event, dispatcher gone");
                        }
                    }
                }
                Err(err) => error!(error = %err, "File watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher }, rx))
    }

    /// Starts watching `path` recursively
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing, permission
    /// denied, or the inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Starting recursive watch");
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))
    }
}

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// - `Create(*)` → `Created`
/// - `Modify(Name(Both))` with two paths → `Renamed`
/// - `Modify(Name(From))` → `Deleted`, `Modify(Name(To))` → `Created`
/// - any other `Modify(*)` → `Modified`
/// - `Remove(*)` → `Deleted`
///
/// Access and unknown events are ignored.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let first = || event.paths.first().cloned();

    let change = match &event.kind {
        EventKind::Create(_) => ChangeEvent::Created(first()?),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            ChangeEvent::Renamed {
                old: event.paths[0].clone(),
                new: event.paths[1].clone(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeEvent::Deleted(first()?),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeEvent::Created(first()?),
        EventKind::Modify(_) => ChangeEvent::Modified(first()?),
        EventKind::Remove(_) => ChangeEvent::Deleted(first()?),
        _ => {
            trace!(kind = ?event.kind, "Ignoring event kind");
            return None;
        }
    };
    trace!(event = ?change, "Mapped notify event");
    Some(change)
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Holds changes until their path has been quiet for the stability period
///
/// A newer event for a pending path replaces the older one and restarts
/// its quiet period, so a burst of writes yields one settled event.
#[derive(Debug)]
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (ChangeEvent, Instant)>,
    stability: Duration,
}

impl DebouncedChangeQueue {
    pub fn new(stability: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            stability,
        }
    }

    pub fn push(&mut self, event: ChangeEvent) {
        self.push_at(event, Instant::now());
    }

    fn push_at(&mut self, event: ChangeEvent, at: Instant) {
        let path = event.path().to_path_buf();
        self.pending.insert(path, (event, at));
    }

    /// Removes and returns every settled change
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let stability = self.stability;
        let settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, seen))| now.saturating_duration_since(*seen) >= stability)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events: Vec<ChangeEvent> = settled
            .iter()
            .filter_map(|path| self.pending.remove(path).map(|(event, _)| event))
            .collect();
        events.sort_by(|a, b| a.path().cmp(b.path()));
        events
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// WatchDispatcher
// ============================================================================

/// Acts on settled changes: direct upload or delete of one path
pub struct WatchDispatcher {
    state: Arc<dyn IStateRepository>,
    transfers: Arc<dyn ITransferExecutor>,
    journal: Arc<ActivityJournal>,
    guards: PathGuards,
}

impl WatchDispatcher {
    pub fn new(
        state: Arc<dyn IStateRepository>,
        transfers: Arc<dyn ITransferExecutor>,
        journal: Arc<ActivityJournal>,
        guards: PathGuards,
    ) -> Self {
        Self {
            state,
            transfers,
            journal,
            guards,
        }
    }

    /// Debounces `events` and dispatches settled changes until cancelled
    ///
    /// Also returns when the sending side (the [`FileWatcher`]) is dropped.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ChangeEvent>,
        stability: Duration,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        info!(
            stability_ms = stability.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            "Change dispatcher starting"
        );
        let mut queue = DebouncedChangeQueue::new(stability);
        let mut poll = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Some(change) if self.guards.is_write_guarded(change.path()) => {
                        trace!(path = %change.path().display(), "Dropping event for guarded path");
                    }
                    Some(change) => queue.push(change),
                    None => {
                        info!("Change channel closed");
                        break;
                    }
                },

                _ = poll.tick() => {
                    for change in queue.poll() {
                        self.handle(change).await;
                    }
                }
            }
        }

        if !queue.is_empty() {
            debug!(pending = queue.len(), "Discarding unsettled changes");
        }
        info!("Change dispatcher stopped");
    }

    /// Applies one settled change
    pub async fn handle(&self, change: ChangeEvent) {
        debug!(event = ?change, "Dispatching change");
        match change {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => {
                self.upload_changed(&path).await;
            }
            ChangeEvent::Deleted(path) => self.delete_removed(&path).await,
            ChangeEvent::Renamed { old, new } => {
                self.delete_removed(&old).await;
                self.upload_changed(&new).await;
            }
        }
    }

    /// Finds the mapping whose root contains `path`, with the path relative to it
    async fn resolve(&self, path: &Path) -> Option<(Mapping, PathBuf)> {
        let mappings = match self.state.list_active_mappings().await {
            Ok(mappings) => mappings,
            Err(e) => {
                warn!(error = %e, "Failed to list mappings for change");
                return None;
            }
        };
        let mapping = mappings
            .into_iter()
            .filter(|m| m.contains(path))
            .max_by_key(|m| m.local_path().components().count());
        let Some(mapping) = mapping else {
            debug!(path = %path.display(), "Change outside every mapping");
            return None;
        };
        let relative = path.strip_prefix(mapping.local_path()).ok()?.to_path_buf();
        Some((mapping, relative))
    }

    async fn upload_changed(&self, path: &Path) {
        if self.guards.is_write_guarded(path) {
            debug!(path = %path.display(), "Ignoring change written by the synchronizer");
            return;
        }
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return,
            Err(_) => {
                trace!(path = %path.display(), "Changed path vanished before upload");
                return;
            }
        }

        let Some((mapping, relative)) = self.resolve(path).await else {
            return;
        };
        let key = match ObjectKey::from_relative_path(&relative) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Changed file has no valid object key");
                return;
            }
        };
        let Some(_claim) = self.guards.try_acquire_in_flight(path) else {
            debug!(path = %path.display(), "Upload already in flight");
            return;
        };

        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        let request = UploadRequest {
            bucket_id: mapping.bucket_id().to_string(),
            key: key.clone(),
            local_path: path.to_path_buf(),
            mime_type: mime_type.clone(),
        };
        let outcome = self.transfers.upload(&request).await;
        self.journal
            .record_outcome(
                ActivityAction::Upload,
                key.as_str(),
                &outcome,
                &JournalContext::for_config(*mapping.config_id()).with_bucket(mapping.bucket_id()),
            )
            .await;

        if let TransferOutcome::Success { bytes } = outcome {
            info!(bucket_id = mapping.bucket_id(), key = %key, bytes, "Uploaded local change");
            let record = FileRecord::uploaded(mapping.bucket_id(), key, bytes, mime_type);
            if let Err(e) = self.state.upsert_file_record(&record).await {
                warn!(path = %path.display(), error = %e, "Failed to cache uploaded file");
            }
        }
    }

    async fn delete_removed(&self, path: &Path) {
        if self.guards.is_write_guarded(path) {
            debug!(path = %path.display(), "Ignoring removal by the synchronizer");
            return;
        }
        let Some((mapping, relative)) = self.resolve(path).await else {
            return;
        };
        if relative.as_os_str().is_empty() {
            info!(
                bucket_id = mapping.bucket_id(),
                "Mapping root removed, remote bucket left untouched"
            );
            return;
        }
        let key = match ObjectKey::from_relative_path(&relative) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Removed path has no valid object key");
                return;
            }
        };
        let Some(_claim) = self.guards.try_acquire_in_flight(path) else {
            debug!(path = %path.display(), "Removal already in flight");
            return;
        };

        let bucket_id = mapping.bucket_id();
        let context = JournalContext::for_config(*mapping.config_id()).with_bucket(bucket_id);
        let prefix = format!("{}/", key.trimmed());
        let nested = match self.state.list_file_records(bucket_id, Some(&prefix)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(bucket_id, prefix = %prefix, error = %e, "Failed to list cached folder");
                Vec::new()
            }
        };

        if nested.is_empty() {
            if self.is_known_remote(bucket_id, &key).await {
                self.delete_one(bucket_id, &key, &context).await;
            } else {
                debug!(bucket_id, key = %key, "Removed path was never synced, nothing to delete");
            }
            return;
        }

        info!(bucket_id, prefix = %prefix, objects = nested.len(), "Deleting removed folder");
        let mut all_deleted = true;
        for record in &nested {
            all_deleted &= self.delete_one(bucket_id, record.key(), &context).await;
        }
        if all_deleted {
            if let Err(e) = self
                .state
                .delete_file_records_with_prefix(bucket_id, &prefix)
                .await
            {
                warn!(bucket_id, prefix = %prefix, error = %e, "Failed to drop cached folder");
            }
        }
    }

    /// Returns `false` only when the cache is readable and has no record for `key`
    async fn is_known_remote(&self, bucket_id: &str, key: &ObjectKey) -> bool {
        match self.state.get_file_record(bucket_id, key.as_str()).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(bucket_id, key = %key, error = %e, "Failed to look up cached record");
                true
            }
        }
    }

    /// Deletes one object and, on success, its cached record
    async fn delete_one(&self, bucket_id: &str, key: &ObjectKey, context: &JournalContext) -> bool {
        let outcome = self.transfers.delete(bucket_id, key).await;
        self.journal
            .record_outcome(ActivityAction::Delete, key.as_str(), &outcome, context)
            .await;
        if !outcome.is_success() {
            return false;
        }
        if let Err(e) = self.state.delete_file_record(bucket_id, key.as_str()).await {
            warn!(bucket_id, key = %key, error = %e, "Failed to drop cached record");
        }
        true
    }
}

// ============================================================================
// Unit tests
// ============================================================================
