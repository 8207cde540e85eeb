//! Sync service facade
//!
//! [`SyncService`] is the surface a host (the daemon, the CLI, a UI)
//! talks to. It wires the storage adapters, journal, engine, scheduler
//! and change watcher together from a [`Config`] and a session token.
//!
//! | Operation | Method |
//! |-----------|--------|
//! | initSync | [`SyncService::init_sync`] |
//! | stopSync | [`SyncService::stop_sync`] |
//! | forceSyncNow | [`SyncService::force_sync_now`] |
//! | getSyncJobs | [`SyncService::get_sync_jobs`] |
//! | getActivityLog | [`SyncService::get_activity_log`] |
//! | progress stream | [`SyncService::subscribe`] |

use std::sync::Arc;

use tokio::{sync::broadcast, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bucketsync_audit::{ActivityJournal, FlushReport, JournalSettings};
use bucketsync_core::{
    config::Config,
    domain::{
        ActivityRecord, ConfigId, Mapping, ProgressEvent, SessionCredentials, SyncConfiguration,
        SyncJob,
    },
    ports::{IProgressSink, IRemoteAuthority, ISecretDecryptor, IStateRepository},
};
use bucketsync_storage::{
    credentials::ResolverSettings, AesGcmDecryptor, AuthorityClient, CredentialResolver,
    ObjectClient, SigV4Presigner, TransferSettings,
};

use crate::{
    engine::{CycleReport, CycleTrigger, SyncEngine},
    guard::PathGuards,
    progress::ProgressReporter,
    scheduler::{AuthExpiredFn, SchedulerExit, SchedulerHandle, SyncScheduler},
    transfer::TransferExecutor,
    watcher::{FileWatcher, WatchDispatcher},
    SyncError,
};

/// Jobs returned by [`SyncService::get_sync_jobs`] when no limit is given
const DEFAULT_JOB_LIMIT: u32 = 50;

/// Background machinery started by `init_sync`
struct Running {
    scheduler: SchedulerHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    // Dropping the watcher stops OS notifications.
    _watcher: Option<FileWatcher>,
}

/// Host-facing sync facade
pub struct SyncService {
    config: Config,
    state: Arc<dyn IStateRepository>,
    decryptor: Arc<dyn ISecretDecryptor>,
    progress: ProgressReporter,
    guards: PathGuards,
    queries: ActivityJournal,
    running: Mutex<Option<Running>>,
}

impl SyncService {
    pub fn new(config: Config, state: Arc<dyn IStateRepository>) -> Self {
        let decryptor = Arc::new(AesGcmDecryptor::from_env(
            &config.credentials.encryption_key_env,
        ));
        let guards = PathGuards::new(config.watcher.guard_release());
        let queries = ActivityJournal::new(Arc::clone(&state), JournalSettings::from(&config.journal));
        Self {
            config,
            state,
            decryptor,
            progress: ProgressReporter::default(),
            guards,
            queries,
            running: Mutex::new(None),
        }
    }

    /// Replaces the secret decryptor used for bucket account keys
    pub fn with_decryptor(mut self, decryptor: Arc<dyn ISecretDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts scheduled synchronization for `session`
    ///
    /// Configurations and mappings from the config file are upserted into
    /// the state store first. A previous run is stopped and replaced.
    ///
    /// `on_auth_expired` fires once if the authority rejects the session.
    /// The scheduler has stopped by then and the watcher stops right after;
    /// nothing runs again until the next `init_sync`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store is unusable, the storage client
    /// cannot be built, or a mapping root cannot be watched.
    pub async fn init_sync(
        &self,
        session: SessionCredentials,
        on_auth_expired: AuthExpiredFn,
    ) -> Result<(), SyncError> {
        self.stop_sync().await;
        self.seed_configurations().await?;

        let engine = self.build_engine(&session)?;
        let cancel = CancellationToken::new();
        let scheduler = SyncScheduler::new(Arc::clone(&engine), self.config.sync.tick_interval())
            .with_auth_expired(on_auth_expired);
        let handle = scheduler.handle();

        let mut tasks = Vec::new();
        let watcher = if self.config.watcher.enabled {
            let (watcher, task) = self.start_watcher(&engine, cancel.clone()).await?;
            tasks.push(task);
            Some(watcher)
        } else {
            debug!("Change watcher disabled");
            None
        };

        let scheduler_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if scheduler.run(scheduler_cancel.clone()).await == SchedulerExit::AuthExpired {
                // The watcher would keep uploading with the rejected session.
                scheduler_cancel.cancel();
            }
        }));

        *self.running.lock().await = Some(Running {
            scheduler: handle,
            cancel,
            tasks,
            _watcher: watcher,
        });
        info!("Sync initialized");
        Ok(())
    }

    /// Stops the scheduler and the watcher; a no-op when not running
    ///
    /// A cycle in progress finishes its current step before the tasks end.
    pub async fn stop_sync(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync task ended abnormally");
            }
        }
        info!("Sync stopped");
    }

    /// Requests an immediate cycle over every active configuration
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotInitialized` before `init_sync` and after the
    /// session expired.
    pub async fn force_sync_now(&self) -> Result<(), SyncError> {
        let running = self.running.lock().await;
        let running = running
            .as_ref()
            .filter(|r| !r.cancel.is_cancelled())
            .ok_or(SyncError::NotInitialized)?;
        running.scheduler.request_sync();
        Ok(())
    }

    /// Returns `true` between `init_sync` and `stop_sync` or session expiry
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled())
    }

    /// Runs one forced cycle in the foreground, without scheduler or watcher
    pub async fn sync_once(&self, session: SessionCredentials) -> Result<CycleReport, SyncError> {
        self.seed_configurations().await?;
        let engine = self.build_engine(&session)?;
        engine.run_cycle(CycleTrigger::Forced).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the most recent jobs of a configuration, newest first
    pub async fn get_sync_jobs(
        &self,
        config_id: &ConfigId,
        limit: Option<u32>,
    ) -> Result<Vec<SyncJob>, SyncError> {
        self.state
            .list_jobs(config_id, limit.unwrap_or(DEFAULT_JOB_LIMIT))
            .await
            .map_err(SyncError::state)
    }

    /// Returns journal entries, newest first
    pub async fn get_activity_log(
        &self,
        config_id: Option<ConfigId>,
        limit: Option<u32>,
    ) -> Result<Vec<ActivityRecord>, SyncError> {
        self.queries
            .activity_log(config_id, limit)
            .await
            .map_err(|e| SyncError::State(e.to_string()))
    }

    pub async fn list_configurations(&self) -> Result<Vec<SyncConfiguration>, SyncError> {
        self.state
            .list_configurations()
            .await
            .map_err(SyncError::state)
    }

    /// Subscribes to progress events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    // ========================================================================
    // Journal maintenance
    // ========================================================================

    /// Posts unsynced journal entries to the ledger
    pub async fn flush_journal(&self, session: SessionCredentials) -> Result<FlushReport, SyncError> {
        let authority: Arc<dyn IRemoteAuthority> = Arc::new(self.authority(&session));
        let journal = ActivityJournal::new(Arc::clone(&self.state), self.journal_settings())
            .with_ledger(authority);
        journal.flush().await.map_err(|e| {
            if e.is_unauthorized() {
                SyncError::AuthExpired(e.to_string())
            } else {
                SyncError::State(e.to_string())
            }
        })
    }

    /// Deletes synced journal entries older than the retention period
    pub async fn prune_journal(&self) -> Result<u64, SyncError> {
        self.queries
            .prune()
            .await
            .map_err(|e| SyncError::State(e.to_string()))
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    /// Upserts configurations and mappings declared in the config file
    async fn seed_configurations(&self) -> Result<(), SyncError> {
        let root = &self.config.sync.root;
        for entry in &self.config.sync.configurations {
            let mut configuration = SyncConfiguration::new(&entry.name, entry.interval_minutes)?;
            configuration.set_active(entry.active);
            let stored = self
                .state
                .save_configuration(&configuration)
                .await
                .map_err(SyncError::state)?;

            for mapping in &entry.mappings {
                let mapping = Mapping::new(mapping.resolve(root), &mapping.bucket_id, *stored.id())?;
                self.state
                    .save_mapping(&mapping)
                    .await
                    .map_err(SyncError::state)?;
            }
            debug!(
                name = %stored.name(),
                mappings = entry.mappings.len(),
                "Configuration seeded"
            );
        }
        Ok(())
    }

    fn authority(&self, session: &SessionCredentials) -> AuthorityClient {
        AuthorityClient::with_base_url(session.token.clone(), self.config.authority.base_url.clone())
    }

    fn journal_settings(&self) -> JournalSettings {
        JournalSettings::from(&self.config.journal)
    }

    fn build_engine(&self, session: &SessionCredentials) -> Result<Arc<SyncEngine>, SyncError> {
        let authority: Arc<dyn IRemoteAuthority> = Arc::new(self.authority(session));
        let journal = Arc::new(
            ActivityJournal::new(Arc::clone(&self.state), self.journal_settings())
                .with_ledger(Arc::clone(&authority)),
        );

        let resolver = Arc::new(CredentialResolver::new(
            Arc::clone(&authority),
            Arc::clone(&self.decryptor),
            ResolverSettings::from_config(&self.config.credentials, &self.config.storage),
        ));
        let signer = match &self.config.storage.endpoint {
            Some(endpoint) => SigV4Presigner::with_endpoint(endpoint)
                .map_err(|e| SyncError::State(format!("{e:#}")))?,
            None => SigV4Presigner::new(),
        };
        let objects = ObjectClient::new(
            Arc::new(signer),
            TransferSettings::from(&self.config.transfer),
        )?;

        let progress: Arc<dyn IProgressSink> = Arc::new(self.progress.clone());
        let transfers = Arc::new(TransferExecutor::new(
            resolver,
            objects,
            self.guards.clone(),
            Arc::clone(&progress),
        ));

        Ok(Arc::new(SyncEngine::new(
            Arc::clone(&self.state),
            authority,
            transfers,
            journal,
            self.guards.clone(),
            progress,
        )))
    }

    /// Watches every active mapping root and spawns the dispatcher
    async fn start_watcher(
        &self,
        engine: &SyncEngine,
        cancel: CancellationToken,
    ) -> Result<(FileWatcher, JoinHandle<()>), SyncError> {
        let (mut watcher, events) =
            FileWatcher::new().map_err(|e| SyncError::Watcher(format!("{e:#}")))?;

        let mappings = self
            .state
            .list_active_mappings()
            .await
            .map_err(SyncError::state)?;
        for mapping in &mappings {
            tokio::fs::create_dir_all(mapping.local_path()).await?;
            watcher
                .watch(mapping.local_path())
                .map_err(|e| SyncError::Watcher(format!("{e:#}")))?;
        }

        let dispatcher = WatchDispatcher::new(
            Arc::clone(&self.state),
            Arc::clone(engine.transfers()),
            Arc::clone(engine.journal()),
            self.guards.clone(),
        );
        let stability = self.config.watcher.stability();
        let poll_interval = self.config.watcher.poll_interval();
        let task = tokio::spawn(async move {
            dispatcher.run(events, stability, poll_interval, cancel).await;
        });
        Ok((watcher, task))
    }
}
