//! CLI subcommands and the context they share

pub mod activity;
pub mod config;
pub mod jobs;
pub mod journal;
pub mod sync;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use bucketsync_cache::{DatabasePool, SqliteStateRepository};
use bucketsync_core::{
    config::Config,
    domain::{SessionCredentials, SyncConfiguration},
};
use bucketsync_sync::SyncService;
use tracing::debug;

use crate::output::{Console, OutputFormat};

/// Overrides the state database location
const DB_ENV: &str = "BUCKETSYNC_DB";

/// Loaded configuration plus output settings
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: Config,
    /// Parse error of the config file; `config` then holds defaults
    pub load_error: Option<String>,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl CliContext {
    /// Loads `path`, or the default config file; a missing file yields defaults
    ///
    /// An unreadable file is recorded in `load_error` so `config validate`
    /// can report it; commands that touch state refuse to run.
    pub fn load(path: Option<&str>, format: OutputFormat, quiet: bool) -> Self {
        let config_path = path.map(PathBuf::from).unwrap_or_else(Config::default_path);
        let (config, load_error) = if config_path.exists() {
            match Config::load(&config_path) {
                Ok(config) => (config, None),
                Err(e) => (Config::default(), Some(format!("{e:#}"))),
            }
        } else {
            debug!(config_path = %config_path.display(), "No config file, using defaults");
            (Config::default(), None)
        };
        Self {
            config_path,
            config,
            load_error,
            format,
            quiet,
        }
    }

    fn ensure_loaded(&self) -> Result<()> {
        match &self.load_error {
            Some(e) => anyhow::bail!("Failed to load {}: {e}", self.config_path.display()),
            None => Ok(()),
        }
    }

    pub fn formatter(&self) -> Console {
        Console::new(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn db_path(&self) -> PathBuf {
        std::env::var_os(DB_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_db_path)
    }

    /// Opens the state database and builds a service over it
    pub async fn service(&self) -> Result<SyncService> {
        self.ensure_loaded()?;
        let db_path = self.db_path();
        let pool = DatabasePool::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        let state = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
        Ok(SyncService::new(self.config.clone(), state))
    }

    /// Reads the session token from the variable named by `authority.token_env`
    pub fn session(&self) -> Result<SessionCredentials> {
        self.ensure_loaded()?;
        let var = &self.config.authority.token_env;
        let token = std::env::var(var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("No session token: set {var}"))?;
        Ok(SessionCredentials::new(token.trim()))
    }
}

/// Picks configurations by name; all of them when `name` is `None`
pub async fn select_configurations(
    service: &SyncService,
    name: Option<&str>,
) -> Result<Vec<SyncConfiguration>> {
    let all = service.list_configurations().await?;
    match name {
        None => Ok(all),
        Some(name) => {
            let selected: Vec<_> = all.into_iter().filter(|c| c.name() == name).collect();
            if selected.is_empty() {
                anyhow::bail!("Unknown configuration: {name}");
            }
            Ok(selected)
        }
    }
}
