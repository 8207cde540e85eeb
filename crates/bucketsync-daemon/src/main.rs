//! BucketSync Daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Scheduled reconciliation of every configured mapping
//! - Live upload and delete of local edits through the change watcher
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Exit on session expiry, so the supervisor can restart it with a
//!   fresh token
//!
//! # Architecture
//!
//! The daemon loads the YAML configuration, opens the state database,
//! reads the session token from the environment and hands everything to
//! [`SyncService`]. It then waits on a `CancellationToken` that is
//! triggered by a shutdown signal or by the service reporting that the
//! authority rejected the session.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use bucketsync_cache::{DatabasePool, SqliteStateRepository};
use bucketsync_core::{
    config::{Config, LoggingConfig},
    domain::SessionCredentials,
};
use bucketsync_sync::SyncService;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Overrides the configuration file location
const CONFIG_ENV: &str = "BUCKETSYNC_CONFIG";

/// Overrides the state database location
const DB_ENV: &str = "BUCKETSYNC_DB";

// ============================================================================
// Logging
// ============================================================================

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `logging.level`; `logging.format` selects
/// human-readable or JSON lines.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Startup
// ============================================================================

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

fn db_path() -> PathBuf {
    std::env::var_os(DB_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_db_path)
}

/// Reads the session token from the variable named by `authority.token_env`
fn session_from_env(config: &Config) -> Result<SessionCredentials> {
    let var = &config.authority.token_env;
    let token = std::env::var(var)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("No session token: set {var}"))?;
    Ok(SessionCredentials::new(token.trim()))
}

/// Why the daemon stopped
#[derive(Debug, Clone, PartialEq, Eq)]
enum StopReason {
    Signal,
    AuthExpired(String),
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}

async fn run(config: Config) -> Result<StopReason> {
    let session = session_from_env(&config)?;

    let db_path = db_path();
    let pool = DatabasePool::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    info!(db_path = %db_path.display(), "Opened state database");
    let state = Arc::new(SqliteStateRepository::new(pool.pool().clone()));

    let service = SyncService::new(config, state);
    let shutdown = CancellationToken::new();
    let expired: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let on_expired = {
        let shutdown = shutdown.clone();
        let expired = Arc::clone(&expired);
        Arc::new(move |reason: &str| {
            if let Ok(mut slot) = expired.lock() {
                *slot = Some(reason.to_string());
            }
            shutdown.cancel();
        })
    };

    service
        .init_sync(session, on_expired)
        .await
        .context("Failed to start synchronization")?;

    tokio::spawn(shutdown_signal(shutdown.clone()));
    shutdown.cancelled().await;
    service.stop_sync().await;

    let reason = expired.lock().ok().and_then(|mut slot| slot.take());
    Ok(match reason {
        Some(reason) => StopReason::AuthExpired(reason),
        None => StopReason::Signal,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };
    init_tracing(&config.logging);
    info!(config_path = %config_path.display(), "BucketSync daemon starting (bucketsyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }
    if config.sync.configurations.is_empty() {
        warn!("No sync configurations defined; only stored ones will run");
    }

    match run(config).await {
        Ok(StopReason::Signal) => {
            info!("BucketSync daemon shut down gracefully");
            Ok(())
        }
        Ok(StopReason::AuthExpired(reason)) => {
            error!(reason = %reason, "Session expired; restart with a fresh token");
            anyhow::bail!("Session expired: {reason}")
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "BucketSync daemon exiting with error");
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
