//! Sync command - Run one reconciliation cycle in the foreground
//!
//! Provides the `bucketsync sync` CLI command which:
//! 1. Upserts configurations and mappings from the config file
//! 2. Reads the session token from the environment
//! 3. Runs a forced cycle over every active configuration
//! 4. Displays per-file progress and the resulting jobs

use anyhow::Result;
use clap::Args;
use tracing::info;

use bucketsync_core::domain::{ProgressEvent, ProgressKind};
use bucketsync_sync::{CycleReport, SyncError};

use super::CliContext;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Hide per-file progress lines
    #[arg(long)]
    pub no_progress: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let session = ctx.session()?;
        let service = ctx.service().await?;

        let printer = (!ctx.is_json() && !ctx.quiet && !self.no_progress).then(|| {
            let mut events = service.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let Some(line) = progress_line(&event) {
                        println!("  {line}");
                    }
                }
            })
        });

        info!("Starting foreground sync");
        let result = service.sync_once(session).await;
        if let Some(printer) = printer {
            printer.abort();
        }

        let report = match result {
            Ok(report) => report,
            Err(SyncError::AuthExpired(reason)) => {
                formatter.error(&format!("Session expired: {reason}"));
                anyhow::bail!("Session expired");
            }
            Err(e) => return Err(e.into()),
        };

        if ctx.is_json() {
            formatter.print_json(&report_json(&report));
            return Ok(());
        }
        if report.busy {
            formatter.warn("Another cycle is already running");
            return Ok(());
        }

        formatter.success(&format!(
            "Sync finished in {} ms: {} downloaded, {} uploaded, {} failed",
            report.duration_ms, report.downloaded, report.uploaded, report.failed
        ));
        for job in &report.jobs {
            match job.error() {
                Some(error) => formatter.warn(&format!(
                    "Job {} {}: {}",
                    job.id(),
                    job.status().as_str(),
                    error
                )),
                None => formatter.info(&format!(
                    "Job {} {} ({} files)",
                    job.id(),
                    job.status().as_str(),
                    job.files_handled()
                )),
            }
        }
        if report.flushed > 0 {
            formatter.info(&format!("{} journal entries sent to the ledger", report.flushed));
        }
        Ok(())
    }
}

/// One line per finished transfer or error; intermediate percentages are dropped
fn progress_line(event: &ProgressEvent) -> Option<String> {
    let name = event.filename.as_deref().unwrap_or("?");
    match event.kind {
        ProgressKind::Download if event.percent == Some(100.0) => Some(format!("\u{2193} {name}")),
        ProgressKind::Upload if event.percent == Some(100.0) => Some(format!("\u{2191} {name}")),
        ProgressKind::Error => Some(format!(
            "\u{2717} {}",
            event.message.as_deref().unwrap_or("error")
        )),
        _ => None,
    }
}

fn report_json(report: &CycleReport) -> serde_json::Value {
    serde_json::json!({
        "success": !report.busy,
        "busy": report.busy,
        "downloaded": report.downloaded,
        "uploaded": report.uploaded,
        "failed": report.failed,
        "flushed": report.flushed,
        "duration_ms": report.duration_ms,
        "jobs": report.jobs,
    })
}
