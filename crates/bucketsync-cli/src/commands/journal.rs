//! Journal maintenance commands - flush to the ledger, prune by retention

use anyhow::Result;
use clap::Args;

use super::CliContext;

#[derive(Debug, Args)]
pub struct FlushCommand {}

impl FlushCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let session = ctx.session()?;
        let service = ctx.service().await?;

        let report = service.flush_journal(session).await?;
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "batches": report.batches,
                "records": report.records,
            }));
        } else if report.records == 0 {
            formatter.success("Journal already in sync with the ledger");
        } else {
            formatter.success(&format!(
                "Sent {} entries in {} batches",
                report.records, report.batches
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PruneCommand {}

impl PruneCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let service = ctx.service().await?;

        let removed = service.prune_journal().await?;
        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({"success": true, "removed": removed}));
        } else {
            formatter.success(&format!(
                "Removed {removed} entries older than {} days",
                ctx.config.journal.retention_days
            ));
        }
        Ok(())
    }
}
