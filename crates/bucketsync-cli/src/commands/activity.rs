//! Activity command - Show activity journal entries

use anyhow::Result;
use clap::Args;

use bucketsync_core::domain::ActivityRecord;

use super::{select_configurations, CliContext};
use crate::output::truncate;

#[derive(Debug, Args)]
pub struct ActivityCommand {
    /// Only show entries of this configuration
    #[arg(long = "name")]
    pub name: Option<String>,

    /// Maximum number of entries to show
    #[arg(long, default_value = "50")]
    pub limit: u32,
}

impl ActivityCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let service = ctx.service().await?;

        let config_id = match &self.name {
            Some(name) => select_configurations(&service, Some(name))
                .await?
                .first()
                .map(|c| *c.id()),
            None => None,
        };
        let entries = service
            .get_activity_log(config_id, Some(self.limit))
            .await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::to_value(&entries)?);
            return Ok(());
        }
        if entries.is_empty() {
            formatter.info("No activity recorded");
            return Ok(());
        }

        formatter.success(&format!("{} entries", entries.len()));
        for entry in &entries {
            formatter.info(&activity_row(entry));
        }
        Ok(())
    }
}

fn activity_row(entry: &ActivityRecord) -> String {
    let mut row = format!(
        "{}  {:<8}  {:<7}  {}  {}",
        entry.created_at().format("%Y-%m-%d %H:%M:%S"),
        entry.action().as_str(),
        entry.status().as_str(),
        if entry.is_synced() { "\u{2713}" } else { " " },
        truncate(entry.file_name(), 60)
    );
    if let Some(error) = entry.error() {
        row.push_str("  ");
        row.push_str(&truncate(error, 60));
    }
    row
}
