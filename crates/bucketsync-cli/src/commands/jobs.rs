//! Jobs command - Show recent sync jobs per configuration

use anyhow::Result;
use clap::Args;

use bucketsync_core::domain::SyncJob;

use super::{select_configurations, CliContext};
use crate::output::truncate;

#[derive(Debug, Args)]
pub struct JobsCommand {
    /// Only show jobs of this configuration
    #[arg(long = "name")]
    pub name: Option<String>,

    /// Maximum number of jobs per configuration
    #[arg(long, default_value = "10")]
    pub limit: u32,
}

impl JobsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let service = ctx.service().await?;
        let configurations = select_configurations(&service, self.name.as_deref()).await?;

        let mut all = Vec::new();
        for configuration in &configurations {
            let jobs = service
                .get_sync_jobs(configuration.id(), Some(self.limit))
                .await?;
            all.push((configuration.name().to_string(), jobs));
        }

        if ctx.is_json() {
            let value: Vec<_> = all
                .iter()
                .map(|(name, jobs)| serde_json::json!({"configuration": name, "jobs": jobs}))
                .collect();
            formatter.print_json(&serde_json::Value::Array(value));
            return Ok(());
        }

        if all.is_empty() {
            formatter.info("No configurations. Add one under sync.configurations and run 'bucketsync sync'.");
            return Ok(());
        }
        for (name, jobs) in &all {
            formatter.success(&format!("{name} ({} jobs)", jobs.len()));
            for job in jobs {
                formatter.info(&job_row(job));
            }
        }
        Ok(())
    }
}

fn job_row(job: &SyncJob) -> String {
    let finished = job
        .end_time()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut row = format!(
        "{:<19}  {:<9}  {:>5} files  {}",
        job.start_time().format("%Y-%m-%d %H:%M:%S"),
        job.status().as_str(),
        job.files_handled(),
        finished
    );
    if let Some(error) = job.error() {
        row.push_str("  ");
        row.push_str(&truncate(error, 60));
    }
    row
}
