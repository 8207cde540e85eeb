//! BucketSync CLI - Command-line interface for BucketSync
//!
//! Provides commands for:
//! - Running a reconciliation cycle in the foreground
//! - Listing sync jobs and the activity journal
//! - Flushing and pruning the journal
//! - Viewing and validating configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    activity::ActivityCommand,
    config::ConfigCommand,
    jobs::JobsCommand,
    journal::{FlushCommand, PruneCommand},
    sync::SyncCommand,
    CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "bucketsync",
    version,
    about = "Bidirectional sync between local folders and object storage buckets"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one reconciliation cycle over every active configuration
    Sync(SyncCommand),
    /// Show recent sync jobs
    Jobs(JobsCommand),
    /// Show activity journal entries
    Activity(ActivityCommand),
    /// Send unsynced journal entries to the ledger
    Flush(FlushCommand),
    /// Delete synced journal entries past retention
    Prune(PruneCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_json_flag(cli.json);
    let ctx = CliContext::load(cli.config.as_deref(), format, cli.quiet);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Jobs(cmd) => cmd.execute(&ctx).await,
        Commands::Activity(cmd) => cmd.execute(&ctx).await,
        Commands::Flush(cmd) => cmd.execute(&ctx).await,
        Commands::Prune(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
