//! Config command - View and validate BucketSync configuration
//!
//! Provides the `bucketsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use super::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
        }
    }
}

fn execute_show(ctx: &CliContext) -> Result<()> {
    let formatter = ctx.formatter();
    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if let Some(e) = &ctx.load_error {
        formatter.warn(&format!("Failed to parse configuration, showing defaults: {e}"));
    }

    if ctx.is_json() {
        let json = serde_json::to_value(&ctx.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");

        let yaml = serde_yaml::to_string(&ctx.config)
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext) -> Result<()> {
    let formatter = ctx.formatter();
    let path = ctx.config_path.display().to_string();

    let errors: Vec<String> = match &ctx.load_error {
        Some(e) => vec![format!("Failed to parse configuration: {e}")],
        None if !ctx.config_path.exists() => {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path,
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {path}"));
                formatter.info("Using default configuration.");
            }
            return Ok(());
        }
        None => ctx.config.validate().iter().map(ToString::to_string).collect(),
    };

    info!(config_path = %path, errors = errors.len(), "Validated configuration");

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path,
            "errors": errors,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {path}"));
    } else {
        formatter.error(&format!("Configuration has {} error(s)", errors.len()));
        for e in &errors {
            formatter.info(&format!("- {e}"));
        }
    }
    Ok(())
}
