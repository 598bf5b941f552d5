mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use cli::{Cli, Commands};
use taskloom_core::OrchestratorConfig;
use taskloom_core::logging::init_logging_with_default;
use taskloom_storage::ProcessedExecutionTracker;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging_with_default(if cli.verbose { "debug" } else { "warn" });

    let config = load_config(&cli);
    debug!(config_path = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Config => commands::config::show(&config, cli.format),
        Commands::Limits => commands::limits::show(&config.resources, cli.format),
        Commands::Stats { ref store } => {
            let tracker = open_tracker(&config)?;
            commands::tracker::stats(&tracker, store.as_deref(), cli.format)
        }
        Commands::Claims { ref store } => {
            let tracker = open_tracker(&config)?;
            commands::tracker::claims(&tracker, store.as_deref(), cli.format)
        }
        Commands::Cleanup { max_age_days } => {
            let tracker = open_tracker(&config)?;
            let max_age_days = max_age_days.unwrap_or(config.scheduler.retention_days);
            commands::tracker::cleanup(&tracker, max_age_days, cli.format)
        }
    }
}

fn load_config(cli: &Cli) -> OrchestratorConfig {
    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::load_from_path(Some(path.clone())),
        None => OrchestratorConfig::load_from_path(OrchestratorConfig::default_path()),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(path) = &cli.tracker {
        config.scheduler.tracker_path = Some(path.clone());
    }
    config
}

fn open_tracker(config: &OrchestratorConfig) -> Result<ProcessedExecutionTracker> {
    let path = config.scheduler.tracker_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), "Opening processed-execution tracker");
    ProcessedExecutionTracker::open(&path)
}
