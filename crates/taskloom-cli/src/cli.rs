use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "taskloom")]
#[command(version, about = "Taskloom - recurring agent task orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (defaults to ~/.config/taskloom/config.toml)
    #[arg(long, global = true, env = "TASKLOOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Processed-execution tracker path (overrides the config file)
    #[arg(long, global = true)]
    pub tracker: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Count processed executions
    Stats {
        /// Only count claims for this store
        #[arg(long)]
        store: Option<String>,
    },

    /// List processed-execution claims
    Claims {
        /// Only list claims for this store
        #[arg(long)]
        store: Option<String>,
    },

    /// Remove claims older than the given age
    Cleanup {
        /// Maximum claim age in days (0 removes every claim)
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Print the effective configuration
    Config,

    /// Print the effective resource limits and a fresh resource report
    Limits,
}
