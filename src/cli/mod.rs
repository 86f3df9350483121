//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod run_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::{HarvestConfig, StoreConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser)]
#[command(name = "imgharvest")]
#[command(about = "Harvest content images from a web page into a destination store")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: discovered imgharvest config file)
    #[arg(short, long, global = true, env = "IMGHARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the source page once and upload qualifying images
    Run {
        /// Page to scan (overrides source_url)
        #[arg(long)]
        url: Option<String>,
        /// Destination folder (overrides destination_folder)
        #[arg(long)]
        folder: Option<String>,
        /// Run date used for naming, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Store images under this local directory instead of Dropbox
        #[arg(long)]
        local_dir: Option<PathBuf>,
        /// Delay between image fetches in milliseconds
        #[arg(long)]
        pacing_ms: Option<u64>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Debug, Default)]
struct RunOverrides {
    url: Option<String>,
    folder: Option<String>,
    date: Option<NaiveDate>,
    local_dir: Option<PathBuf>,
    pacing_ms: Option<u64>,
}

impl RunOverrides {
    fn apply(self, mut config: HarvestConfig) -> HarvestConfig {
        if let Some(url) = self.url {
            config.source_url = url;
        }
        if let Some(folder) = self.folder {
            config.destination_folder = folder;
        }
        if let Some(date) = self.date {
            config.run_date = Some(date);
        }
        if let Some(local_dir) = self.local_dir {
            config.store = StoreConfig::Local { local_dir };
        }
        if let Some(pacing_ms) = self.pacing_ms {
            config.pacing_ms = pacing_ms;
        }
        config
    }
}

/// Run the parsed command. Configuration errors surface as `Err`; run
/// outcomes map to the returned exit code.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = HarvestConfig::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            url,
            folder,
            date,
            local_dir,
            pacing_ms,
        } => {
            let overrides = RunOverrides {
                url,
                folder,
                date,
                local_dir,
                pacing_ms,
            };
            run_cmd::cmd_run(overrides.apply(config)).await
        }
        Commands::ShowConfig => config_cmd::cmd_show_config(&config),
    }
}
