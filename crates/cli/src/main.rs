//! Host Telemetry CLI
//!
//! A command-line tool for inspecting the CSV log written by the
//! telemetry agent: recent samples, summary statistics, replayed alerts
//! and a CPU trend forecast.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, forecast, show, stats};
use std::path::PathBuf;
use telemetry_lib::alerts::DEFAULT_THRESHOLD_PERCENT;
use telemetry_lib::forecast::DEFAULT_FORECAST_HORIZON;
use telemetry_lib::history::DEFAULT_HISTORY_CAPACITY;

/// Host Telemetry CLI
#[derive(Parser)]
#[command(name = "telem")]
#[command(author, version, about = "Inspect host telemetry logs", long_about = None)]
pub struct Cli {
    /// Telemetry log to read (overrides the config file)
    #[arg(long, global = true, env = "TELEMETRY_LOG_PATH")]
    pub log_path: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the most recent samples
    Show {
        /// Number of samples to show
        #[arg(long, short = 'n', default_value_t = 20)]
        tail: usize,
    },

    /// Summary statistics per column
    Stats,

    /// Replay threshold alerts over the log
    Alerts {
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_PERCENT)]
        cpu_threshold: f64,

        #[arg(long, default_value_t = DEFAULT_THRESHOLD_PERCENT)]
        memory_threshold: f64,

        #[arg(long, default_value_t = DEFAULT_THRESHOLD_PERCENT)]
        gpu_threshold: f64,

        #[arg(long, default_value_t = DEFAULT_THRESHOLD_PERCENT)]
        gpu_memory_threshold: f64,
    },

    /// Forecast the next CPU values from the latest samples
    Forecast {
        /// Number of most recent samples to fit
        #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
        window: usize,

        /// Number of future values to forecast
        #[arg(long, default_value_t = DEFAULT_FORECAST_HORIZON)]
        steps: usize,
    },

    /// Manage CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings
    Show,

    /// Store the default log path
    SetLogPath {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;
    let log_path = settings.resolve_log_path(cli.log_path.clone());

    match cli.command {
        Commands::Show { tail } => {
            show::show_samples(&log_path, tail, cli.format)?;
        }
        Commands::Stats => {
            stats::show_stats(&log_path, cli.format)?;
        }
        Commands::Alerts {
            cpu_threshold,
            memory_threshold,
            gpu_threshold,
            gpu_memory_threshold,
        } => {
            let thresholds = telemetry_lib::alerts::AlertThresholds {
                cpu_percent: cpu_threshold,
                cpu_memory_percent: memory_threshold,
                gpu_percent: Some(gpu_threshold),
                gpu_memory_percent: Some(gpu_memory_threshold),
            };
            alerts::replay_alerts(&log_path, thresholds, cli.format)?;
        }
        Commands::Forecast { window, steps } => {
            forecast::forecast_cpu(&log_path, window, steps, cli.format)?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => {
                output::print_info(&format!("Config file: {}", config::Config::config_path()?.display()));
                output::print_info(&format!("Log path:    {}", log_path.display()));
            }
            ConfigCommands::SetLogPath { path } => {
                let updated = config::Config {
                    log_path: Some(path.clone()),
                };
                let saved_to = updated.save()?;
                output::print_info(&format!(
                    "Default log path set to {} ({})",
                    path.display(),
                    saved_to.display()
                ));
            }
        },
    }

    Ok(())
}
