//! Subcommands over the telemetry log

pub mod alerts;
pub mod forecast;
pub mod show;
pub mod stats;

use anyhow::{Context, Result};
use std::path::Path;
use telemetry_lib::models::Sample;
use telemetry_lib::persistence::read_log;

/// Read every sample of the log at `path`
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    read_log(path).with_context(|| format!("Cannot read telemetry log {}", path.display()))
}
