//! Recent samples

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use telemetry_lib::models::Sample;
use telemetry_lib::persistence::TIMESTAMP_FORMAT;

use super::load_samples;
use crate::output::{format_optional, format_percent, print_json, print_table, OutputFormat};

/// Row for the samples table
#[derive(Tabled, Serialize)]
struct SampleRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "CPU Temp")]
    cpu_temperature: String,
    #[tabled(rename = "GPU")]
    gpu: String,
    #[tabled(rename = "GPU Memory")]
    gpu_memory: String,
    #[tabled(rename = "GPU Temp")]
    gpu_temperature: String,
}

impl From<&Sample> for SampleRow {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            cpu: format_percent(sample.cpu_percent),
            memory: format_percent(sample.cpu_memory_percent),
            cpu_temperature: format_optional(sample.cpu_temperature_celsius, "°C"),
            gpu: format_optional(sample.gpu_percent, "%"),
            gpu_memory: format_optional(sample.gpu_memory_percent, "%"),
            gpu_temperature: format_optional(sample.gpu_temperature_celsius, "°C"),
        }
    }
}

/// Last `tail` samples, oldest first
pub fn tail(samples: &[Sample], tail: usize) -> &[Sample] {
    &samples[samples.len().saturating_sub(tail)..]
}

/// Show the most recent samples
pub fn show_samples(path: &Path, count: usize, format: OutputFormat) -> Result<()> {
    let samples = load_samples(path)?;
    let recent = tail(&samples, count);

    match format {
        OutputFormat::Json => print_json(recent),
        OutputFormat::Table => {
            let rows: Vec<SampleRow> = recent.iter().map(SampleRow::from).collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}
