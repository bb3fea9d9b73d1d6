//! Summary statistics over the whole log

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use telemetry_lib::models::{Sample, NOT_AVAILABLE};
use telemetry_lib::persistence::{HEADER, TIMESTAMP_FORMAT};

use super::load_samples;
use crate::output::{print_json, print_table, print_warning, OutputFormat};

/// Statistics for one numeric column; absent readings are excluded
#[derive(Debug, Serialize, PartialEq)]
pub struct ColumnStats {
    pub column: &'static str,
    pub present: usize,
    pub missing: usize,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub samples: usize,
    pub first: Option<String>,
    pub last: Option<String>,
    pub columns: Vec<ColumnStats>,
}

#[derive(Tabled, Serialize)]
struct StatsRow {
    #[tabled(rename = "Column")]
    column: &'static str,
    #[tabled(rename = "Present")]
    present: usize,
    #[tabled(rename = "Missing")]
    missing: usize,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Max")]
    max: String,
}

fn cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn column_stats<F>(column: &'static str, samples: &[Sample], field: F) -> ColumnStats
where
    F: Fn(&Sample) -> Option<f64>,
{
    let values: Vec<f64> = samples.iter().filter_map(&field).collect();
    let present = values.len();
    let (min, avg, max) = if values.is_empty() {
        (None, None, None)
    } else {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / present as f64;
        (Some(min), Some(avg), Some(max))
    };

    ColumnStats {
        column,
        present,
        missing: samples.len() - present,
        min,
        avg,
        max,
    }
}

pub fn compute(samples: &[Sample]) -> LogStats {
    let columns = vec![
        column_stats(HEADER[1], samples, |s| Some(s.cpu_percent)),
        column_stats(HEADER[2], samples, |s| Some(s.cpu_memory_percent)),
        column_stats(HEADER[3], samples, |s| s.cpu_temperature_celsius),
        column_stats(HEADER[4], samples, |s| s.gpu_percent),
        column_stats(HEADER[5], samples, |s| s.gpu_memory_percent),
        column_stats(HEADER[6], samples, |s| s.gpu_temperature_celsius),
    ];

    LogStats {
        samples: samples.len(),
        first: samples
            .first()
            .map(|s| s.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        last: samples
            .last()
            .map(|s| s.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        columns,
    }
}

/// Show summary statistics
pub fn show_stats(path: &Path, format: OutputFormat) -> Result<()> {
    let samples = load_samples(path)?;
    let stats = compute(&samples);

    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Table => {
            if stats.samples == 0 {
                print_warning("Log contains no samples");
                return Ok(());
            }

            println!("{}", "Telemetry Log".bold());
            println!("{}", "=".repeat(50));
            println!("File:      {}", path.display().to_string().cyan());
            println!("Samples:   {}", stats.samples);
            if let (Some(first), Some(last)) = (&stats.first, &stats.last) {
                println!("Span:      {} → {}", first, last);
            }
            println!();

            let rows: Vec<StatsRow> = stats
                .columns
                .iter()
                .map(|c| StatsRow {
                    column: c.column,
                    present: c.present,
                    missing: c.missing,
                    min: cell(c.min),
                    avg: cell(c.avg),
                    max: cell(c.max),
                })
                .collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}
