//! Replay threshold alerts over logged samples

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use telemetry_lib::alerts::{AlertEvaluator, AlertEvent, AlertThresholds};
use telemetry_lib::models::Sample;
use telemetry_lib::persistence::TIMESTAMP_FORMAT;

use super::load_samples;
use crate::output::{color_percent, print_info, print_json, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct AlertRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Alert")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
}

/// Every alert the evaluator raises over `samples`, in log order
pub fn replay(samples: &[Sample], thresholds: AlertThresholds) -> Vec<AlertEvent> {
    let evaluator = AlertEvaluator::new(thresholds);
    samples.iter().flat_map(|s| evaluator.evaluate(s)).collect()
}

/// Replay alerts and print them
pub fn replay_alerts(path: &Path, thresholds: AlertThresholds, format: OutputFormat) -> Result<()> {
    let samples = load_samples(path)?;
    let events = replay(&samples, thresholds);

    match format {
        OutputFormat::Json => print_json(&events),
        OutputFormat::Table => {
            let rows: Vec<AlertRow> = events
                .iter()
                .map(|e| AlertRow {
                    timestamp: e.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    kind: e.kind.label().to_string(),
                    value: color_percent(e.value, e.threshold),
                    threshold: format!("{:.0}%", e.threshold),
                })
                .collect();
            print_table(&rows, format);
            print_info(&format!(
                "{} alert(s) across {} sample(s)",
                events.len(),
                samples.len()
            ));
        }
    }

    Ok(())
}
