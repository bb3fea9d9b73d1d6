//! CPU trend forecast over the latest logged samples

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use telemetry_lib::forecast::{Forecaster, LinearTrendForecaster};

use super::load_samples;
use crate::output::{
    format_percent, print_info, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Serialize)]
struct ForecastOutput<'a> {
    model: &'a str,
    samples_used: usize,
    predictions: &'a [f64],
}

#[derive(Tabled, Serialize)]
struct PredictionRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Predicted CPU")]
    cpu: String,
}

/// Forecast the next `steps` CPU values from the last `window` samples
pub fn forecast_cpu(path: &Path, window: usize, steps: usize, format: OutputFormat) -> Result<()> {
    let samples = load_samples(path)?;
    let series: Vec<f64> = samples
        .iter()
        .rev()
        .take(window)
        .rev()
        .map(|s| s.cpu_percent)
        .collect();

    let forecaster = LinearTrendForecaster::new();
    let predictions = match forecaster.forecast(&series, steps) {
        Ok(predictions) => predictions,
        Err(e) => {
            print_warning(&e.to_string());
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => print_json(&ForecastOutput {
            model: forecaster.name(),
            samples_used: series.len(),
            predictions: &predictions,
        }),
        OutputFormat::Table => {
            print_table(&rows(&predictions), format);
            print_info(&format!(
                "{} fitted over {} sample(s)",
                forecaster.name(),
                series.len()
            ));
        }
    }

    Ok(())
}

fn rows(predictions: &[f64]) -> Vec<PredictionRow> {
    predictions
        .iter()
        .enumerate()
        .map(|(i, v)| PredictionRow {
            step: i + 1,
            cpu: format_percent(*v),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_numbered_from_one() {
        let rows = rows(&[41.0, 42.5]);
        assert_eq!(rows[0].step, 1);
        assert_eq!(rows[1].cpu, "42.5%");
    }
}
