//! Least-squares trend forecaster

use super::Forecaster;
use anyhow::{bail, Result};

/// Minimum number of samples required before forecasting
pub const MIN_SAMPLES: usize = 10;

/// Extrapolates the least-squares line through the series
///
/// Predictions are clamped to the percentage range.
#[derive(Debug, Clone)]
pub struct LinearTrendForecaster {
    min_samples: usize,
    lower: f64,
    upper: f64,
}

impl LinearTrendForecaster {
    pub fn new() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            lower: 0.0,
            upper: 100.0,
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(2);
        self
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
}

impl Default for LinearTrendForecaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for LinearTrendForecaster {
    fn forecast(&self, series: &[f64], horizon: usize) -> Result<Vec<f64>> {
        if series.len() < self.min_samples {
            bail!(
                "Insufficient data: {} samples, need {}",
                series.len(),
                self.min_samples
            );
        }
        if series.iter().any(|v| !v.is_finite()) {
            bail!("series contains non-finite values");
        }

        let (slope, intercept) = linear_regression(series);
        let n = series.len();
        Ok((0..horizon)
            .map(|step| {
                let x = (n + step) as f64;
                (intercept + slope * x).clamp(self.lower, self.upper)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "linear-trend"
    }
}

/// Calculate linear regression slope for trend detection
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    linear_regression(values).0
}

/// Least-squares fit over x = 0..n, returns (slope, intercept)
pub fn linear_regression(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let sum_y: f64 = values.iter().sum();
    if values.len() < 2 {
        return (0.0, sum_y / n);
    }
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return (0.0, sum_y / n);
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}
