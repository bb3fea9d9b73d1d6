//! Forecasting over the rolling history
//!
//! The forecasting model is an opaque collaborator behind [`Forecaster`].
//! [`LinearTrendForecaster`] is the built-in fallback model and
//! [`ForecastPoller`] is a pull-based consumer of the history buffer.

mod poller;
mod trend;

pub use poller::{ForecastConfig, ForecastPoller, ForecastResult, DEFAULT_FORECAST_HORIZON};
pub use trend::{linear_regression, linear_regression_slope, LinearTrendForecaster, MIN_SAMPLES};

use anyhow::Result;

/// Trait for forecasting implementations
pub trait Forecaster: Send + Sync {
    /// Predict the next `horizon` values following `series` (oldest first)
    fn forecast(&self, series: &[f64], horizon: usize) -> Result<Vec<f64>>;

    /// Model identifier for logs
    fn name(&self) -> &str;
}
