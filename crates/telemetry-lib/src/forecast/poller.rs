//! Forecast polling loop
//!
//! Reads history snapshots on its own timer, independent of the sampling
//! cadence, and forecasts the CPU series. Tolerates an empty or short
//! history at startup.

use super::{Forecaster, MIN_SAMPLES};
use crate::history::HistoryReader;
use crate::models::now_local_seconds;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Number of future values forecast per poll
pub const DEFAULT_FORECAST_HORIZON: usize = 5;

/// Configuration for the forecast consumer
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// How often the history is polled
    pub poll_interval: Duration,
    /// Number of future values to forecast
    pub horizon: usize,
    /// Minimum history length before forecasting
    pub min_samples: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            horizon: DEFAULT_FORECAST_HORIZON,
            min_samples: MIN_SAMPLES,
        }
    }
}

/// Outcome of one forecast poll
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub generated_at: NaiveDateTime,
    pub model: String,
    pub samples_used: usize,
    pub predictions: Vec<f64>,
    pub skipped_reason: Option<String>,
    pub duration_us: u64,
}

/// Pull-based consumer that forecasts the CPU series of the history
pub struct ForecastPoller {
    history: HistoryReader,
    forecaster: Arc<dyn Forecaster>,
    config: ForecastConfig,
    forecast_tx: mpsc::Sender<ForecastResult>,
}

impl ForecastPoller {
    pub fn new(
        history: HistoryReader,
        forecaster: Arc<dyn Forecaster>,
        config: ForecastConfig,
    ) -> (Self, mpsc::Receiver<ForecastResult>) {
        let (tx, rx) = mpsc::channel(16);
        let poller = Self {
            history,
            forecaster,
            config,
            forecast_tx: tx,
        };
        (poller, rx)
    }

    /// Run the polling loop until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            horizon = self.config.horizon,
            model = %self.forecaster.name(),
            "Starting forecast poller"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.poll_once();
                    if self.forecast_tx.send(result).await.is_err() {
                        debug!("Forecast receiver dropped, stopping poller");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down forecast poller");
                    break;
                }
            }
        }
    }

    /// Take one snapshot and forecast over it
    pub fn poll_once(&self) -> ForecastResult {
        let start = Instant::now();
        let series = self.history.series(|s| Some(s.cpu_percent));

        let mut result = ForecastResult {
            generated_at: now_local_seconds(),
            model: self.forecaster.name().to_string(),
            samples_used: series.len(),
            predictions: Vec::new(),
            skipped_reason: None,
            duration_us: 0,
        };

        if series.len() < self.config.min_samples {
            result.skipped_reason = Some(format!(
                "Insufficient data: {} samples, need {}",
                series.len(),
                self.config.min_samples
            ));
        } else {
            match self.forecaster.forecast(&series, self.config.horizon) {
                Ok(predictions) => result.predictions = predictions,
                Err(e) => {
                    warn!(error = %e, model = %self.forecaster.name(), "Forecast failed");
                    result.skipped_reason = Some(format!("Forecast failed: {}", e));
                }
            }
        }

        result.duration_us = start.elapsed().as_micros() as u64;
        result
    }
}
