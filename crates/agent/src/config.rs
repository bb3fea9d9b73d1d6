//! Collector configuration
//!
//! Values come from an optional TOML file (`TELEMETRY_CONFIG`, default
//! `telemetry.toml`) overlaid by `TELEMETRY_*` environment variables.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry_lib::alerts::{AlertThresholds, DEFAULT_THRESHOLD_PERCENT};
use telemetry_lib::collector::{SchedulerConfig, DEFAULT_CPU_SENSOR_KEYS};
use telemetry_lib::forecast::{ForecastConfig, DEFAULT_FORECAST_HORIZON, MIN_SAMPLES};
use telemetry_lib::history::DEFAULT_HISTORY_CAPACITY;
use tracing::warn;

const CONFIG_PATH_VAR: &str = "TELEMETRY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "telemetry.toml";
const ENV_PREFIX: &str = "TELEMETRY";

/// Collector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Start-to-start sampling period in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// CPU measurement window in milliseconds
    #[serde(default = "default_cpu_window_ms")]
    pub cpu_window_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Call `sync_data` after every appended row
    #[serde(default = "default_true")]
    pub fsync_each_append: bool,

    #[serde(default = "default_threshold")]
    pub cpu_alert_threshold: f64,

    #[serde(default = "default_threshold")]
    pub memory_alert_threshold: f64,

    /// GPU utilization threshold; `"off"` disables the check
    #[serde(
        default = "default_optional_threshold",
        deserialize_with = "deserialize_optional_threshold"
    )]
    pub gpu_alert_threshold: Option<f64>,

    /// GPU memory threshold; `"off"` disables the check
    #[serde(
        default = "default_optional_threshold",
        deserialize_with = "deserialize_optional_threshold"
    )]
    pub gpu_memory_alert_threshold: Option<f64>,

    /// Skip the GPU probe and run CPU-only
    #[serde(default)]
    pub disable_gpu: bool,

    /// Sensor names tried in order for the CPU temperature
    #[serde(default = "default_cpu_sensor_keys")]
    pub cpu_sensor_keys: Vec<String>,

    #[serde(default = "default_true")]
    pub forecast_enabled: bool,

    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: usize,

    #[serde(default = "default_interval_ms")]
    pub forecast_interval_ms: u64,

    /// node-exporter textfile to refresh after every cycle
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,

    /// Stop after this many cycles
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_cpu_window_ms() -> u64 {
    1000
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_log_path() -> PathBuf {
    PathBuf::from("system_monitor.csv")
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_PERCENT
}

fn default_optional_threshold() -> Option<f64> {
    Some(DEFAULT_THRESHOLD_PERCENT)
}

const THRESHOLD_OFF: &str = "off";

#[derive(Deserialize)]
#[serde(untagged)]
enum ThresholdSetting {
    Percent(f64),
    Text(String),
}

fn deserialize_optional_threshold<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match ThresholdSetting::deserialize(deserializer)? {
        ThresholdSetting::Percent(value) => Ok(Some(value)),
        ThresholdSetting::Text(text) if text.trim().eq_ignore_ascii_case(THRESHOLD_OFF) => Ok(None),
        ThresholdSetting::Text(text) => text.trim().parse().map(Some).map_err(|_| {
            D::Error::custom(format!(
                "expected a percentage or \"{}\", found {:?}",
                THRESHOLD_OFF, text
            ))
        }),
    }
}

fn default_cpu_sensor_keys() -> Vec<String> {
    DEFAULT_CPU_SENSOR_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_forecast_horizon() -> usize {
    DEFAULT_FORECAST_HORIZON
}

impl TelemetryConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Some(Path::new(&file)), environment())
    }

    fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Self = builder
            .add_source(env)
            .build()
            .context("Failed to read telemetry configuration")?
            .try_deserialize()
            .context("Invalid telemetry configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            bail!("interval_ms must be greater than zero");
        }
        if self.history_capacity == 0 {
            bail!("history_capacity must be at least 1");
        }
        if self.forecast_enabled && self.forecast_interval_ms == 0 {
            bail!("forecast_interval_ms must be greater than zero");
        }
        let thresholds = [
            Some(self.cpu_alert_threshold),
            Some(self.memory_alert_threshold),
            self.gpu_alert_threshold,
            self.gpu_memory_alert_threshold,
        ];
        if thresholds.iter().flatten().any(|t| !t.is_finite()) {
            bail!("alert thresholds must be finite numbers");
        }
        if self.cpu_window_ms >= self.interval_ms {
            warn!(
                cpu_window_ms = self.cpu_window_ms,
                interval_ms = self.interval_ms,
                "CPU window fills the whole interval, cycles will run back to back"
            );
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
            max_cycles: self.max_cycles,
            history_capacity: self.history_capacity,
            ..SchedulerConfig::default()
        }
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            cpu_percent: self.cpu_alert_threshold,
            cpu_memory_percent: self.memory_alert_threshold,
            gpu_percent: self.gpu_alert_threshold,
            gpu_memory_percent: self.gpu_memory_alert_threshold,
        }
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            poll_interval: Duration::from_millis(self.forecast_interval_ms),
            horizon: self.forecast_horizon,
            min_samples: MIN_SAMPLES,
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("cpu_sensor_keys")
}
