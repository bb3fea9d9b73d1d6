//! Per-cycle metric sampling
//!
//! CPU and memory are mandatory: a failure there is fatal for the cycle.
//! Everything else is optional and degrades to absent for the current
//! sample only, with a warning. There is no forward-fill from earlier
//! samples.

use super::{GpuBackend, GpuProbe, OsMetricsProvider, SensorReadings};
use crate::error::CollectorError;
use crate::models::{now_local_seconds, GpuCapability, Sample};
use crate::observability::CollectorMetrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default CPU measurement window
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

/// Sensor names tried in order for the CPU temperature
pub const DEFAULT_CPU_SENSOR_KEYS: &[&str] = &["coretemp", "cpu-thermal", "cpu_thermal", "k10temp"];

/// Index of the GPU that is sampled
const GPU_INDEX: u32 = 0;

/// Reads one [`Sample`] per call
pub struct MetricSampler {
    os: Arc<dyn OsMetricsProvider>,
    capability: GpuCapability,
    gpu: Option<Arc<dyn GpuBackend>>,
    cpu_window: Duration,
    cpu_sensor_keys: Vec<String>,
}

impl MetricSampler {
    /// Build a sampler from the OS provider and the startup probe result
    pub fn new(os: Arc<dyn OsMetricsProvider>, probe: &GpuProbe) -> Self {
        let capability = probe.capability().clone();
        let gpu = if capability.is_available() {
            probe.backend()
        } else {
            None
        };

        Self {
            os,
            capability,
            gpu,
            cpu_window: DEFAULT_CPU_WINDOW,
            cpu_sensor_keys: DEFAULT_CPU_SENSOR_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }

    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    pub fn with_cpu_sensor_keys(mut self, keys: Vec<String>) -> Self {
        self.cpu_sensor_keys = keys;
        self
    }

    pub fn capability(&self) -> &GpuCapability {
        &self.capability
    }

    pub fn cpu_window(&self) -> Duration {
        self.cpu_window
    }

    /// Take one sample; blocks for the CPU measurement window
    pub async fn sample(&self) -> Result<Sample, CollectorError> {
        let timestamp = now_local_seconds();

        let cpu_percent = self
            .os
            .cpu_percent(self.cpu_window)
            .await
            .map_err(|e| CollectorError::FatalHost(format!("CPU usage: {:#}", e)))?;
        let cpu_memory_percent = self
            .os
            .virtual_memory_percent()
            .await
            .map_err(|e| CollectorError::FatalHost(format!("memory usage: {:#}", e)))?;

        let mut sample = Sample::new(timestamp, cpu_percent, cpu_memory_percent);
        sample.cpu_temperature_celsius = self.cpu_temperature().await;

        if let Some(gpu) = &self.gpu {
            let gpu = Arc::clone(gpu);
            let (usage, memory, temperature) = read_gpu(gpu).await;
            sample.gpu_percent = usage;
            sample.gpu_memory_percent = memory;
            sample.gpu_temperature_celsius = temperature;
        }

        Ok(sample)
    }

    async fn cpu_temperature(&self) -> Option<f64> {
        match self.os.sensor_temperatures().await {
            Ok(sensors) => lookup_sensor(&sensors, &self.cpu_sensor_keys),
            Err(e) => {
                log_transient("cpu_temperature_celsius", &e);
                None
            }
        }
    }
}

/// First reading of the first sensor key that resolves
pub fn lookup_sensor(sensors: &SensorReadings, keys: &[String]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| sensors.get(key))
        .find_map(|readings| readings.first().copied())
}

async fn read_gpu(gpu: Arc<dyn GpuBackend>) -> (Option<f64>, Option<f64>, Option<f64>) {
    let reads = tokio::task::spawn_blocking(move || {
        let usage = gpu.utilization(GPU_INDEX);
        let memory = gpu
            .memory_info(GPU_INDEX)
            .map(|(used, total)| used as f64 / total as f64 * 100.0);
        let temperature = gpu.temperature(GPU_INDEX);
        (usage, memory, temperature)
    })
    .await;

    match reads {
        Ok((usage, memory, temperature)) => (
            degrade("gpu_percent", usage),
            degrade("gpu_memory_percent", memory),
            degrade("gpu_temperature_celsius", temperature),
        ),
        Err(e) => {
            log_transient("gpu", &anyhow::Error::new(e));
            (None, None, None)
        }
    }
}

fn degrade(metric: &'static str, reading: Result<f64>) -> Option<f64> {
    match reading {
        Ok(value) if value.is_finite() => Some(value),
        Ok(value) => {
            log_transient(metric, &anyhow::anyhow!("non-finite reading {}", value));
            None
        }
        Err(e) => {
            log_transient(metric, &e);
            None
        }
    }
}

fn log_transient(metric: &'static str, error: &anyhow::Error) {
    let err = CollectorError::TransientRead {
        metric,
        reason: format!("{:#}", error),
    };
    warn!(event = "transient_read_failed", metric = metric, error = %err, "Reading unavailable for this sample");
    CollectorMetrics::new().inc_transient_read_failures(metric);
}
