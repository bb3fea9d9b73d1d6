//! Observability infrastructure for the collector
//!
//! Provides:
//! - Prometheus metrics (cycle latency, sample and failure counters, history length,
//!   GPU capability, last readings), optionally dumped to a node-exporter textfile
//! - Structured JSON logging with tracing

use crate::alerts::AlertEvent;
use crate::forecast::ForecastResult;
use crate::models::{GpuCapability, Sample};
use anyhow::{Context, Result};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for cycle latency (in seconds); a cycle includes the CPU window
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    cycle_latency_seconds: Histogram,
    samples_collected: IntCounter,
    persistence_failures: IntCounter,
    transient_read_failures: IntCounterVec,
    alerts_raised: IntCounterVec,
    forecasts_generated: IntCounter,
    history_length: IntGauge,
    gpu_available: IntGauge,
    gpu_devices: IntGauge,
    last_cpu_percent: Gauge,
    last_memory_percent: Gauge,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "host_telemetry_cycle_latency_seconds",
                "Time spent in one collection cycle, CPU window included",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            samples_collected: register_int_counter!(
                "host_telemetry_samples_collected_total",
                "Total number of samples taken"
            )
            .expect("Failed to register samples_collected"),

            persistence_failures: register_int_counter!(
                "host_telemetry_persistence_failures_total",
                "Total number of failed log appends"
            )
            .expect("Failed to register persistence_failures"),

            transient_read_failures: register_int_counter_vec!(
                "host_telemetry_transient_read_failures_total",
                "Optional readings that were absent for one sample",
                &["metric"]
            )
            .expect("Failed to register transient_read_failures"),

            alerts_raised: register_int_counter_vec!(
                "host_telemetry_alerts_raised_total",
                "Threshold alerts raised, by kind",
                &["kind"]
            )
            .expect("Failed to register alerts_raised"),

            forecasts_generated: register_int_counter!(
                "host_telemetry_forecasts_generated_total",
                "Total number of forecasts produced"
            )
            .expect("Failed to register forecasts_generated"),

            history_length: register_int_gauge!(
                "host_telemetry_history_length",
                "Number of samples currently held in the rolling history"
            )
            .expect("Failed to register history_length"),

            gpu_available: register_int_gauge!(
                "host_telemetry_gpu_available",
                "1 when GPU telemetry was detected at startup"
            )
            .expect("Failed to register gpu_available"),

            gpu_devices: register_int_gauge!(
                "host_telemetry_gpu_devices",
                "Number of GPU devices reported by the provider"
            )
            .expect("Failed to register gpu_devices"),

            last_cpu_percent: register_gauge!(
                "host_telemetry_cpu_usage_percent",
                "CPU utilization of the most recent sample"
            )
            .expect("Failed to register cpu_usage_percent"),

            last_memory_percent: register_gauge!(
                "host_telemetry_memory_usage_percent",
                "Memory utilization of the most recent sample"
            )
            .expect("Failed to register memory_usage_percent"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new)
    }

    /// Record one completed cycle
    pub fn observe_cycle(&self, elapsed: Duration, sample: &Sample, history_len: usize) {
        let inner = self.inner();
        inner.cycle_latency_seconds.observe(elapsed.as_secs_f64());
        inner.samples_collected.inc();
        inner.history_length.set(history_len as i64);
        inner.last_cpu_percent.set(sample.cpu_percent);
        inner.last_memory_percent.set(sample.cpu_memory_percent);
    }

    pub fn set_gpu_capability(&self, capability: &GpuCapability) {
        let inner = self.inner();
        inner.gpu_available.set(i64::from(capability.is_available()));
        inner.gpu_devices.set(i64::from(capability.device_count()));
    }

    pub fn inc_persistence_failures(&self) {
        self.inner().persistence_failures.inc();
    }

    pub fn inc_transient_read_failures(&self, metric: &str) {
        self.inner()
            .transient_read_failures
            .with_label_values(&[metric])
            .inc();
    }

    pub fn inc_alerts_raised(&self, alert: &AlertEvent) {
        let kind = alert.kind.to_string();
        self.inner()
            .alerts_raised
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_forecasts_generated(&self) {
        self.inner().forecasts_generated.inc();
    }

    pub fn samples_collected(&self) -> u64 {
        self.inner().samples_collected.get()
    }

    /// Text exposition of everything in the default registry
    pub fn render_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics exposition is not UTF-8")
    }

    /// Write the exposition for the node-exporter textfile collector
    ///
    /// The file is replaced atomically so a scrape never sees a partial write.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let text = self.render_text()?;
        let temp_path = path.with_extension("prom.tmp");
        std::fs::write(&temp_path, text)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
        Ok(())
    }
}

/// Structured logger for collector events
///
/// Every event carries the host name so logs from several machines can be
/// merged.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Log collector startup
    pub fn log_startup(&self, version: &str, interval: Duration, log_path: &Path) {
        info!(
            event = "collector_started",
            host = %self.host_name,
            version = %version,
            interval_ms = interval.as_millis() as u64,
            log_path = %log_path.display(),
            "Telemetry collector started"
        );
    }

    /// Log the probe outcome; called once per process
    pub fn log_capability(&self, capability: &GpuCapability) {
        match capability.diagnostic() {
            None => info!(
                event = "gpu_capability",
                host = %self.host_name,
                available = true,
                devices = capability.device_count(),
                "GPU telemetry enabled"
            ),
            Some(diagnostic) => warn!(
                event = "gpu_capability",
                host = %self.host_name,
                available = false,
                diagnostic = %diagnostic,
                "GPU telemetry disabled for this run"
            ),
        }
    }

    pub fn log_cycle(&self, cycle: u64, sample: &Sample, elapsed: Duration) {
        debug!(
            event = "cycle_complete",
            host = %self.host_name,
            cycle = cycle,
            cpu_percent = sample.cpu_percent,
            cpu_memory_percent = sample.cpu_memory_percent,
            gpu_percent = ?sample.gpu_percent,
            elapsed_ms = elapsed.as_millis() as u64,
            "Collection cycle complete"
        );
    }

    pub fn log_alert(&self, alert: &AlertEvent) {
        warn!(
            event = "alert_raised",
            host = %self.host_name,
            kind = %alert.kind,
            value = alert.value,
            threshold = alert.threshold,
            timestamp = %alert.timestamp,
            "{}", alert.kind.label()
        );
    }

    pub fn log_persistence_failure(&self, location: &str, error: &str) {
        warn!(
            event = "persistence_failed",
            host = %self.host_name,
            location = %location,
            error = %error,
            "Sample kept in history but not persisted"
        );
    }

    pub fn log_forecast(&self, result: &ForecastResult) {
        match &result.skipped_reason {
            None => info!(
                event = "forecast_generated",
                host = %self.host_name,
                model = %result.model,
                samples_used = result.samples_used,
                predictions = ?result.predictions,
                duration_us = result.duration_us,
                "CPU forecast generated"
            ),
            Some(reason) => debug!(
                event = "forecast_skipped",
                host = %self.host_name,
                model = %result.model,
                samples_used = result.samples_used,
                reason = %reason,
                "CPU forecast skipped"
            ),
        }
    }

    /// Log collector shutdown
    pub fn log_shutdown(&self, reason: &str, cycles: u64) {
        info!(
            event = "collector_shutdown",
            host = %self.host_name,
            reason = %reason,
            cycles = cycles,
            "Telemetry collector shutting down"
        );
    }
}
