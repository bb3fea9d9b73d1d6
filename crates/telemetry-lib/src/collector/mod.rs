//! Host metrics collection
//!
//! This module provides the provider seams the collector reads through,
//! their production implementations (sysinfo for CPU, memory and sensors;
//! NVML for the GPU), the one-shot GPU capability probe, the per-cycle
//! sampler and the scheduler loop that drives everything.

mod nvml;
mod probe;
mod sampler;
mod system;
mod r#loop;

#[cfg(test)]
mod tests;

pub use nvml::NvmlBackend;
pub use probe::{probe, probe_with, GpuProbe, NO_DEVICES};
pub use r#loop::{CycleReport, Scheduler, SchedulerBuilder, SchedulerConfig, StopReason};
pub use sampler::{lookup_sensor, MetricSampler, DEFAULT_CPU_SENSOR_KEYS, DEFAULT_CPU_WINDOW};
pub use system::SysinfoProvider;

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

pub use async_trait::async_trait;

/// Sensor name to list of readings in degrees Celsius
pub type SensorReadings = HashMap<String, Vec<f64>>;

/// Trait for reading host CPU, memory and sensor counters
#[async_trait]
pub trait OsMetricsProvider: Send + Sync {
    /// CPU utilization percent measured over `window`; blocks for the window
    async fn cpu_percent(&self, window: Duration) -> Result<f64>;

    /// Used share of physical memory, in percent
    async fn virtual_memory_percent(&self) -> Result<f64>;

    /// Temperature sensors grouped by sensor name
    async fn sensor_temperatures(&self) -> Result<SensorReadings>;
}

/// Trait for an initialized GPU metrics library
///
/// Every call is fallible per cycle; the sampler degrades failures to
/// absent readings.
pub trait GpuBackend: Send + Sync {
    fn device_count(&self) -> Result<u32>;

    /// Utilization percent of device `index`
    fn utilization(&self, index: u32) -> Result<f64>;

    /// (used, total) memory of device `index`, in bytes
    fn memory_info(&self, index: u32) -> Result<(u64, u64)>;

    /// Core temperature of device `index`, in degrees Celsius
    fn temperature(&self, index: u32) -> Result<f64>;
}
