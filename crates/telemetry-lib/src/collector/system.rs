//! sysinfo-backed host metrics
//!
//! - CPU usage is the delta between two refreshes spaced one window apart
//! - memory percent follows the `(total - available) / total` convention
//! - sensor names are the first word of the component label (`coretemp`,
//!   `k10temp`, `cpu_thermal`, ...)

use super::{async_trait, OsMetricsProvider, SensorReadings};
use anyhow::{bail, Result};
use std::time::Duration;
use sysinfo::{ComponentExt, CpuExt, System, SystemExt};
use tokio::sync::Mutex;

/// Host metrics provider backed by the sysinfo crate
pub struct SysinfoProvider {
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_components_list();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Group component readings by sensor name
    pub fn group_sensors<'a, I>(labelled: I) -> SensorReadings
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let mut sensors = SensorReadings::new();
        for (label, celsius) in labelled {
            if !celsius.is_finite() {
                continue;
            }
            let name = label.split_whitespace().next().unwrap_or(label);
            sensors
                .entry(name.to_string())
                .or_default()
                .push(celsius as f64);
        }
        sensors
    }

    /// Used memory percent from total and available bytes
    pub fn memory_percent(total: u64, available: u64) -> Result<f64> {
        if total == 0 {
            bail!("total memory reported as zero");
        }
        let used = total.saturating_sub(available);
        Ok(used as f64 / total as f64 * 100.0)
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsMetricsProvider for SysinfoProvider {
    async fn cpu_percent(&self, window: Duration) -> Result<f64> {
        if !System::IS_SUPPORTED {
            bail!("sysinfo does not support this platform");
        }

        let mut system = self.system.lock().await;
        system.refresh_cpu();
        tokio::time::sleep(window).await;
        system.refresh_cpu();

        if system.cpus().is_empty() {
            bail!("no CPUs reported by the host");
        }
        let usage = system.global_cpu_info().cpu_usage() as f64;
        if !usage.is_finite() {
            bail!("CPU usage reading is not a number");
        }
        Ok(usage.clamp(0.0, 100.0))
    }

    async fn virtual_memory_percent(&self) -> Result<f64> {
        let mut system = self.system.lock().await;
        system.refresh_memory();
        Self::memory_percent(system.total_memory(), system.available_memory())
    }

    async fn sensor_temperatures(&self) -> Result<SensorReadings> {
        let mut system = self.system.lock().await;
        system.refresh_components();
        Ok(Self::group_sensors(
            system
                .components()
                .iter()
                .map(|c| (c.label(), c.temperature())),
        ))
    }
}
