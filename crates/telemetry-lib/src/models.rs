//! Core data models for the telemetry collector

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker used wherever an absent reading is rendered as text
pub const NOT_AVAILABLE: &str = "N/A";

/// One timestamped reading of host metrics
///
/// Optional fields are `None` when the underlying capability or sensor was
/// unavailable for this sample. They are only rendered as [`NOT_AVAILABLE`]
/// at the persistence and display boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Local wall-clock time, second resolution
    pub timestamp: NaiveDateTime,
    pub cpu_percent: f64,
    pub cpu_memory_percent: f64,
    pub cpu_temperature_celsius: Option<f64>,
    pub gpu_percent: Option<f64>,
    pub gpu_memory_percent: Option<f64>,
    pub gpu_temperature_celsius: Option<f64>,
}

impl Sample {
    /// Create a CPU-only sample; GPU and temperature fields start absent
    pub fn new(timestamp: NaiveDateTime, cpu_percent: f64, cpu_memory_percent: f64) -> Self {
        Self {
            timestamp,
            cpu_percent,
            cpu_memory_percent,
            cpu_temperature_celsius: None,
            gpu_percent: None,
            gpu_memory_percent: None,
            gpu_temperature_celsius: None,
        }
    }

    /// True when every GPU field is absent
    pub fn gpu_absent(&self) -> bool {
        self.gpu_percent.is_none()
            && self.gpu_memory_percent.is_none()
            && self.gpu_temperature_celsius.is_none()
    }
}

/// Current local time truncated to whole seconds
pub fn now_local_seconds() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Render an optional reading with a unit suffix, or the absent marker
pub fn display_optional(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => NOT_AVAILABLE.to_string(),
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | CPU: {:.1}% | CPU Memory: {:.1}% | CPU Temp: {} | GPU: {} | GPU Memory: {} | GPU Temp: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.cpu_percent,
            self.cpu_memory_percent,
            display_optional(self.cpu_temperature_celsius, "°C"),
            display_optional(self.gpu_percent, "%"),
            display_optional(self.gpu_memory_percent, "%"),
            display_optional(self.gpu_temperature_celsius, "°C"),
        )
    }
}

/// Whether GPU telemetry is usable for this process lifetime
///
/// Produced once by the capability probe and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuCapability {
    available: bool,
    device_count: u32,
    diagnostic: Option<String>,
}

impl GpuCapability {
    pub fn available(device_count: u32) -> Self {
        Self {
            available: true,
            device_count,
            diagnostic: None,
        }
    }

    pub fn unavailable(diagnostic: impl Into<String>) -> Self {
        Self {
            available: false,
            device_count: 0,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn device_count(&self) -> u32 {
        self.device_count
    }

    /// Why the GPU provider could not be used, if it could not
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap()
    }

    #[test]
    fn test_sample_display_marks_absent_fields() {
        let sample = Sample::new(ts(), 12.5, 40.0);
        let line = sample.to_string();

        assert!(line.starts_with("2024-03-01 12:30:05"));
        assert!(line.contains("CPU: 12.5%"));
        assert!(line.contains("GPU: N/A"));
        assert!(line.contains("GPU Temp: N/A"));
        assert!(sample.gpu_absent());
    }

    #[test]
    fn test_sample_display_with_gpu() {
        let mut sample = Sample::new(ts(), 12.5, 40.0);
        sample.gpu_percent = Some(33.0);
        sample.gpu_temperature_celsius = Some(61.0);

        let line = sample.to_string();
        assert!(line.contains("GPU: 33.0%"));
        assert!(line.contains("GPU Temp: 61.0°C"));
        assert!(!sample.gpu_absent());
    }

    #[test]
    fn test_now_local_seconds_has_no_subseconds() {
        use chrono::Timelike;
        assert_eq!(now_local_seconds().nanosecond(), 0);
    }

    #[test]
    fn test_gpu_capability() {
        let available = GpuCapability::available(2);
        assert!(available.is_available());
        assert_eq!(available.device_count(), 2);
        assert!(available.diagnostic().is_none());

        let missing = GpuCapability::unavailable("no devices");
        assert!(!missing.is_available());
        assert_eq!(missing.diagnostic(), Some("no devices"));
    }
}
