//! Threshold alerts over single samples
//!
//! Evaluation is a pure function of one sample: no history, no
//! deduplication. Absent readings never fire.

use crate::models::Sample;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default threshold for every metric, in percent
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;

/// Which metric crossed its threshold
///
/// Variant order is the order alerts are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    CpuHigh,
    MemoryHigh,
    GpuHigh,
    GpuMemoryHigh,
}

impl AlertKind {
    /// Short label used in console output
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::CpuHigh => "High CPU Usage",
            AlertKind::MemoryHigh => "High CPU Memory Usage",
            AlertKind::GpuHigh => "High GPU Usage",
            AlertKind::GpuMemoryHigh => "High GPU Memory Usage",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::CpuHigh => write!(f, "CPU_HIGH"),
            AlertKind::MemoryHigh => write!(f, "MEMORY_HIGH"),
            AlertKind::GpuHigh => write!(f, "GPU_HIGH"),
            AlertKind::GpuMemoryHigh => write!(f, "GPU_MEMORY_HIGH"),
        }
    }
}

/// A metric crossed its threshold in one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALERT: {}! ({:.1}% > {:.0}%)",
            self.kind.label(),
            self.value,
            self.threshold
        )
    }
}

/// Threshold per metric; `None` disables the GPU checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub cpu_percent: f64,
    pub cpu_memory_percent: f64,
    pub gpu_percent: Option<f64>,
    pub gpu_memory_percent: Option<f64>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: DEFAULT_THRESHOLD_PERCENT,
            cpu_memory_percent: DEFAULT_THRESHOLD_PERCENT,
            gpu_percent: Some(DEFAULT_THRESHOLD_PERCENT),
            gpu_memory_percent: Some(DEFAULT_THRESHOLD_PERCENT),
        }
    }
}

/// Stateless threshold checker
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Alerts for one sample, in CPU, CPU memory, GPU, GPU memory order
    pub fn evaluate(&self, sample: &Sample) -> Vec<AlertEvent> {
        let t = &self.thresholds;
        let checks = [
            (AlertKind::CpuHigh, Some(sample.cpu_percent), Some(t.cpu_percent)),
            (
                AlertKind::MemoryHigh,
                Some(sample.cpu_memory_percent),
                Some(t.cpu_memory_percent),
            ),
            (AlertKind::GpuHigh, sample.gpu_percent, t.gpu_percent),
            (
                AlertKind::GpuMemoryHigh,
                sample.gpu_memory_percent,
                t.gpu_memory_percent,
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(kind, value, threshold)| match (value, threshold) {
                (Some(value), Some(threshold)) if value > threshold => Some(AlertEvent {
                    kind,
                    value,
                    threshold,
                    timestamp: sample.timestamp,
                }),
                _ => None,
            })
            .collect()
    }
}
