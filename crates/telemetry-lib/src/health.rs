//! Health tracking for the collector components
//!
//! The scheduler and the forecast consumer report their state here; the
//! agent logs the final report on shutdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names for health tracking
pub mod components {
    /// GPU capability probe
    pub const PROBE: &str = "probe";
    /// Mandatory CPU and memory reads
    pub const SAMPLER: &str = "sampler";
    /// Append-only sample log
    pub const PERSISTENCE: &str = "persistence";
    /// History-polling forecast consumer
    pub const FORECAST: &str = "forecast";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Working normally
    Healthy,
    /// Failing but sampling continues (e.g. the log is not writable)
    Degraded,
    /// Sampling cannot continue
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if sampling can go on with this component in this state
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last status change
    pub since: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Snapshot of every registered component, ordered by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    /// Worst status across all components; an empty registry is healthy
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }

    /// Names of components that are not healthy
    pub fn attention(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, h)| h.status != ComponentStatus::Healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Shared component health, cloned into the scheduler and the forecast task
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Status of one component, if registered
    pub async fn status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.read().await.get(name).map(|h| h.status)
    }

    pub async fn health(&self) -> HealthReport {
        let components = self.components.read().await.clone();
        let status = HealthReport::compute_status(&components);
        HealthReport { status, components }
    }
}
