//! Host telemetry collector library
//!
//! This crate provides the core functionality for:
//! - GPU capability probing and per-cycle host sampling
//! - A rolling in-memory history for live consumers
//! - Durable CSV persistence of every sample
//! - Threshold alerts and CPU trend forecasting
//! - Health checks and observability

pub mod alerts;
pub mod collector;
pub mod error;
pub mod forecast;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod report;

pub use alerts::{AlertEvaluator, AlertEvent, AlertKind, AlertThresholds};
pub use error::CollectorError;
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthReport};
pub use history::{HistoryBuffer, HistoryReader, HistoryStats};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use persistence::{CsvSink, SampleSink};
pub use report::ConsoleReporter;
