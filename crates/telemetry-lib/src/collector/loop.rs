//! Collection scheduler
//!
//! Drives one cycle per interval: sample, push to history, persist, evaluate
//! alerts, report. Cycles never overlap and the scheduler is the only writer
//! of the history and the log.

use super::MetricSampler;
use crate::alerts::{AlertEvaluator, AlertEvent};
use crate::error::CollectorError;
use crate::health::{components, HealthRegistry};
use crate::history::{HistoryBuffer, HistoryReader, DEFAULT_HISTORY_CAPACITY};
use crate::models::Sample;
use crate::observability::{CollectorMetrics, StructuredLogger};
use crate::persistence::SampleSink;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Start-to-start period between cycles (default: 2 seconds)
    pub interval: Duration,
    /// Stop after this many cycles; unbounded when `None`
    pub max_cycles: Option<u64>,
    /// Number of samples kept in the rolling history
    pub history_capacity: usize,
    /// Channel buffer size for cycle reports
    pub report_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_cycles: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            report_buffer: 64,
        }
    }
}

/// Why the scheduler returned without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Cancelled,
    /// `max_cycles` was reached
    CycleLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::CycleLimit => write!(f, "cycle limit reached"),
        }
    }
}

/// Outcome of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub sample: Sample,
    pub alerts: Vec<AlertEvent>,
    /// Set when the sample could not be appended to the log
    pub persist_error: Option<String>,
    /// History length after the push
    pub history_len: usize,
    pub elapsed: Duration,
}

/// Periodic driver of the collection cycle
pub struct Scheduler {
    sampler: MetricSampler,
    history: HistoryBuffer,
    sink: Box<dyn SampleSink>,
    evaluator: AlertEvaluator,
    config: SchedulerConfig,
    report_tx: mpsc::Sender<CycleReport>,
    metrics: CollectorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    cycles: u64,
    persistence_failing: bool,
}

impl Scheduler {
    /// Create a new scheduler and the receiving end of its cycle reports
    pub fn new(
        sampler: MetricSampler,
        sink: Box<dyn SampleSink>,
        evaluator: AlertEvaluator,
        config: SchedulerConfig,
    ) -> (Self, mpsc::Receiver<CycleReport>) {
        let (report_tx, report_rx) = mpsc::channel(config.report_buffer.max(1));

        let scheduler = Self {
            sampler,
            history: HistoryBuffer::new(config.history_capacity),
            sink,
            evaluator,
            config,
            report_tx,
            metrics: CollectorMetrics::new(),
            logger: StructuredLogger::new("localhost"),
            health: None,
            cycles: 0,
            persistence_failing: false,
        };

        (scheduler, report_rx)
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Read-only handle to the rolling history
    pub fn history(&self) -> HistoryReader {
        self.history.reader()
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run cycles until shutdown, the cycle limit or a fatal host failure
    ///
    /// A cycle that has started always completes before shutdown is observed,
    /// so the log never receives a partial row.
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<StopReason, CollectorError> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            cpu_window_ms = self.sampler.cpu_window().as_millis() as u64,
            history_capacity = self.history.capacity(),
            sink = %self.sink.describe(),
            "Starting collection scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            if let Some(max) = self.config.max_cycles {
                if self.cycles >= max {
                    break StopReason::CycleLimit;
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    break StopReason::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, cycles = self.cycles, "Stopping scheduler after host failure");
                        return Err(e);
                    }
                }
            }
        };

        let stats = self.history.stats();
        info!(
            reason = %reason,
            cycles = self.cycles,
            history_entries = stats.entries,
            newest_sample = ?stats.newest_timestamp,
            "Collection scheduler stopped"
        );
        Ok(reason)
    }

    /// Execute one full cycle
    ///
    /// Persistence failures are recorded in the report and do not fail the
    /// cycle; only a fatal host failure does, and then nothing is recorded.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CollectorError> {
        let start = Instant::now();

        let sample = match self.sampler.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                if let Some(health) = &self.health {
                    health.set_unhealthy(components::SAMPLER, e.to_string()).await;
                }
                return Err(e);
            }
        };

        self.history.push(sample.clone());
        let persist_error = self.persist(&sample).await;

        let alerts = self.evaluator.evaluate(&sample);
        for alert in &alerts {
            self.logger.log_alert(alert);
            self.metrics.inc_alerts_raised(alert);
        }

        self.cycles += 1;
        let elapsed = start.elapsed();
        let history_len = self.history.len();
        self.metrics.observe_cycle(elapsed, &sample, history_len);
        self.logger.log_cycle(self.cycles, &sample, elapsed);

        let report = CycleReport {
            cycle: self.cycles,
            sample,
            alerts,
            persist_error,
            history_len,
            elapsed,
        };
        self.emit(report.clone());

        Ok(report)
    }

    async fn persist(&mut self, sample: &Sample) -> Option<String> {
        match self.sink.append(sample) {
            Ok(()) => {
                if self.persistence_failing {
                    self.persistence_failing = false;
                    info!(sink = %self.sink.describe(), "Log appends recovered");
                    if let Some(health) = &self.health {
                        health.set_healthy(components::PERSISTENCE).await;
                    }
                }
                None
            }
            Err(e) => {
                let message = e.to_string();
                self.persistence_failing = true;
                self.logger
                    .log_persistence_failure(&self.sink.describe(), &message);
                self.metrics.inc_persistence_failures();
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::PERSISTENCE, message.clone())
                        .await;
                }
                Some(message)
            }
        }
    }

    /// Hand the report to the consumer without stalling the cadence
    fn emit(&self, report: CycleReport) {
        match self.report_tx.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                warn!(cycle = report.cycle, "Report consumer is behind, dropping cycle report");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Report receiver dropped");
            }
        }
    }
}

/// Builder for creating the scheduler
pub struct SchedulerBuilder {
    sampler: Option<MetricSampler>,
    sink: Option<Box<dyn SampleSink>>,
    evaluator: AlertEvaluator,
    config: SchedulerConfig,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl SchedulerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sampler: None,
            sink: None,
            evaluator: AlertEvaluator::default(),
            config: SchedulerConfig::default(),
            logger: None,
            health: None,
        }
    }

    pub fn sampler(mut self, sampler: MetricSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn sink(mut self, sink: Box<dyn SampleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn evaluator(mut self, evaluator: AlertEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Set the start-to-start interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.config.max_cycles = max_cycles;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn report_buffer(mut self, size: usize) -> Self {
        self.config.report_buffer = size;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<(Scheduler, mpsc::Receiver<CycleReport>)> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Sink is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Interval must be greater than zero");
        }

        let (mut scheduler, rx) = Scheduler::new(sampler, sink, self.evaluator, self.config);
        if let Some(logger) = self.logger {
            scheduler = scheduler.with_logger(logger);
        }
        if let Some(health) = self.health {
            scheduler = scheduler.with_health(health);
        }

        Ok((scheduler, rx))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
