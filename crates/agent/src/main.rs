//! Telemetry Agent - host CPU/GPU telemetry collector
//!
//! Samples the host on a fixed cadence, appends every sample to a CSV log,
//! keeps a rolling history for the forecast consumer and prints a summary
//! line per cycle.

use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry_lib::{
    alerts::AlertEvaluator,
    collector::{self, GpuProbe, MetricSampler, SchedulerBuilder, SysinfoProvider},
    forecast::{ForecastPoller, ForecastResult, LinearTrendForecaster},
    health::{components, HealthRegistry},
    observability::{CollectorMetrics, StructuredLogger},
    persistence::CsvSink,
    report::ConsoleReporter,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs go to stderr, stdout carries the cycle summaries
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::TelemetryConfig::load()?;
    info!(host_name = %config.host_name, "Collector configured");

    let health = HealthRegistry::new();
    health.register(components::PROBE).await;
    health.register(components::SAMPLER).await;
    health.register(components::PERSISTENCE).await;
    if config.forecast_enabled {
        health.register(components::FORECAST).await;
    }

    let metrics = CollectorMetrics::new();
    let logger = StructuredLogger::new(&config.host_name);

    let probe = if config.disable_gpu {
        GpuProbe::disabled("disabled by configuration")
    } else {
        tokio::task::spawn_blocking(collector::probe)
            .await
            .context("GPU probe task failed")?
    };
    logger.log_capability(probe.capability());
    metrics.set_gpu_capability(probe.capability());
    if let Some(diagnostic) = probe.capability().diagnostic() {
        health.set_degraded(components::PROBE, diagnostic).await;
    }

    let mut reporter = ConsoleReporter::new(std::io::stdout());
    reporter.capability(probe.capability())?;

    let sink = CsvSink::ensure_initialized(&config.log_path)
        .with_context(|| format!("Failed to open log {}", config.log_path.display()))?
        .with_sync_each_append(config.fsync_each_append);

    let sampler = MetricSampler::new(Arc::new(SysinfoProvider::new()), &probe)
        .with_cpu_window(config.cpu_window())
        .with_cpu_sensor_keys(config.cpu_sensor_keys.clone());

    let scheduler_config = config.scheduler_config();
    let (scheduler, mut reports) = SchedulerBuilder::new()
        .sampler(sampler)
        .sink(Box::new(sink))
        .evaluator(AlertEvaluator::new(config.alert_thresholds()))
        .interval(scheduler_config.interval)
        .history_capacity(scheduler_config.history_capacity)
        .max_cycles(scheduler_config.max_cycles)
        .logger(logger.clone())
        .health(health.clone())
        .build()?;
    let history = scheduler.history();

    logger.log_startup(AGENT_VERSION, config.interval(), &config.log_path);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let mut forecasts = if config.forecast_enabled {
        let (poller, rx) = ForecastPoller::new(
            history,
            Arc::new(LinearTrendForecaster::new()),
            config.forecast_config(),
        );
        tokio::spawn(poller.run(shutdown_tx.subscribe()));
        Some(rx)
    } else {
        None
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cycles = 0u64;

    let joined = loop {
        tokio::select! {
            Some(report) = reports.recv() => {
                cycles = report.cycle;
                if let Err(e) = reporter.cycle(&report) {
                    warn!(error = %e, "Failed to print cycle summary");
                }
                if let Some(path) = &config.metrics_textfile {
                    if let Err(e) = metrics.write_textfile(path) {
                        warn!(error = %e, path = %path.display(), "Failed to write metrics textfile");
                    }
                }
            }
            Some(result) = next_forecast(&mut forecasts) => {
                handle_forecast(&result, &logger, &metrics, &health).await;
                if let Err(e) = reporter.forecast(&result) {
                    warn!(error = %e, "Failed to print forecast");
                }
            }
            joined = &mut scheduler_handle => {
                break joined;
            }
            _ = &mut ctrl_c => {
                info!("Interrupt received, finishing current cycle");
                let _ = shutdown_tx.send(());
                break (&mut scheduler_handle).await;
            }
        }
    };

    // Stop the forecast poller if the scheduler ended on its own
    let _ = shutdown_tx.send(());

    while let Ok(report) = reports.try_recv() {
        cycles = report.cycle;
        if let Err(e) = reporter.cycle(&report) {
            warn!(error = %e, "Failed to print cycle summary");
        }
    }

    let outcome = joined.context("Scheduler task panicked")?;
    let final_health = health.health().await;
    match serde_json::to_string(&final_health) {
        Ok(report) => info!(
            status = ?final_health.status,
            attention = ?final_health.attention(),
            report = %report,
            "Final health report"
        ),
        Err(e) => warn!(error = %e, "Failed to serialize health report"),
    }

    match outcome {
        Ok(reason) => {
            logger.log_shutdown(&reason.to_string(), cycles);
            Ok(())
        }
        Err(e) => {
            logger.log_shutdown("host metrics failure", cycles);
            Err(e).context("Collection stopped")
        }
    }
}

async fn next_forecast(
    forecasts: &mut Option<mpsc::Receiver<ForecastResult>>,
) -> Option<ForecastResult> {
    match forecasts {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_forecast(
    result: &ForecastResult,
    logger: &StructuredLogger,
    metrics: &CollectorMetrics,
    health: &HealthRegistry,
) {
    logger.log_forecast(result);
    match &result.skipped_reason {
        None => {
            metrics.inc_forecasts_generated();
            health.set_healthy(components::FORECAST).await;
        }
        Some(reason) if reason.starts_with("Forecast failed") => {
            health.set_degraded(components::FORECAST, reason.clone()).await;
        }
        Some(_) => {}
    }
}
