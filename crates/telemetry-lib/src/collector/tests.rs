//! End-to-end collection scenarios
//!
//! These tests drive the scheduler against mock providers and a real CSV log
//! in a temporary directory.

#[cfg(test)]
mod scheduler_scenarios {
    use crate::alerts::{AlertEvaluator, AlertKind, AlertThresholds};
    use crate::collector::{
        async_trait, probe_with, GpuBackend, GpuProbe, MetricSampler, OsMetricsProvider,
        SchedulerBuilder, SensorReadings, StopReason, NO_DEVICES,
    };
    use crate::error::CollectorError;
    use crate::forecast::{ForecastConfig, ForecastPoller, LinearTrendForecaster};
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::models::{Sample, NOT_AVAILABLE};
    use crate::persistence::{read_log, CsvSink, SampleSink, HEADER};
    use crate::report::ConsoleReporter;
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    /// CPU usage equals the call number; fails from call `fail_from` on
    struct ScriptedOs {
        calls: AtomicUsize,
        fail_from: Option<usize>,
    }

    impl ScriptedOs {
        fn counting() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_from: None,
            })
        }

        fn failing_from(call: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_from: Some(call),
            })
        }
    }

    #[async_trait]
    impl OsMetricsProvider for ScriptedOs {
        async fn cpu_percent(&self, _window: Duration) -> Result<f64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_from.map(|n| call >= n).unwrap_or(false) {
                bail!("/proc/stat unreadable");
            }
            Ok(call as f64)
        }

        async fn virtual_memory_percent(&self) -> Result<f64> {
            Ok(85.0)
        }

        async fn sensor_temperatures(&self) -> Result<SensorReadings> {
            let mut sensors = SensorReadings::new();
            sensors.insert("coretemp".to_string(), vec![51.0]);
            Ok(sensors)
        }
    }

    /// GPU library that initializes but reports no devices
    struct EmptyGpu {
        reads: Arc<AtomicUsize>,
    }

    impl GpuBackend for EmptyGpu {
        fn device_count(&self) -> Result<u32> {
            Ok(0)
        }
        fn utilization(&self, _index: u32) -> Result<f64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(10.0)
        }
        fn memory_info(&self, _index: u32) -> Result<(u64, u64)> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok((1, 2))
        }
        fn temperature(&self, _index: u32) -> Result<f64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(40.0)
        }
    }

    /// Wraps a CSV sink and fails while the switch is on
    struct SwitchableSink {
        inner: CsvSink,
        failing: Arc<AtomicBool>,
    }

    impl SampleSink for SwitchableSink {
        fn append(&mut self, sample: &Sample) -> Result<(), CollectorError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CollectorError::Persistence {
                    path: self.inner.path().to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.append(sample)
        }

        fn describe(&self) -> String {
            self.inner.describe()
        }
    }

    fn cpu_only(os: Arc<ScriptedOs>) -> MetricSampler {
        MetricSampler::new(os, &GpuProbe::disabled(NO_DEVICES)).with_cpu_window(Duration::ZERO)
    }

    fn csv_sink(dir: &TempDir) -> CsvSink {
        CsvSink::ensure_initialized(dir.path().join("system_monitor.csv"))
            .unwrap()
            .with_sync_each_append(false)
    }

    #[tokio::test]
    async fn test_history_keeps_last_fifty_of_seventy_five() {
        let dir = TempDir::new().unwrap();
        let sink = csv_sink(&dir);
        let log_path = sink.path().to_path_buf();

        let (scheduler, _rx) = SchedulerBuilder::new()
            .sampler(cpu_only(ScriptedOs::counting()))
            .sink(Box::new(sink))
            .interval(Duration::from_millis(1))
            .history_capacity(50)
            .max_cycles(Some(75))
            .report_buffer(128)
            .build()
            .unwrap();
        let history = scheduler.history();

        let (_tx, shutdown) = broadcast::channel(1);
        assert_eq!(scheduler.run(shutdown).await.unwrap(), StopReason::CycleLimit);

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot[0].cpu_percent, 26.0);
        assert_eq!(snapshot[49].cpu_percent, 75.0);
        assert!(snapshot
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));

        let logged = read_log(&log_path).unwrap();
        assert_eq!(logged.len(), 75);
        assert_eq!(logged[0].cpu_percent, 1.0);
        assert_eq!(&logged[25..], &snapshot[..]);
    }

    #[tokio::test]
    async fn test_no_gpu_devices_runs_cpu_only() {
        let dir = TempDir::new().unwrap();
        let sink = csv_sink(&dir);
        let log_path = sink.path().to_path_buf();
        let reads = Arc::new(AtomicUsize::new(0));

        let probe = {
            let reads = Arc::clone(&reads);
            probe_with(move || Ok(Arc::new(EmptyGpu { reads }) as Arc<dyn GpuBackend>))
        };
        assert_eq!(probe.capability().diagnostic(), Some(NO_DEVICES));

        let mut reporter = ConsoleReporter::new(Vec::new());
        reporter.capability(probe.capability()).unwrap();

        let sampler = MetricSampler::new(ScriptedOs::counting(), &probe)
            .with_cpu_window(Duration::ZERO);
        let (scheduler, mut rx) = SchedulerBuilder::new()
            .sampler(sampler)
            .sink(Box::new(sink))
            .interval(Duration::from_millis(1))
            .max_cycles(Some(3))
            .build()
            .unwrap();

        let (_tx, shutdown) = broadcast::channel(1);
        scheduler.run(shutdown).await.unwrap();

        while let Ok(report) = rx.try_recv() {
            reporter.capability(probe.capability()).unwrap();
            reporter.cycle(&report).unwrap();
        }

        assert_eq!(reads.load(Ordering::SeqCst), 0);

        let text = std::fs::read_to_string(&log_path).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 3);
        for row in rows {
            let fields: Vec<&str> = row.split(',').collect();
            assert_eq!(fields.len(), HEADER.len());
            assert_eq!(fields[3], "51");
            assert_eq!(&fields[4..], &[NOT_AVAILABLE; 3]);
        }

        let console = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(console.matches("GPU Not Found: no devices").count(), 1);
        assert_eq!(console.matches("GPU: N/A").count(), 3);
        assert_eq!(console.matches("ALERT: High CPU Memory Usage!").count(), 3);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_sampling() {
        let dir = TempDir::new().unwrap();
        let failing = Arc::new(AtomicBool::new(true));
        let sink = SwitchableSink {
            inner: csv_sink(&dir),
            failing: Arc::clone(&failing),
        };
        let log_path = sink.inner.path().to_path_buf();
        let health = HealthRegistry::new();
        health.register(components::PERSISTENCE).await;

        let (mut scheduler, _rx) = SchedulerBuilder::new()
            .sampler(cpu_only(ScriptedOs::counting()))
            .sink(Box::new(sink))
            .health(health.clone())
            .build()
            .unwrap();

        let first = scheduler.run_cycle().await.unwrap();
        assert!(first.persist_error.unwrap().contains("disk full"));
        assert_eq!(first.history_len, 1);
        assert_eq!(
            health.status(components::PERSISTENCE).await,
            Some(ComponentStatus::Degraded)
        );

        failing.store(false, Ordering::SeqCst);
        let second = scheduler.run_cycle().await.unwrap();
        assert!(second.persist_error.is_none());
        assert_eq!(second.history_len, 2);
        assert_eq!(
            health.status(components::PERSISTENCE).await,
            Some(ComponentStatus::Healthy)
        );

        let logged = read_log(&log_path).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].cpu_percent, 2.0);
    }

    #[tokio::test]
    async fn test_host_failure_stops_scheduler() {
        let dir = TempDir::new().unwrap();
        let sink = csv_sink(&dir);
        let log_path = sink.path().to_path_buf();
        let health = HealthRegistry::new();

        let (scheduler, _rx) = SchedulerBuilder::new()
            .sampler(cpu_only(ScriptedOs::failing_from(3)))
            .sink(Box::new(sink))
            .interval(Duration::from_millis(1))
            .health(health.clone())
            .build()
            .unwrap();
        let history = scheduler.history();

        let (_tx, shutdown) = broadcast::channel(1);
        let err = scheduler.run(shutdown).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(history.len(), 2);
        assert_eq!(read_log(&log_path).unwrap().len(), 2);
        assert_eq!(
            health.status(components::SAMPLER).await,
            Some(ComponentStatus::Unhealthy)
        );
    }

    #[tokio::test]
    async fn test_alerts_follow_thresholds() {
        let dir = TempDir::new().unwrap();
        let evaluator = AlertEvaluator::new(AlertThresholds {
            cpu_percent: 1.5,
            cpu_memory_percent: 90.0,
            ..AlertThresholds::default()
        });

        let (mut scheduler, _rx) = SchedulerBuilder::new()
            .sampler(cpu_only(ScriptedOs::counting()))
            .sink(Box::new(csv_sink(&dir)))
            .evaluator(evaluator)
            .build()
            .unwrap();

        assert!(scheduler.run_cycle().await.unwrap().alerts.is_empty());
        let alerts = scheduler.run_cycle().await.unwrap().alerts;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CpuHigh);
    }

    #[tokio::test]
    async fn test_forecast_reads_history_while_running() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _rx) = SchedulerBuilder::new()
            .sampler(cpu_only(ScriptedOs::counting()))
            .sink(Box::new(csv_sink(&dir)))
            .interval(Duration::from_millis(1))
            .max_cycles(Some(20))
            .build()
            .unwrap();

        let (poller, _forecasts) = ForecastPoller::new(
            scheduler.history(),
            Arc::new(LinearTrendForecaster::new()),
            ForecastConfig::default(),
        );

        let early = poller.poll_once();
        assert_eq!(early.samples_used, 0);
        assert!(early.skipped_reason.is_some());

        let (_tx, shutdown) = broadcast::channel(1);
        scheduler.run(shutdown).await.unwrap();

        let result = poller.poll_once();
        assert_eq!(result.samples_used, 20);
        assert!(result.skipped_reason.is_none());
        assert_eq!(result.predictions.len(), 5);
        assert!((result.predictions[0] - 21.0).abs() < 1e-6);
    }
}
