//! Human-readable console output for the collector
//!
//! One capability line at startup, then one summary line per cycle followed
//! by its alert lines.

use crate::collector::CycleReport;
use crate::forecast::ForecastResult;
use crate::models::GpuCapability;
use std::io::{self, Write};

/// Writes cycle summaries to any [`Write`] target (stdout in the agent)
pub struct ConsoleReporter<W: Write> {
    out: W,
    capability_printed: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            capability_printed: false,
        }
    }

    /// Print the probe outcome; only the first call writes anything
    pub fn capability(&mut self, capability: &GpuCapability) -> io::Result<()> {
        if self.capability_printed {
            return Ok(());
        }
        self.capability_printed = true;

        match capability.diagnostic() {
            Some(diagnostic) => writeln!(self.out, "GPU Not Found: {}", diagnostic)?,
            None => writeln!(
                self.out,
                "GPU detected: {} device(s)",
                capability.device_count()
            )?,
        }
        self.out.flush()
    }

    pub fn cycle(&mut self, report: &CycleReport) -> io::Result<()> {
        writeln!(self.out, "{}", report.sample)?;
        for alert in &report.alerts {
            writeln!(self.out, "{}", alert)?;
        }
        if let Some(error) = &report.persist_error {
            writeln!(self.out, "WARNING: sample not saved: {}", error)?;
        }
        self.out.flush()
    }

    pub fn forecast(&mut self, result: &ForecastResult) -> io::Result<()> {
        if result.predictions.is_empty() {
            return Ok(());
        }
        let values: Vec<String> = result
            .predictions
            .iter()
            .map(|v| format!("{:.1}%", v))
            .collect();
        writeln!(
            self.out,
            "CPU forecast ({}, next {}): {}",
            result.model,
            values.len(),
            values.join(", ")
        )?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertEvent, AlertKind};
    use crate::models::Sample;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn report(alerts: Vec<AlertEvent>, persist_error: Option<String>) -> CycleReport {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 5)
            .unwrap();
        CycleReport {
            cycle: 1,
            sample: Sample::new(timestamp, 95.0, 40.0),
            alerts,
            persist_error,
            history_len: 1,
            elapsed: Duration::from_millis(1000),
        }
    }

    fn output(reporter: ConsoleReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_capability_printed_once() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        let capability = GpuCapability::unavailable("no devices");
        reporter.capability(&capability).unwrap();
        reporter.capability(&capability).unwrap();

        assert_eq!(output(reporter), "GPU Not Found: no devices\n");
    }

    #[test]
    fn test_capability_available() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        reporter.capability(&GpuCapability::available(2)).unwrap();
        assert_eq!(output(reporter), "GPU detected: 2 device(s)\n");
    }

    #[test]
    fn test_cycle_with_alert() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        let r = report(
            vec![AlertEvent {
                kind: AlertKind::CpuHigh,
                value: 95.0,
                threshold: 80.0,
                timestamp: report(vec![], None).sample.timestamp,
            }],
            None,
        );
        reporter.cycle(&r).unwrap();

        let text = output(reporter);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2024-03-01 12:00:05 | CPU: 95.0%"));
        assert_eq!(lines[1], "ALERT: High CPU Usage! (95.0% > 80%)");
    }

    #[test]
    fn test_cycle_with_persist_error() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        reporter
            .cycle(&report(vec![], Some("disk full".to_string())))
            .unwrap();
        assert!(output(reporter).contains("WARNING: sample not saved: disk full"));
    }

    #[test]
    fn test_skipped_forecast_prints_nothing() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        let result = ForecastResult {
            generated_at: report(vec![], None).sample.timestamp,
            model: "linear-trend".to_string(),
            samples_used: 3,
            predictions: vec![],
            skipped_reason: Some("Insufficient data".to_string()),
            duration_us: 4,
        };
        reporter.forecast(&result).unwrap();
        assert!(output(reporter).is_empty());
    }
}
