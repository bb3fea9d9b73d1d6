//! Durable append-only sample log
//!
//! Every sample becomes one CSV row. The header is written once when the
//! file is missing or empty; an existing file is never truncated or
//! rewritten. Each append opens the file, writes one row, flushes and
//! closes it again, so at most one row is in flight at any time.
//!
//! A crash mid-append can leave a torn row without its newline. Reopening
//! the log terminates that fragment with a single appended `\n`, and the
//! reader skips torn rows wherever they sit.

use crate::error::CollectorError;
use crate::models::{Sample, NOT_AVAILABLE};
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column names, in row order
pub const HEADER: [&str; 7] = [
    "Timestamp",
    "CPU_Usage",
    "CPU_Memory_Usage",
    "CPU_Temperature",
    "GPU_Usage",
    "GPU_Memory_Usage",
    "GPU_Temperature",
];

/// Timestamp column format (local wall clock)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Destination for every sample taken by the scheduler
pub trait SampleSink: Send {
    /// Durably record one sample
    fn append(&mut self, sample: &Sample) -> Result<(), CollectorError>;

    /// Human-readable location, used in logs
    fn describe(&self) -> String;
}

/// The header row as written to disk
pub fn header_line() -> String {
    HEADER.join(",")
}

/// Append-only CSV log on local storage
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    sync_each_append: bool,
}

impl CsvSink {
    /// Open the log at `path`, writing the header if the file is missing or empty
    ///
    /// Calling this again on an initialized file is a no-op, except that a
    /// file not ending in a newline gets one appended. A non-empty file
    /// whose first line is not the expected header is rejected.
    pub fn ensure_initialized(path: impl Into<PathBuf>) -> Result<Self, CollectorError> {
        let path = path.into();
        let io_err = |source| CollectorError::Persistence {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let existing_len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(io_err(e)),
        };

        if existing_len == 0 {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(io_err)?;
            let mut header = header_line();
            header.push('\n');
            file.write_all(header.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
            info!(path = %path.display(), "Created telemetry log");
        } else {
            let mut file = File::open(&path).map_err(io_err)?;
            let mut first = String::new();
            BufReader::new(&mut file)
                .read_line(&mut first)
                .map_err(io_err)?;
            let found = first.trim_end_matches(['\r', '\n']);
            if found != header_line() {
                return Err(CollectorError::LogSchemaMismatch {
                    path,
                    found: found.to_string(),
                });
            }

            if !ends_with_newline(&mut file).map_err(io_err)? {
                let mut log = OpenOptions::new().append(true).open(&path).map_err(io_err)?;
                log.write_all(b"\n").map_err(io_err)?;
                log.sync_all().map_err(io_err)?;
                warn!(path = %path.display(), "Terminated torn trailing row in telemetry log");
            }
            debug!(path = %path.display(), bytes = existing_len, "Reusing existing telemetry log");
        }

        Ok(Self {
            path,
            sync_each_append: true,
        })
    }

    /// Choose whether each append is followed by `sync_data`
    pub fn with_sync_each_append(mut self, sync: bool) -> Self {
        self.sync_each_append = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(&self, sample: &Sample) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let mut row = format_row(sample);
        row.push('\n');
        file.write_all(row.as_bytes())?;
        file.flush()?;
        if self.sync_each_append {
            file.sync_data()?;
        }
        Ok(())
    }
}

impl SampleSink for CsvSink {
    fn append(&mut self, sample: &Sample) -> Result<(), CollectorError> {
        self.write_row(sample)
            .map_err(|source| CollectorError::Persistence {
                path: self.path.clone(),
                source,
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.seek(SeekFrom::End(0))? == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn format_optional(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Serialize a sample as one CSV row without the trailing newline
pub fn format_row(sample: &Sample) -> String {
    [
        sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        sample.cpu_percent.to_string(),
        sample.cpu_memory_percent.to_string(),
        format_optional(sample.cpu_temperature_celsius),
        format_optional(sample.gpu_percent),
        format_optional(sample.gpu_memory_percent),
        format_optional(sample.gpu_temperature_celsius),
    ]
    .join(",")
}

fn parse_required(field: &str, column: &str) -> Result<f64> {
    field
        .trim()
        .parse()
        .with_context(|| format!("invalid {} value {:?}", column, field))
}

fn parse_optional(field: &str, column: &str) -> Result<Option<f64>> {
    let field = field.trim();
    if field == NOT_AVAILABLE {
        return Ok(None);
    }
    parse_required(field, column).map(Some)
}

/// True for a prefix of a row cut short by a crash
///
/// Truncation only loses trailing bytes: either whole columns are missing,
/// or every column is there and only the last one is cut.
fn is_torn_row(line: &str) -> bool {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() < HEADER.len() {
        return true;
    }
    if fields.len() > HEADER.len() {
        return false;
    }
    let last = fields[HEADER.len() - 1].trim();
    let mut complete = fields.clone();
    complete[HEADER.len() - 1] = NOT_AVAILABLE;
    NOT_AVAILABLE.starts_with(last) && parse_row(&complete.join(",")).is_ok()
}

/// Parse one CSV row produced by [`format_row`]
pub fn parse_row(line: &str) -> Result<Sample> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != HEADER.len() {
        bail!(
            "expected {} columns, found {} in row {:?}",
            HEADER.len(),
            fields.len(),
            line
        );
    }

    let timestamp = NaiveDateTime::parse_from_str(fields[0].trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp {:?}", fields[0]))?;

    Ok(Sample {
        timestamp,
        cpu_percent: parse_required(fields[1], HEADER[1])?,
        cpu_memory_percent: parse_required(fields[2], HEADER[2])?,
        cpu_temperature_celsius: parse_optional(fields[3], HEADER[3])?,
        gpu_percent: parse_optional(fields[4], HEADER[4])?,
        gpu_memory_percent: parse_optional(fields[5], HEADER[5])?,
        gpu_temperature_celsius: parse_optional(fields[6], HEADER[6])?,
    })
}

/// Read every sample from a log written by [`CsvSink`]
///
/// Partial rows left by a crash mid-write are skipped, whether they are
/// the last row or were followed by rows appended after a restart.
pub fn read_log(path: &Path) -> Result<Vec<Sample>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open log {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    match lines.next() {
        None => return Ok(Vec::new()),
        Some(header) => {
            let header = header.context("Failed to read log header")?;
            if header.trim_end() != header_line() {
                bail!("unexpected log header {:?} in {}", header, path.display());
            }
        }
    }

    let rows: Vec<String> = lines
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let last = rows.len().saturating_sub(1);

    let mut samples = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if row.trim().is_empty() {
            continue;
        }
        match parse_row(row) {
            Ok(sample) => samples.push(sample),
            Err(e) if idx == last || is_torn_row(row) => {
                debug!(error = %e, row = idx + 2, "Skipping incomplete row");
            }
            Err(e) => return Err(e.context(format!("row {} of {}", idx + 2, path.display()))),
        }
    }

    Ok(samples)
}
