//! Error taxonomy for the collector
//!
//! Capability and transient failures are absorbed where they occur and only
//! logged. Persistence failures are reported to the caller without stopping
//! sampling. Fatal host failures stop the scheduler.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// GPU provider absent or could not be initialized
    #[error("GPU telemetry unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A single optional reading failed for one cycle
    #[error("failed to read {metric}: {reason}")]
    TransientRead {
        metric: &'static str,
        reason: String,
    },

    /// Appending to the durable log failed
    #[error("failed to persist sample to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log exists but was written with a different schema
    #[error("log {} has unexpected header {found:?}", path.display())]
    LogSchemaMismatch { path: PathBuf, found: String },

    /// The mandatory CPU or memory reading failed
    #[error("host metrics facility failed: {0}")]
    FatalHost(String),
}

impl CollectorError {
    /// Whether this error must halt the scheduler
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectorError::FatalHost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_host_failures_are_fatal() {
        assert!(CollectorError::FatalHost("cpu".into()).is_fatal());
        assert!(!CollectorError::CapabilityUnavailable("x".into()).is_fatal());
        assert!(!CollectorError::TransientRead {
            metric: "gpu_percent",
            reason: "timeout".into()
        }
        .is_fatal());
        assert!(!CollectorError::Persistence {
            path: PathBuf::from("/tmp/log.csv"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .is_fatal());
    }

    #[test]
    fn test_persistence_error_message_names_path() {
        let err = CollectorError::Persistence {
            path: PathBuf::from("/var/log/telemetry.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/var/log/telemetry.csv"));
    }
}
