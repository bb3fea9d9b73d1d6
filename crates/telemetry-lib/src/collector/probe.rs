//! One-shot GPU capability probe
//!
//! Runs once at startup. A missing library, a missing driver or zero
//! devices all produce an unavailable capability with a diagnostic; none
//! of them is an error. The result never changes for the process lifetime.

use super::{GpuBackend, NvmlBackend};
use crate::error::CollectorError;
use crate::models::GpuCapability;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Diagnostic used when the provider initializes but sees no devices
pub const NO_DEVICES: &str = "no devices";

/// Capability flag plus the provider handle it was derived from
///
/// The handle is only present when the capability is available.
pub struct GpuProbe {
    capability: GpuCapability,
    backend: Option<Arc<dyn GpuBackend>>,
}

impl GpuProbe {
    /// Capability that was switched off without probing
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            capability: GpuCapability::unavailable(reason),
            backend: None,
        }
    }

    pub fn capability(&self) -> &GpuCapability {
        &self.capability
    }

    pub fn backend(&self) -> Option<Arc<dyn GpuBackend>> {
        self.backend.clone()
    }
}

impl std::fmt::Debug for GpuProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProbe")
            .field("capability", &self.capability)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

/// Probe the NVML provider
pub fn probe() -> GpuProbe {
    probe_with(|| {
        let backend = NvmlBackend::init()?;
        if let Some(version) = backend.driver_version() {
            debug!(driver_version = %version, "NVML initialized");
        }
        Ok(Arc::new(backend) as Arc<dyn GpuBackend>)
    })
}

/// Probe with a custom provider initializer
pub fn probe_with<F>(init: F) -> GpuProbe
where
    F: FnOnce() -> Result<Arc<dyn GpuBackend>>,
{
    let backend = match init() {
        Ok(backend) => backend,
        Err(e) => {
            let diagnostic = format!("{:#}", e);
            let err = CollectorError::CapabilityUnavailable(diagnostic.clone());
            warn!(error = %err, "Collecting CPU metrics only");
            return GpuProbe::disabled(diagnostic);
        }
    };

    match backend.device_count() {
        Ok(0) => {
            warn!(diagnostic = NO_DEVICES, "GPU provider reports no devices");
            GpuProbe::disabled(NO_DEVICES)
        }
        Ok(count) => {
            info!(devices = count, "GPU telemetry available");
            GpuProbe {
                capability: GpuCapability::available(count),
                backend: Some(backend),
            }
        }
        Err(e) => {
            let diagnostic = format!("{:#}", e);
            let err = CollectorError::CapabilityUnavailable(diagnostic.clone());
            warn!(error = %err, "GPU device enumeration failed");
            GpuProbe::disabled(diagnostic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, bail};

    struct FixedBackend {
        devices: Result<u32, String>,
    }

    impl GpuBackend for FixedBackend {
        fn device_count(&self) -> Result<u32> {
            self.devices.clone().map_err(|e| anyhow!(e))
        }
        fn utilization(&self, _index: u32) -> Result<f64> {
            Ok(50.0)
        }
        fn memory_info(&self, _index: u32) -> Result<(u64, u64)> {
            Ok((1, 2))
        }
        fn temperature(&self, _index: u32) -> Result<f64> {
            Ok(60.0)
        }
    }

    fn with_devices(devices: Result<u32, String>) -> GpuProbe {
        probe_with(move || Ok(Arc::new(FixedBackend { devices }) as Arc<dyn GpuBackend>))
    }

    #[test]
    fn test_available_with_devices() {
        let probe = with_devices(Ok(2));
        assert!(probe.capability().is_available());
        assert_eq!(probe.capability().device_count(), 2);
        assert!(probe.backend().is_some());
    }

    #[test]
    fn test_zero_devices_is_unavailable() {
        let probe = with_devices(Ok(0));
        assert!(!probe.capability().is_available());
        assert_eq!(probe.capability().diagnostic(), Some(NO_DEVICES));
        assert!(probe.backend().is_none());
    }

    #[test]
    fn test_init_failure_captures_diagnostic() {
        let probe = probe_with(|| bail!("libnvidia-ml.so not found"));
        assert!(!probe.capability().is_available());
        assert!(probe
            .capability()
            .diagnostic()
            .unwrap()
            .contains("libnvidia-ml.so not found"));
        assert!(probe.backend().is_none());
    }

    #[test]
    fn test_enumeration_failure_is_unavailable() {
        let probe = with_devices(Err("driver mismatch".to_string()));
        assert!(!probe.capability().is_available());
        assert_eq!(probe.capability().diagnostic(), Some("driver mismatch"));
    }

    #[test]
    fn test_disabled() {
        let probe = GpuProbe::disabled("disabled by configuration");
        assert!(!probe.capability().is_available());
        assert!(probe.backend().is_none());
    }

    #[test]
    fn test_real_probe_never_panics() {
        let probe = probe();
        assert_eq!(
            probe.capability().is_available(),
            probe.backend().is_some()
        );
    }
}
