//! NVIDIA GPU metrics through NVML
//!
//! The NVML library is loaded at runtime, so hosts without the driver
//! simply fail [`NvmlBackend::init`] and run CPU-only.

use super::GpuBackend;
use anyhow::{bail, Context, Result};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::Nvml;

/// Handle to an initialized NVML library
pub struct NvmlBackend {
    nvml: Nvml,
}

impl NvmlBackend {
    /// Load and initialize NVML
    pub fn init() -> Result<Self> {
        let nvml = Nvml::init().context("NVML initialization failed")?;
        Ok(Self { nvml })
    }

    /// Driver version, when NVML can report it
    pub fn driver_version(&self) -> Option<String> {
        self.nvml.sys_driver_version().ok()
    }
}

impl GpuBackend for NvmlBackend {
    fn device_count(&self) -> Result<u32> {
        self.nvml
            .device_count()
            .context("Failed to enumerate NVML devices")
    }

    fn utilization(&self, index: u32) -> Result<f64> {
        let device = self.nvml.device_by_index(index)?;
        Ok(device.utilization_rates()?.gpu as f64)
    }

    fn memory_info(&self, index: u32) -> Result<(u64, u64)> {
        let device = self.nvml.device_by_index(index)?;
        let memory = device.memory_info()?;
        if memory.total == 0 {
            bail!("device {} reports zero total memory", index);
        }
        Ok((memory.used, memory.total))
    }

    fn temperature(&self, index: u32) -> Result<f64> {
        let device = self.nvml.device_by_index(index)?;
        Ok(device.temperature(TemperatureSensor::Gpu)? as f64)
    }
}
