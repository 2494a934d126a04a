//! Enumerates and creates compute devices by `(backend tag, device_index,
//! config map)`, per SPEC_FULL.md §6.

use std::collections::HashMap;

use crate::device::config::{ConfigValue, DeviceConfig};
use crate::device::cpu::CpuDevice;
use crate::device::ComputeDevice;
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTag {
    Cpu,
    Cuda,
}

impl BackendTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTag::Cpu => "cpu",
            BackendTag::Cuda => "cuda",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputeDeviceInfo {
    pub backend: BackendTag,
    pub device_index: u32,
    pub device_name: String,
    pub total_memory: u64,
}

pub struct ComputeDeviceFactory;

impl ComputeDeviceFactory {
    /// Lists every device this build can create. The CPU backend always
    /// contributes exactly one entry; CUDA devices are enumerated only when
    /// built with the `cuda` feature and a CUDA runtime is present.
    pub fn enumerate_compute_devices() -> Vec<ComputeDeviceInfo> {
        let mut devices = vec![ComputeDeviceInfo {
            backend: BackendTag::Cpu,
            device_index: 0,
            device_name: CpuDevice::new().device_name(),
            total_memory: 0,
        }];

        #[cfg(feature = "cuda")]
        devices.extend(crate::device::cuda::enumerate_devices());

        devices
    }

    pub fn create_compute_device(
        backend: BackendTag,
        device_index: u32,
        config: &HashMap<String, ConfigValue>,
    ) -> EngineResult<Box<dyn ComputeDevice>> {
        let device_config = DeviceConfig::from_map(config);
        match backend {
            BackendTag::Cpu => {
                if device_index != 0 {
                    return Err(EngineError::InvalidArgument(format!(
                        "cpu backend only exposes device_index 0, got {device_index}"
                    )));
                }
                let _ = device_config;
                Ok(Box::new(CpuDevice::new()))
            }
            #[cfg(feature = "cuda")]
            BackendTag::Cuda => {
                let device = crate::device::cuda::CudaDevice::new(device_index, device_config)?;
                Ok(Box::new(device))
            }
            #[cfg(not(feature = "cuda"))]
            BackendTag::Cuda => Err(EngineError::BackendFailure {
                stage: "create_compute_device".into(),
                message: "this build was not compiled with the cuda feature".into(),
            }),
        }
    }
}
