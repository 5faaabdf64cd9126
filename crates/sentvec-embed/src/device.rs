use std::str::FromStr;

use anyhow::{anyhow, Result};
use candle_core::Device;
use tracing::{info, warn};

/// Where the in-process model runs. `Auto` tries Metal, then CUDA, then CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Metal,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "metal" | "mps" => Ok(Self::Metal),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(anyhow!("unknown device '{other}' (expected auto, cpu, metal or cuda)")),
        }
    }
}

pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Metal => Device::new_metal(0).map_err(|e| anyhow!("Failed to initialize Metal device: {}", e))?,
        DevicePreference::Cuda => Device::new_cuda(0).map_err(|e| anyhow!("Failed to initialize CUDA device: {}", e))?,
        DevicePreference::Auto => {
            if let Ok(dev) = Device::new_metal(0) {
                dev
            } else if let Ok(dev) = Device::new_cuda(0) {
                dev
            } else {
                if cfg!(feature = "metal") { warn!("metal feature enabled but no Metal device found"); }
                Device::Cpu
            }
        }
    };
    info!(device = ?device, "selected compute device");
    Ok(device)
}
