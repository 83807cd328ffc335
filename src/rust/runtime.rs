use candle_core::Device;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Selects the compute device the network trains and runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Try a CUDA device first; falls back to CPU when none is available
    pub use_gpu: bool,
    pub gpu_ordinal: usize,
}

impl RuntimeConfig {
    pub fn cpu() -> Self {
        Self::default()
    }
}

pub fn create_device(config: &RuntimeConfig) -> Device {
    if config.use_gpu {
        match Device::cuda_if_available(config.gpu_ordinal) {
            Ok(device) if device.is_cuda() => {
                info!("Using CUDA device {}", config.gpu_ordinal);
                return device;
            }
            Ok(_) => warn!("No CUDA device available, falling back to CPU"),
            Err(e) => warn!("Failed to open CUDA device {}: {}, falling back to CPU", config.gpu_ordinal, e),
        }
    }
    info!("Using CPU device");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        let device = create_device(&RuntimeConfig::default());
        assert!(device.is_cpu());
    }

    #[test]
    fn test_gpu_request_always_yields_a_device() {
        let config = RuntimeConfig { use_gpu: true, gpu_ordinal: 0 };
        let device = create_device(&config);
        assert!(device.is_cpu() || device.is_cuda());
    }
}
