//! Compute device identifiers

use crate::model::ReconstructionModel;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Device a model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown device '{0}' (expected cpu, cuda or cuda:N)")]
pub struct ParseDeviceError(String);

impl Device {
    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// Resolve a device preference against what the model can run on.
    ///
    /// Unparseable or unsupported preferences fall back to the CPU.
    pub fn resolve(preference: &str, model: &dyn ReconstructionModel) -> Device {
        let preferred = match preference.parse::<Device>() {
            Ok(device) => device,
            Err(err) => {
                tracing::warn!("{err}; using cpu");
                return Device::Cpu;
            }
        };

        if model.supports_device(&preferred) {
            preferred
        } else {
            tracing::warn!(
                "Model {} does not support {}, falling back to cpu",
                model.id(),
                preferred
            );
            Device::Cpu
        }
    }
}

impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| ParseDeviceError(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SilhouetteHullModel;

    #[test]
    fn test_parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for device in [Device::Cpu, Device::Cuda(0), Device::Cuda(7)] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn test_resolve_falls_back_to_cpu() {
        let model = SilhouetteHullModel::default();
        assert_eq!(Device::resolve("cuda:0", &model), Device::Cpu);
        assert_eq!(Device::resolve("nonsense", &model), Device::Cpu);
        assert_eq!(Device::resolve("cpu", &model), Device::Cpu);
    }
}
