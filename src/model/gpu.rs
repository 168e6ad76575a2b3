//! GPU acceleration selection.
//!
//! The user asks for a [`GpuType`]; `auto` is turned into a concrete
//! [`Accelerator`] by a [`GpuProbe`]. [`HostProbe`] is the best-effort probe
//! used outside tests.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::constants::{CUDA_ENV_VAR, CUDA_INSTALL_PATH};

/// GPU acceleration requested on the command line or in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuType {
    None,
    Metal,
    Cuda,
    #[default]
    Auto,
}

/// A concrete acceleration backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    None,
    Metal,
    Cuda,
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accelerator::None => write!(f, "Disabled"),
            Accelerator::Metal => write!(f, "METAL"),
            Accelerator::Cuda => write!(f, "CUDA"),
        }
    }
}

/// Detects which accelerator the host offers.
pub trait GpuProbe {
    fn detect(&self) -> Accelerator;
}

/// Probes the running host: Apple silicon means Metal, a CUDA environment
/// variable or toolkit install means CUDA.
pub struct HostProbe {
    cuda_root: PathBuf,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            cuda_root: PathBuf::from(CUDA_INSTALL_PATH),
        }
    }
}

impl GpuProbe for HostProbe {
    fn detect(&self) -> Accelerator {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Accelerator::Metal
        } else if std::env::var_os(CUDA_ENV_VAR).is_some() || self.cuda_root.exists() {
            Accelerator::Cuda
        } else {
            Accelerator::None
        }
    }
}

/// Outcome of combining the requested GPU type with the layer count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuPlan {
    pub accelerator: Accelerator,
    /// Layers to offload; `-1` means all.
    pub n_gpu_layers: i32,
    /// The requested layer count was dropped to 0 because no GPU is in use.
    pub layers_disabled: bool,
}

/// Resolves `requested` (probing only for `auto`) and clamps the layer count.
pub fn resolve(requested: GpuType, n_gpu_layers: i32, probe: &dyn GpuProbe) -> GpuPlan {
    let accelerator = match requested {
        GpuType::Auto => probe.detect(),
        GpuType::None => Accelerator::None,
        GpuType::Metal => Accelerator::Metal,
        GpuType::Cuda => Accelerator::Cuda,
    };

    let layers_disabled = accelerator == Accelerator::None && n_gpu_layers != 0;
    GpuPlan {
        accelerator,
        n_gpu_layers: if accelerator == Accelerator::None {
            0
        } else {
            n_gpu_layers
        },
        layers_disabled,
    }
}

#[cfg(test)]
pub(crate) struct FixedProbe(pub Accelerator);

#[cfg(test)]
impl GpuProbe for FixedProbe {
    fn detect(&self) -> Accelerator {
        self.0
    }
}
