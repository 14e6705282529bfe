use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Failures of the platform or driver contract. None of these can be worked around,
/// they travel up to `main` which logs them and ends the process.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Could not load vulkan library")]
    Loading(#[from] ash::LoadingError),

    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("No physical device supports hardware ray tracing")]
    NoSuitableDevice,

    #[error("No memory type matches type bits {type_bits:#b} with flags {flags:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("Could not open shader file {}", path.display())]
    ShaderFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create shader module {name}: {result}")]
    ShaderModule { name: String, result: vk::Result },
}
