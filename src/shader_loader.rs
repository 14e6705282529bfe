use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use crate::vulkan::{device::RayTracingShaders, error::DeviceError};

pub const RAYGEN: &str = "raygen.rgen.spv";
pub const MISS: &str = "miss.rmiss.spv";
pub const SHADOW_MISS: &str = "shadow.rmiss.spv";
pub const CLOSEST_HIT: &str = "closesthit.rchit.spv";
pub const SPHERE_INTERSECTION: &str = "sphere.rint.spv";
pub const SPHERE_CLOSEST_HIT: &str = "sphere.rchit.spv";

/// Reads one pre-compiled SPIR-V binary.
pub fn load_shader(directory: &Path, file_name: &str) -> Result<Vec<u32>, DeviceError> {
    let path = directory.join(file_name);
    let read = || -> io::Result<Vec<u32>> {
        let mut reader = BufReader::new(File::open(&path)?);
        let code = ash::util::read_spv(&mut reader)?;
        if code.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty shader"));
        }
        Ok(code)
    };

    read().map_err(|source| DeviceError::ShaderFile {
        path: path.clone(),
        source,
    })
}

pub fn load_ray_tracing_shaders(directory: &Path) -> Result<RayTracingShaders, DeviceError> {
    let shaders = RayTracingShaders {
        raygen: load_shader(directory, RAYGEN)?,
        miss: load_shader(directory, MISS)?,
        shadow_miss: load_shader(directory, SHADOW_MISS)?,
        closest_hit: load_shader(directory, CLOSEST_HIT)?,
        sphere_intersection: load_shader(directory, SPHERE_INTERSECTION)?,
        sphere_closest_hit: load_shader(directory, SPHERE_CLOSEST_HIT)?,
    };
    log::info!("Loaded ray tracing shaders from {}", directory.display());
    Ok(shaders)
}
