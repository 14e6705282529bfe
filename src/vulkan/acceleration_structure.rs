use std::mem::size_of;

use ash::vk;

use crate::render::shader_types::{AabbPositions, GpuVertex, InstanceRecord};

use super::{
    command_buffer::MemoryBarrier,
    device::{AccelerationStructureBuild, GeometryInput},
    error::DeviceError,
    resources::{AccelerationStructureKey, BufferKey, GpuResources, MemoryLocation},
    scratch_buffer::ScratchBuffer,
};

/// Flattened scene geometry as it lives in device buffers. A scene is either all
/// triangles or all procedural boxes, never a mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneGeometry {
    Triangles {
        vertex_buffer: BufferKey,
        index_buffer: BufferKey,
        vertex_count: u32,
        index_count: u32,
    },
    Procedural {
        aabb_buffer: BufferKey,
        primitive_count: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Triangles,
    Procedural,
}

impl SceneGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            SceneGeometry::Triangles { .. } => GeometryKind::Triangles,
            SceneGeometry::Procedural { .. } => GeometryKind::Procedural,
        }
    }

    /// Resolves the device addresses, `None` when there is nothing to build.
    fn input(&self, resources: &GpuResources) -> Option<(GeometryInput, u32)> {
        match *self {
            SceneGeometry::Triangles {
                vertex_buffer,
                index_buffer,
                vertex_count,
                index_count,
            } => {
                let primitive_count = index_count / 3;
                if vertex_count == 0 || primitive_count == 0 {
                    return None;
                }
                let geometry = GeometryInput::Triangles {
                    vertex_address: resources.buffer_device_address(vertex_buffer)?,
                    vertex_stride: size_of::<GpuVertex>() as vk::DeviceSize,
                    max_vertex: vertex_count - 1,
                    index_address: resources.buffer_device_address(index_buffer)?,
                };
                Some((geometry, primitive_count))
            }
            SceneGeometry::Procedural {
                aabb_buffer,
                primitive_count,
            } => {
                if primitive_count == 0 {
                    return None;
                }
                let geometry = GeometryInput::Aabbs {
                    data_address: resources.buffer_device_address(aabb_buffer)?,
                    stride: size_of::<AabbPositions>() as vk::DeviceSize,
                };
                Some((geometry, primitive_count))
            }
        }
    }

    /// Hit group offset in the shader binding table.
    fn sbt_record_offset(&self) -> u32 {
        match self.kind() {
            GeometryKind::Triangles => 0,
            GeometryKind::Procedural => 1,
        }
    }
}

/// Records the bottom level build of `geometry`. Returns `None` without touching the
/// device when the geometry is empty or its buffers are gone.
pub fn build_bottom_level(
    resources: &mut GpuResources,
    scratch: &mut ScratchBuffer,
    command_buffer: vk::CommandBuffer,
    geometry: &SceneGeometry,
) -> Result<Option<(AccelerationStructureKey, u32)>, DeviceError> {
    let Some((input, primitive_count)) = geometry.input(resources) else {
        return Ok(None);
    };
    let device = resources.device().clone();

    let sizes = device.acceleration_structure_build_sizes(&input, primitive_count);
    log::info!(
        "Bottom level build: {primitive_count} primitives, structure {} bytes, scratch {} bytes",
        sizes.acceleration_structure_size,
        sizes.build_scratch_size
    );

    let handle = resources.create_acceleration_structure(
        vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        sizes.acceleration_structure_size,
    )?;
    let scratch_address = scratch.ensure(resources, sizes.build_scratch_size)?;
    let destination = resources
        .acceleration_structure(handle)
        .map(|record| record.inner)
        .unwrap_or_default();

    device.cmd_build_acceleration_structure(
        command_buffer,
        &AccelerationStructureBuild {
            geometry: input,
            primitive_count,
            destination,
            scratch_address,
        },
    );
    device.cmd_memory_barrier(command_buffer, &MemoryBarrier::bottom_level_build());

    Ok(Some((handle, primitive_count)))
}

/// The top level structure plus the host visible buffer its instances are read from.
#[derive(Default)]
pub struct TopLevelStructure {
    structure: Option<AccelerationStructureKey>,
    structure_size: vk::DeviceSize,
    instance_buffer: Option<BufferKey>,
    instance_capacity: usize,
}

impl TopLevelStructure {
    pub fn handle(&self) -> Option<AccelerationStructureKey> {
        self.structure
    }

    /// Records the build over `instances`. The structure and instance buffer are kept
    /// when they are still large enough.
    pub fn build(
        &mut self,
        resources: &mut GpuResources,
        scratch: &mut ScratchBuffer,
        command_buffer: vk::CommandBuffer,
        instances: &[InstanceRecord],
    ) -> Result<AccelerationStructureKey, DeviceError> {
        let device = resources.device().clone();

        let instance_buffer = match self.instance_buffer {
            Some(handle) if self.instance_capacity >= instances.len() => handle,
            _ => {
                if let Some(old) = self.instance_buffer.take() {
                    resources.dispose_buffer(old);
                }
                let handle = resources.create_buffer(
                    (instances.len() * size_of::<InstanceRecord>()) as vk::DeviceSize,
                    vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    MemoryLocation::HostVisible,
                )?;
                self.instance_buffer = Some(handle);
                self.instance_capacity = instances.len();
                handle
            }
        };
        resources.write_buffer(instance_buffer, bytemuck::cast_slice(instances));

        let input = GeometryInput::Instances {
            data_address: resources
                .buffer_device_address(instance_buffer)
                .unwrap_or_default(),
        };
        let instance_count = instances.len() as u32;
        let sizes = device.acceleration_structure_build_sizes(&input, instance_count);
        log::info!(
            "Top level build: {instance_count} instances, structure {} bytes, scratch {} bytes",
            sizes.acceleration_structure_size,
            sizes.build_scratch_size
        );

        let structure = match self.structure {
            Some(handle)
                if self.structure_size >= sizes.acceleration_structure_size
                    && resources.acceleration_structure(handle).is_some() =>
            {
                handle
            }
            _ => {
                if let Some(old) = self.structure.take() {
                    resources.dispose_acceleration_structure(old);
                }
                let handle = resources.create_acceleration_structure(
                    vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                    sizes.acceleration_structure_size,
                )?;
                self.structure = Some(handle);
                self.structure_size = sizes.acceleration_structure_size;
                handle
            }
        };

        let scratch_address = scratch.ensure(resources, sizes.build_scratch_size)?;
        let destination = resources
            .acceleration_structure(structure)
            .map(|record| record.inner)
            .unwrap_or_default();

        device.cmd_build_acceleration_structure(
            command_buffer,
            &AccelerationStructureBuild {
                geometry: input,
                primitive_count: instance_count,
                destination,
                scratch_address,
            },
        );
        device.cmd_memory_barrier(command_buffer, &MemoryBarrier::top_level_build());

        Ok(structure)
    }

    pub fn dispose(&mut self, resources: &mut GpuResources) {
        if let Some(handle) = self.structure.take() {
            resources.dispose_acceleration_structure(handle);
        }
        if let Some(handle) = self.instance_buffer.take() {
            resources.dispose_buffer(handle);
        }
        self.structure_size = 0;
        self.instance_capacity = 0;
    }
}

/// Owns the scene's bottom and top level structures and the scratch buffer both
/// builds share. Every change is a full rebuild, nothing is refitted.
#[derive(Default)]
pub struct AccelerationStructureManager {
    scratch: ScratchBuffer,
    bottom_level: Option<AccelerationStructureKey>,
    top_level: TopLevelStructure,
    primitive_count: u32,
    geometry_kind: Option<GeometryKind>,
}

impl AccelerationStructureManager {
    /// Records both builds into `command_buffer`. Empty geometry leaves the manager
    /// as it was and returns `false`.
    pub fn build(
        &mut self,
        resources: &mut GpuResources,
        command_buffer: vk::CommandBuffer,
        geometry: &SceneGeometry,
    ) -> Result<bool, DeviceError> {
        let Some((bottom_level, primitive_count)) =
            build_bottom_level(resources, &mut self.scratch, command_buffer, geometry)?
        else {
            log::debug!("Nothing to build for {:?} geometry", geometry.kind());
            return Ok(false);
        };

        if let Some(old) = self.bottom_level.replace(bottom_level) {
            resources.dispose_acceleration_structure(old);
        }

        let blas_address = resources
            .acceleration_structure(bottom_level)
            .map(|record| record.device_address)
            .unwrap_or_default();
        let instance = InstanceRecord::new(blas_address, geometry.sbt_record_offset());
        self.top_level.build(
            resources,
            &mut self.scratch,
            command_buffer,
            std::slice::from_ref(&instance),
        )?;

        self.primitive_count = primitive_count;
        self.geometry_kind = Some(geometry.kind());
        Ok(true)
    }

    pub fn rebuild(
        &mut self,
        resources: &mut GpuResources,
        command_buffer: vk::CommandBuffer,
        geometry: &SceneGeometry,
    ) -> Result<bool, DeviceError> {
        self.cleanup(resources);
        self.build(resources, command_buffer, geometry)
    }

    /// Queues both structures for destruction. The scratch buffer survives so the
    /// next build can reuse it.
    pub fn cleanup(&mut self, resources: &mut GpuResources) {
        if let Some(handle) = self.bottom_level.take() {
            resources.dispose_acceleration_structure(handle);
        }
        self.top_level.dispose(resources);
        self.primitive_count = 0;
        self.geometry_kind = None;
    }

    pub fn release_all(&mut self, resources: &mut GpuResources) {
        self.cleanup(resources);
        self.scratch.release(resources);
    }

    pub fn is_built(&self) -> bool {
        self.bottom_level.is_some() && self.top_level.handle().is_some()
    }

    pub fn top_level_handle(&self) -> Option<AccelerationStructureKey> {
        self.top_level.handle()
    }

    pub fn primitive_count(&self) -> u32 {
        self.primitive_count
    }

    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        self.geometry_kind
    }

    pub fn scratch_size(&self) -> vk::DeviceSize {
        self.scratch.high_water_mark()
    }
}
