use ash::vk;

use super::{
    command_buffer::{ImageLayoutTransition, MemoryBarrier},
    descriptor_set::WriteDescriptorSet,
    error::DeviceError,
};

/// A buffer together with the memory that backs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// Where the geometry of an acceleration structure build lives on the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeometryInput {
    Triangles {
        vertex_address: vk::DeviceAddress,
        vertex_stride: vk::DeviceSize,
        max_vertex: u32,
        index_address: vk::DeviceAddress,
    },
    Aabbs {
        data_address: vk::DeviceAddress,
        stride: vk::DeviceSize,
    },
    Instances {
        data_address: vk::DeviceAddress,
    },
}

impl GeometryInput {
    pub fn structure_type(&self) -> vk::AccelerationStructureTypeKHR {
        match self {
            GeometryInput::Triangles { .. } | GeometryInput::Aabbs { .. } => {
                vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL
            }
            GeometryInput::Instances { .. } => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildSizes {
    pub acceleration_structure_size: vk::DeviceSize,
    pub build_scratch_size: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccelerationStructureBuild {
    pub geometry: GeometryInput,
    pub primitive_count: u32,
    pub destination: vk::AccelerationStructureKHR,
    pub scratch_address: vk::DeviceAddress,
}

/// SPIR-V words of every stage of the ray tracing pipeline.
#[derive(Clone, Debug, Default)]
pub struct RayTracingShaders {
    pub raygen: Vec<u32>,
    pub miss: Vec<u32>,
    pub shadow_miss: Vec<u32>,
    pub closest_hit: Vec<u32>,
    pub sphere_intersection: Vec<u32>,
    pub sphere_closest_hit: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderBindingTable {
    pub buffer: Option<RawBuffer>,
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

#[derive(Clone, Copy, Debug)]
pub struct RayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub shader_binding_table: ShaderBindingTable,
}

/// Everything the ray tracing core asks of the GPU.
///
/// Creation functions return `DeviceError` for conditions the process cannot recover from.
/// Recording functions append to a command buffer obtained from [`Self::begin_commands`].
pub trait RayTracingDevice {
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> Result<RawBuffer, DeviceError>;
    fn destroy_buffer(&self, buffer: RawBuffer);
    /// Only valid for host visible buffers.
    fn write_buffer(&self, buffer: &RawBuffer, offset: vk::DeviceSize, data: &[u8]);
    fn buffer_device_address(&self, buffer: &RawBuffer) -> vk::DeviceAddress;

    fn acceleration_structure_build_sizes(
        &self,
        geometry: &GeometryInput,
        primitive_count: u32,
    ) -> BuildSizes;
    fn create_acceleration_structure(
        &self,
        structure_type: vk::AccelerationStructureTypeKHR,
        buffer: &RawBuffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, DeviceError>;
    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR);
    fn acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress;
    fn scratch_alignment(&self) -> vk::DeviceSize;

    fn create_storage_image(&self, extent: vk::Extent2D) -> Result<RawImage, DeviceError>;
    fn create_sampled_image(
        &self,
        extent: vk::Extent2D,
        rgba_pixels: &[u8],
    ) -> Result<RawImage, DeviceError>;
    fn destroy_image(&self, image: RawImage);
    fn default_sampler(&self) -> vk::Sampler;

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout, DeviceError>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceError>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[WriteDescriptorSet]);

    fn create_ray_tracing_pipeline(
        &self,
        set_layout: vk::DescriptorSetLayout,
        shaders: &RayTracingShaders,
        push_constant_size: u32,
    ) -> Result<RayTracingPipeline, DeviceError>;
    fn destroy_ray_tracing_pipeline(&self, pipeline: &RayTracingPipeline);

    fn begin_commands(&self) -> Result<vk::CommandBuffer, DeviceError>;
    /// Submits and blocks until the GPU retired the commands.
    fn submit_commands(&self, command_buffer: vk::CommandBuffer) -> Result<(), DeviceError>;
    fn wait_idle(&self);

    fn cmd_build_acceleration_structure(
        &self,
        command_buffer: vk::CommandBuffer,
        build: &AccelerationStructureBuild,
    );
    fn cmd_memory_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &MemoryBarrier);
    fn cmd_image_layout_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        transition: &ImageLayoutTransition,
    );
    fn cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &RayTracingPipeline,
        descriptor_set: vk::DescriptorSet,
        push_constants: &[u8],
        extent: vk::Extent2D,
    );
}
