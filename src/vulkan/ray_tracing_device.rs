use ash::vk;

use super::{
    buffer,
    command_buffer::{self, CmdPipelineBarrier, ImageLayoutTransition, MemoryBarrier},
    context::Context,
    descriptor_set::{self, WriteDescriptorSet},
    device::{
        AccelerationStructureBuild, BuildSizes, GeometryInput, RawBuffer, RawImage,
        RayTracingDevice, RayTracingPipeline, RayTracingShaders,
    },
    error::DeviceError,
    image,
    ray_tracing_pipeline::{self, push_constant_stages},
};

// See https://github.com/SaschaWillems/Vulkan/blob/a467d941599a2cef5bd0eff696999bca8d75ee23/base/VulkanRaytracingSample.cpp#L149
fn geometry_description(geometry: &GeometryInput) -> vk::AccelerationStructureGeometryKHR {
    match *geometry {
        GeometryInput::Triangles {
            vertex_address,
            vertex_stride,
            max_vertex,
            index_address,
        } => vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: vertex_address,
                    })
                    .vertex_stride(vertex_stride)
                    .max_vertex(max_vertex)
                    .index_type(vk::IndexType::UINT32)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: index_address,
                    })
                    .build(),
            })
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .build(),
        GeometryInput::Aabbs {
            data_address,
            stride,
        } => vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::AABBS)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::builder()
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: data_address,
                    })
                    .stride(stride)
                    .build(),
            })
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .build(),
        GeometryInput::Instances { data_address } => {
            vk::AccelerationStructureGeometryKHR::builder()
                .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    instances: vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                        .array_of_pointers(false)
                        .data(vk::DeviceOrHostAddressConstKHR {
                            device_address: data_address,
                        })
                        .build(),
                })
                .flags(vk::GeometryFlagsKHR::OPAQUE)
                .build()
        }
    }
}

impl RayTracingDevice for Context {
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> Result<RawBuffer, DeviceError> {
        buffer::create_buffer(self, size, usage, memory_flags)
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        buffer::destroy_buffer(self, buffer)
    }

    fn write_buffer(&self, buffer: &RawBuffer, offset: vk::DeviceSize, data: &[u8]) {
        buffer::write_buffer(self, buffer, offset, data).expect("Could not map memory")
    }

    fn buffer_device_address(&self, buffer: &RawBuffer) -> vk::DeviceAddress {
        buffer::get_device_address(self, buffer)
    }

    fn acceleration_structure_build_sizes(
        &self,
        geometry: &GeometryInput,
        primitive_count: u32,
    ) -> BuildSizes {
        let geometry_description = geometry_description(geometry);
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(geometry.structure_type())
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry_description));

        let size_info = unsafe {
            self.context_raytracing
                .acceleration_structure
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &[primitive_count],
                )
        };

        BuildSizes {
            acceleration_structure_size: size_info.acceleration_structure_size,
            build_scratch_size: size_info.build_scratch_size,
        }
    }

    fn create_acceleration_structure(
        &self,
        structure_type: vk::AccelerationStructureTypeKHR,
        buffer: &RawBuffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, DeviceError> {
        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(buffer.buffer)
            .size(size)
            .ty(structure_type);

        Ok(unsafe {
            self.context_raytracing
                .acceleration_structure
                .create_acceleration_structure(&create_info, None)
        }?)
    }

    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR) {
        unsafe {
            self.context_raytracing
                .acceleration_structure
                .destroy_acceleration_structure(acceleration_structure, None);
        }
    }

    fn acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress {
        let acceleration_structure_device_address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::builder()
                .acceleration_structure(acceleration_structure);

        unsafe {
            self.context_raytracing
                .acceleration_structure
                .get_acceleration_structure_device_address(
                    &acceleration_structure_device_address_info,
                )
        }
    }

    fn scratch_alignment(&self) -> vk::DeviceSize {
        self.context_raytracing
            .physical_device_acceleration_structure_properties_khr
            .min_acceleration_structure_scratch_offset_alignment as vk::DeviceSize
    }

    fn create_storage_image(&self, extent: vk::Extent2D) -> Result<RawImage, DeviceError> {
        image::create_storage_image(self, extent)
    }

    fn create_sampled_image(
        &self,
        extent: vk::Extent2D,
        rgba_pixels: &[u8],
    ) -> Result<RawImage, DeviceError> {
        image::create_sampled_image(self, extent, rgba_pixels)
    }

    fn destroy_image(&self, image: RawImage) {
        image::destroy_image(self, image)
    }

    fn default_sampler(&self) -> vk::Sampler {
        self.default_sampler
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout, DeviceError> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&create_info, None) }?)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceError> {
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(std::slice::from_ref(&layout));

        Ok(unsafe { self.device.allocate_descriptor_sets(&allocate_info) }?[0])
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[WriteDescriptorSet]) {
        descriptor_set::update_descriptor_set(self, set, writes)
    }

    fn create_ray_tracing_pipeline(
        &self,
        set_layout: vk::DescriptorSetLayout,
        shaders: &RayTracingShaders,
        push_constant_size: u32,
    ) -> Result<RayTracingPipeline, DeviceError> {
        ray_tracing_pipeline::create_ray_tracing_pipeline(
            self,
            set_layout,
            shaders,
            push_constant_size,
        )
    }

    fn destroy_ray_tracing_pipeline(&self, pipeline: &RayTracingPipeline) {
        ray_tracing_pipeline::destroy_ray_tracing_pipeline(self, pipeline)
    }

    fn begin_commands(&self) -> Result<vk::CommandBuffer, DeviceError> {
        Ok(command_buffer::begin_one_time_commands(
            self,
            self.command_pool,
        )?)
    }

    fn submit_commands(&self, command_buffer: vk::CommandBuffer) -> Result<(), DeviceError> {
        Ok(command_buffer::submit_and_wait(
            self,
            self.command_pool,
            command_buffer,
            self.frame_fence,
        )?)
    }

    fn wait_idle(&self) {
        unsafe { self.device.device_wait_idle() }.expect("Could not wait for device idle");
    }

    fn cmd_build_acceleration_structure(
        &self,
        command_buffer: vk::CommandBuffer,
        build: &AccelerationStructureBuild,
    ) {
        let geometry_description = geometry_description(&build.geometry);
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(build.geometry.structure_type())
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(build.destination)
            .geometries(std::slice::from_ref(&geometry_description))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: build.scratch_address,
            })
            .build();

        let build_range_info = vk::AccelerationStructureBuildRangeInfoKHR::builder()
            .primitive_count(build.primitive_count)
            .primitive_offset(0)
            .first_vertex(0)
            .transform_offset(0)
            .build();

        unsafe {
            self.context_raytracing
                .acceleration_structure
                .cmd_build_acceleration_structures(
                    command_buffer,
                    std::slice::from_ref(&build_info),
                    &[std::slice::from_ref(&build_range_info)],
                )
        };
    }

    fn cmd_memory_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &MemoryBarrier) {
        CmdPipelineBarrier {
            memory_barriers: std::slice::from_ref(barrier),
            image_transitions: &[],
        }
        .execute(command_buffer, self);
    }

    fn cmd_image_layout_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        transition: &ImageLayoutTransition,
    ) {
        CmdPipelineBarrier {
            memory_barriers: &[],
            image_transitions: std::slice::from_ref(transition),
        }
        .execute(command_buffer, self);
    }

    fn cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &RayTracingPipeline,
        descriptor_set: vk::DescriptorSet,
        push_constants: &[u8],
        extent: vk::Extent2D,
    ) {
        let device = &self.device;
        let shader_binding_table = &pipeline.shader_binding_table;
        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                pipeline.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                pipeline.layout,
                0,
                std::slice::from_ref(&descriptor_set),
                &[],
            );
            device.cmd_push_constants(
                command_buffer,
                pipeline.layout,
                push_constant_stages(),
                0,
                push_constants,
            );
            self.context_raytracing
                .ray_tracing_pipeline
                .cmd_trace_rays(
                    command_buffer,
                    &shader_binding_table.raygen,
                    &shader_binding_table.miss,
                    &shader_binding_table.hit,
                    &shader_binding_table.callable,
                    extent.width,
                    extent.height,
                    1,
                );
        }
    }
}
