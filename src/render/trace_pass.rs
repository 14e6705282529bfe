use std::sync::Arc;

use ash::vk;

use crate::vulkan::{
    command_buffer::ImageLayoutTransition,
    device::{RayTracingDevice, RayTracingPipeline, RayTracingShaders},
    error::DeviceError,
};

use super::shader_types::CameraPushConstants;

/// The ray tracing pipeline plus the commands that dispatch it over the output image.
pub struct TracePass {
    pipeline: RayTracingPipeline,
    device: Arc<dyn RayTracingDevice>,
}

impl TracePass {
    pub fn new(
        device: Arc<dyn RayTracingDevice>,
        set_layout: vk::DescriptorSetLayout,
        shaders: &RayTracingShaders,
    ) -> Result<Self, DeviceError> {
        let pipeline = device.create_ray_tracing_pipeline(
            set_layout,
            shaders,
            std::mem::size_of::<CameraPushConstants>() as u32,
        )?;
        Ok(Self { pipeline, device })
    }

    /// A freshly created output image starts out UNDEFINED, the shaders write it in GENERAL.
    pub fn prepare_output(&self, command_buffer: vk::CommandBuffer, image: vk::Image) {
        self.device.cmd_image_layout_transition(
            command_buffer,
            &ImageLayoutTransition::storage_image(image),
        );
    }

    pub fn render(
        &self,
        command_buffer: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        camera: &CameraPushConstants,
        extent: vk::Extent2D,
    ) {
        self.device.cmd_trace_rays(
            command_buffer,
            &self.pipeline,
            descriptor_set,
            bytemuck::bytes_of(camera),
            extent,
        );
    }
}

impl Drop for TracePass {
    fn drop(&mut self) {
        self.device.destroy_ray_tracing_pipeline(&self.pipeline);
    }
}
