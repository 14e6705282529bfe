use ash::vk;

use super::context::Context;

/// Global memory dependency between two synchronization scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
}

impl MemoryBarrier {
    /// Bottom level writes have to land before the top level build reads them. Both
    /// builds share the scratch buffer, so the top level scratch writes wait too.
    pub fn bottom_level_build() -> Self {
        Self {
            src_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            src_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
            dst_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            dst_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        }
    }

    /// The top level structure is only ever read by the trace dispatch.
    pub fn top_level_build() -> Self {
        Self {
            src_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            src_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
            dst_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            dst_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
        }
    }

    /// Host writes to mapped scene buffers before the build reads them.
    pub fn host_upload() -> Self {
        Self {
            src_stage_mask: vk::PipelineStageFlags2::HOST,
            src_access_mask: vk::AccessFlags2::HOST_WRITE,
            dst_stage_mask: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
                | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            dst_access_mask: vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags2::SHADER_STORAGE_READ,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageLayoutTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
}

impl ImageLayoutTransition {
    /// The output image stays in GENERAL for its whole life.
    pub fn storage_image(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::GENERAL,
            src_stage_mask: vk::PipelineStageFlags2::NONE,
            src_access_mask: vk::AccessFlags2::empty(),
            dst_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            dst_access_mask: vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }

    fn color_subresource_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

pub struct CmdPipelineBarrier<'a> {
    pub memory_barriers: &'a [MemoryBarrier],
    pub image_transitions: &'a [ImageLayoutTransition],
}

impl<'a> CmdPipelineBarrier<'a> {
    pub fn execute(self, command_buffer: vk::CommandBuffer, context: &Context) {
        let memory_barriers: Vec<_> = self
            .memory_barriers
            .iter()
            .map(|v| {
                vk::MemoryBarrier2::builder()
                    .src_stage_mask(v.src_stage_mask)
                    .src_access_mask(v.src_access_mask)
                    .dst_stage_mask(v.dst_stage_mask)
                    .dst_access_mask(v.dst_access_mask)
                    .build() // Calling build is legal here
            })
            .collect();

        let image_memory_barriers: Vec<_> = self
            .image_transitions
            .iter()
            .map(|v| {
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(v.src_stage_mask)
                    .src_access_mask(v.src_access_mask)
                    .dst_stage_mask(v.dst_stage_mask)
                    .dst_access_mask(v.dst_access_mask)
                    .old_layout(v.old_layout)
                    .new_layout(v.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(v.image)
                    .subresource_range(ImageLayoutTransition::color_subresource_range())
                    .build()
            })
            .collect();

        unsafe {
            context.synchronisation2_loader.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::builder()
                    .memory_barriers(&memory_barriers)
                    .image_memory_barriers(&image_memory_barriers),
            );
        };
    }
}

/// Allocates and begins a primary command buffer that is submitted exactly once.
pub fn begin_one_time_commands(
    context: &Context,
    command_pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, vk::Result> {
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe { context.device.allocate_command_buffers(&allocate_info) }?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        context
            .device
            .begin_command_buffer(command_buffer, &begin_info)
    }?;

    Ok(command_buffer)
}

/// Ends, submits and waits on `fence`, then hands the command buffer back to the pool.
pub fn submit_and_wait(
    context: &Context,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
) -> Result<(), vk::Result> {
    let device = &context.device;
    unsafe { device.end_command_buffer(command_buffer) }?;

    let submit_info =
        vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&command_buffer));

    unsafe {
        device.reset_fences(std::slice::from_ref(&fence))?;
        device.queue_submit(context.queue, std::slice::from_ref(&submit_info), fence)?;
        device.wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)?;
        device.free_command_buffers(command_pool, std::slice::from_ref(&command_buffer));
    }
    Ok(())
}
