use ash::vk;

use super::{
    buffer::{self, find_memorytype_index},
    command_buffer::{begin_one_time_commands, submit_and_wait},
    context::Context,
    device::RawImage,
    error::DeviceError,
};

pub const STORAGE_IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn create_image(
    context: &Context,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> Result<RawImage, DeviceError> {
    let device = &context.device;

    let create_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&create_info, None) }?;

    let memory_requirements = unsafe { device.get_image_memory_requirements(image) };

    let Some(image_memorytype_index) = find_memorytype_index(
        &memory_requirements,
        &context.device_memory_properties,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) else {
        unsafe { device.destroy_image(image, None) };
        return Err(DeviceError::NoCompatibleMemoryType {
            type_bits: memory_requirements.memory_type_bits,
            flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        });
    };

    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(memory_requirements.size)
        .memory_type_index(image_memorytype_index);

    let memory = unsafe { device.allocate_memory(&allocate_info, None) }?;

    unsafe { device.bind_image_memory(image, memory, 0) }?;

    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_subresource_range());

    let view = unsafe { device.create_image_view(&view_info, None) }?;

    Ok(RawImage {
        image,
        memory,
        view,
        extent,
        format,
    })
}

fn insert_layout_barrier(
    context: &Context,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_stage_mask, dst_stage_mask): (vk::PipelineStageFlags2, vk::PipelineStageFlags2),
    (src_access_mask, dst_access_mask): (vk::AccessFlags2, vk::AccessFlags2),
) {
    let barrier = vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(src_stage_mask)
        .src_access_mask(src_access_mask)
        .dst_stage_mask(dst_stage_mask)
        .dst_access_mask(dst_access_mask)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .build();

    let dependency_info =
        vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&barrier));

    unsafe {
        context
            .synchronisation2_loader
            .cmd_pipeline_barrier2(command_buffer, &dependency_info)
    };
}

/// Output target of the trace dispatch. Left in UNDEFINED, the first frame transitions it.
pub fn create_storage_image(
    context: &Context,
    extent: vk::Extent2D,
) -> Result<RawImage, DeviceError> {
    create_image(
        context,
        extent,
        STORAGE_IMAGE_FORMAT,
        vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::SAMPLED,
    )
}

/// Uploads tightly packed RGBA8 pixels through a staging buffer and leaves the image
/// in SHADER_READ_ONLY_OPTIMAL.
pub fn create_sampled_image(
    context: &Context,
    extent: vk::Extent2D,
    rgba_pixels: &[u8],
) -> Result<RawImage, DeviceError> {
    assert_eq!(
        rgba_pixels.len(),
        (extent.width * extent.height * 4) as usize
    );

    let image = create_image(
        context,
        extent,
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
    )?;

    let staging_buffer = buffer::create_buffer(
        context,
        rgba_pixels.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    buffer::write_buffer(context, &staging_buffer, 0, rgba_pixels)?;

    let command_buffer = begin_one_time_commands(context, context.command_pool)?;

    insert_layout_barrier(
        context,
        command_buffer,
        image.image,
        (
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        (
            vk::PipelineStageFlags2::NONE,
            vk::PipelineStageFlags2::COPY,
        ),
        (vk::AccessFlags2::empty(), vk::AccessFlags2::TRANSFER_WRITE),
    );

    let buffer_image_copy = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    };

    unsafe {
        context.device.cmd_copy_buffer_to_image(
            command_buffer,
            staging_buffer.buffer,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&buffer_image_copy),
        )
    };

    insert_layout_barrier(
        context,
        command_buffer,
        image.image,
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        (
            vk::PipelineStageFlags2::COPY,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        ),
        (
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
    );

    submit_and_wait(
        context,
        context.command_pool,
        command_buffer,
        context.upload_fence,
    )?;

    // The copy has retired, the staging memory can go right away.
    buffer::destroy_buffer(context, staging_buffer);

    Ok(image)
}

pub fn destroy_image(context: &Context, image: RawImage) {
    let device = &context.device;
    unsafe {
        device.destroy_image_view(image.view, None);
        device.destroy_image(image.image, None);
        device.free_memory(image.memory, None);
    }
}

pub fn create_sampler(device: &ash::Device) -> Result<vk::Sampler, vk::Result> {
    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .max_lod(vk::LOD_CLAMP_NONE);

    unsafe { device.create_sampler(&create_info, None) }
}
