use ash::vk;

use crate::utility::aligned_size;

use super::{
    buffer,
    context::Context,
    device::{RayTracingPipeline, RayTracingShaders, ShaderBindingTable},
    error::DeviceError,
    shader_create_info::ShaderCreateInfo,
};

// Shader group order, the shader binding table is laid out the same way.
const RAYGEN_GROUP: u32 = 0;
const MISS_GROUP_COUNT: u32 = 2;
const HIT_GROUP_COUNT: u32 = 2;
const GROUP_COUNT: u32 = 1 + MISS_GROUP_COUNT + HIT_GROUP_COUNT;

pub fn push_constant_stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::RAYGEN_KHR
        | vk::ShaderStageFlags::MISS_KHR
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR
}

pub fn create_ray_tracing_pipeline(
    context: &Context,
    set_layout: vk::DescriptorSetLayout,
    shaders: &RayTracingShaders,
    push_constant_size: u32,
) -> Result<RayTracingPipeline, DeviceError> {
    let device = &context.device;

    let pipeline_layout = {
        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(push_constant_stages())
            .offset(0)
            .size(push_constant_size);
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(std::slice::from_ref(&set_layout))
            .push_constant_ranges(std::slice::from_ref(&push_constant_range));
        unsafe { device.create_pipeline_layout(&create_info, None) }?
    };

    let shader_stages = [
        ShaderCreateInfo::new(context, vk::ShaderStageFlags::RAYGEN_KHR, &shaders.raygen)?,
        ShaderCreateInfo::new(context, vk::ShaderStageFlags::MISS_KHR, &shaders.miss)?,
        ShaderCreateInfo::new(context, vk::ShaderStageFlags::MISS_KHR, &shaders.shadow_miss)?,
        ShaderCreateInfo::new(
            context,
            vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            &shaders.closest_hit,
        )?,
        ShaderCreateInfo::new(
            context,
            vk::ShaderStageFlags::INTERSECTION_KHR,
            &shaders.sphere_intersection,
        )?,
        ShaderCreateInfo::new(
            context,
            vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            &shaders.sphere_closest_hit,
        )?,
    ];
    let stage_create_infos: Vec<_> = shader_stages.iter().map(|stage| stage.build()).collect();

    let general_group = |shader: u32| {
        vk::RayTracingShaderGroupCreateInfoKHR::builder()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(shader)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
            .build()
    };

    let groups = [
        general_group(0),
        general_group(1),
        general_group(2),
        vk::RayTracingShaderGroupCreateInfoKHR::builder()
            .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(3)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
            .build(),
        vk::RayTracingShaderGroupCreateInfoKHR::builder()
            .ty(vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(5)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(4)
            .build(),
    ];

    let create_info = vk::RayTracingPipelineCreateInfoKHR::builder()
        .stages(&stage_create_infos)
        .groups(&groups)
        // Primary ray plus the shadow ray.
        .max_pipeline_ray_recursion_depth(2)
        .layout(pipeline_layout);

    let pipeline = unsafe {
        context
            .context_raytracing
            .ray_tracing_pipeline
            .create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
    }?[0];

    let shader_binding_table = create_shader_binding_table(context, pipeline)?;

    Ok(RayTracingPipeline {
        pipeline,
        layout: pipeline_layout,
        shader_binding_table,
    })
}

fn create_shader_binding_table(
    context: &Context,
    pipeline: vk::Pipeline,
) -> Result<ShaderBindingTable, DeviceError> {
    let properties = &context
        .context_raytracing
        .physical_device_ray_tracing_pipeline_properties_khr;
    let handle_size = properties.shader_group_handle_size;
    let handle_size_aligned = aligned_size(handle_size, properties.shader_group_handle_alignment);
    let base_alignment = properties.shader_group_base_alignment;

    // The raygen region must have size == stride.
    let raygen_size = aligned_size(handle_size_aligned, base_alignment);
    let miss_size = aligned_size(handle_size_aligned * MISS_GROUP_COUNT, base_alignment);
    let hit_size = aligned_size(handle_size_aligned * HIT_GROUP_COUNT, base_alignment);

    let handles = unsafe {
        context
            .context_raytracing
            .ray_tracing_pipeline
            .get_ray_tracing_shader_group_handles(
                pipeline,
                RAYGEN_GROUP,
                GROUP_COUNT,
                (GROUP_COUNT * handle_size) as usize,
            )
    }?;
    let handle = |group: u32| {
        let start = (group * handle_size) as usize;
        &handles[start..start + handle_size as usize]
    };

    let mut table = vec![0u8; (raygen_size + miss_size + hit_size) as usize];
    let mut place = |offset: u32, group: u32| {
        let offset = offset as usize;
        table[offset..offset + handle_size as usize].copy_from_slice(handle(group));
    };
    place(0, RAYGEN_GROUP);
    for i in 0..MISS_GROUP_COUNT {
        place(raygen_size + i * handle_size_aligned, 1 + i);
    }
    for i in 0..HIT_GROUP_COUNT {
        place(
            raygen_size + miss_size + i * handle_size_aligned,
            1 + MISS_GROUP_COUNT + i,
        );
    }

    let sbt_buffer = buffer::create_buffer(
        context,
        table.len() as vk::DeviceSize,
        vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    buffer::write_buffer(context, &sbt_buffer, 0, &table)?;
    let device_address = buffer::get_device_address(context, &sbt_buffer);

    Ok(ShaderBindingTable {
        buffer: Some(sbt_buffer),
        raygen: vk::StridedDeviceAddressRegionKHR {
            device_address,
            stride: raygen_size as u64,
            size: raygen_size as u64,
        },
        miss: vk::StridedDeviceAddressRegionKHR {
            device_address: device_address + raygen_size as u64,
            stride: handle_size_aligned as u64,
            size: miss_size as u64,
        },
        hit: vk::StridedDeviceAddressRegionKHR {
            device_address: device_address + (raygen_size + miss_size) as u64,
            stride: handle_size_aligned as u64,
            size: hit_size as u64,
        },
        callable: vk::StridedDeviceAddressRegionKHR::default(),
    })
}

pub fn destroy_ray_tracing_pipeline(context: &Context, pipeline: &RayTracingPipeline) {
    if let Some(sbt_buffer) = pipeline.shader_binding_table.buffer {
        buffer::destroy_buffer(context, sbt_buffer);
    }
    unsafe {
        context.device.destroy_pipeline(pipeline.pipeline, None);
        context
            .device
            .destroy_pipeline_layout(pipeline.layout, None);
    }
}
