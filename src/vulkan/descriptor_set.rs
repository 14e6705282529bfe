use ash::vk;

use super::context::Context;

#[derive(Clone, Debug)]
pub struct WriteDescriptorSet {
    pub binding: u32,
    pub info: DescriptorInfo,
}

#[derive(Clone, Debug)]
pub enum DescriptorInfo {
    StorageBuffer(vk::DescriptorBufferInfo),
    StorageImage(vk::DescriptorImageInfo),
    SampledImages(Vec<vk::DescriptorImageInfo>),
    AccelerationStructure(vk::AccelerationStructureKHR),
}

impl DescriptorInfo {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorInfo::StorageBuffer(_) => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorInfo::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorInfo::SampledImages(_) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorInfo::AccelerationStructure(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }
}

impl WriteDescriptorSet {
    pub fn storage_buffer(binding: u32, buffer: vk::Buffer) -> WriteDescriptorSet {
        let info = vk::DescriptorBufferInfo::builder()
            .buffer(buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)
            .build();

        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageBuffer(info),
        }
    }

    pub fn storage_image_view_with_layout(
        binding: u32,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    ) -> WriteDescriptorSet {
        let info = vk::DescriptorImageInfo::builder()
            .image_view(image_view)
            .image_layout(image_layout)
            .build();

        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageImage(info),
        }
    }

    pub fn image_view_sampler_array(
        binding: u32,
        image_views: impl IntoIterator<Item = vk::ImageView>,
        sampler: vk::Sampler,
    ) -> WriteDescriptorSet {
        let infos = image_views
            .into_iter()
            .map(|image_view| {
                vk::DescriptorImageInfo::builder()
                    .sampler(sampler)
                    .image_view(image_view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .build()
            })
            .collect();

        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::SampledImages(infos),
        }
    }

    pub fn acceleration_structure(
        binding: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::AccelerationStructure(acceleration_structure),
        }
    }
}

pub fn update_descriptor_set(
    context: &Context,
    descriptor_set: vk::DescriptorSet,
    writes: &[WriteDescriptorSet],
) {
    // Acceleration structure writes chain an extension struct that has to outlive the call.
    let mut acceleration_structure_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> =
        writes
            .iter()
            .map(|write| match &write.info {
                DescriptorInfo::AccelerationStructure(acceleration_structure) => {
                    vk::WriteDescriptorSetAccelerationStructureKHR::builder()
                        .acceleration_structures(std::slice::from_ref(acceleration_structure))
                        .build()
                }
                _ => vk::WriteDescriptorSetAccelerationStructureKHR::default(),
            })
            .collect();

    let write_descriptor_sets: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .zip(acceleration_structure_infos.iter_mut())
        .map(|(write, acceleration_structure_info)| {
            let mut vk_write = vk::WriteDescriptorSet::builder()
                .dst_binding(write.binding)
                .descriptor_type(write.info.descriptor_type())
                .dst_set(descriptor_set);

            match &write.info {
                DescriptorInfo::StorageBuffer(info) => {
                    vk_write = vk_write.buffer_info(std::slice::from_ref(info))
                }
                DescriptorInfo::StorageImage(info) => {
                    vk_write = vk_write.image_info(std::slice::from_ref(info))
                }
                DescriptorInfo::SampledImages(infos) => vk_write = vk_write.image_info(infos),
                DescriptorInfo::AccelerationStructure(_) => {
                    vk_write = vk_write.push_next(acceleration_structure_info);
                    vk_write.descriptor_count = 1;
                }
            }
            vk_write.build()
        })
        .collect();

    unsafe {
        context
            .device
            .update_descriptor_sets(&write_descriptor_sets, &[])
    };
}
