use ash::vk;

use crate::{
    scene_uploader::SceneBuffers,
    texture_cache::MAX_TEXTURES,
    vulkan::{
        descriptor_set::WriteDescriptorSet,
        device::RayTracingDevice,
        error::DeviceError,
        resources::{AccelerationStructureKey, BufferKey, GpuResources, ImageKey},
    },
};

pub const TOP_LEVEL: u32 = 0;
pub const OUTPUT_IMAGE: u32 = 1;
pub const VERTICES: u32 = 2;
pub const INDICES: u32 = 3;
pub const MATERIALS: u32 = 4;
pub const MATERIAL_INDICES: u32 = 5;
pub const LIGHTS: u32 = 6;
pub const TEXTURES: u32 = 7;
pub const AABBS: u32 = 8;

const BINDING_COUNT: usize = 9;

fn stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::RAYGEN_KHR
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        | vk::ShaderStageFlags::MISS_KHR
        | vk::ShaderStageFlags::INTERSECTION_KHR
}

pub fn layout_bindings() -> Vec<vk::DescriptorSetLayoutBinding> {
    let binding = |binding: u32, descriptor_type: vk::DescriptorType, count: u32| {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(count)
            .stage_flags(stages())
            .build()
    };

    vec![
        binding(TOP_LEVEL, vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1),
        binding(OUTPUT_IMAGE, vk::DescriptorType::STORAGE_IMAGE, 1),
        binding(VERTICES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(INDICES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(MATERIALS, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(MATERIAL_INDICES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(LIGHTS, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(
            TEXTURES,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            MAX_TEXTURES as u32,
        ),
        binding(AABBS, vk::DescriptorType::STORAGE_BUFFER, 1),
    ]
}

/// What one binding slot was last written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bound {
    AccelerationStructure(AccelerationStructureKey),
    Image(ImageKey),
    Buffer(BufferKey),
    Textures([ImageKey; MAX_TEXTURES]),
}

/// Everything the binding table points at this frame.
pub struct BindingSources<'a> {
    /// `None` until the first successful build, the slot then stays unwritten.
    pub top_level: Option<AccelerationStructureKey>,
    pub output_image: ImageKey,
    pub buffers: SceneBuffers,
    pub textures: &'a [ImageKey],
    pub fallback_texture: ImageKey,
}

impl BindingSources<'_> {
    fn desired(&self) -> [Option<Bound>; BINDING_COUNT] {
        let mut textures = [self.fallback_texture; MAX_TEXTURES];
        for (slot, &texture) in textures.iter_mut().zip(self.textures) {
            *slot = texture;
        }

        [
            self.top_level.map(Bound::AccelerationStructure),
            Some(Bound::Image(self.output_image)),
            Some(Bound::Buffer(self.buffers.vertices)),
            Some(Bound::Buffer(self.buffers.indices)),
            Some(Bound::Buffer(self.buffers.materials)),
            Some(Bound::Buffer(self.buffers.material_indices)),
            Some(Bound::Buffer(self.buffers.lights)),
            Some(Bound::Textures(textures)),
            Some(Bound::Buffer(self.buffers.aabbs)),
        ]
    }
}

/// The single descriptor set of the ray tracing pipeline. Remembers which resource
/// each binding points at and only rewrites the bindings whose resource changed.
pub struct SceneBindings {
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
    bound: [Option<Bound>; BINDING_COUNT],
}

impl SceneBindings {
    pub fn new(device: &dyn RayTracingDevice) -> Result<Self, DeviceError> {
        let layout = device.create_descriptor_set_layout(&layout_bindings())?;
        let set = device.allocate_descriptor_set(layout)?;
        Ok(Self {
            layout,
            set,
            bound: [None; BINDING_COUNT],
        })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Returns the bindings that were rewritten.
    pub fn write(&mut self, resources: &GpuResources, sources: &BindingSources) -> Vec<u32> {
        let desired = sources.desired();
        let mut writes = Vec::new();
        let mut rewritten = Vec::new();

        for (binding, (wanted, bound)) in desired.iter().zip(self.bound.iter_mut()).enumerate() {
            let Some(wanted) = wanted else {
                continue;
            };
            if bound.as_ref() == Some(wanted) {
                continue;
            }
            let Some(write) = Self::describe(resources, binding as u32, wanted) else {
                log::warn!("Binding {binding} points at a released resource, left as it was");
                continue;
            };
            writes.push(write);
            rewritten.push(binding as u32);
            *bound = Some(*wanted);
        }

        if !writes.is_empty() {
            log::debug!("Rewriting descriptor bindings {rewritten:?}");
            resources.device().update_descriptor_set(self.set, &writes);
        }
        rewritten
    }

    fn describe(resources: &GpuResources, binding: u32, bound: &Bound) -> Option<WriteDescriptorSet> {
        let write = match *bound {
            Bound::AccelerationStructure(handle) => WriteDescriptorSet::acceleration_structure(
                binding,
                resources.acceleration_structure(handle)?.inner,
            ),
            Bound::Image(handle) => WriteDescriptorSet::storage_image_view_with_layout(
                binding,
                resources.image(handle)?.raw.view,
                vk::ImageLayout::GENERAL,
            ),
            Bound::Buffer(handle) => {
                WriteDescriptorSet::storage_buffer(binding, resources.buffer(handle)?.raw.buffer)
            }
            Bound::Textures(handles) => {
                let views = handles
                    .iter()
                    .map(|&handle| resources.image(handle).map(|record| record.raw.view))
                    .collect::<Option<Vec<_>>>()?;
                WriteDescriptorSet::image_view_sampler_array(
                    binding,
                    views,
                    resources.device().default_sampler(),
                )
            }
        };
        Some(write)
    }

    /// Forgets what was written, the next [`SceneBindings::write`] rewrites everything.
    pub fn invalidate(&mut self) {
        self.bound = [None; BINDING_COUNT];
    }

    pub fn destroy(&mut self, device: &dyn RayTracingDevice) {
        device.destroy_descriptor_set_layout(self.layout);
        self.invalidate();
    }
}
