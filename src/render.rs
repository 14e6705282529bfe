pub mod scene_bindings;
pub mod shader_types;
mod trace_pass;

use std::sync::Arc;

use ash::vk;

use crate::{
    camera::Camera,
    config_loader::Config,
    scene::Scene,
    scene_uploader::{SceneBuffer, SceneUploader},
    texture_cache::TextureCache,
    vulkan::{
        acceleration_structure::AccelerationStructureManager,
        command_buffer::MemoryBarrier,
        device::{RawImage, RayTracingDevice, RayTracingShaders},
        error::DeviceError,
        resources::{GpuResources, ImageKey},
    },
};

use self::{
    scene_bindings::{BindingSources, SceneBindings},
    trace_pass::TracePass,
};

/// What happened during one [`Renderer::render`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// The scene was uploaded and the acceleration structures rebuilt.
    pub scene_synced: bool,
    pub reallocated: Vec<SceneBuffer>,
    /// Descriptor bindings rewritten before the dispatch.
    pub rebound: Vec<u32>,
    pub traced: bool,
    pub primitive_count: u32,
}

/// Keeps the device side copy of a [`Scene`] current and traces it into an output image.
///
/// Scene changes are only picked up after [`Renderer::invalidate_scene`], they then go
/// through upload, a full acceleration structure rebuild and a descriptor refresh before
/// the dispatch of that same frame.
pub struct Renderer {
    resources: GpuResources,
    uploader: SceneUploader,
    acceleration_structures: AccelerationStructureManager,
    bindings: SceneBindings,
    textures: TextureCache,
    trace_pass: TracePass,

    output_image: ImageKey,
    output_extent: vk::Extent2D,
    output_needs_transition: bool,
    render_scale: f32,

    scene_dirty: bool,
    frame_index: u32,
    destroyed: bool,
}

impl Renderer {
    pub fn new(
        device: Arc<dyn RayTracingDevice>,
        shaders: &RayTracingShaders,
        config: &Config,
    ) -> Result<Self, DeviceError> {
        let mut resources = GpuResources::new(device.clone());
        let bindings = SceneBindings::new(device.as_ref())?;
        let trace_pass = TracePass::new(device, bindings.layout(), shaders)?;

        let (width, height) = config.render_extent();
        let output_extent = vk::Extent2D { width, height };
        let output_image = resources.create_storage_image(output_extent)?;
        log::info!("Renderer ready, tracing at {width}x{height}");

        Ok(Self {
            resources,
            uploader: SceneUploader::default(),
            acceleration_structures: AccelerationStructureManager::default(),
            bindings,
            textures: TextureCache::new(&config.texture_directory),
            trace_pass,
            output_image,
            output_extent,
            output_needs_transition: true,
            render_scale: config.render_scale,
            scene_dirty: true,
            frame_index: 0,
            destroyed: false,
        })
    }

    /// Recreates the output image for a new viewport size. Returns `false` when the
    /// traced size stays the same or the viewport is zero sized.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<bool, DeviceError> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {width}x{height}");
            return Ok(false);
        }
        let scale = |size: u32| ((size as f32 * self.render_scale) as u32).max(1);
        let extent = vk::Extent2D {
            width: scale(width),
            height: scale(height),
        };
        if extent == self.output_extent {
            return Ok(false);
        }

        let output_image = self.resources.create_storage_image(extent)?;
        self.resources.dispose_image(self.output_image);
        self.output_image = output_image;
        self.output_extent = extent;
        self.output_needs_transition = true;
        log::info!("Output image resized to {}x{}", extent.width, extent.height);
        Ok(true)
    }

    /// The next frame uploads the scene again and rebuilds the acceleration structures.
    pub fn invalidate_scene(&mut self) {
        self.scene_dirty = true;
    }

    pub fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<FrameReport, DeviceError> {
        let frame = self.resources.begin_frame();
        let device = self.resources.device().clone();
        let command_buffer = device.begin_commands()?;
        let mut report = FrameReport {
            frame,
            ..Default::default()
        };

        if self.output_needs_transition {
            if let Some(record) = self.resources.image(self.output_image) {
                self.trace_pass
                    .prepare_output(command_buffer, record.raw.image);
            }
            self.output_needs_transition = false;
        }

        if self.scene_dirty {
            let sync = self
                .uploader
                .sync(&mut self.resources, &mut self.textures, scene)?;
            device.cmd_memory_barrier(command_buffer, &MemoryBarrier::host_upload());
            match &sync.geometry {
                Some(geometry) => {
                    self.acceleration_structures
                        .rebuild(&mut self.resources, command_buffer, geometry)?;
                }
                None => self.acceleration_structures.cleanup(&mut self.resources),
            }
            self.scene_dirty = false;
            report.scene_synced = true;
            report.reallocated = sync.reallocated;
        }

        if let Some(buffers) = self.uploader.buffers() {
            let fallback_texture = self.textures.fallback(&mut self.resources)?;
            let sources = BindingSources {
                top_level: self.acceleration_structures.top_level_handle(),
                output_image: self.output_image,
                buffers,
                textures: self.textures.textures(),
                fallback_texture,
            };
            report.rebound = self.bindings.write(&self.resources, &sources);
        }

        if self.acceleration_structures.is_built() {
            let push_constants = camera.push_constants(self.frame_index);
            self.trace_pass.render(
                command_buffer,
                self.bindings.set(),
                &push_constants,
                self.output_extent,
            );
            report.traced = true;
            report.primitive_count = self.acceleration_structures.primitive_count();
        }

        device.submit_commands(command_buffer)?;
        self.resources.retire(frame);
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(report)
    }

    pub fn output_image(&self) -> Option<&RawImage> {
        self.resources
            .image(self.output_image)
            .map(|record| &record.raw)
    }

    pub fn output_extent(&self) -> vk::Extent2D {
        self.output_extent
    }

    pub fn is_built(&self) -> bool {
        self.acceleration_structures.is_built()
    }

    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    /// Waits for the device and frees every resource. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        self.acceleration_structures
            .release_all(&mut self.resources);
        self.uploader.release(&mut self.resources);
        self.textures.release(&mut self.resources);
        self.resources.dispose_image(self.output_image);
        self.resources.release_all();
        self.bindings.destroy(self.resources.device().as_ref());
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.destroy();
    }
}
