use std::{collections::HashMap, path::PathBuf};

use ash::vk;
use image::RgbaImage;

use crate::{
    render::shader_types::GpuMaterial,
    vulkan::{
        error::DeviceError,
        resources::{GpuResources, ImageKey},
    },
};

/// Slots in the shader's texture array.
pub const MAX_TEXTURES: usize = 16;

/// Loads textures by file name on first use and hands out their slot in the
/// texture array afterwards. Files that fail to load resolve to
/// [`GpuMaterial::NO_TEXTURE`], and are only reported once.
pub struct TextureCache {
    directory: PathBuf,
    slots: HashMap<String, i32>,
    textures: Vec<ImageKey>,
    fallback: Option<ImageKey>,
}

impl TextureCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            slots: HashMap::new(),
            textures: Vec::new(),
            fallback: None,
        }
    }

    /// Slot of `file_name` in the texture array. Unreadable files degrade to
    /// [`GpuMaterial::NO_TEXTURE`], failing to create the image on the device does not.
    pub fn resolve(
        &mut self,
        resources: &mut GpuResources,
        file_name: &str,
    ) -> Result<i32, DeviceError> {
        if let Some(&slot) = self.slots.get(file_name) {
            return Ok(slot);
        }

        let slot = if self.textures.len() >= MAX_TEXTURES {
            log::warn!("Texture array is full, {file_name} is drawn untextured");
            GpuMaterial::NO_TEXTURE
        } else {
            match self.decode(file_name) {
                Ok(pixels) => {
                    let handle = self.upload(resources, file_name, &pixels)?;
                    self.textures.push(handle);
                    (self.textures.len() - 1) as i32
                }
                Err(error) => {
                    log::warn!("Could not load texture {file_name}: {error}");
                    GpuMaterial::NO_TEXTURE
                }
            }
        };

        self.slots.insert(file_name.to_string(), slot);
        Ok(slot)
    }

    fn decode(&self, file_name: &str) -> image::ImageResult<RgbaImage> {
        Ok(image::open(self.directory.join(file_name))?.to_rgba8())
    }

    fn upload(
        &self,
        resources: &mut GpuResources,
        file_name: &str,
        pixels: &RgbaImage,
    ) -> Result<ImageKey, DeviceError> {
        let extent = vk::Extent2D {
            width: pixels.width(),
            height: pixels.height(),
        };
        let handle = resources.create_sampled_image(extent, pixels.as_raw())?;
        log::info!(
            "Loaded texture {file_name} ({}x{})",
            extent.width,
            extent.height
        );
        Ok(handle)
    }

    /// Loaded textures, indexed by slot.
    pub fn textures(&self) -> &[ImageKey] {
        &self.textures
    }

    /// A 1x1 white texture that fills every unused slot of the texture array.
    pub fn fallback(&mut self, resources: &mut GpuResources) -> Result<ImageKey, DeviceError> {
        if let Some(handle) = self.fallback.filter(|&handle| resources.image(handle).is_some()) {
            return Ok(handle);
        }
        let handle = resources.create_sampled_image(
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            &[255; 4],
        )?;
        self.fallback = Some(handle);
        Ok(handle)
    }

    pub fn release(&mut self, resources: &mut GpuResources) {
        for handle in self.textures.drain(..).chain(self.fallback.take()) {
            resources.dispose_image(handle);
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vulkan::test_device::{DeviceCall, RecordingDevice};

    fn resources() -> (Arc<RecordingDevice>, GpuResources) {
        let device = Arc::new(RecordingDevice::default());
        let resources = GpuResources::new(device.clone());
        (device, resources)
    }

    fn write_png(directory: &std::path::Path, name: &str, width: u32, height: u32) {
        image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]))
            .save(directory.join(name))
            .unwrap();
    }

    fn sampled_images(device: &RecordingDevice) -> Vec<vk::Extent2D> {
        device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CreateSampledImage(extent) => Some(extent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn repeated_file_names_hit_the_cache() {
        let directory = tempfile::tempdir().unwrap();
        write_png(directory.path(), "grass.png", 4, 2);
        write_png(directory.path(), "stone.png", 2, 2);
        let (device, mut resources) = resources();
        let mut cache = TextureCache::new(directory.path());

        assert_eq!(cache.resolve(&mut resources, "grass.png").unwrap(), 0);
        assert_eq!(cache.resolve(&mut resources, "stone.png").unwrap(), 1);
        assert_eq!(cache.resolve(&mut resources, "grass.png").unwrap(), 0);

        assert_eq!(cache.textures().len(), 2);
        assert_eq!(
            sampled_images(&device),
            vec![
                vk::Extent2D {
                    width: 4,
                    height: 2
                },
                vk::Extent2D {
                    width: 2,
                    height: 2
                }
            ]
        );
    }

    #[test]
    fn missing_file_resolves_to_no_texture() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(directory.path().join("broken.png"), b"not a png").unwrap();
        let (device, mut resources) = resources();
        let mut cache = TextureCache::new(directory.path());

        assert_eq!(cache.resolve(&mut resources, "missing.png").unwrap(), -1);
        assert_eq!(cache.resolve(&mut resources, "broken.png").unwrap(), -1);
        assert_eq!(cache.resolve(&mut resources, "missing.png").unwrap(), -1);

        assert!(cache.textures().is_empty());
        assert!(sampled_images(&device).is_empty());
    }

    #[test]
    fn full_array_refuses_new_textures() {
        let directory = tempfile::tempdir().unwrap();
        let (_device, mut resources) = resources();
        let mut cache = TextureCache::new(directory.path());
        for i in 0..=MAX_TEXTURES {
            write_png(directory.path(), &format!("{i}.png"), 1, 1);
        }

        for i in 0..MAX_TEXTURES {
            assert_eq!(cache.resolve(&mut resources, &format!("{i}.png")).unwrap(), i as i32);
        }
        let overflow = format!("{MAX_TEXTURES}.png");

        assert_eq!(cache.resolve(&mut resources, &overflow).unwrap(), -1);
        assert_eq!(cache.textures().len(), MAX_TEXTURES);
    }

    #[test]
    fn device_failure_is_not_swallowed() {
        let directory = tempfile::tempdir().unwrap();
        write_png(directory.path(), "grass.png", 2, 2);
        let (device, mut resources) = resources();
        device.fail_image_creation();
        let mut cache = TextureCache::new(directory.path());

        let result = cache.resolve(&mut resources, "grass.png");

        assert!(matches!(
            result,
            Err(DeviceError::NoCompatibleMemoryType { .. })
        ));
        assert!(cache.textures().is_empty());
        // Nothing is cached, the next sync fails the same way.
        assert!(cache.resolve(&mut resources, "grass.png").is_err());
    }

    #[test]
    fn fallback_is_created_once() {
        let (device, mut resources) = resources();
        let mut cache = TextureCache::new("textures");

        let first = cache.fallback(&mut resources).unwrap();
        let second = cache.fallback(&mut resources).unwrap();

        assert_eq!(first, second);
        assert_eq!(sampled_images(&device).len(), 1);
    }
}
