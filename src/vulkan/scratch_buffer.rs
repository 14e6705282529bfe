use ash::vk;

use crate::utility::aligned_device_size;

use super::{
    error::DeviceError,
    resources::{BufferKey, GpuResources, MemoryLocation},
};

/// The one scratch allocation shared by every bottom and top level build.
/// Grows to the largest request seen, only [`ScratchBuffer::release`] shrinks it.
#[derive(Default)]
pub struct ScratchBuffer {
    buffer: Option<BufferKey>,
    size: vk::DeviceSize,
}

impl ScratchBuffer {
    /// Returns the device address of a scratch region of at least `min_size` bytes.
    pub fn ensure(
        &mut self,
        resources: &mut GpuResources,
        min_size: vk::DeviceSize,
    ) -> Result<vk::DeviceAddress, DeviceError> {
        let alignment = resources.device().scratch_alignment().max(1);
        let required = aligned_device_size(min_size, alignment);

        let current = self
            .buffer
            .and_then(|handle| resources.buffer_device_address(handle));
        if let Some(address) = current {
            if self.size >= required {
                return Ok(aligned_device_size(address, alignment));
            }
        }

        if let Some(old) = self.buffer.take() {
            resources.dispose_buffer(old);
        }

        // Over allocate by one alignment so the address itself can be aligned.
        let handle = resources.create_buffer(
            required + alignment,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::DeviceLocal,
        )?;
        log::debug!("Scratch buffer grown from {} to {required} bytes", self.size);
        self.buffer = Some(handle);
        self.size = required;

        let address = resources.buffer_device_address(handle).unwrap_or_default();
        Ok(aligned_device_size(address, alignment))
    }

    /// Size of the current allocation, zero when none exists.
    pub fn high_water_mark(&self) -> vk::DeviceSize {
        if self.buffer.is_some() {
            self.size
        } else {
            0
        }
    }

    pub fn release(&mut self, resources: &mut GpuResources) {
        if let Some(handle) = self.buffer.take() {
            resources.dispose_buffer(handle);
        }
        self.size = 0;
    }
}
