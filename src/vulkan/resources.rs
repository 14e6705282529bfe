use std::{collections::VecDeque, sync::Arc};

use ash::vk;
use slotmap::{new_key_type, SlotMap};

use super::{
    device::{RawBuffer, RawImage, RayTracingDevice},
    error::DeviceError,
};

/// The hardware rejects zero sized buffers, empty logical buffers get this many bytes.
pub const MIN_BUFFER_SIZE: vk::DeviceSize = 16;

new_key_type! {
    /// A key of a removed record never resolves again, even after its slot got reused.
    pub struct BufferKey;
    pub struct AccelerationStructureKey;
    pub struct ImageKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    DeviceLocal,
    /// Host visible and host coherent, writes are seen by the next GPU read.
    HostVisible,
}

impl MemoryLocation {
    pub fn property_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryLocation::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryLocation::HostVisible => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferRecord {
    pub raw: RawBuffer,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    /// Bytes the caller asked for, `raw.size` may be larger.
    pub requested_size: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug)]
pub struct AccelerationStructureRecord {
    pub inner: vk::AccelerationStructureKHR,
    pub structure_type: vk::AccelerationStructureTypeKHR,
    pub buffer: BufferKey,
    pub device_address: vk::DeviceAddress,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageRecord {
    pub raw: RawImage,
}

#[derive(Debug)]
enum PendingFree {
    Buffer(RawBuffer),
    AccelerationStructure(vk::AccelerationStructureKHR),
    Image(RawImage),
}

/// Disposal requests keyed by the frame that last could have used the resource.
#[derive(Default)]
pub struct DeferredFreeQueue {
    pending: VecDeque<(u64, PendingFree)>,
}

impl DeferredFreeQueue {
    fn push(&mut self, frame: u64, resource: PendingFree) {
        self.pending.push_back((frame, resource));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Everything queued at or before `completed_frame`, in request order.
    fn take_retired(&mut self, completed_frame: u64) -> Vec<PendingFree> {
        let mut retired = Vec::new();
        while let Some((frame, _)) = self.pending.front() {
            if *frame > completed_frame {
                break;
            }
            if let Some((_, resource)) = self.pending.pop_front() {
                retired.push(resource);
            }
        }
        retired
    }

    fn take_all(&mut self) -> Vec<PendingFree> {
        self.pending.drain(..).map(|(_, resource)| resource).collect()
    }
}

/// Owns every GPU resource the renderer creates. Records live in slot maps and are never destroyed in place: disposing one queues the raw handles until
/// the frame that requested the disposal has retired on the GPU.
pub struct GpuResources {
    device: Arc<dyn RayTracingDevice>,
    buffers: SlotMap<BufferKey, BufferRecord>,
    acceleration_structures: SlotMap<AccelerationStructureKey, AccelerationStructureRecord>,
    images: SlotMap<ImageKey, ImageRecord>,
    pending_frees: DeferredFreeQueue,
    current_frame: u64,
}

impl GpuResources {
    pub fn new(device: Arc<dyn RayTracingDevice>) -> Self {
        Self {
            device,
            buffers: SlotMap::with_key(),
            acceleration_structures: SlotMap::with_key(),
            images: SlotMap::with_key(),
            pending_frees: DeferredFreeQueue::default(),
            current_frame: 0,
        }
    }

    pub fn device(&self) -> &Arc<dyn RayTracingDevice> {
        &self.device
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Starts recording a new frame, disposals from here on wait for this frame.
    pub fn begin_frame(&mut self) -> u64 {
        self.current_frame += 1;
        self.current_frame
    }

    pub fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<BufferKey, DeviceError> {
        let allocation_size = size.max(MIN_BUFFER_SIZE);
        let raw = self
            .device
            .create_buffer(allocation_size, usage, location.property_flags())?;

        Ok(self.buffers.insert(BufferRecord {
            raw,
            usage,
            location,
            requested_size: size,
        }))
    }

    pub fn buffer(&self, handle: BufferKey) -> Option<&BufferRecord> {
        self.buffers.get(handle)
    }

    /// Copies `data` to the start of a host visible buffer.
    pub fn write_buffer(&self, handle: BufferKey, data: &[u8]) {
        let Some(record) = self.buffers.get(handle) else {
            log::warn!("Write to stale buffer {handle:?} ignored");
            return;
        };
        debug_assert_eq!(record.location, MemoryLocation::HostVisible);
        self.device.write_buffer(&record.raw, 0, data);
    }

    pub fn buffer_device_address(&self, handle: BufferKey) -> Option<vk::DeviceAddress> {
        self.buffers
            .get(handle)
            .map(|record| self.device.buffer_device_address(&record.raw))
    }

    pub fn dispose_buffer(&mut self, handle: BufferKey) {
        if let Some(record) = self.buffers.remove(handle) {
            self.pending_frees
                .push(self.current_frame, PendingFree::Buffer(record.raw));
        }
    }

    /// Allocates the backing buffer and creates the structure object on it. The
    /// buffer is owned by the record and disposed together with it.
    pub fn create_acceleration_structure(
        &mut self,
        structure_type: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
    ) -> Result<AccelerationStructureKey, DeviceError> {
        let usage = vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        let location = MemoryLocation::DeviceLocal;
        let raw_buffer =
            self.device
                .create_buffer(size.max(MIN_BUFFER_SIZE), usage, location.property_flags())?;

        let inner = match self
            .device
            .create_acceleration_structure(structure_type, &raw_buffer, size)
        {
            Ok(inner) => inner,
            Err(error) => {
                // Never referenced by any command, nothing to wait for.
                self.device.destroy_buffer(raw_buffer);
                return Err(error);
            }
        };
        let device_address = self.device.acceleration_structure_device_address(inner);

        let buffer = self.buffers.insert(BufferRecord {
            raw: raw_buffer,
            usage,
            location,
            requested_size: size,
        });

        Ok(self.acceleration_structures.insert(AccelerationStructureRecord {
            inner,
            structure_type,
            buffer,
            device_address,
        }))
    }

    pub fn acceleration_structure(
        &self,
        handle: AccelerationStructureKey,
    ) -> Option<&AccelerationStructureRecord> {
        self.acceleration_structures.get(handle)
    }

    pub fn dispose_acceleration_structure(&mut self, handle: AccelerationStructureKey) {
        if let Some(record) = self.acceleration_structures.remove(handle) {
            self.pending_frees.push(
                self.current_frame,
                PendingFree::AccelerationStructure(record.inner),
            );
            self.dispose_buffer(record.buffer);
        }
    }

    pub fn create_storage_image(
        &mut self,
        extent: vk::Extent2D,
    ) -> Result<ImageKey, DeviceError> {
        let raw = self.device.create_storage_image(extent)?;
        Ok(self.images.insert(ImageRecord { raw }))
    }

    pub fn create_sampled_image(
        &mut self,
        extent: vk::Extent2D,
        rgba_pixels: &[u8],
    ) -> Result<ImageKey, DeviceError> {
        let raw = self.device.create_sampled_image(extent, rgba_pixels)?;
        Ok(self.images.insert(ImageRecord { raw }))
    }

    pub fn image(&self, handle: ImageKey) -> Option<&ImageRecord> {
        self.images.get(handle)
    }

    pub fn dispose_image(&mut self, handle: ImageKey) {
        if let Some(record) = self.images.remove(handle) {
            self.pending_frees
                .push(self.current_frame, PendingFree::Image(record.raw));
        }
    }

    pub fn pending_free_count(&self) -> usize {
        self.pending_frees.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Destroys everything whose last possible user was `completed_frame` or older.
    /// Call only after the GPU signalled that frame's fence.
    pub fn retire(&mut self, completed_frame: u64) {
        let retired = self.pending_frees.take_retired(completed_frame);
        if !retired.is_empty() {
            log::debug!(
                "Frame {completed_frame} retired, freeing {} resources",
                retired.len()
            );
        }
        for resource in retired {
            self.destroy(resource);
        }
    }

    /// Waits for the device and destroys every pending and live resource.
    pub fn release_all(&mut self) {
        self.device.wait_idle();

        for resource in self.pending_frees.take_all() {
            self.destroy(resource);
        }

        for (_, record) in self.acceleration_structures.drain() {
            self.device.destroy_acceleration_structure(record.inner);
        }
        for (_, record) in self.buffers.drain() {
            self.device.destroy_buffer(record.raw);
        }
        for (_, record) in self.images.drain() {
            self.device.destroy_image(record.raw);
        }
    }

    fn destroy(&self, resource: PendingFree) {
        match resource {
            PendingFree::Buffer(raw) => self.device.destroy_buffer(raw),
            PendingFree::AccelerationStructure(inner) => {
                self.device.destroy_acceleration_structure(inner)
            }
            PendingFree::Image(raw) => self.device.destroy_image(raw),
        }
    }
}
