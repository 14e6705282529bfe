//! Device double that records every call and hands out fake handles.

use std::{collections::HashMap, sync::Mutex};

use ash::vk::{self, Handle};

use super::{
    command_buffer::{ImageLayoutTransition, MemoryBarrier},
    descriptor_set::WriteDescriptorSet,
    device::{
        AccelerationStructureBuild, BuildSizes, GeometryInput, RawBuffer, RawImage,
        RayTracingDevice, RayTracingPipeline, RayTracingShaders, ShaderBindingTable,
    },
    error::DeviceError,
};

pub const SCRATCH_ALIGNMENT: vk::DeviceSize = 128;

#[derive(Clone, Debug)]
pub enum DeviceCall {
    CreateBuffer {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    },
    DestroyBuffer(vk::Buffer),
    WriteBuffer {
        buffer: vk::Buffer,
        len: usize,
    },
    CreateAccelerationStructure {
        structure_type: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
    },
    DestroyAccelerationStructure(vk::AccelerationStructureKHR),
    BuildAccelerationStructure(AccelerationStructureBuild),
    MemoryBarrier(MemoryBarrier),
    ImageLayoutTransition(ImageLayoutTransition),
    CreateStorageImage(vk::Extent2D),
    CreateSampledImage(vk::Extent2D),
    DestroyImage(vk::Image),
    CreateDescriptorSetLayout(usize),
    DestroyDescriptorSetLayout,
    AllocateDescriptorSet,
    UpdateDescriptorSet(Vec<WriteDescriptorSet>),
    CreatePipeline,
    DestroyPipeline,
    BeginCommands,
    SubmitCommands,
    WaitIdle,
    TraceRays {
        extent: vk::Extent2D,
        push_constants: Vec<u8>,
    },
}

#[derive(Default)]
struct State {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    buffer_contents: HashMap<vk::Buffer, Vec<u8>>,
    fail_buffer_creation: bool,
    fail_image_creation: bool,
}

impl State {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

#[derive(Default)]
pub struct RecordingDevice {
    state: Mutex<State>,
}

impl RecordingDevice {
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn record(&self, call: DeviceCall) {
        self.with_state(|state| state.calls.push(call));
    }

    pub fn fail_buffer_creation(&self) {
        self.with_state(|state| state.fail_buffer_creation = true);
    }

    pub fn fail_image_creation(&self) {
        self.with_state(|state| state.fail_image_creation = true);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with_state(|state| state.calls.clear());
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.with_state(|state| state.calls.iter().filter(|call| predicate(call)).count())
    }

    pub fn created_buffer_sizes(&self) -> Vec<vk::DeviceSize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CreateBuffer { size, .. } => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn builds(&self) -> Vec<AccelerationStructureBuild> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::BuildAccelerationStructure(build) => Some(build),
                _ => None,
            })
            .collect()
    }

    pub fn barriers(&self) -> Vec<MemoryBarrier> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::MemoryBarrier(barrier) => Some(barrier),
                _ => None,
            })
            .collect()
    }

    /// Bindings touched by each descriptor update, in call order.
    pub fn descriptor_updates(&self) -> Vec<Vec<WriteDescriptorSet>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::UpdateDescriptorSet(writes) => Some(writes),
                _ => None,
            })
            .collect()
    }

    pub fn writes_to(&self, buffer: vk::Buffer) -> usize {
        self.count(|call| matches!(call, DeviceCall::WriteBuffer { buffer: b, .. } if *b == buffer))
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.with_state(|state| {
            state
                .buffer_contents
                .get(&buffer)
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Fake device addresses are the raw handle shifted, so they never overlap.
    pub fn address_of(raw: u64) -> vk::DeviceAddress {
        raw << 16
    }
}

impl RayTracingDevice for RecordingDevice {
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<RawBuffer, DeviceError> {
        self.with_state(|state| {
            if state.fail_buffer_creation {
                return Err(DeviceError::NoCompatibleMemoryType {
                    type_bits: 0,
                    flags,
                });
            }
            let buffer = vk::Buffer::from_raw(state.next_raw());
            let memory = vk::DeviceMemory::from_raw(state.next_raw());
            state
                .buffer_contents
                .insert(buffer, vec![0; size as usize]);
            state.calls.push(DeviceCall::CreateBuffer {
                buffer,
                size,
                usage,
                flags,
            });
            Ok(RawBuffer {
                buffer,
                memory,
                size,
            })
        })
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        self.with_state(|state| {
            state.buffer_contents.remove(&buffer.buffer);
            state.calls.push(DeviceCall::DestroyBuffer(buffer.buffer));
        });
    }

    fn write_buffer(&self, buffer: &RawBuffer, offset: vk::DeviceSize, data: &[u8]) {
        self.with_state(|state| {
            let contents = state
                .buffer_contents
                .get_mut(&buffer.buffer)
                .expect("write to destroyed buffer");
            let start = offset as usize;
            assert!(start + data.len() <= contents.len(), "write out of bounds");
            contents[start..start + data.len()].copy_from_slice(data);
            state.calls.push(DeviceCall::WriteBuffer {
                buffer: buffer.buffer,
                len: data.len(),
            });
        });
    }

    fn buffer_device_address(&self, buffer: &RawBuffer) -> vk::DeviceAddress {
        Self::address_of(buffer.buffer.as_raw())
    }

    fn acceleration_structure_build_sizes(
        &self,
        geometry: &GeometryInput,
        primitive_count: u32,
    ) -> BuildSizes {
        let per_primitive = match geometry {
            GeometryInput::Instances { .. } => 128,
            _ => 64,
        };
        BuildSizes {
            acceleration_structure_size: 256 + per_primitive * primitive_count as u64,
            build_scratch_size: 100 + 32 * primitive_count as u64,
        }
    }

    fn create_acceleration_structure(
        &self,
        structure_type: vk::AccelerationStructureTypeKHR,
        _buffer: &RawBuffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, DeviceError> {
        self.with_state(|state| {
            state.calls.push(DeviceCall::CreateAccelerationStructure {
                structure_type,
                size,
            });
            Ok(vk::AccelerationStructureKHR::from_raw(state.next_raw()))
        })
    }

    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR) {
        self.record(DeviceCall::DestroyAccelerationStructure(
            acceleration_structure,
        ));
    }

    fn acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress {
        Self::address_of(acceleration_structure.as_raw())
    }

    fn scratch_alignment(&self) -> vk::DeviceSize {
        SCRATCH_ALIGNMENT
    }

    fn create_storage_image(&self, extent: vk::Extent2D) -> Result<RawImage, DeviceError> {
        self.with_state(|state| {
            state.calls.push(DeviceCall::CreateStorageImage(extent));
            Ok(RawImage {
                image: vk::Image::from_raw(state.next_raw()),
                memory: vk::DeviceMemory::from_raw(state.next_raw()),
                view: vk::ImageView::from_raw(state.next_raw()),
                extent,
                format: vk::Format::R8G8B8A8_UNORM,
            })
        })
    }

    fn create_sampled_image(
        &self,
        extent: vk::Extent2D,
        rgba_pixels: &[u8],
    ) -> Result<RawImage, DeviceError> {
        assert_eq!(
            rgba_pixels.len(),
            (extent.width * extent.height * 4) as usize
        );
        self.with_state(|state| {
            if state.fail_image_creation {
                return Err(DeviceError::NoCompatibleMemoryType {
                    type_bits: 0,
                    flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                });
            }
            state.calls.push(DeviceCall::CreateSampledImage(extent));
            Ok(RawImage {
                image: vk::Image::from_raw(state.next_raw()),
                memory: vk::DeviceMemory::from_raw(state.next_raw()),
                view: vk::ImageView::from_raw(state.next_raw()),
                extent,
                format: vk::Format::R8G8B8A8_SRGB,
            })
        })
    }

    fn destroy_image(&self, image: RawImage) {
        self.record(DeviceCall::DestroyImage(image.image));
    }

    fn default_sampler(&self) -> vk::Sampler {
        vk::Sampler::from_raw(u64::MAX)
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout, DeviceError> {
        self.with_state(|state| {
            state
                .calls
                .push(DeviceCall::CreateDescriptorSetLayout(bindings.len()));
            Ok(vk::DescriptorSetLayout::from_raw(state.next_raw()))
        })
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.record(DeviceCall::DestroyDescriptorSetLayout);
    }

    fn allocate_descriptor_set(
        &self,
        _layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceError> {
        self.with_state(|state| {
            state.calls.push(DeviceCall::AllocateDescriptorSet);
            Ok(vk::DescriptorSet::from_raw(state.next_raw()))
        })
    }

    fn update_descriptor_set(&self, _set: vk::DescriptorSet, writes: &[WriteDescriptorSet]) {
        self.record(DeviceCall::UpdateDescriptorSet(writes.to_vec()));
    }

    fn create_ray_tracing_pipeline(
        &self,
        _set_layout: vk::DescriptorSetLayout,
        _shaders: &RayTracingShaders,
        _push_constant_size: u32,
    ) -> Result<RayTracingPipeline, DeviceError> {
        self.with_state(|state| {
            state.calls.push(DeviceCall::CreatePipeline);
            Ok(RayTracingPipeline {
                pipeline: vk::Pipeline::from_raw(state.next_raw()),
                layout: vk::PipelineLayout::from_raw(state.next_raw()),
                shader_binding_table: ShaderBindingTable::default(),
            })
        })
    }

    fn destroy_ray_tracing_pipeline(&self, _pipeline: &RayTracingPipeline) {
        self.record(DeviceCall::DestroyPipeline);
    }

    fn begin_commands(&self) -> Result<vk::CommandBuffer, DeviceError> {
        self.with_state(|state| {
            state.calls.push(DeviceCall::BeginCommands);
            Ok(vk::CommandBuffer::from_raw(state.next_raw()))
        })
    }

    fn submit_commands(&self, _command_buffer: vk::CommandBuffer) -> Result<(), DeviceError> {
        self.record(DeviceCall::SubmitCommands);
        Ok(())
    }

    fn wait_idle(&self) {
        self.record(DeviceCall::WaitIdle);
    }

    fn cmd_build_acceleration_structure(
        &self,
        _command_buffer: vk::CommandBuffer,
        build: &AccelerationStructureBuild,
    ) {
        self.record(DeviceCall::BuildAccelerationStructure(*build));
    }

    fn cmd_memory_barrier(&self, _command_buffer: vk::CommandBuffer, barrier: &MemoryBarrier) {
        self.record(DeviceCall::MemoryBarrier(*barrier));
    }

    fn cmd_image_layout_transition(
        &self,
        _command_buffer: vk::CommandBuffer,
        transition: &ImageLayoutTransition,
    ) {
        self.record(DeviceCall::ImageLayoutTransition(*transition));
    }

    fn cmd_trace_rays(
        &self,
        _command_buffer: vk::CommandBuffer,
        _pipeline: &RayTracingPipeline,
        _descriptor_set: vk::DescriptorSet,
        push_constants: &[u8],
        extent: vk::Extent2D,
    ) {
        self.record(DeviceCall::TraceRays {
            extent,
            push_constants: push_constants.to_vec(),
        });
    }
}
