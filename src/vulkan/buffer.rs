use ash::vk;

use super::{context::Context, device::RawBuffer, error::DeviceError};

pub fn find_memorytype_index(
    memory_req: &vk::MemoryRequirements,
    memory_prop: &vk::PhysicalDeviceMemoryProperties,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_prop.memory_types[..memory_prop.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            (memory_req.memory_type_bits & (1 << index)) != 0
                && memory_type.property_flags & flags == flags
        })
        .map(|(index, _)| index as u32)
}

pub fn create_buffer(
    context: &Context,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_property_flags: vk::MemoryPropertyFlags,
) -> Result<RawBuffer, DeviceError> {
    let device = &context.device;

    let create_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&create_info, None) }?;

    let buffer_memory_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let Some(buffer_memorytype_index) = find_memorytype_index(
        &buffer_memory_requirements,
        &context.device_memory_properties,
        memory_property_flags,
    ) else {
        unsafe { device.destroy_buffer(buffer, None) };
        return Err(DeviceError::NoCompatibleMemoryType {
            type_bits: buffer_memory_requirements.memory_type_bits,
            flags: memory_property_flags,
        });
    };

    let mut allocate_flags_info =
        vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);

    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(buffer_memory_requirements.size)
        .memory_type_index(buffer_memorytype_index)
        .push_next(&mut allocate_flags_info);

    let memory = unsafe { device.allocate_memory(&allocate_info, None) }?;

    unsafe { device.bind_buffer_memory(buffer, memory, 0) }?;

    Ok(RawBuffer {
        buffer,
        memory,
        size,
    })
}

pub fn write_buffer(
    context: &Context,
    buffer: &RawBuffer,
    offset: vk::DeviceSize,
    data: &[u8],
) -> Result<(), vk::Result> {
    assert!(offset + data.len() as vk::DeviceSize <= buffer.size);
    if data.is_empty() {
        return Ok(());
    }

    let device = &context.device;
    let buffer_ptr = unsafe {
        device.map_memory(
            buffer.memory,
            offset,
            data.len() as vk::DeviceSize,
            vk::MemoryMapFlags::empty(),
        )
    }? as *mut u8;

    unsafe { buffer_ptr.copy_from_nonoverlapping(data.as_ptr(), data.len()) };

    unsafe { device.unmap_memory(buffer.memory) };
    Ok(())
}

pub fn get_device_address(context: &Context, buffer: &RawBuffer) -> vk::DeviceAddress {
    let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer.buffer);
    unsafe {
        context
            .buffer_device_address
            .get_buffer_device_address(&info)
    }
}

pub fn destroy_buffer(context: &Context, buffer: RawBuffer) {
    let device = &context.device;
    unsafe { device.destroy_buffer(buffer.buffer, None) };
    unsafe { device.free_memory(buffer.memory, None) };
}
