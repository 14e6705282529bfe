use std::ffi::CStr;

use ash::{
    extensions::khr::{
        AccelerationStructure, BufferDeviceAddress, RayTracingPipeline, Synchronization2,
    },
    vk::{self, ApplicationInfo, DeviceCreateInfo, DeviceQueueCreateInfo, InstanceCreateInfo},
};

use super::{error::DeviceError, image};

/// Descriptor pool capacity. One scene set is alive at a time, the headroom covers
/// resizes that reallocate it.
const MAX_DESCRIPTOR_SETS: u32 = 4;

const APPLICATION_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"ray-cat\0") };

pub struct Context {
    _entry: ash::Entry,
    pub instance: ash::Instance,

    pub context_raytracing: ContextRaytracing,
    pub synchronisation2_loader: ash::extensions::khr::Synchronization2,

    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,

    pub device: ash::Device,
    pub queue: vk::Queue,

    pub buffer_device_address: BufferDeviceAddress,
    pub device_memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub command_pool: vk::CommandPool,
    pub descriptor_pool: vk::DescriptorPool,
    pub default_sampler: vk::Sampler,
    /// Signalled when a frame's commands retired.
    pub frame_fence: vk::Fence,
    /// Used by blocking texture uploads.
    pub upload_fence: vk::Fence,
}

pub struct ContextRaytracing {
    pub ray_tracing_pipeline: RayTracingPipeline,
    pub physical_device_ray_tracing_pipeline_properties_khr:
        vk::PhysicalDeviceRayTracingPipelinePropertiesKHR,

    pub acceleration_structure: AccelerationStructure,
    pub physical_device_acceleration_structure_properties_khr:
        vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
}

impl Context {
    /// Creates a device without a surface, the output image is handed to whoever presents it.
    pub fn new_headless() -> Result<Self, DeviceError> {
        let entry = unsafe { ash::Entry::load() }?;

        let instance = {
            let app_info = ApplicationInfo::builder()
                .application_name(APPLICATION_NAME)
                .api_version(vk::API_VERSION_1_3);
            let create_info = InstanceCreateInfo::builder().application_info(&app_info);
            unsafe { entry.create_instance(&create_info, None) }?
        };

        let (physical_device, queue_family_index) = find_physical_device(&instance)?;
        log::info!("Using physical device {}", device_name(&instance, physical_device));

        let device = create_logical_device(&instance, &physical_device, queue_family_index)?;

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let synchronisation2_loader = Synchronization2::new(&instance, &device);

        let ray_tracing_pipeline = RayTracingPipeline::new(&instance, &device);
        let physical_device_ray_tracing_pipeline_properties_khr =
            unsafe { RayTracingPipeline::get_properties(&instance, physical_device) };

        let acceleration_structure = AccelerationStructure::new(&instance, &device);
        let physical_device_acceleration_structure_properties_khr =
            unsafe { AccelerationStructure::get_properties(&instance, physical_device) };

        let buffer_device_address = BufferDeviceAddress::new(&instance, &device);

        let context_raytracing = ContextRaytracing {
            ray_tracing_pipeline,
            physical_device_ray_tracing_pipeline_properties_khr,
            acceleration_structure,
            physical_device_acceleration_structure_properties_khr,
        };

        let device_memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let command_pool = {
            let create_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(queue_family_index)
                .flags(
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                        | vk::CommandPoolCreateFlags::TRANSIENT,
                );
            unsafe { device.create_command_pool(&create_info, None) }?
        };

        let descriptor_pool = create_descriptor_pool(&device)?;
        let default_sampler = image::create_sampler(&device)?;

        let fence_create_info = vk::FenceCreateInfo::builder();
        let frame_fence = unsafe { device.create_fence(&fence_create_info, None) }?;
        let upload_fence = unsafe { device.create_fence(&fence_create_info, None) }?;

        Ok(Self {
            _entry: entry,
            instance,

            context_raytracing,
            synchronisation2_loader,

            physical_device,
            queue_family_index,

            device,
            queue,
            buffer_device_address,
            device_memory_properties,

            command_pool,
            descriptor_pool,
            default_sampler,
            frame_fence,
            upload_fence,
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            // Nothing sensible is left to do if waiting fails during teardown.
            let _ = self.device.device_wait_idle();
            self.device.destroy_fence(self.frame_fence, None);
            self.device.destroy_fence(self.upload_fence, None);
            self.device.destroy_sampler(self.default_sampler, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

fn device_name(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> String {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn required_device_extensions() -> [&'static CStr; 5] {
    [
        ash::extensions::khr::Synchronization2::name(),
        ash::extensions::khr::AccelerationStructure::name(),
        ash::extensions::khr::RayTracingPipeline::name(),
        ash::extensions::khr::DeferredHostOperations::name(),
        ash::extensions::khr::BufferDeviceAddress::name(),
    ]
}

fn find_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32), DeviceError> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }?;

    physical_devices
        .into_iter()
        .filter(|pd| {
            let Ok(extension_properties) =
                (unsafe { instance.enumerate_device_extension_properties(*pd) })
            else {
                return false;
            };
            let supported_extensions: Vec<&CStr> = extension_properties
                .iter()
                .map(|property| unsafe { CStr::from_ptr(property.extension_name.as_ptr()) })
                .collect();

            required_device_extensions()
                .iter()
                .all(|required| supported_extensions.contains(required))
        })
        .filter_map(|pd| {
            unsafe { instance.get_physical_device_queue_family_properties(pd) }
                .iter()
                .position(|info| {
                    info.queue_flags
                        .contains(vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS)
                })
                .map(|i| (pd, i as u32))
        })
        .min_by_key(|(pd, _)| {
            let device_type = unsafe { instance.get_physical_device_properties(*pd) }.device_type;

            match device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 3,
                vk::PhysicalDeviceType::OTHER => 4,
                _ => 5,
            }
        })
        .ok_or(DeviceError::NoSuitableDevice)
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: &vk::PhysicalDevice,
    queue_family_index: u32,
) -> Result<ash::Device, DeviceError> {
    let device_extensions: Vec<_> = required_device_extensions()
        .iter()
        .map(|name| name.as_ptr())
        .collect();

    let queue_priorities = [1.0];
    let queue_create_info = DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities);

    let mut physical_device_vulkan13_features = vk::PhysicalDeviceVulkan13Features {
        synchronization2: vk::TRUE,
        ..vk::PhysicalDeviceVulkan13Features::default()
    };

    let mut physical_device_vulkan12_features = vk::PhysicalDeviceVulkan12Features {
        buffer_device_address: vk::TRUE,
        descriptor_indexing: vk::TRUE,
        shader_sampled_image_array_non_uniform_indexing: vk::TRUE,
        ..vk::PhysicalDeviceVulkan12Features::default()
    };

    let mut enabled_ray_tracing_pipeline_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR {
            ray_tracing_pipeline: vk::TRUE,
            ..vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
        };

    let mut enabled_acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
            acceleration_structure: vk::TRUE,
            ..vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
        };

    let create_info = DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&device_extensions)
        .push_next(&mut physical_device_vulkan13_features)
        .push_next(&mut physical_device_vulkan12_features)
        .push_next(&mut enabled_ray_tracing_pipeline_features)
        .push_next(&mut enabled_acceleration_structure_features)
        .build();

    Ok(unsafe { instance.create_device(*physical_device, &create_info, None) }?)
}

fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool, vk::Result> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            descriptor_count: MAX_DESCRIPTOR_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: MAX_DESCRIPTOR_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 6 * MAX_DESCRIPTOR_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 16 * MAX_DESCRIPTOR_SETS,
        },
    ];

    let create_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(MAX_DESCRIPTOR_SETS)
        .pool_sizes(&pool_sizes);

    unsafe { device.create_descriptor_pool(&create_info, None) }
}
