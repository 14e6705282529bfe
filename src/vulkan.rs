pub mod acceleration_structure;
pub mod buffer;
pub mod command_buffer;
pub mod context;
pub mod descriptor_set;
pub mod device;
pub mod error;
pub mod image;
mod ray_tracing_device;
pub mod ray_tracing_pipeline;
pub mod resources;
pub mod scratch_buffer;
mod shader_create_info;
#[cfg(test)]
pub mod test_device;
