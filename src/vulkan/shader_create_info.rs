use std::ffi::CStr;

use ash::vk;

use super::{context::Context, error::DeviceError};

/// Owns a shader module for as long as the pipeline using it is being created.
pub struct ShaderCreateInfo<'a> {
    context: &'a Context,
    stage: vk::ShaderStageFlags,
    shader_module: vk::ShaderModule,
}

const SHADER_ENTRY_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

impl<'a> ShaderCreateInfo<'a> {
    pub fn new(
        context: &'a Context,
        stage: vk::ShaderStageFlags,
        code: &[u32],
    ) -> Result<Self, DeviceError> {
        let shader_module = {
            let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
            unsafe { context.device.create_shader_module(&create_info, None) }.map_err(
                |result| DeviceError::ShaderModule {
                    name: format!("{stage:?}"),
                    result,
                },
            )?
        };

        Ok(Self {
            context,
            stage,
            shader_module,
        })
    }

    pub fn build(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .module(self.shader_module)
            .name(SHADER_ENTRY_NAME)
            .stage(self.stage)
            .build()
    }
}

impl<'a> Drop for ShaderCreateInfo<'a> {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_shader_module(self.shader_module, None);
        }
    }
}
