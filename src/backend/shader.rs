// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. build.rs compiles the GLSL in
// shaders/ with glslc; the renderer loads the .spv files at startup.

use ash::vk;
use std::fs::File;
use std::path::Path;

use super::VulkanDevice;
use crate::error::{fatal_on, ErrorKind, RenderError, RenderResult};

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> RenderResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }.map_err(fatal_on("create shader module"))
}

/// Read a SPIR-V file and create a shader module from it
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> RenderResult<vk::ShaderModule> {
    let code = read_spirv(path)?;
    log::debug!("Loaded shader {:?} ({} words)", path, code.len());
    create_shader_module(device, &code)
}

/// Read a SPIR-V file into properly aligned words
pub fn read_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let setup_error = |e: std::io::Error| {
        RenderError::fatal(ErrorKind::Setup(format!("Failed to read shader {:?}: {}", path, e)))
    };

    let mut file = File::open(path).map_err(setup_error)?;
    ash::util::read_spv(&mut file).map_err(setup_error)
}
