// Camera uniform buffer

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::backend::{AllocatedBuffer, Gpu};
use crate::error::RenderResult;

/// Shader-visible camera block (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: Mat4,
}

impl CameraUniform {
    /// Perspective camera at `eye` looking at the origin
    pub fn looking_at_origin(eye: Vec3, aspect: f32) -> Self {
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;
        Self {
            view_proj: proj * view,
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
        }
    }
}

pub struct Camera {
    pub buffer: AllocatedBuffer,
}

impl Camera {
    pub fn new(gpu: &dyn Gpu) -> RenderResult<Self> {
        let camera = Self {
            buffer: AllocatedBuffer::with_data(
                gpu,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                &[CameraUniform::default()],
            )?,
        };
        Ok(camera)
    }

    /// Write new matrices. The GPU must not be reading the buffer.
    pub fn update(&self, gpu: &dyn Gpu, uniform: &CameraUniform) -> RenderResult<()> {
        self.buffer.upload(gpu, bytemuck::bytes_of(uniform))
    }

    pub fn release(self, gpu: &dyn Gpu) {
        self.buffer.release(gpu);
    }
}
