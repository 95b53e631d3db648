// Vertex + index buffers for one mesh

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::backend::{AllocatedBuffer, Gpu};
use crate::error::RenderResult;

/// Interleaved position + texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// Unit quad centred on the origin, facing +Z
pub const SQUARE_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [0.0, 1.0]),
];

pub const SQUARE_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

pub struct Model {
    pub vertex_buffer: AllocatedBuffer,
    pub index_buffer: AllocatedBuffer,
    pub index_count: u32,
}

impl Model {
    /// Upload a mesh into host-visible vertex and index buffers
    pub fn new(gpu: &dyn Gpu, vertices: &[Vertex], indices: &[u32]) -> RenderResult<Self> {
        let vertex_buffer = AllocatedBuffer::with_data(gpu, vk::BufferUsageFlags::VERTEX_BUFFER, vertices)?;

        let index_buffer = match AllocatedBuffer::with_data(gpu, vk::BufferUsageFlags::INDEX_BUFFER, indices) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.release(gpu);
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn square(gpu: &dyn Gpu) -> RenderResult<Self> {
        Self::new(gpu, &SQUARE_VERTICES, &SQUARE_INDICES)
    }

    pub fn release(self, gpu: &dyn Gpu) {
        self.vertex_buffer.release(gpu);
        self.index_buffer.release(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimulatedDevice;

    #[test]
    fn test_square_uploads_mesh() {
        let gpu = SimulatedDevice::new();
        let square = Model::square(&gpu).unwrap();

        assert_eq!(square.index_count, 6);
        assert_eq!(square.vertex_buffer.size, std::mem::size_of_val(&SQUARE_VERTICES) as u64);

        let indices = gpu.memory_contents(square.index_buffer.memory).unwrap();
        assert_eq!(&indices[..24], bytemuck::cast_slice::<u32, u8>(&SQUARE_INDICES));

        square.release(&gpu);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_allocations(), 0);
    }

    #[test]
    fn test_upload_failure_leaves_nothing_alive() {
        let gpu = SimulatedDevice::new();
        gpu.fail_on("map_memory");

        assert!(Model::square(&gpu).is_err());
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_allocations(), 0);
    }
}
