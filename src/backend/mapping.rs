// Host-to-device copies through mapped memory
//
// The mapping always spans the whole allocation and is released on every
// path out of the scope that acquired it. No flush or invalidate is issued,
// so the memory must be HOST_COHERENT and the GPU must not touch the range
// while it is mapped.

use ash::vk;

use super::Gpu;
use crate::error::{warn_on, ErrorKind, RenderError, RenderResult};

/// A mapped allocation, unmapped on drop
pub struct MappedMemory<'a> {
    gpu: &'a dyn Gpu,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
}

impl<'a> MappedMemory<'a> {
    /// Map the entire range of `memory`, which is `allocation_size` bytes long.
    /// Blocks until the mapping is available.
    pub fn map(
        gpu: &'a dyn Gpu,
        memory: vk::DeviceMemory,
        allocation_size: vk::DeviceSize,
    ) -> RenderResult<Self> {
        let ptr = unsafe {
            gpu.map_memory(memory, 0, vk::WHOLE_SIZE)
                .map_err(warn_on("map memory"))?
        };

        Ok(Self {
            gpu,
            memory,
            ptr: ptr.cast::<u8>(),
            len: allocation_size as usize,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.unmap_memory(self.memory) };
    }
}

/// Copy `data` into the start of `memory`.
///
/// The caller guarantees `memory` was allocated HOST_VISIBLE | HOST_COHERENT;
/// this is not checked.
pub fn upload(
    gpu: &dyn Gpu,
    memory: vk::DeviceMemory,
    allocation_size: vk::DeviceSize,
    data: &[u8],
) -> RenderResult<()> {
    if data.len() as vk::DeviceSize > allocation_size {
        return Err(RenderError::warning(ErrorKind::PayloadTooLarge {
            len: data.len() as u64,
            capacity: allocation_size,
        }));
    }

    let mut mapped = MappedMemory::map(gpu, memory, allocation_size)?;
    mapped.as_mut_slice()[..data.len()].copy_from_slice(data);

    Ok(())
}
