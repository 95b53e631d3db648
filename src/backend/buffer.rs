// Buffer utilities for vertex, index, uniform and staging buffers
//
// A buffer and its backing memory are created, bound and released together.

use ash::vk;

use super::mapping;
use super::memory::memory_type_for;
use super::Gpu;
use crate::error::{warn_on, RenderResult};

/// A buffer bound to its own device memory allocation
#[derive(Debug)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Size the caller asked for
    pub size: vk::DeviceSize,
    /// Size the device required, always >= `size`
    pub allocation_size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl AllocatedBuffer {
    /// Create a buffer, allocate memory of the type selected for
    /// `memory_properties`, and bind the two at offset 0.
    ///
    /// Any failing step abandons the call and destroys whatever it already
    /// created, so no half-built pair survives.
    pub fn new(
        gpu: &dyn Gpu,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { gpu.create_buffer(&buffer_info) }.map_err(warn_on("create buffer"))?;

        match unsafe { Self::back_with_memory(gpu, buffer, memory_properties) } {
            Ok((memory, allocation_size)) => {
                log::debug!(
                    "Created buffer {:?}: {} bytes requested, {} allocated",
                    usage,
                    size,
                    allocation_size
                );
                Ok(Self {
                    buffer,
                    memory,
                    size,
                    allocation_size,
                    usage,
                })
            }
            Err(e) => {
                unsafe { gpu.destroy_buffer(buffer) };
                Err(e)
            }
        }
    }

    /// Create a host-visible, host-coherent buffer and fill it with `data`
    pub fn with_data<T: bytemuck::Pod>(
        gpu: &dyn Gpu,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> RenderResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        let buffer = Self::new(
            gpu,
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        if let Err(e) = buffer.upload(gpu, bytes) {
            buffer.release(gpu);
            return Err(e);
        }

        Ok(buffer)
    }

    /// Copy bytes into the start of this buffer's memory.
    /// The memory must be host-visible and host-coherent.
    pub fn upload(&self, gpu: &dyn Gpu, data: &[u8]) -> RenderResult<()> {
        mapping::upload(gpu, self.memory, self.allocation_size, data)
    }

    /// Destroy the buffer and free its memory
    pub fn release(self, gpu: &dyn Gpu) {
        unsafe {
            gpu.destroy_buffer(self.buffer);
            gpu.free_memory(self.memory);
        }
    }

    // Allocation always uses the required size, which may exceed the
    // requested one.
    unsafe fn back_with_memory(
        gpu: &dyn Gpu,
        buffer: vk::Buffer,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> RenderResult<(vk::DeviceMemory, vk::DeviceSize)> {
        let mem_requirements = gpu.buffer_memory_requirements(buffer);

        let memory_type_index =
            memory_type_for(gpu.memory_properties(), &mem_requirements, memory_properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = gpu
            .allocate_memory(&alloc_info)
            .map_err(warn_on("allocate buffer memory"))?;

        if let Err(e) = gpu.bind_buffer_memory(buffer, memory, 0) {
            gpu.free_memory(memory);
            return Err(warn_on("bind buffer memory")(e));
        }

        Ok((memory, mem_requirements.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimulatedDevice;
    use crate::error::ErrorKind;

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn test_allocation_covers_requested_size() {
        let gpu = SimulatedDevice::new();

        for size in [1, 100, 256, 1000, 4097] {
            let buffer = AllocatedBuffer::new(&gpu, size, vk::BufferUsageFlags::VERTEX_BUFFER, HOST).unwrap();

            assert!(buffer.allocation_size >= size);
            assert_eq!(gpu.memory_size(buffer.memory), Some(buffer.allocation_size));
            assert_eq!(gpu.bound_memory_of_buffer(buffer.buffer), Some(buffer.memory));

            buffer.release(&gpu);
        }

        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_allocations(), 0);
    }

    #[test]
    fn test_allocates_required_size_not_requested() {
        let gpu = SimulatedDevice::new();
        let buffer = AllocatedBuffer::new(&gpu, 10, vk::BufferUsageFlags::UNIFORM_BUFFER, HOST).unwrap();

        assert_eq!(buffer.size, 10);
        assert_eq!(buffer.allocation_size, SimulatedDevice::ALIGNMENT);
    }

    #[test]
    fn test_missing_memory_type_creates_nothing() {
        let gpu = SimulatedDevice::with_memory_types(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let err = AllocatedBuffer::new(&gpu, 64, vk::BufferUsageFlags::TRANSFER_SRC, HOST).unwrap_err();

        assert!(!err.is_fatal());
        assert!(matches!(err.kind(), ErrorKind::NoSuitableMemoryType { .. }));
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_allocations(), 0);
    }

    #[test]
    fn test_failed_bind_frees_memory() {
        let gpu = SimulatedDevice::new();
        gpu.fail_on("bind_buffer_memory");

        let err = AllocatedBuffer::new(&gpu, 64, vk::BufferUsageFlags::VERTEX_BUFFER, HOST).unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Vulkan("bind buffer memory", _)));
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_allocations(), 0);
    }

    #[test]
    fn test_respects_requirement_bitmask() {
        let gpu = SimulatedDevice::new();
        // Type 1 is the first host-visible type, but the buffer only accepts type 2
        gpu.set_type_bits(0b100);

        let buffer = AllocatedBuffer::new(&gpu, 64, vk::BufferUsageFlags::VERTEX_BUFFER, HOST).unwrap();

        assert_eq!(gpu.memory_type_of(buffer.memory), Some(2));
    }

    #[test]
    fn test_with_data_fills_buffer() {
        let gpu = SimulatedDevice::new();
        let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];

        let buffer = AllocatedBuffer::with_data(&gpu, vk::BufferUsageFlags::INDEX_BUFFER, &indices).unwrap();

        let contents = gpu.memory_contents(buffer.memory).unwrap();
        assert_eq!(&contents[..12], bytemuck::cast_slice::<u16, u8>(&indices));
    }
}
