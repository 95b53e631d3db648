// Device seam
//
// Every resource component talks to the GPU through this trait. The real
// implementation is `VulkanDevice`; tests run against `SimulatedDevice`.
//
// All methods carry the same contracts as the matching `ash::Device` calls:
// handles must be live and owned by this device, and the caller is
// responsible for CPU/GPU synchronization of anything it destroys or maps.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::c_void;

pub trait Gpu {
    /// Memory types and heaps advertised by the physical device
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties;

    // ─────────────────────────────────────────────────────────────────────
    // Buffers & images
    // ─────────────────────────────────────────────────────────────────────
    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image>;
    unsafe fn destroy_image(&self, image: vk::Image);
    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    // ─────────────────────────────────────────────────────────────────────
    // Device memory
    // ─────────────────────────────────────────────────────────────────────
    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory>;
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Record, submit and wait for a one-shot copy from `buffer` into the
    /// whole of `image`, leaving the image in SHADER_READ_ONLY_OPTIMAL.
    unsafe fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) -> VkResult<()>;

    // ─────────────────────────────────────────────────────────────────────
    // Descriptors
    // ─────────────────────────────────────────────────────────────────────
    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    // ─────────────────────────────────────────────────────────────────────
    // Synchronization & submission
    // ─────────────────────────────────────────────────────────────────────
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    /// Err(vk::Result::TIMEOUT) when the fence is still unsignaled after `timeout_ns`
    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    unsafe fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    unsafe fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);
    unsafe fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Submit to the graphics queue, signalling `fence` on completion
    unsafe fn queue_submit(&self, submit: &vk::SubmitInfo, fence: vk::Fence) -> VkResult<()>;
}
