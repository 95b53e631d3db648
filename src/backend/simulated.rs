// Simulated device for tests (no GPU required)
//
// Hands out fake handles, keeps every allocation as host bytes, records
// descriptor writes and submissions, and signals fences as soon as work is
// submitted unless the device has been told to hang.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;

use super::Gpu;

struct BufferRecord {
    size: vk::DeviceSize,
    memory: Option<vk::DeviceMemory>,
}

struct ImageRecord {
    size: vk::DeviceSize,
    memory: Option<vk::DeviceMemory>,
}

struct Allocation {
    type_index: u32,
    bytes: Box<[u8]>,
    mapped: bool,
}

#[derive(Default, Clone, Copy)]
struct DescriptorRecord {
    image_view: Option<vk::ImageView>,
    uniform_buffer: Option<vk::Buffer>,
}

/// A queue submission as seen by the device
#[derive(Debug, Clone)]
pub struct Submission {
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub fence: vk::Fence,
}

pub struct SimulatedDevice {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    type_bits: Cell<u32>,
    next_handle: Cell<u64>,
    buffers: RefCell<HashMap<vk::Buffer, BufferRecord>>,
    images: RefCell<HashMap<vk::Image, ImageRecord>>,
    views: RefCell<HashMap<vk::ImageView, vk::Image>>,
    allocations: RefCell<HashMap<vk::DeviceMemory, Allocation>>,
    descriptor_sets: RefCell<HashMap<vk::DescriptorSet, DescriptorRecord>>,
    fences: RefCell<HashMap<vk::Fence, bool>>,
    semaphores: RefCell<HashSet<vk::Semaphore>>,
    command_buffers: RefCell<HashSet<vk::CommandBuffer>>,
    submissions: RefCell<Vec<Submission>>,
    last_map_size: Cell<Option<vk::DeviceSize>>,
    failures: RefCell<HashSet<&'static str>>,
    hung: Cell<bool>,
}

impl SimulatedDevice {
    /// Every allocation is rounded up to this
    pub const ALIGNMENT: vk::DeviceSize = 256;

    /// A typical discrete GPU: device-local, host-visible/coherent, and both
    pub fn new() -> Self {
        Self::with_memory_types(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ])
    }

    pub fn with_memory_types(types: &[vk::MemoryPropertyFlags]) -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            memory_properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }

        Self {
            memory_properties,
            type_bits: Cell::new((1u32 << types.len()) - 1),
            next_handle: Cell::new(1),
            buffers: RefCell::default(),
            images: RefCell::default(),
            views: RefCell::default(),
            allocations: RefCell::default(),
            descriptor_sets: RefCell::default(),
            fences: RefCell::default(),
            command_buffers: RefCell::default(),
            semaphores: RefCell::default(),
            submissions: RefCell::default(),
            last_map_size: Cell::new(None),
            failures: RefCell::default(),
            hung: Cell::new(false),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Knobs
    // ─────────────────────────────────────────────────────────────────────

    /// Requirement bitmask reported for every buffer and image
    pub fn set_type_bits(&self, bits: u32) {
        self.type_bits.set(bits);
    }

    /// Make every later call to the named `Gpu` method fail
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.borrow_mut().insert(operation);
    }

    /// Undo an earlier `fail_on`
    pub fn recover(&self, operation: &'static str) {
        self.failures.borrow_mut().remove(operation);
    }

    /// Submitted work never completes
    pub fn hang(&self) {
        self.hung.set(true);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────

    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    pub fn live_images(&self) -> usize {
        self.images.borrow().len()
    }

    pub fn live_views(&self) -> usize {
        self.views.borrow().len()
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.borrow().len()
    }

    pub fn live_sync_objects(&self) -> usize {
        self.fences.borrow().len() + self.semaphores.borrow().len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.command_buffers.borrow().len()
    }

    pub fn memory_size(&self, memory: vk::DeviceMemory) -> Option<vk::DeviceSize> {
        self.allocations
            .borrow()
            .get(&memory)
            .map(|a| a.bytes.len() as vk::DeviceSize)
    }

    pub fn memory_type_of(&self, memory: vk::DeviceMemory) -> Option<u32> {
        self.allocations.borrow().get(&memory).map(|a| a.type_index)
    }

    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.allocations.borrow().get(&memory).map(|a| a.bytes.to_vec())
    }

    pub fn is_mapped(&self, memory: vk::DeviceMemory) -> bool {
        self.allocations
            .borrow()
            .get(&memory)
            .map_or(false, |a| a.mapped)
    }

    pub fn last_map_size(&self) -> Option<vk::DeviceSize> {
        self.last_map_size.get()
    }

    pub fn bound_memory_of_buffer(&self, buffer: vk::Buffer) -> Option<vk::DeviceMemory> {
        self.buffers.borrow().get(&buffer).and_then(|b| b.memory)
    }

    pub fn bound_memory_of_image(&self, image: vk::Image) -> Option<vk::DeviceMemory> {
        self.images.borrow().get(&image).and_then(|i| i.memory)
    }

    /// Bytes currently held by the memory bound to `image`
    pub fn image_contents(&self, image: vk::Image) -> Option<Vec<u8>> {
        self.bound_memory_of_image(image)
            .and_then(|memory| self.memory_contents(memory))
    }

    pub fn descriptor_image_view(&self, set: vk::DescriptorSet) -> Option<vk::ImageView> {
        self.descriptor_sets.borrow().get(&set).and_then(|d| d.image_view)
    }

    pub fn descriptor_uniform_buffer(&self, set: vk::DescriptorSet) -> Option<vk::Buffer> {
        self.descriptor_sets
            .borrow()
            .get(&set)
            .and_then(|d| d.uniform_buffer)
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.borrow().get(&fence).copied().unwrap_or(false)
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.submissions.borrow().last().cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn next<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }

    fn check(&self, operation: &'static str) -> VkResult<()> {
        if !self.failures.borrow().contains(operation) {
            return Ok(());
        }
        Err(match operation {
            "map_memory" => vk::Result::ERROR_MEMORY_MAP_FAILED,
            _ => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        })
    }

    fn requirements(&self, size: vk::DeviceSize) -> vk::MemoryRequirements {
        let size = size.max(1);
        vk::MemoryRequirements {
            size: (size + Self::ALIGNMENT - 1) / Self::ALIGNMENT * Self::ALIGNMENT,
            alignment: Self::ALIGNMENT,
            memory_type_bits: self.type_bits.get(),
        }
    }

    fn bound_bytes<T>(&self, memory: Option<vk::DeviceMemory>, f: impl FnOnce(&mut [u8]) -> T) -> Option<T> {
        let mut allocations = self.allocations.borrow_mut();
        memory
            .and_then(|m| allocations.get_mut(&m))
            .map(|a| f(&mut a.bytes))
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpu for SimulatedDevice {
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        self.check("create_buffer")?;
        let buffer = self.next();
        self.buffers.borrow_mut().insert(
            buffer,
            BufferRecord {
                size: info.size,
                memory: None,
            },
        );
        Ok(buffer)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.buffers.borrow_mut().remove(&buffer);
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.buffers.borrow().get(&buffer).map_or(1, |b| b.size);
        self.requirements(size)
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        self.check("create_image")?;
        let image = self.next();
        let texels = info.extent.width as u64 * info.extent.height as u64 * info.extent.depth as u64;
        self.images.borrow_mut().insert(
            image,
            ImageRecord {
                size: texels * 4,
                memory: None,
            },
        );
        Ok(image)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.images.borrow_mut().remove(&image);
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self.images.borrow().get(&image).map_or(1, |i| i.size);
        self.requirements(size)
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.check("create_image_view")?;
        let view = self.next();
        self.views.borrow_mut().insert(view, info.image);
        Ok(view)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.views.borrow_mut().remove(&view);
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        self.check("allocate_memory")?;
        if info.memory_type_index >= self.memory_properties.memory_type_count {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let memory = self.next();
        self.allocations.borrow_mut().insert(
            memory,
            Allocation {
                type_index: info.memory_type_index,
                bytes: vec![0; info.allocation_size as usize].into_boxed_slice(),
                mapped: false,
            },
        );
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.allocations.borrow_mut().remove(&memory);
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.check("bind_buffer_memory")?;
        let mut buffers = self.buffers.borrow_mut();
        let record = buffers.get_mut(&buffer).ok_or(vk::Result::ERROR_UNKNOWN)?;
        record.memory = Some(memory);
        Ok(())
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.check("bind_image_memory")?;
        let mut images = self.images.borrow_mut();
        let record = images.get_mut(&image).ok_or(vk::Result::ERROR_UNKNOWN)?;
        record.memory = Some(memory);
        Ok(())
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.check("map_memory")?;
        let mut allocations = self.allocations.borrow_mut();
        let allocation = allocations
            .get_mut(&memory)
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if allocation.mapped {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        allocation.mapped = true;
        self.last_map_size.set(Some(size));
        Ok(allocation.bytes.as_mut_ptr().cast())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        if let Some(allocation) = self.allocations.borrow_mut().get_mut(&memory) {
            allocation.mapped = false;
        }
    }

    unsafe fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) -> VkResult<()> {
        self.check("copy_buffer_to_image")?;
        let len = extent.width as usize * extent.height as usize * 4;

        let src_memory = self.bound_memory_of_buffer(buffer);
        let dst_memory = self.bound_memory_of_image(image);
        let staged = self
            .bound_bytes(src_memory, |bytes| bytes[..len].to_vec())
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        self.bound_bytes(dst_memory, |bytes| bytes[..len].copy_from_slice(&staged))
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.check("allocate_descriptor_sets")?;
        let sets: Vec<vk::DescriptorSet> = (0..info.descriptor_set_count).map(|_| self.next()).collect();
        let mut records = self.descriptor_sets.borrow_mut();
        for &set in &sets {
            records.insert(set, DescriptorRecord::default());
        }
        Ok(sets)
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let mut records = self.descriptor_sets.borrow_mut();
        for write in writes {
            let record = records.entry(write.dst_set).or_default();
            match write.descriptor_type {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER if !write.p_image_info.is_null() => {
                    record.image_view = Some((*write.p_image_info).image_view);
                }
                vk::DescriptorType::UNIFORM_BUFFER if !write.p_buffer_info.is_null() => {
                    record.uniform_buffer = Some((*write.p_buffer_info).buffer);
                }
                _ => {}
            }
        }
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence> {
        self.check("create_fence")?;
        let fence = self.next();
        let signaled = info.flags.contains(vk::FenceCreateFlags::SIGNALED);
        self.fences.borrow_mut().insert(fence, signaled);
        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.fences.borrow_mut().remove(&fence);
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        self.check("wait_for_fence")?;
        if self.fence_signaled(fence) {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.check("reset_fence")?;
        self.fences.borrow_mut().insert(fence, false);
        Ok(())
    }

    unsafe fn create_semaphore(&self, _info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore> {
        self.check("create_semaphore")?;
        let semaphore = self.next();
        self.semaphores.borrow_mut().insert(semaphore);
        Ok(semaphore)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.semaphores.borrow_mut().remove(&semaphore);
    }

    unsafe fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        self.check("allocate_command_buffer")?;
        let command_buffer = self.next();
        self.command_buffers.borrow_mut().insert(command_buffer);
        Ok(command_buffer)
    }

    unsafe fn free_command_buffer(&self, _pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        self.command_buffers.borrow_mut().remove(&command_buffer);
    }

    unsafe fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.check("reset_command_buffer")
    }

    unsafe fn begin_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        self.check("begin_command_buffer")
    }

    unsafe fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.check("end_command_buffer")
    }

    unsafe fn queue_submit(&self, submit: &vk::SubmitInfo, fence: vk::Fence) -> VkResult<()> {
        self.check("queue_submit")?;

        let slice = |ptr, len: u32| std::slice::from_raw_parts(ptr, len as usize).to_vec();
        self.submissions.borrow_mut().push(Submission {
            wait_semaphores: slice(submit.p_wait_semaphores, submit.wait_semaphore_count),
            signal_semaphores: slice(submit.p_signal_semaphores, submit.signal_semaphore_count),
            command_buffers: std::slice::from_raw_parts(
                submit.p_command_buffers,
                submit.command_buffer_count as usize,
            )
            .to_vec(),
            fence,
        });

        if !self.hung.get() && fence != vk::Fence::null() {
            self.fences.borrow_mut().insert(fence, true);
        }
        Ok(())
    }
}
