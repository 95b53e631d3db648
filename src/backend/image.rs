// Sampled 2D images
//
// An image, its view and its memory live and die together.

use ash::vk;

use super::memory::memory_type_for;
use super::Gpu;
use crate::error::{warn_on, RenderResult};

/// Format used for every texture slot
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Bytes per texel of [`TEXTURE_FORMAT`]
pub const TEXEL_SIZE: usize = 4;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Image + view + backing memory
#[derive(Debug)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub allocation_size: vk::DeviceSize,
}

/// Image + memory, bound, before a view exists
#[derive(Debug)]
pub struct BoundImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub allocation_size: vk::DeviceSize,
}

impl BoundImage {
    /// Create a device-local, sampled, transfer-destination image and bind
    /// memory to it. Cleans up after itself on failure.
    pub fn new(gpu: &dyn Gpu, extent: vk::Extent2D, format: vk::Format) -> RenderResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { gpu.create_image(&image_info) }.map_err(warn_on("create image"))?;

        let backed = unsafe {
            let mem_requirements = gpu.image_memory_requirements(image);
            memory_type_for(
                gpu.memory_properties(),
                &mem_requirements,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(mem_requirements.size)
                    .memory_type_index(memory_type_index);
                gpu.allocate_memory(&alloc_info)
                    .map_err(warn_on("allocate image memory"))
            })
            .and_then(|memory| match gpu.bind_image_memory(image, memory, 0) {
                Ok(()) => Ok((memory, mem_requirements.size)),
                Err(e) => {
                    gpu.free_memory(memory);
                    Err(warn_on("bind image memory")(e))
                }
            })
        };

        match backed {
            Ok((memory, allocation_size)) => Ok(Self {
                image,
                memory,
                extent,
                format,
                allocation_size,
            }),
            Err(e) => {
                unsafe { gpu.destroy_image(image) };
                Err(e)
            }
        }
    }

    /// Create a 2D color view; on failure the image and memory are released
    pub fn into_sampled(self, gpu: &dyn Gpu) -> RenderResult<AllocatedImage> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(COLOR_RANGE);

        match unsafe { gpu.create_image_view(&view_info) } {
            Ok(view) => Ok(AllocatedImage {
                image: self.image,
                view,
                memory: self.memory,
                extent: self.extent,
                format: self.format,
                allocation_size: self.allocation_size,
            }),
            Err(e) => {
                self.release(gpu);
                Err(warn_on("create image view")(e))
            }
        }
    }

    pub fn release(self, gpu: &dyn Gpu) {
        unsafe {
            gpu.destroy_image(self.image);
            gpu.free_memory(self.memory);
        }
    }
}

impl AllocatedImage {
    /// Destroy view, image and memory
    pub fn release(self, gpu: &dyn Gpu) {
        unsafe {
            gpu.destroy_image_view(self.view);
            gpu.destroy_image(self.image);
            gpu.free_memory(self.memory);
        }
    }
}
