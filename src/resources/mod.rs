// Resource table
//
// Fixed-capacity registry of everything shaders can bind: one descriptor set
// per texture slot, the texture images themselves, the camera uniform buffer
// and the square model. Sized once, torn down as a whole.

pub mod camera;
pub mod model;
pub mod slots;
pub mod texture;

use ash::vk;

use crate::backend::{AllocatedImage, Gpu};
use crate::error::{fatal_on, ErrorKind, RenderError, RenderResult};
pub use camera::{Camera, CameraUniform};
pub use model::{Model, Vertex};
pub use slots::FixedSlots;

/// Descriptor binding of the camera uniform buffer
pub const CAMERA_BINDING: u32 = 0;
/// Descriptor binding of the texture sampler
pub const TEXTURE_BINDING: u32 = 1;

pub struct ResourceTable {
    descriptor_sets: FixedSlots<vk::DescriptorSet>,
    image_textures: FixedSlots<Option<AllocatedImage>>,
    camera: Camera,
    square: Model,
}

impl ResourceTable {
    /// Allocate `max_image_texture_num` texture slots and as many descriptor
    /// sets, plus the camera and square.
    ///
    /// Fails fast, before touching the device, unless the capacity is
    /// greater than 1.
    pub fn new(
        gpu: &dyn Gpu,
        max_image_texture_num: usize,
        descriptor_pool: vk::DescriptorPool,
        descriptor_set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<Self> {
        Self::check_capacity(max_image_texture_num)?;

        let layouts = vec![descriptor_set_layout; max_image_texture_num];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&layouts);

        let descriptor_sets = unsafe { gpu.allocate_descriptor_sets(&alloc_info) }
            .map_err(fatal_on("allocate descriptor sets"))?;

        let camera = Camera::new(gpu).map_err(RenderError::escalate)?;
        let square = match Model::square(gpu) {
            Ok(square) => square,
            Err(e) => {
                camera.release(gpu);
                return Err(e.escalate());
            }
        };

        log::info!("Resource table ready with {} texture slots", max_image_texture_num);

        Ok(Self {
            descriptor_sets: FixedSlots::from_vec(descriptor_sets),
            image_textures: FixedSlots::from_fn(max_image_texture_num, |_| None),
            camera,
            square,
        })
    }

    /// A table needs more than one slot
    pub fn check_capacity(max_image_texture_num: usize) -> RenderResult<()> {
        if max_image_texture_num <= 1 {
            return Err(RenderError::fatal(ErrorKind::CapacityTooSmall(max_image_texture_num)));
        }
        Ok(())
    }

    pub fn max_image_texture_num(&self) -> usize {
        self.image_textures.capacity()
    }

    /// Always equal to [`Self::max_image_texture_num`]
    pub fn max_descriptor_set_num(&self) -> usize {
        self.descriptor_sets.capacity()
    }

    pub fn descriptor_set(&self, id: usize) -> RenderResult<vk::DescriptorSet> {
        self.descriptor_sets.get(id).copied()
    }

    pub fn image_texture(&self, id: usize) -> RenderResult<Option<&AllocatedImage>> {
        self.image_textures.get(id).map(Option::as_ref)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn square(&self) -> &Model {
        &self.square
    }

    /// See [`texture::load_image_texture`]. Overwrites slot `id` and leaves
    /// `descriptor_sets[id]` alone.
    pub fn load_image_texture(
        &mut self,
        gpu: &dyn Gpu,
        pixels: &[u8],
        width: u32,
        height: u32,
        id: usize,
    ) -> RenderResult<Option<AllocatedImage>> {
        texture::load_image_texture(gpu, self, pixels, width, height, id)
    }

    /// Point `descriptor_sets[id]` at the camera buffer and at the view
    /// currently stored in `image_textures[id]`.
    ///
    /// The descriptor set must not be in use by pending GPU work.
    pub fn bind_texture(&self, gpu: &dyn Gpu, id: usize, sampler: vk::Sampler) -> RenderResult<()> {
        let set = self.descriptor_set(id)?;
        let texture = self
            .image_texture(id)?
            .ok_or_else(|| RenderError::warning(ErrorKind::EmptySlot(id)))?;

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: self.camera.buffer.buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }];
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(CAMERA_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(TEXTURE_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
        ];

        unsafe { gpu.update_descriptor_sets(&writes) };
        log::debug!("Bound texture slot {} to its descriptor set", id);
        Ok(())
    }

    /// Release every texture, the camera and the square. Descriptor sets are
    /// returned with their pool. The GPU must be idle.
    pub fn destroy(self, gpu: &dyn Gpu) {
        for texture in self.image_textures.into_vec().into_iter().flatten() {
            texture.release(gpu);
        }
        self.camera.release(gpu);
        self.square.release(gpu);
    }
}
