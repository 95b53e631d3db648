// Texture loading into a table slot
//
// Pixels go host -> staging buffer -> device-local image. The new image
// replaces whatever the slot held. The old image is handed back untouched and
// the slot's descriptor set keeps pointing at the old view until the caller
// rebinds it with `ResourceTable::bind_texture`.

use ash::vk;

use super::ResourceTable;
use crate::backend::image::{BoundImage, TEXEL_SIZE, TEXTURE_FORMAT};
use crate::backend::{AllocatedBuffer, AllocatedImage, Gpu};
use crate::error::{warn_on, ErrorKind, RenderError, RenderResult};

/// Load tightly packed RGBA8 `pixels` of `width` x `height` into
/// `image_textures[id]`.
///
/// Returns the image previously stored in the slot, which this call neither
/// releases nor unbinds. On failure nothing created by this call survives and
/// the slot is left as it was.
pub fn load_image_texture(
    gpu: &dyn Gpu,
    table: &mut ResourceTable,
    pixels: &[u8],
    width: u32,
    height: u32,
    id: usize,
) -> RenderResult<Option<AllocatedImage>> {
    table.image_textures.check(id)?;

    let expected = width as usize * height as usize * TEXEL_SIZE;
    if expected == 0 || pixels.len() != expected {
        return Err(RenderError::warning(ErrorKind::PixelSizeMismatch {
            width,
            height,
            expected,
            actual: pixels.len(),
        }));
    }

    let extent = vk::Extent2D { width, height };
    let bound = BoundImage::new(gpu, extent, TEXTURE_FORMAT)?;

    if let Err(e) = stage_pixels(gpu, &bound, pixels) {
        bound.release(gpu);
        return Err(e);
    }

    let texture = bound.into_sampled(gpu)?;
    log::debug!("Loaded {}x{} texture into slot {}", width, height, id);

    table.image_textures.replace(id, Some(texture))
}

fn stage_pixels(gpu: &dyn Gpu, image: &BoundImage, pixels: &[u8]) -> RenderResult<()> {
    let staging = AllocatedBuffer::new(
        gpu,
        pixels.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    // Blocking: the copy has completed when this returns, so the staging
    // buffer can go straight away.
    let result = staging.upload(gpu, pixels).and_then(|()| unsafe {
        gpu.copy_buffer_to_image(staging.buffer, image.image, image.extent)
            .map_err(warn_on("copy staging buffer to image"))
    });

    staging.release(gpu);
    result
}
