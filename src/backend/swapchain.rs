// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Image views and framebuffers are parallel arrays, one per swapchain image,
// rebuilt together whenever the surface is resized.

use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::{pipeline, VulkanDevice};
use crate::error::{fatal_on, ErrorKind, RenderError, RenderResult};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    surface: vk::SurfaceKHR,
    preferred_present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: vk::SurfaceKHR,
        surface_loader: &khr::Surface,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RenderResult<Self> {
        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let mut swapchain = Self {
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            surface,
            preferred_present_mode,
            device,
        };
        swapchain.build(surface_loader, width, height)?;
        Ok(swapchain)
    }

    /// Number of presentable images
    pub fn images_cnt(&self) -> usize {
        self.images.len()
    }

    fn build(&mut self, surface_loader: &khr::Surface, width: u32, height: u32) -> RenderResult<()> {
        log::info!("Creating swapchain: {}x{}", width, height);
        let physical_device = self.device.physical_device;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .map_err(fatal_on("query surface capabilities"))?;

        // Query supported formats
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, self.surface) }
            .map_err(fatal_on("query surface formats"))?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .map_err(fatal_on("query present modes"))?;

        // Choose surface format (prefer SRGB)
        let surface_format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| RenderError::fatal(ErrorKind::Setup("No suitable surface format".into())))?;

        check_format_unchanged(self.format, surface_format.format)?;

        // FIFO is always supported
        let present_mode = if present_modes.contains(&self.preferred_present_mode) {
            self.preferred_present_mode
        } else {
            log::warn!(
                "Present mode {:?} unsupported, falling back to FIFO",
                self.preferred_present_mode
            );
            vk::PresentModeKHR::FIFO
        };
        log::info!("Present mode: {:?}", present_mode);

        // Choose extent
        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };

        let mut image_count = surface_caps.min_image_count + 1;
        if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
            image_count = surface_caps.max_image_count;
        }

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(fatal_on("create swapchain"))?;

        // The old chain is retired as soon as the new one exists
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.format = surface_format.format;
        self.extent = extent;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(fatal_on("get swapchain images"))?;
        log::info!("Created swapchain with {} images", self.images.len());

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { self.device.device.create_image_view(&create_info, None) }
                .map_err(fatal_on("create swapchain image view"))?;
            self.image_views.push(view);
        }

        Ok(())
    }

    /// Create one framebuffer per swapchain image view
    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> RenderResult<()> {
        self.destroy_framebuffers();
        for &view in &self.image_views {
            let framebuffer = pipeline::create_framebuffer(&self.device, render_pass, view, self.extent)?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Rebuild the chain, its views and framebuffers for a new surface size.
    /// The device must be idle.
    pub fn recreate(
        &mut self,
        surface_loader: &khr::Surface,
        width: u32,
        height: u32,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        self.destroy_framebuffers();
        self.destroy_views();
        self.build(surface_loader, width, height)?;
        self.create_framebuffers(render_pass)
    }

    /// Acquire next image for rendering. `None` means the chain is out of date.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RenderResult<Option<(u32, bool)>> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(Some((index, suboptimal))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(vk::Result::TIMEOUT) => Err(RenderError::fatal(ErrorKind::GpuTimeout(
                std::time::Duration::from_nanos(timeout),
            ))),
            Err(e) => Err(fatal_on("acquire swapchain image")(e)),
        }
    }

    /// Present rendered image to screen. Returns true when the chain should be rebuilt.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> RenderResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(fatal_on("present swapchain image")(e)),
        }
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    fn destroy_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.device.destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        self.destroy_views();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// The render pass is built once for the first format. A rebuild that picks a
/// different one would produce framebuffers incompatible with it.
fn check_format_unchanged(previous: vk::Format, chosen: vk::Format) -> RenderResult<()> {
    if previous == vk::Format::UNDEFINED || previous == chosen {
        return Ok(());
    }
    Err(RenderError::fatal(ErrorKind::Setup(format!(
        "Surface format changed from {:?} to {:?}; render pass is incompatible",
        previous, chosen
    ))))
}
