// Renderer - wires device, swapchain, pipeline, frames and resources
//
// Per frame:
//   wait fence -> acquire image -> record -> submit -> present
//
// Everything here runs on one thread. CPU/GPU ordering comes from the
// FrameCycle fences and semaphores only.

use ash::extensions::khr;
use ash::vk;
use glam::Vec3;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::pipeline::PipelineObjects;
use crate::backend::{surface, AllocatedImage, FrameCycle, Gpu, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::error::{fatal_on, ErrorKind, RenderError, RenderResult};
use crate::platform::PlatformWindow;
use crate::resources::{CameraUniform, Model, ResourceTable};

const DEFAULT_EYE: Vec3 = Vec3::new(0.0, 0.0, 1.5);

pub struct Renderer {
    // Teardown happens in Drop, in reverse creation order
    device: Arc<VulkanDevice>,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    swapchain: Option<Swapchain>,
    pipeline: PipelineObjects,
    command_pool: vk::CommandPool,
    frames: Vec<FrameCycle>,
    resources: Option<ResourceTable>,
    bound_slots: Vec<bool>,

    current_frame: usize,
    surface_size: (u32, u32),
    needs_rebuild: bool,
    eye: Vec3,
    fence_timeout: Duration,
    clear_color: [f32; 4],
}

impl Renderer {
    pub fn new(platform: &PlatformWindow, config: &Config) -> RenderResult<Self> {
        let display = platform.display_handle()?;
        let window = platform.window_handle()?;

        let device = VulkanDevice::new(&config.window.title, config.debug.validation_layers, display)?;
        let surface_loader = khr::Surface::new(&device.entry, &device.instance);
        let surface = unsafe { surface::create_surface(&device.entry, &device.instance, display, window)? };

        let mut renderer = Self {
            device,
            surface_loader,
            surface,
            swapchain: None,
            pipeline: PipelineObjects::default(),
            command_pool: vk::CommandPool::null(),
            frames: Vec::new(),
            resources: None,
            bound_slots: Vec::new(),
            current_frame: 0,
            surface_size: platform.inner_size(),
            needs_rebuild: false,
            eye: DEFAULT_EYE,
            fence_timeout: config.fence_timeout(),
            clear_color: config.graphics.clear_color,
        };

        // On failure Drop releases whatever was created so far
        renderer.init(config)?;
        Ok(renderer)
    }

    fn init(&mut self, config: &Config) -> RenderResult<()> {
        let max_image_texture_num = config.resources.max_image_texture_num;
        ResourceTable::check_capacity(max_image_texture_num)?;
        let max_sets = u32::try_from(max_image_texture_num)
            .map_err(|_| RenderError::fatal(ErrorKind::Setup("Too many texture slots".into())))?;

        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                self.device.physical_device,
                self.device.graphics_queue_family,
                self.surface,
            )
        }
        .map_err(fatal_on("query surface support"))?;
        if !supported {
            return Err(RenderError::fatal(ErrorKind::Setup(
                "Graphics queue cannot present to this surface".into(),
            )));
        }

        let (width, height) = self.surface_size;
        let mut swapchain = Swapchain::new(
            self.device.clone(),
            self.surface,
            &self.surface_loader,
            width,
            height,
            config.get_present_mode(),
        )?;

        self.pipeline = PipelineObjects::new(
            &self.device,
            swapchain.format,
            &config.shaders.vertex,
            &config.shaders.fragment,
            max_sets,
        )?;
        swapchain.create_framebuffers(self.pipeline.render_pass)?;
        self.swapchain = Some(swapchain);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        self.command_pool = unsafe { self.device.device.create_command_pool(&pool_info, None) }
            .map_err(fatal_on("create command pool"))?;

        let gpu: &dyn Gpu = &*self.device;
        for _ in 0..config.graphics.max_frames_in_flight.max(1) {
            self.frames.push(FrameCycle::new(gpu, self.command_pool)?);
        }

        self.resources = Some(ResourceTable::new(
            gpu,
            max_image_texture_num,
            self.pipeline.descriptor_pool,
            self.pipeline.descriptor_set_layout,
        )?);
        self.bound_slots = vec![false; max_image_texture_num];
        self.apply_camera().map_err(RenderError::escalate)?;

        log::info!(
            "Renderer ready: {} frames in flight, {} texture slots",
            self.frames.len(),
            max_image_texture_num
        );
        Ok(())
    }

    fn resources(&self) -> RenderResult<&ResourceTable> {
        self.resources
            .as_ref()
            .ok_or_else(|| RenderError::fatal(ErrorKind::Setup("Resource table not initialised".into())))
    }

    fn resources_mut(&mut self) -> RenderResult<&mut ResourceTable> {
        self.resources
            .as_mut()
            .ok_or_else(|| RenderError::fatal(ErrorKind::Setup("Resource table not initialised".into())))
    }

    pub fn max_image_texture_num(&self) -> usize {
        self.bound_slots.len()
    }

    /// Load pixels into slot `id`. Returns the displaced image, which is still
    /// referenced by the slot's descriptor set until [`Self::bind_texture`].
    pub fn load_image_texture(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        id: usize,
    ) -> RenderResult<Option<AllocatedImage>> {
        let device = self.device.clone();
        self.resources_mut()?
            .load_image_texture(&*device, pixels, width, height, id)
    }

    /// Point slot `id`'s descriptor set at its current texture.
    /// Waits for frames in flight first since they may be reading the set.
    pub fn bind_texture(&mut self, id: usize) -> RenderResult<()> {
        self.wait_for_frames()?;
        self.resources()?
            .bind_texture(&*self.device, id, self.pipeline.sampler)?;
        self.bound_slots[id] = true;
        Ok(())
    }

    /// Release an image handed back by [`Self::load_image_texture`]. The slot
    /// must have been rebound first; this waits out frames still sampling it.
    pub fn release_texture(&mut self, image: AllocatedImage) -> RenderResult<()> {
        self.wait_for_frames()?;
        image.release(&*self.device);
        Ok(())
    }

    /// Move the camera. Waits for frames in flight since they read the uniform buffer.
    pub fn update_camera(&mut self, eye: Vec3) -> RenderResult<()> {
        self.eye = eye;
        self.wait_for_frames()?;
        self.apply_camera()
    }

    fn apply_camera(&self) -> RenderResult<()> {
        let (width, height) = self.surface_size;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let uniform = CameraUniform::looking_at_origin(self.eye, aspect);
        self.resources()?.camera().update(&*self.device, &uniform)
    }

    fn wait_for_frames(&mut self) -> RenderResult<()> {
        let gpu: &dyn Gpu = &*self.device;
        for frame in &mut self.frames {
            frame.wait(gpu, self.fence_timeout)?;
        }
        Ok(())
    }

    /// The surface changed size. A zero size (minimised) pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        log::debug!("Resize to {}x{}", width, height);
        self.surface_size = (width, height);
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.rebuild_swapchain()
    }

    fn rebuild_swapchain(&mut self) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.wait_for_frames()?;

        let (width, height) = self.surface_size;
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| RenderError::fatal(ErrorKind::Setup("Swapchain not initialised".into())))?;
        swapchain.recreate(&self.surface_loader, width, height, self.pipeline.render_pass)?;

        self.needs_rebuild = false;
        self.apply_camera()
    }

    /// Draw the square with the texture bound to slot `texture_id` and present it
    pub fn render_frame(&mut self, texture_id: usize) -> RenderResult<()> {
        let descriptor_set = self.resources()?.descriptor_set(texture_id)?;
        if !self.bound_slots[texture_id] {
            return Err(RenderError::warning(ErrorKind::EmptySlot(texture_id)));
        }

        if self.surface_size.0 == 0 || self.surface_size.1 == 0 {
            return Ok(());
        }
        if self.needs_rebuild {
            self.rebuild_swapchain()?;
        }

        let Self {
            device,
            swapchain,
            pipeline,
            frames,
            resources,
            current_frame,
            needs_rebuild,
            fence_timeout,
            clear_color,
            ..
        } = self;

        let gpu: &dyn Gpu = &**device;
        let (Some(swapchain), Some(resources)) = (swapchain.as_ref(), resources.as_ref()) else {
            return Err(RenderError::fatal(ErrorKind::Setup("Renderer not initialised".into())));
        };
        let frame = &mut frames[*current_frame];

        frame.wait(gpu, *fence_timeout)?;

        let timeout_ns = u64::try_from(fence_timeout.as_nanos()).unwrap_or(u64::MAX);
        let Some((image_index, suboptimal)) = swapchain.acquire_next_image(timeout_ns, frame.image_available)?
        else {
            *needs_rebuild = true;
            return Ok(());
        };

        // `image_available` is now pending; a frame that stops here would
        // leave it signalled with no waiter.
        let cmd = frame.begin(gpu).map_err(RenderError::escalate)?;
        unsafe {
            record_draw(
                &device.device,
                cmd,
                pipeline,
                swapchain.framebuffers[image_index as usize],
                swapchain.extent,
                *clear_color,
                descriptor_set,
                resources.square(),
            );
        }
        frame.submit(gpu).map_err(RenderError::escalate)?;

        let out_of_date = swapchain.present(device.graphics_queue, image_index, frame.render_finished)?;
        if suboptimal || out_of_date {
            *needs_rebuild = true;
        }

        *current_frame = (*current_frame + 1) % frames.len();
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &PipelineObjects,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
    descriptor_set: vk::DescriptorSet,
    square: &Model,
) {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue { float32: clear_color },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(pipeline.render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(&clear_values);

    device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    device.cmd_set_viewport(cmd, 0, &[viewport]);
    device.cmd_set_scissor(cmd, 0, &[scissor]);

    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        pipeline.pipeline_layout,
        0,
        &[descriptor_set],
        &[],
    );
    device.cmd_bind_vertex_buffers(cmd, 0, &[square.vertex_buffer.buffer], &[0]);
    device.cmd_bind_index_buffer(cmd, square.index_buffer.buffer, 0, vk::IndexType::UINT32);
    device.cmd_draw_indexed(cmd, square.index_count, 1, 0, 0, 0);

    device.cmd_end_render_pass(cmd);
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer...");
        let _ = self.device.wait_idle();

        let gpu: &dyn Gpu = &*self.device;
        if let Some(resources) = self.resources.take() {
            resources.destroy(gpu);
        }
        for frame in self.frames.drain(..) {
            frame.destroy(gpu);
        }

        unsafe { self.device.device.destroy_command_pool(self.command_pool, None) };
        self.pipeline.destroy(&self.device);

        // Framebuffers and views must go before the surface
        self.swapchain = None;
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}
