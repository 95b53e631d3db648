// Platform window - OS window + message pump
//
// The renderer only needs three things from the OS layer: raw handles to
// build a surface from, a per-frame "should continue" answer, and the window
// going away on drop. Events are pumped on demand instead of handing control
// to winit's run loop.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::WindowConfig;
use crate::error::{ErrorKind, RenderError, RenderResult};

fn setup_error(what: &str, e: impl std::fmt::Display) -> RenderError {
    RenderError::fatal(ErrorKind::Setup(format!("{}: {}", what, e)))
}

/// Event handler state shared with winit while pumping
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<String>,
    close_requested: bool,
    pending_resize: Option<PhysicalSize<u32>>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                log::info!("Window created: {:?}", window.inner_size());
                self.window = Some(window);
            }
            Err(e) => {
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.pending_resize = Some(size);
            }
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    pub fn new(config: &WindowConfig) -> RenderResult<Self> {
        let event_loop = EventLoop::new().map_err(|e| setup_error("Failed to create event loop", e))?;

        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height));

        let mut platform = Self {
            event_loop,
            state: WindowState {
                attributes,
                window: None,
                create_error: None,
                close_requested: false,
                pending_resize: None,
            },
        };

        // The window is created from `resumed`, delivered by the first pump
        platform
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut platform.state);

        if let Some(e) = platform.state.create_error.take() {
            return Err(setup_error("Failed to create window", e));
        }
        if platform.state.window.is_none() {
            return Err(setup_error("Failed to create window", "no window after first event pump"));
        }

        // Creation sizes are not a resize
        platform.state.pending_resize = None;
        Ok(platform)
    }

    /// Pump pending OS messages. Returns false once the window should close.
    pub fn do_events(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);

        matches!(status, PumpStatus::Continue) && !self.state.close_requested
    }

    /// Most recent surface size reported since the last call, if any
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.state
            .pending_resize
            .take()
            .map(|size| (size.width, size.height))
    }

    /// Current drawable size in pixels
    pub fn inner_size(&self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map_or((0, 0), |window| {
                let size = window.inner_size();
                (size.width, size.height)
            })
    }

    pub fn display_handle(&self) -> RenderResult<RawDisplayHandle> {
        let window = self.window()?;
        window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| setup_error("Failed to get display handle", e))
    }

    pub fn window_handle(&self) -> RenderResult<RawWindowHandle> {
        let window = self.window()?;
        window
            .window_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| setup_error("Failed to get window handle", e))
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }

    fn window(&self) -> RenderResult<&Window> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| setup_error("Window unavailable", "already closed"))
    }
}
