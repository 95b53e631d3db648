// Surface - Native window to Vulkan surface
//
// Built straight from raw-window-handle 0.6 handles. Only the desktop
// platforms we ship on are wired up.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;

use crate::error::{fatal_on, ErrorKind, RenderError, RenderResult};

fn unsupported(what: impl std::fmt::Debug) -> RenderError {
    RenderError::fatal(ErrorKind::Setup(format!("Unsupported window system: {:?}", what)))
}

/// Instance extensions needed to present on `display`
pub fn required_extensions(display: RawDisplayHandle) -> RenderResult<Vec<*const c_char>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => return Err(unsupported(other)),
    };

    Ok(vec![khr::Surface::name().as_ptr(), platform.as_ptr()])
}

/// Create a presentable surface for the window
///
/// # Safety
/// The handles must stay valid until the surface is destroyed, and the
/// instance must have been created with `required_extensions(display)`.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> RenderResult<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
            let hinstance = window.hinstance.map_or(0, |h| h.get());
            let info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance as vk::HINSTANCE)
                .hwnd(window.hwnd.get() as vk::HWND);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&info, None)
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .ok_or_else(|| unsupported("Xlib without a display connection"))?;
            let info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr().cast())
                .window(window.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&info, None)
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
            let connection = display
                .connection
                .ok_or_else(|| unsupported("Xcb without a connection"))?;
            let info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr().cast())
                .window(window.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&info, None)
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr().cast())
                .surface(window.surface.as_ptr().cast());
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&info, None)
        }
        (display, window) => return Err(unsupported((display, window))),
    };

    surface.map_err(fatal_on("create window surface"))
}
