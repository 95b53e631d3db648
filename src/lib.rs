// Slot renderer
//
// Vulkan resource core: memory-type selection, buffer and texture upload into
// a fixed-capacity resource table, and the per-frame fence/semaphore cycle.

pub mod backend;
pub mod config;
pub mod error;
pub mod platform;
pub mod renderer;
pub mod resources;

pub use config::Config;
pub use error::{ErrorKind, RenderError, RenderResult, Severity};
pub use platform::PlatformWindow;
pub use renderer::Renderer;
