// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash. Resource code talks to the device through
// the `Gpu` trait so it can run against a simulated device in tests.

pub mod buffer;
pub mod device;
pub mod gpu;
pub mod image;
pub mod mapping;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub mod simulated;

pub use buffer::AllocatedBuffer;
pub use device::VulkanDevice;
pub use gpu::Gpu;
pub use image::AllocatedImage;
pub use swapchain::Swapchain;
pub use sync::{FrameCycle, FrameState};
