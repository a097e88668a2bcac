// Backend module - Vulkan abstraction layer
//
// Design: Thin wrappers around ash, one per owned handle. Each wrapper keeps
// an `Arc` to what it was built from, so nothing is destroyed while a
// dependent still exists.

pub mod context;
pub mod device;
pub mod framebuffer;
pub mod negotiate;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use context::{Context, ContextSettings};
pub use device::Device;
pub use framebuffer::FramebufferSet;
pub use negotiate::{DeviceFeature, DeviceRequirements};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use shader::ShaderStage;
pub use surface::{Surface, WindowData};
pub use swapchain::Swapchain;
