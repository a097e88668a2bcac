// vkboot - Vulkan rendering-context bootstrap
//
// Brings up instance, surface, device, swapchain, pipeline and framebuffers
// in dependency order, and tears them down in exact reverse.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;

pub use bootstrap::Bootstrap;
pub use config::Config;
pub use error::BootstrapError;
