// =============================================================================
// BOOTSTRAP - the full resource chain in one value
// =============================================================================
//
// Construction order:
//   Context -> Surface -> Device -> Swapchain -> Pipeline -> Framebuffers
//
// IMPORTANT: Field order matters for Drop! Rust drops fields top to bottom,
// so the fields are declared in reverse order of creation.

use anyhow::{Context as _, Result};
use raw_window_handle::HasRawDisplayHandle;
use std::sync::Arc;
use winit::event_loop::ActiveEventLoop;

use crate::backend::{
    Context, Device, FramebufferSet, Pipeline, PipelineBuilder, ShaderStage, Surface, Swapchain,
};
use crate::config::Config;

pub struct Bootstrap {
    pub framebuffers: FramebufferSet,
    pub pipeline: Arc<Pipeline>,
    pub swapchain: Arc<Swapchain>,
    pub device: Arc<Device>,
    pub surface: Arc<Surface>,
    pub context: Arc<Context>,
}

impl Bootstrap {
    /// Build the whole chain. Must be called from `resumed`, where the event
    /// loop can create windows.
    pub fn new(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        log::info!("Bootstrapping Vulkan...");

        // STEP 1: Backend connection
        let context = Context::open(event_loop.raw_display_handle(), &config.context_settings())
            .context("Failed to open Vulkan context")?;

        // STEP 2: Window + surface
        let surface = Surface::create(&context, event_loop, &config.window.title, config.window_data())
            .context("Failed to create window surface")?;

        // STEP 3: GPU selection + logical device
        let requirements = config.device_requirements()?;
        let device = Device::create(&context, &surface, &requirements)
            .context("Failed to create logical device")?;

        // STEP 4: Swapchain + image views
        let swapchain = Swapchain::create(&device, &surface).context("Failed to create swapchain")?;

        // STEP 5: Graphics pipeline targeting the swapchain format
        let mut builder = PipelineBuilder::new(&device);
        builder
            .add_shader_stage(ShaderStage::Vertex, &config.shaders.vertex)?
            .add_shader_stage(ShaderStage::Fragment, &config.shaders.fragment)?
            .set_output_format(swapchain.format());
        let pipeline = builder.build()?;

        // STEP 6: One framebuffer per swapchain image
        let framebuffers = FramebufferSet::create(&device, &pipeline, &swapchain)
            .context("Failed to create framebuffers")?;

        log::info!("Vulkan bootstrap complete");

        Ok(Self {
            framebuffers,
            pipeline,
            swapchain,
            device,
            surface,
            context,
        })
    }
}

impl Drop for Bootstrap {
    fn drop(&mut self) {
        // Fields are destroyed right after this, in declaration order
        log::info!("Tearing down Vulkan resources...");
        let _ = self.device.wait_idle();
    }
}
