// End-to-end bring-up against a real driver.
//
// Needs a display, a Vulkan driver and the compiled shaders in shaders/:
//   cargo test --test bootstrap -- --ignored

use anyhow::{ensure, Result};
use raw_window_handle::HasRawDisplayHandle;
use std::path::PathBuf;
use vkboot::backend::{
    ContextSettings, Context, Device, DeviceRequirements, FramebufferSet, PipelineBuilder,
    ShaderStage, Surface, Swapchain, WindowData,
};
use vkboot::{Bootstrap, BootstrapError, Config};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::WindowId;

fn shader(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders").join(name)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.shaders.vertex = shader("triangle.vert.spv");
    config.shaders.fragment = shader("triangle.frag.spv");
    config.debug.validation_layers = false;
    config
}

// Not every driver install ships the validation layer
fn settings() -> ContextSettings {
    ContextSettings {
        enable_validation: false,
        ..Default::default()
    }
}

/// Walks the chain by hand, including a swapchain rebuild.
fn manual_chain(event_loop: &ActiveEventLoop) -> Result<()> {
    let context = Context::open(event_loop.raw_display_handle(), &settings())?;

    let second = Context::open(event_loop.raw_display_handle(), &settings());
    ensure!(
        matches!(
            second.as_ref().err().and_then(|e| e.downcast_ref::<BootstrapError>()),
            Some(BootstrapError::ContextAlreadyOpen)
        ),
        "second live context was not refused"
    );

    let data = WindowData {
        width: 1600,
        height: 900,
        fullscreen: false,
    };
    let surface = Surface::create(&context, event_loop, "vkboot test", data)?;
    ensure!(surface.window_data() == data);

    let device = Device::create(&context, &surface, &DeviceRequirements::default())?;

    // Destroy-then-create is how a resize would rebuild the swapchain
    let swapchain = Swapchain::create(&device, &surface)?;
    drop(swapchain);
    let swapchain = Swapchain::create(&device, &surface)?;
    ensure!(swapchain.image_views.len() == swapchain.images.len());

    let mut builder = PipelineBuilder::new(&device);
    builder
        .add_shader_stage(ShaderStage::Vertex, shader("triangle.vert.spv"))?
        .add_shader_stage(ShaderStage::Fragment, shader("triangle.frag.spv"))?
        .set_output_format(swapchain.format());
    let pipeline = builder.build()?;
    ensure!(pipeline.format == swapchain.format());

    let framebuffers = FramebufferSet::create(&device, &pipeline, &swapchain)?;
    ensure!(framebuffers.len() == swapchain.image_views.len());
    ensure!(framebuffers.extent == swapchain.extent());

    // Reverse order of creation
    drop(framebuffers);
    drop(pipeline);
    drop(swapchain);
    drop(device);
    drop(surface);
    drop(context);
    Ok(())
}

fn full_bootstrap(event_loop: &ActiveEventLoop) -> Result<()> {
    let bootstrap = Bootstrap::new(event_loop, &test_config())?;

    ensure!(!bootstrap.framebuffers.is_empty());
    ensure!(bootstrap.framebuffers.len() == bootstrap.swapchain.image_views.len());
    ensure!(bootstrap.pipeline.format == bootstrap.swapchain.format());
    Ok(())
}

#[derive(Default)]
struct Harness {
    outcome: Option<Result<()>>,
}

impl ApplicationHandler for Harness {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.outcome.is_none() {
            self.outcome = Some(manual_chain(event_loop).and_then(|_| full_bootstrap(event_loop)));
            event_loop.exit();
        }
    }

    fn window_event(&mut self, _: &ActiveEventLoop, _: WindowId, _: WindowEvent) {}
}

#[test]
#[ignore = "needs a display and a Vulkan driver"]
fn bootstrap_and_teardown_on_real_driver() {
    let mut builder = EventLoop::builder();
    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_any_thread(true);
    }
    let event_loop = builder.build().unwrap();

    let mut harness = Harness::default();
    event_loop.run_app(&mut harness).unwrap();

    harness
        .outcome
        .expect("event loop never resumed")
        .unwrap();
}
