// =============================================================================
// VKBOOT - Vulkan context bootstrap
// =============================================================================
//
// Opens a window, builds the Vulkan resource chain for it, and tears the
// chain down again when the window is closed. There is no render loop.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Context (instance + debug messenger)                           │
// │    └── Surface (window)                                         │
// │          └── Device (GPU + queues)                              │
// │                └── Swapchain (images + views)                   │
// │                      └── Pipeline (render pass + state)         │
// │                            └── Framebuffers                     │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use vkboot::{Bootstrap, Config};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting vkboot");

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging, optionally redirected to the configured log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_env("RUST_LOG");

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== vkboot log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    bootstrap: Option<Bootstrap>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            bootstrap: None,
            failure: None,
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.bootstrap.is_some() {
            return;
        }

        match Bootstrap::new(event_loop, &self.config) {
            Ok(bootstrap) => {
                log::info!(
                    "Ready: {} framebuffers at {}x{}",
                    bootstrap.framebuffers.len(),
                    bootstrap.swapchain.extent().width,
                    bootstrap.swapchain.extent().height
                );
                self.bootstrap = Some(bootstrap);
            }
            Err(e) => {
                log::error!("Failed to bootstrap Vulkan: {:?}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down...");
            // Reverse-order teardown happens here, while the event loop is alive
            self.bootstrap = None;
            event_loop.exit();
        }
    }
}
