// Surface - the window we present into
//
// Owns both the platform window and the VkSurfaceKHR made from it. The
// surface goes first on drop, then the window.

use anyhow::{Context as _, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window, WindowAttributes};

use super::Context;
use crate::error::rejected;

/// Size and mode the window was requested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowData {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    data: WindowData,
    window: Arc<Window>,
    _context: Arc<Context>,
}

impl Surface {
    pub fn create(
        context: &Arc<Context>,
        event_loop: &ActiveEventLoop,
        title: &str,
        data: WindowData,
    ) -> Result<Arc<Self>> {
        log::info!(
            "Creating window: {}x{} ({})",
            data.width,
            data.height,
            if data.fullscreen { "fullscreen" } else { "windowed" }
        );

        let mut window_attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(winit::dpi::PhysicalSize::new(data.width, data.height));

        // Fullscreen goes on the primary display
        if data.fullscreen {
            window_attributes = window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(event_loop.primary_monitor())));
        }

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        let surface = unsafe {
            ash_window::create_surface(
                context.entry(),
                context.instance(),
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(rejected("vkCreateSurfaceKHR"))?;

        let surface_loader =
            ash::extensions::khr::Surface::new(context.entry(), context.instance());

        Ok(Arc::new(Self {
            surface,
            surface_loader,
            data,
            window: Arc::new(window),
            _context: context.clone(),
        }))
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn window_data(&self) -> WindowData {
        self.data
    }

    /// Current drawable size in physical pixels.
    pub fn pixel_size(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                family,
                self.surface,
            )
        }
        .context("Failed to query surface present support")?;
        Ok(supported)
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .context("Failed to query surface capabilities")?;
        Ok(caps)
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .context("Failed to query surface formats")?;
        Ok(formats)
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .context("Failed to query surface present modes")?;
        Ok(modes)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::debug!("Destroying surface...");
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
