// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Resizing is handled by the caller: drop the swapchain (and everything
// built on its views), then create a new one.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::negotiate::{QueueFamilySelection, SwapchainConfig};
use super::{Device, Surface};
use crate::error::rejected;

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub config: SwapchainConfig,
    device: Arc<Device>,
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn create(device: &Arc<Device>, surface: &Arc<Surface>) -> Result<Arc<Self>> {
        let physical_device = device.physical_device;

        // Query surface capabilities, formats and present modes
        let surface_caps = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;

        let config = SwapchainConfig::negotiate(
            &surface_caps,
            &formats,
            &present_modes,
            surface.pixel_size(),
        )?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            config.extent.width,
            config.extent.height,
            config.format.format,
            config.present_mode,
            config.image_count
        );

        let (sharing_mode, queue_family_indices) = sharing_mode(device.queue_families);

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(device.context().instance(), &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(rejected("vkCreateSwapchainKHR"))?;

        // From here on `Drop` cleans up whatever has been created
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            config,
            device: device.clone(),
            _surface: surface.clone(),
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(rejected("vkGetSwapchainImagesKHR"))?;

        log::info!("Created swapchain with {} images", this.images.len());

        this.image_views.reserve(this.images.len());
        for &image in &this.images {
            let view = create_image_view(&device.device, image, config.format.format)?;
            this.image_views.push(view);
        }

        Ok(Arc::new(this))
    }

    pub fn format(&self) -> vk::Format {
        self.config.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::debug!("Destroying swapchain ({} views)...", self.image_views.len());
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// CONCURRENT across both families when they differ, EXCLUSIVE otherwise.
pub fn sharing_mode(queue_families: QueueFamilySelection) -> (vk::SharingMode, Vec<u32>) {
    if queue_families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queue_families.graphics, queue_families.present],
        )
    }
}

fn create_image_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe { device.create_image_view(&create_info, None) }
        .map_err(rejected("vkCreateImageView"))?;
    Ok(view)
}
