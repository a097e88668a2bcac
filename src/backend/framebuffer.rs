// Framebuffers - one per swapchain image, bound to the pipeline's render pass

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::{Device, Pipeline, Swapchain};
use crate::error::rejected;

pub struct FramebufferSet {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
    device: Arc<Device>,
    _pipeline: Arc<Pipeline>,
    _swapchain: Arc<Swapchain>,
}

impl FramebufferSet {
    pub fn create(
        device: &Arc<Device>,
        pipeline: &Arc<Pipeline>,
        swapchain: &Arc<Swapchain>,
    ) -> Result<Self> {
        let extent = swapchain.extent();

        // Filled one by one so a failure drops (and destroys) the ones already made
        let mut set = Self {
            framebuffers: Vec::with_capacity(swapchain.image_views.len()),
            extent,
            device: device.clone(),
            _pipeline: pipeline.clone(),
            _swapchain: swapchain.clone(),
        };

        for &image_view in &swapchain.image_views {
            let attachments = [image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(pipeline.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
                .map_err(rejected("vkCreateFramebuffer"))?;
            set.framebuffers.push(framebuffer);
        }

        log::info!("Created {} framebuffers", set.framebuffers.len());
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl Drop for FramebufferSet {
    fn drop(&mut self) {
        log::debug!("Destroying {} framebuffers...", self.framebuffers.len());
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
