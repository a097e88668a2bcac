// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first enumerated, no scoring)
// - Capability negotiation against the bound surface
// - Logical device + graphics/present queue creation

use anyhow::{Context as _, Result};
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::negotiate::{Capabilities, DeviceRequirements, QueueFamilySelection};
use super::{Context, Surface};
use crate::error::{rejected, BootstrapError};

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles (the same handle twice when the families coincide)
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilySelection,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,

    context: Arc<Context>,
}

impl Device {
    /// Create the logical device.
    ///
    /// The surface is only consulted during selection; the device does not
    /// keep it alive.
    pub fn create(
        context: &Arc<Context>,
        surface: &Surface,
        requirements: &DeviceRequirements,
    ) -> Result<Arc<Self>> {
        let instance = context.instance();

        // Step 1: Pick physical device (GPU)
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;
        let physical_device = *devices.first().ok_or(BootstrapError::NoPhysicalDevice)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 2: Negotiate capabilities
        let capabilities = Capabilities::query(context, surface, physical_device)?;
        capabilities.check(requirements)?;
        let queue_families = QueueFamilySelection::select(&capabilities.queue_families, |family| {
            surface.supports_present(physical_device, family)
        })?;
        log::info!(
            "Queue families: graphics={}, present={}",
            queue_families.graphics,
            queue_families.present
        );

        // Step 3: Create logical device
        let device = Self::create_logical_device(context, physical_device, queue_families, requirements)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = if queue_families.is_shared() {
            graphics_queue
        } else {
            unsafe { device.get_device_queue(queue_families.present, 0) }
        };

        Ok(Arc::new(Self {
            device,
            physical_device,
            graphics_queue,
            present_queue,
            queue_families,
            properties,
            context: context.clone(),
        }))
    }

    fn create_logical_device(
        context: &Context,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilySelection,
        requirements: &DeviceRequirements,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = queue_create_infos(queue_families, &queue_priorities);

        let extensions: Vec<_> = requirements.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layers = context.enabled_layer_names();
        let features = requirements.enabled_features();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe {
            context
                .instance()
                .create_device(physical_device, &create_info, None)
        }
        .map_err(rejected("vkCreateDevice"))?;

        Ok(device)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying logical device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

/// One queue request per distinct family. `priorities` must outlive the
/// returned structs.
pub fn queue_create_infos(
    queue_families: QueueFamilySelection,
    priorities: &[f32],
) -> Vec<vk::DeviceQueueCreateInfo> {
    queue_families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(priorities)
                .build()
        })
        .collect()
}
