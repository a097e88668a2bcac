// Capability negotiation
//
// Queries what a GPU + surface pair can do and picks a configuration from it.
// The selection policies are plain functions over ash's value types so they
// can be exercised without a driver.

use anyhow::{Context as _, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::{c_char, CStr, CString};

use super::{Context, Surface};
use crate::error::BootstrapError;

/// Device features the bootstrap knows how to require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFeature {
    SamplerAnisotropy,
    FillModeNonSolid,
    WideLines,
    GeometryShader,
    ShaderInt64,
}

impl DeviceFeature {
    pub fn name(self) -> &'static str {
        match self {
            Self::SamplerAnisotropy => "sampler_anisotropy",
            Self::FillModeNonSolid => "fill_mode_non_solid",
            Self::WideLines => "wide_lines",
            Self::GeometryShader => "geometry_shader",
            Self::ShaderInt64 => "shader_int64",
        }
    }

    fn flag_mut(self, features: &mut vk::PhysicalDeviceFeatures) -> &mut vk::Bool32 {
        match self {
            Self::SamplerAnisotropy => &mut features.sampler_anisotropy,
            Self::FillModeNonSolid => &mut features.fill_mode_non_solid,
            Self::WideLines => &mut features.wide_lines,
            Self::GeometryShader => &mut features.geometry_shader,
            Self::ShaderInt64 => &mut features.shader_int64,
        }
    }

    pub fn supported_by(self, features: &vk::PhysicalDeviceFeatures) -> bool {
        let supported = match self {
            Self::SamplerAnisotropy => features.sampler_anisotropy,
            Self::FillModeNonSolid => features.fill_mode_non_solid,
            Self::WideLines => features.wide_lines,
            Self::GeometryShader => features.geometry_shader,
            Self::ShaderInt64 => features.shader_int64,
        };
        supported == vk::TRUE
    }
}

/// What the selected GPU must offer before we create a logical device on it.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub extensions: Vec<CString>,
    pub features: Vec<DeviceFeature>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: vec![ash::extensions::khr::Swapchain::name().to_owned()],
            features: vec![DeviceFeature::SamplerAnisotropy],
        }
    }
}

impl DeviceRequirements {
    /// Feature struct with exactly the required flags turned on.
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        let mut enabled = vk::PhysicalDeviceFeatures::default();
        for feature in &self.features {
            *feature.flag_mut(&mut enabled) = vk::TRUE;
        }
        enabled
    }
}

/// Everything the backend reports for one physical device and surface.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    pub features: vk::PhysicalDeviceFeatures,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl Capabilities {
    pub fn query(
        context: &Context,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let instance = context.instance();

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("Failed to enumerate device extensions")?
            .iter()
            .map(|ext| raw_name(&ext.extension_name))
            .collect();

        Ok(Self {
            layers: context.available_layers()?,
            extensions,
            features: unsafe { instance.get_physical_device_features(physical_device) },
            formats: surface.formats(physical_device)?,
            present_modes: surface.present_modes(physical_device)?,
            queue_families: unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            },
        })
    }

    /// Checks features, surface support and extensions, in that order.
    pub fn check(&self, requirements: &DeviceRequirements) -> Result<(), BootstrapError> {
        if let Some(missing) = requirements
            .features
            .iter()
            .find(|feature| !feature.supported_by(&self.features))
        {
            return Err(BootstrapError::MissingFeature(missing.name()));
        }

        if self.formats.is_empty() {
            return Err(BootstrapError::NoSurfaceFormats);
        }
        if self.present_modes.is_empty() {
            return Err(BootstrapError::NoPresentModes);
        }

        for required in &requirements.extensions {
            let required = required.to_string_lossy();
            if !self.extensions.iter().any(|ext| *ext == required) {
                return Err(BootstrapError::MissingExtension(required.into_owned()));
            }
        }

        Ok(())
    }
}

/// Graphics and present queue family indices. They may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySelection {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilySelection {
    /// Scans families in index order and stops once both roles are filled.
    /// The first family satisfying a role wins it. `supports_present` is only
    /// asked about families scanned while no present family has been found.
    pub fn select<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in (0u32..).zip(families) {
            if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(index);
            }
            if present.is_none() && supports_present(index)? {
                present = Some(index);
            }
            if graphics.is_some() && present.is_some() {
                break;
            }
        }

        Ok(Self {
            graphics: graphics.ok_or(BootstrapError::NoGraphicsQueue)?,
            present: present.ok_or(BootstrapError::NoPresentQueue)?,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Negotiated swapchain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn negotiate(
        surface_caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        window_size: vk::Extent2D,
    ) -> Result<Self, BootstrapError> {
        Ok(Self {
            format: choose_surface_format(formats).ok_or(BootstrapError::NoSurfaceFormats)?,
            present_mode: choose_present_mode(present_modes),
            extent: resolve_extent(surface_caps, window_size),
            image_count: resolve_image_count(surface_caps),
        })
    }
}

/// BGRA8 sRGB with the sRGB non-linear color space, else whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX: no vsync tearing, triple buffered
/// FIFO: vsync, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A current extent width of `u32::MAX` means the surface lets us pick.
pub fn resolve_extent(surface_caps: &vk::SurfaceCapabilitiesKHR, window_size: vk::Extent2D) -> vk::Extent2D {
    if surface_caps.current_extent.width != u32::MAX {
        return surface_caps.current_extent;
    }

    vk::Extent2D {
        width: window_size.width.clamp(
            surface_caps.min_image_extent.width,
            surface_caps.max_image_extent.width,
        ),
        height: window_size.height.clamp(
            surface_caps.min_image_extent.height,
            surface_caps.max_image_extent.height,
        ),
    }
}

/// One more than the minimum; a maximum of 0 means unbounded.
pub fn resolve_image_count(surface_caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = surface_caps.min_image_count + 1;
    if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
        surface_caps.max_image_count
    } else {
        image_count
    }
}

/// Reads a fixed-size, NUL-terminated name array as reported by Vulkan.
pub(crate) fn raw_name(raw: &[c_char]) -> String {
    assert!(raw.contains(&0), "Vulkan name array is not NUL-terminated");
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn surface_caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    fn full_caps() -> Capabilities {
        Capabilities {
            layers: vec![],
            extensions: vec!["VK_KHR_swapchain".to_string()],
            features: vk::PhysicalDeviceFeatures {
                sampler_anisotropy: vk::TRUE,
                ..Default::default()
            },
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            queue_families: vec![family(vk::QueueFlags::GRAPHICS)],
        }
    }

    #[test]
    fn queue_scan_takes_first_match_and_stops() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let asked = RefCell::new(Vec::new());

        let selection = QueueFamilySelection::select(&families, |index| {
            asked.borrow_mut().push(index);
            Ok(index >= 2)
        })
        .unwrap();

        assert_eq!(selection, QueueFamilySelection { graphics: 1, present: 2 });
        assert_eq!(*asked.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn queue_scan_allows_shared_family() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let mut calls = 0;

        let selection = QueueFamilySelection::select(&families, |_| {
            calls += 1;
            Ok(true)
        })
        .unwrap();

        assert!(selection.is_shared());
        assert_eq!(selection.unique_families(), vec![0]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn queue_scan_fails_without_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        let err = QueueFamilySelection::select(&families, |_| Ok(true)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::NoGraphicsQueue)
        ));
    }

    #[test]
    fn queue_scan_fails_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = QueueFamilySelection::select(&families, |_| Ok(false)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::NoPresentQueue)
        ));
    }

    #[test]
    fn distinct_families_request_two_queues() {
        let selection = QueueFamilySelection { graphics: 0, present: 3 };
        assert!(!selection.is_shared());
        assert_eq!(selection.unique_families(), vec![0, 3]);
    }

    #[test]
    fn prefers_bgra8_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_else_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn defined_current_extent_wins() {
        let caps = surface_caps((800, 600), (1, 1), (4096, 4096));
        let window = vk::Extent2D { width: 1600, height: 900 };
        assert_eq!(resolve_extent(&caps, window), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn undefined_current_extent_clamps_window_size() {
        let caps = surface_caps((u32::MAX, u32::MAX), (640, 480), (1280, 1024));
        let window = vk::Extent2D { width: 1600, height: 300 };
        assert_eq!(resolve_extent(&caps, window), vk::Extent2D { width: 1280, height: 480 });

        let window = vk::Extent2D { width: 1000, height: 700 };
        assert_eq!(resolve_extent(&caps, window), window);
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        let mut caps = surface_caps((1, 1), (1, 1), (1, 1));
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(resolve_image_count(&caps), 3);

        caps.max_image_count = 8;
        assert_eq!(resolve_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(resolve_image_count(&caps), 2);
    }

    #[test]
    fn swapchain_config_rejects_empty_formats() {
        let caps = surface_caps((800, 600), (1, 1), (4096, 4096));
        let err = SwapchainConfig::negotiate(&caps, &[], &[vk::PresentModeKHR::FIFO], caps.current_extent)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::NoSurfaceFormats));
    }

    #[test]
    fn check_accepts_complete_device() {
        assert!(full_caps().check(&DeviceRequirements::default()).is_ok());
    }

    #[test]
    fn check_reports_missing_feature_first() {
        let mut caps = full_caps();
        caps.features.sampler_anisotropy = vk::FALSE;
        caps.extensions.clear();
        assert!(matches!(
            caps.check(&DeviceRequirements::default()),
            Err(BootstrapError::MissingFeature("sampler_anisotropy"))
        ));
    }

    #[test]
    fn check_reports_empty_surface_lists() {
        let mut caps = full_caps();
        caps.present_modes.clear();
        assert!(matches!(
            caps.check(&DeviceRequirements::default()),
            Err(BootstrapError::NoPresentModes)
        ));

        caps.formats.clear();
        assert!(matches!(
            caps.check(&DeviceRequirements::default()),
            Err(BootstrapError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn check_reports_missing_extension() {
        let requirements = DeviceRequirements {
            extensions: vec![CString::new("VK_KHR_ray_query").unwrap()],
            features: vec![],
        };
        match full_caps().check(&requirements) {
            Err(BootstrapError::MissingExtension(name)) => assert_eq!(name, "VK_KHR_ray_query"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn enabled_features_sets_only_requested_flags() {
        let requirements = DeviceRequirements {
            extensions: vec![],
            features: vec![DeviceFeature::SamplerAnisotropy, DeviceFeature::WideLines],
        };
        let enabled = requirements.enabled_features();
        assert_eq!(enabled.sampler_anisotropy, vk::TRUE);
        assert_eq!(enabled.wide_lines, vk::TRUE);
        assert_eq!(enabled.fill_mode_non_solid, vk::FALSE);
        assert_eq!(enabled.geometry_shader, vk::FALSE);
    }

    #[test]
    fn raw_name_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_surface") {
            *dst = *src as c_char;
        }
        assert_eq!(raw_name(&raw), "VK_KHR_surface");
    }
}
