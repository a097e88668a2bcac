// Vulkan Context - process-wide connection to the driver
//
// Responsibilities:
// - Load the Vulkan library and create the instance
// - Enable surface extensions for the platform's display server
// - Validation layer + debug messenger (diagnostic builds only)

use anyhow::{Context as _, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::negotiate::raw_name;
use crate::error::{rejected, BootstrapError};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Set while a [`Context`] is alive.
static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);

pub struct ContextSettings {
    pub app_name: String,
    /// Validation layer and debug messenger. Ignored in release builds.
    pub enable_validation: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            app_name: "vkboot".to_string(),
            enable_validation: true,
        }
    }
}

impl ContextSettings {
    pub fn validation_active(&self) -> bool {
        cfg!(debug_assertions) && self.enable_validation
    }
}

/// Holds a process-wide "one live instance" flag until dropped.
#[derive(Debug)]
pub(crate) struct LiveGuard(&'static AtomicBool);

impl LiveGuard {
    pub(crate) fn acquire(flag: &'static AtomicBool) -> Result<Self, BootstrapError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| BootstrapError::ContextAlreadyOpen)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Instance wrapper with automatic cleanup
pub struct Context {
    instance: ash::Instance,
    entry: Entry,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    validation: bool,
    _live: LiveGuard,
}

impl Context {
    /// Open the backend connection.
    ///
    /// # Arguments
    /// * `display` - Display the surfaces will be presented on; decides which
    ///   platform surface extensions get enabled
    /// * `settings` - Application name and validation toggle
    pub fn open(display: RawDisplayHandle, settings: &ContextSettings) -> Result<Arc<Self>> {
        let live = LiveGuard::acquire(&CONTEXT_LIVE)?;
        let validation = settings.validation_active();
        log::info!(
            "Opening Vulkan context: {} (validation {})",
            settings.app_name,
            if validation { "on" } else { "off" }
        );

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if validation {
            let layers = Self::layers_of(&entry)?;
            let wanted = VALIDATION_LAYER.to_string_lossy();
            if !layers.iter().any(|layer| *layer == wanted) {
                return Err(BootstrapError::MissingValidationLayer(wanted.into_owned()).into());
            }
        }

        let instance = Self::create_instance(&entry, display, &settings.app_name, validation)?;

        let mut context = Self {
            instance,
            entry,
            debug_utils: None,
            validation,
            _live: live,
        };

        // Instance is owned by `context` from here on, so a failure below
        // still destroys it.
        if validation {
            context.debug_utils = Some(context.setup_debug_messenger()?);
        }

        Ok(Arc::new(context))
    }

    fn create_instance(
        entry: &Entry,
        display: RawDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("No Engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        // Platform-specific surface extensions
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("Display server has no Vulkan surface support")?
            .to_vec();

        let layer_names = if validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so instance creation and destruction are reported too.
        let mut debug_info = debug_messenger_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(rejected("vkCreateInstance"))?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(&self.entry, &self.instance);

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&debug_messenger_info(), None)
        }
        .map_err(rejected("vkCreateDebugUtilsMessengerEXT"))?;

        Ok((debug_utils, messenger))
    }

    fn layers_of(entry: &Entry) -> Result<Vec<String>> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;
        Ok(layers.iter().map(|layer| raw_name(&layer.layer_name)).collect())
    }

    /// Instance layers installed on this machine.
    pub fn available_layers(&self) -> Result<Vec<String>> {
        Self::layers_of(&self.entry)
    }

    /// Layers to enable on the logical device, matching the instance.
    pub fn enabled_layer_names(&self) -> Vec<*const c_char> {
        if self.validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan context...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    pub fn classify(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

/// Prefixes the message and wraps warnings (yellow) and errors (bright red)
/// in ANSI color codes.
pub fn format_diagnostic(severity: DiagnosticSeverity, message: &str) -> String {
    match severity {
        DiagnosticSeverity::Error => format!("[Vulkan] \x1b[91m{}\x1b[0m", message),
        DiagnosticSeverity::Warning => format!("[Vulkan] \x1b[93m{}\x1b[0m", message),
        DiagnosticSeverity::Info => format!("[Vulkan] {}", message),
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    let severity = DiagnosticSeverity::classify(message_severity);
    let line = format_diagnostic(severity, &message);
    match severity {
        DiagnosticSeverity::Error => log::error!("{}", line),
        DiagnosticSeverity::Warning => log::warn!("{}", line),
        DiagnosticSeverity::Info => log::debug!("{}", line),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_live_guard_is_refused() {
        static FLAG: AtomicBool = AtomicBool::new(false);

        let first = LiveGuard::acquire(&FLAG).unwrap();
        assert!(matches!(
            LiveGuard::acquire(&FLAG),
            Err(BootstrapError::ContextAlreadyOpen)
        ));

        drop(first);
        assert!(LiveGuard::acquire(&FLAG).is_ok());
    }

    #[test]
    fn classifies_by_highest_severity() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;

        assert_eq!(DiagnosticSeverity::classify(Flags::VERBOSE), DiagnosticSeverity::Info);
        assert_eq!(DiagnosticSeverity::classify(Flags::INFO), DiagnosticSeverity::Info);
        assert_eq!(DiagnosticSeverity::classify(Flags::WARNING), DiagnosticSeverity::Warning);
        assert_eq!(DiagnosticSeverity::classify(Flags::ERROR), DiagnosticSeverity::Error);
        assert_eq!(
            DiagnosticSeverity::classify(Flags::WARNING | Flags::ERROR),
            DiagnosticSeverity::Error
        );
    }

    #[test]
    fn emphasis_only_for_warnings_and_errors() {
        assert_eq!(
            format_diagnostic(DiagnosticSeverity::Info, "loader ready"),
            "[Vulkan] loader ready"
        );
        assert_eq!(
            format_diagnostic(DiagnosticSeverity::Warning, "slow path"),
            "[Vulkan] \x1b[93mslow path\x1b[0m"
        );
        assert_eq!(
            format_diagnostic(DiagnosticSeverity::Error, "bad handle"),
            "[Vulkan] \x1b[91mbad handle\x1b[0m"
        );
    }

    #[test]
    fn validation_follows_build_profile() {
        let settings = ContextSettings {
            enable_validation: true,
            ..Default::default()
        };
        assert_eq!(settings.validation_active(), cfg!(debug_assertions));

        let settings = ContextSettings {
            enable_validation: false,
            ..Default::default()
        };
        assert!(!settings.validation_active());
    }
}
