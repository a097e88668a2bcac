// Bootstrap failures
//
// Everything here is a runtime failure: the environment can't support the
// configuration we asked for, or the driver rejected a call. Broken
// preconditions in our own code panic instead.

use ash::vk;
use std::panic::Location;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("a Vulkan context is already open in this process")]
    ContextAlreadyOpen,

    #[error("validation layer {0} is not available")]
    MissingValidationLayer(String),

    #[error("no Vulkan-capable GPU found")]
    NoPhysicalDevice,

    #[error("GPU does not support required feature `{0}`")]
    MissingFeature(&'static str),

    #[error("GPU does not support required device extension {0}")]
    MissingExtension(String),

    #[error("no queue family supports graphics work")]
    NoGraphicsQueue,

    #[error("no queue family can present to the surface")]
    NoPresentQueue,

    #[error("surface exposes no formats")]
    NoSurfaceFormats,

    #[error("surface exposes no present modes")]
    NoPresentModes,

    #[error("shader {path} is not SPIR-V: {reason}")]
    InvalidShader { path: String, reason: String },

    #[error("{op} failed with {result:?} at {location}")]
    Backend {
        op: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },
}

/// Maps a failed Vulkan call to [`BootstrapError::Backend`], recording where
/// the call was made.
///
/// ```ignore
/// let view = unsafe { device.create_image_view(&info, None) }
///     .map_err(rejected("vkCreateImageView"))?;
/// ```
#[track_caller]
pub fn rejected(op: &'static str) -> impl FnOnce(vk::Result) -> BootstrapError {
    let location = Location::caller();
    move |result| BootstrapError::Backend {
        op,
        result,
        location,
    }
}
