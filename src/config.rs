// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::backend::{ContextSettings, DeviceFeature, DeviceRequirements, WindowData};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub shaders: ShaderConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkboot".to_string(),
            width: 1600,
            height: 900,
            fullscreen: false,
        }
    }
}

/// Compiled SPIR-V shader paths
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// What the GPU must support
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub extensions: Vec<String>,
    pub features: Vec<DeviceFeature>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["VK_KHR_swapchain".to_string()],
            features: vec![DeviceFeature::SamplerAnisotropy],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vkboot.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            app_name: self.window.title.clone(),
            enable_validation: self.debug.validation_layers,
        }
    }

    pub fn window_data(&self) -> WindowData {
        WindowData {
            width: self.window.width,
            height: self.window.height,
            fullscreen: self.window.fullscreen,
        }
    }

    /// Device requirements as Vulkan expects them
    pub fn device_requirements(&self) -> Result<DeviceRequirements> {
        let extensions = self
            .device
            .extensions
            .iter()
            .map(|name| {
                CString::new(name.as_str())
                    .with_context(|| format!("Invalid device extension name: {:?}", name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DeviceRequirements {
            extensions,
            features: self.device.features.clone(),
        })
    }
}
