// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Files are read as opaque bytes; the only
// check done here is that they decode into 32-bit words. Whether the words
// are a valid module is up to the driver.

use anyhow::{Context as _, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::Device;
use crate::error::{rejected, BootstrapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Read a SPIR-V binary from disk as 32-bit words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file: {:?}", path))?;

    // read_spv copies into aligned storage and fixes endianness
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
        BootstrapError::InvalidShader {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(words)
}

/// A compiled shader module, destroyed on drop.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    device: Arc<Device>,
}

impl ShaderModule {
    pub fn from_file(device: &Arc<Device>, stage: ShaderStage, path: &Path) -> Result<Self> {
        let code = read_spirv(path)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .map_err(rejected("vkCreateShaderModule"))
            .with_context(|| format!("Backend rejected {:?} shader {:?}", stage, path))?;

        log::debug!("Loaded {:?} shader from {:?}", stage, path);

        Ok(Self {
            module,
            stage,
            device: device.clone(),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vkboot-{}-{}", std::process::id(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn reads_little_endian_words() {
        let mut bytes = Vec::new();
        for word in [0x0723_0203u32, 0x0001_0000, 0xdead_beef] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let path = scratch_file("ok.spv", &bytes);

        let words = read_spirv(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000, 0xdead_beef]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_truncated_binary() {
        let path = scratch_file("truncated.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);

        let err = read_spirv(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::InvalidShader { .. })
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_names_the_path() {
        let path = std::env::temp_dir().join("vkboot-does-not-exist.spv");
        let err = read_spirv(&path).unwrap_err();
        assert!(err.to_string().contains("vkboot-does-not-exist.spv"));
    }

    #[test]
    fn stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
