/// Texture trait, texture format and texture descriptor

use std::any::Any;

use crate::error::{Error, Result};

/// Texture pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R32_SINT,
    R32G32B32A32_SFLOAT,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R32G32B32A32_SFLOAT => 16,
            _ => 4,
        }
    }

    /// Depth (or depth/stencil) format
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT)
    }

    /// Integer color format (cleared and read back as i32, never blended)
    pub fn is_integer(&self) -> bool {
        matches!(self, TextureFormat::R32_SINT)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT)
    }
}

/// Texture usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Texture can be sampled in shaders
    Sampled,
    /// Texture can be used as render target
    RenderTarget,
    /// Texture can be used for both
    SampledAndRenderTarget,
    /// Texture can be used as depth/stencil attachment
    DepthStencil,
}

impl TextureUsage {
    pub fn is_sampled(&self) -> bool {
        matches!(self, TextureUsage::Sampled | TextureUsage::SampledAndRenderTarget)
    }

    pub fn is_color_target(&self) -> bool {
        matches!(self, TextureUsage::RenderTarget | TextureUsage::SampledAndRenderTarget)
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label used in logs and validation output
    pub label: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Usage
    pub usage: TextureUsage,
}

impl TextureDesc {
    pub fn new(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self { label: label.into(), width, height, format, usage }
    }

    /// Exact number of bytes a full upload must carry
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }

    /// Reject zero extents and format/usage combinations no backend supports
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource(format!(
                "texture '{}': extent {}x{} has zero area",
                self.label, self.width, self.height
            )));
        }
        let depth_usage = self.usage == TextureUsage::DepthStencil;
        if self.format.is_depth() != depth_usage {
            return Err(Error::InvalidResource(format!(
                "texture '{}': format {:?} cannot be used as {:?}",
                self.label, self.format, self.usage
            )));
        }
        Ok(())
    }

    /// Check an upload against the fixed capacity
    ///
    /// The upload must cover the whole texture: partial uploads are rejected
    /// so that a wrongly sized source never lands half-written. Only sampled
    /// textures accept uploads.
    pub fn validate_upload(&self, len: usize) -> Result<()> {
        if self.format.is_depth() {
            return Err(Error::InvalidResource(format!(
                "texture '{}': depth textures cannot be uploaded",
                self.label
            )));
        }
        // Uploads land in the sampled layout
        if !self.usage.is_sampled() {
            return Err(Error::InvalidOperation(format!(
                "texture '{}': {:?} textures cannot be uploaded",
                self.label, self.usage
            )));
        }
        if len as u64 != self.byte_size() {
            return Err(Error::InvalidResource(format!(
                "texture '{}': expected {} bytes, got {}",
                self.label,
                self.byte_size(),
                len
            )));
        }
        Ok(())
    }
}

/// Texture resource trait
///
/// Implemented by backend-specific texture types.
/// The texture is destroyed when the last `Arc` is dropped.
pub trait Texture: Send + Sync {
    /// Creation descriptor (never changes)
    fn desc(&self) -> &TextureDesc;

    /// Replace the full texel contents
    ///
    /// `data.len()` must equal `desc().byte_size()`; otherwise nothing is written.
    fn set_data(&self, data: &[u8]) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
