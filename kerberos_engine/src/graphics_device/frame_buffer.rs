/// Framebuffer trait - an offscreen render target made of owned attachments
///
/// A framebuffer owns one or more color textures and an optional depth
/// texture, all with the same extent. Integer color attachments
/// (`R32_SINT`) are used for entity-id picking: cleared with
/// `clear_attachment` and read back with `read_pixel`. `resize` recreates
/// every attachment at a new extent.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{Texture, TextureDesc, TextureFormat, TextureUsage};

/// Upper bound on color attachments per framebuffer
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Descriptor for creating a framebuffer
#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    /// Debug label used in logs and validation output
    pub label: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// One texture is created per entry, in attachment order
    pub color_formats: Vec<TextureFormat>,
    /// Optional depth/stencil attachment
    pub depth_format: Option<TextureFormat>,
}

impl FramebufferDesc {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource(format!(
                "framebuffer '{}': extent {}x{} has zero area",
                self.label, self.width, self.height
            )));
        }
        if self.color_formats.is_empty() && self.depth_format.is_none() {
            return Err(Error::InvalidResource(format!(
                "framebuffer '{}': no attachments",
                self.label
            )));
        }
        if self.color_formats.len() > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidResource(format!(
                "framebuffer '{}': {} color attachments (max {})",
                self.label,
                self.color_formats.len(),
                MAX_COLOR_ATTACHMENTS
            )));
        }
        if let Some(format) = self.color_formats.iter().find(|f| f.is_depth()) {
            return Err(Error::InvalidResource(format!(
                "framebuffer '{}': {:?} is not a color format",
                self.label, format
            )));
        }
        if let Some(format) = self.depth_format {
            if !format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "framebuffer '{}': {:?} is not a depth format",
                    self.label, format
                )));
            }
        }
        Ok(())
    }

    /// Same attachments at `width` x `height`
    pub fn resized(&self, width: u32, height: u32) -> Result<Self> {
        let desc = Self { width, height, ..self.clone() };
        desc.validate()?;
        Ok(desc)
    }

    /// Texture descriptor of color attachment `index`
    pub fn color_texture_desc(&self, index: usize, format: TextureFormat) -> TextureDesc {
        TextureDesc::new(
            format!("{} (color {})", self.label, index),
            self.width,
            self.height,
            format,
            TextureUsage::SampledAndRenderTarget,
        )
    }

    /// Texture descriptor of the depth attachment
    pub fn depth_texture_desc(&self, format: TextureFormat) -> TextureDesc {
        TextureDesc::new(format!("{} (depth)", self.label), self.width, self.height, format, TextureUsage::DepthStencil)
    }

    /// Check that `attachment` is an integer color attachment and (x, y) is inside
    pub fn validate_int_access(&self, attachment: usize, x: u32, y: u32) -> Result<()> {
        let format = self.color_formats.get(attachment).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "framebuffer '{}': no color attachment {}",
                self.label, attachment
            ))
        })?;
        if !format.is_integer() {
            return Err(Error::InvalidOperation(format!(
                "framebuffer '{}': attachment {} is {:?}, not an integer format",
                self.label, attachment, format
            )));
        }
        if x >= self.width || y >= self.height {
            return Err(Error::InvalidOperation(format!(
                "framebuffer '{}': pixel ({}, {}) outside {}x{}",
                self.label, x, y, self.width, self.height
            )));
        }
        Ok(())
    }
}

/// The textures of a framebuffer at one extent
#[derive(Clone)]
pub struct FramebufferAttachments {
    pub desc: FramebufferDesc,
    pub colors: Vec<Arc<dyn Texture>>,
    pub depth: Option<Arc<dyn Texture>>,
}

impl FramebufferAttachments {
    /// Create every attachment `desc` names through `create`
    pub fn build(
        desc: FramebufferDesc,
        mut create: impl FnMut(TextureDesc) -> Result<Arc<dyn Texture>>,
    ) -> Result<Self> {
        desc.validate()?;
        let colors = desc
            .color_formats
            .iter()
            .enumerate()
            .map(|(index, &format)| create(desc.color_texture_desc(index, format)))
            .collect::<Result<Vec<_>>>()?;
        let depth = match desc.depth_format {
            Some(format) => Some(create(desc.depth_texture_desc(format))?),
            None => None,
        };
        Ok(Self { desc, colors, depth })
    }
}

/// Offscreen render target
///
/// Created via `GraphicsDevice::create_framebuffer()`. Attachments are owned
/// by the framebuffer and can be sampled once rendering has ended.
pub trait Framebuffer: Send + Sync {
    /// Current descriptor; the extent follows `resize`
    fn desc(&self) -> FramebufferDesc;

    /// Descriptor and textures as one consistent snapshot
    fn attachments(&self) -> FramebufferAttachments;

    /// Color attachment texture by index
    fn color_attachment(&self, index: usize) -> Option<Arc<dyn Texture>> {
        self.attachments().colors.get(index).cloned()
    }

    /// Depth attachment texture
    fn depth_attachment(&self) -> Option<Arc<dyn Texture>> {
        self.attachments().depth
    }

    /// Recreate every attachment at `width` x `height`
    ///
    /// Contents are lost. A zero extent is rejected with
    /// `Error::InvalidResource`; the current extent is a no-op. Command
    /// lists that already recorded the old attachments keep them alive.
    fn resize(&self, width: u32, height: u32) -> Result<()>;

    /// Read one texel of an integer color attachment
    ///
    /// Blocking: waits until all submitted GPU work has finished.
    fn read_pixel(&self, attachment: usize, x: u32, y: u32) -> Result<i32>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "frame_buffer_tests.rs"]
mod tests;
