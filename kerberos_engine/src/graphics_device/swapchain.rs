/// Swapchain trait and surface negotiation
///
/// `SurfaceCapabilities::negotiate` turns what the surface offers plus what the
/// application asks for into the concrete configuration a backend creates.
/// Backends report their surface as `SurfaceCapabilities` so that every
/// backend negotiates identically.

use std::any::Any;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graphics_device::{Semaphore, TextureFormat};
use crate::engine_warn;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized or collapsed window
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Presentation mode preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    /// No vertical sync, tearing allowed (IMMEDIATE)
    Immediate,
    /// Wait for vertical blank (FIFO, always available)
    #[default]
    Vsync,
    /// Replace the queued image instead of blocking (MAILBOX)
    TripleBuffer,
}

/// What the application asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub extent: Extent2D,
    /// Requested minimum number of images
    pub min_image_count: u32,
    pub present_mode: PresentMode,
}

/// What the surface offers
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means no upper bound
    pub max_image_count: u32,
    /// Set when the window system dictates the extent
    pub current_extent: Option<Extent2D>,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    /// Supported color formats, in the surface's preference order
    pub formats: Vec<TextureFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Concrete swapchain parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub image_count: u32,
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub present_mode: PresentMode,
}

const PREFERRED_FORMATS: [TextureFormat; 2] = [TextureFormat::B8G8R8A8_SRGB, TextureFormat::R8G8B8A8_SRGB];

impl SurfaceCapabilities {
    /// Pick image count, format, extent and present mode for `desc`
    ///
    /// - image count: `max(requested, surface min + 1, 2)`, clamped to the
    ///   surface max when there is one; fewer than 2 is an error
    /// - format: `B8G8R8A8_SRGB`, then `R8G8B8A8_SRGB`, then the first offered
    /// - extent: the surface's current extent when fixed, otherwise the
    ///   requested extent clamped to the surface limits
    /// - present mode: the requested one if offered, otherwise `Vsync`
    pub fn negotiate(&self, desc: &SwapchainDesc) -> Result<SwapchainConfig> {
        let mut image_count = desc.min_image_count.max(self.min_image_count + 1).max(2);
        if self.max_image_count > 0 {
            image_count = image_count.min(self.max_image_count);
        }
        if image_count < 2 {
            return Err(Error::InitializationFailed(format!(
                "surface allows at most {} swapchain image(s), at least 2 are required",
                self.max_image_count
            )));
        }

        let format = PREFERRED_FORMATS
            .iter()
            .copied()
            .find(|preferred| self.formats.contains(preferred))
            .or_else(|| self.formats.first().copied())
            .ok_or_else(|| Error::InitializationFailed("surface reports no usable color format".to_string()))?;

        let extent = match self.current_extent {
            Some(extent) => extent,
            None => Extent2D {
                width: desc.extent.width.clamp(self.min_extent.width, self.max_extent.width.max(self.min_extent.width)),
                height: desc
                    .extent
                    .height
                    .clamp(self.min_extent.height, self.max_extent.height.max(self.min_extent.height)),
            },
        };

        let present_mode = if desc.present_mode == PresentMode::Vsync || self.present_modes.contains(&desc.present_mode) {
            desc.present_mode
        } else {
            engine_warn!(
                "kerberos::swapchain",
                "Present mode {:?} not supported by the surface, falling back to Vsync",
                desc.present_mode
            );
            PresentMode::Vsync
        };

        Ok(SwapchainConfig { image_count, extent, format, present_mode })
    }
}

/// Result of acquiring the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// `signal` will be signaled when the image is ready to be rendered to
    Success { image_index: u32, suboptimal: bool },
    /// The surface changed; nothing was acquired and `signal` is untouched
    NeedsRecreate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// Not presented; the swapchain must be recreated
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreate(&self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

/// Result of recreating a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateStatus {
    Recreated,
    /// The surface has zero area; the old images were released and none created
    ZeroArea,
}

/// Swapchain for presenting rendered images to a window
///
/// Owned by the renderer's `SwapchainManager`, which implements the lifecycle
/// state machine on top of these operations.
pub trait Swapchain: Send + Sync {
    /// Acquire the next presentable image
    fn acquire_next_image(&mut self, signal: &dyn Semaphore, timeout_ns: u64) -> Result<AcquireStatus>;

    /// Queue `image_index` for presentation once `wait` is signaled
    fn present(&mut self, image_index: u32, wait: &dyn Semaphore) -> Result<PresentStatus>;

    /// Rebuild images for the new extent
    ///
    /// The caller guarantees the device is idle.
    fn recreate(&mut self, desc: &SwapchainDesc) -> Result<RecreateStatus>;

    fn image_count(&self) -> u32;

    fn extent(&self) -> Extent2D;

    fn format(&self) -> TextureFormat;

    /// Present mode actually in use after negotiation
    fn present_mode(&self) -> PresentMode;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
