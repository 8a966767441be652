/// Swapchain lifecycle state machine
///
/// ```text
/// Uninitialized -> Created -> (Acquiring <-> Presenting) -> Invalidated -> Created
///                                  any state -> Suspended (zero-area surface)
/// ```
///
/// Resize notifications never touch the live swapchain: they only move the
/// manager to `Invalidated` (or `Suspended`), and the renderer recreates at
/// the next frame boundary.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireStatus, Extent2D, GraphicsDevice, PresentStatus, RecreateStatus, Semaphore, Swapchain,
    SwapchainDesc, Texture, TextureDesc, TextureFormat, TextureUsage,
};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "kerberos::swapchain";

/// Format of the depth target created alongside the swapchain
pub const SWAPCHAIN_DEPTH_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;

/// Lifecycle state of the managed swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Created,
    /// An image is held by the current frame
    Acquiring { image_index: u32 },
    Presenting,
    /// Must be recreated before the next acquire
    Invalidated,
    /// Zero-area surface; nothing is acquired until a nonzero resize
    Suspended,
}

pub struct SwapchainManager {
    swapchain: Option<Box<dyn Swapchain>>,
    desc: SwapchainDesc,
    state: SwapchainState,
    depth_enabled: bool,
    depth_target: Option<Arc<dyn Texture>>,
    /// Resize received while an image was held
    resize_pending: bool,
    recreate_count: u64,
    discarded_images: u64,
}

impl SwapchainManager {
    pub fn new(desc: SwapchainDesc, depth_enabled: bool) -> Self {
        Self {
            swapchain: None,
            desc,
            state: SwapchainState::Uninitialized,
            depth_enabled,
            depth_target: None,
            resize_pending: false,
            recreate_count: 0,
            discarded_images: 0,
        }
    }

    /// Create the swapchain, or enter `Suspended` for a zero-area extent
    pub fn create(&mut self, device: &dyn GraphicsDevice) -> Result<()> {
        if self.swapchain.is_some() {
            return Err(Error::InvalidOperation("swapchain already created".to_string()));
        }
        if self.desc.extent.is_zero_area() {
            engine_info!(SOURCE, "Surface has zero area, swapchain creation deferred");
            self.state = SwapchainState::Suspended;
            return Ok(());
        }

        let swapchain = device.create_swapchain(&self.desc)?;
        self.depth_target = self.build_depth_target(device, swapchain.extent())?;
        engine_info!(
            SOURCE,
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            swapchain.image_count(),
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.format(),
            swapchain.present_mode()
        );
        self.swapchain = Some(swapchain);
        self.state = SwapchainState::Created;
        Ok(())
    }

    /// Record a new surface extent; applied at the next frame boundary
    pub fn notify_resized(&mut self, extent: Extent2D) {
        let healthy = matches!(
            self.state,
            SwapchainState::Created | SwapchainState::Acquiring { .. } | SwapchainState::Presenting
        );
        if healthy && extent == self.desc.extent && !self.resize_pending {
            engine_debug!(SOURCE, "Resize to {}x{} matches the live swapchain", extent.width, extent.height);
            return;
        }

        self.desc.extent = extent;
        if let SwapchainState::Acquiring { .. } = self.state {
            // The frame holding the image finishes first
            self.resize_pending = true;
            return;
        }
        self.state = if extent.is_zero_area() {
            engine_info!(SOURCE, "Surface has zero area, rendering suspended");
            SwapchainState::Suspended
        } else {
            SwapchainState::Invalidated
        };
    }

    /// Acquire the next image, signaling `signal` when it is ready
    pub fn acquire_next(&mut self, signal: &dyn Semaphore, timeout_ns: u64) -> Result<AcquireStatus> {
        match self.state {
            SwapchainState::Created | SwapchainState::Presenting => {}
            state => {
                return Err(Error::InvalidOperation(format!("cannot acquire in state {:?}", state)));
            }
        }
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation("no swapchain".to_string()))?;

        let status = swapchain.acquire_next_image(signal, timeout_ns)?;
        match status {
            AcquireStatus::Success { image_index, suboptimal } => {
                if suboptimal {
                    engine_debug!(SOURCE, "Acquired image {} from a suboptimal swapchain", image_index);
                }
                self.state = SwapchainState::Acquiring { image_index };
            }
            AcquireStatus::NeedsRecreate => {
                engine_debug!(SOURCE, "Acquire reported out-of-date swapchain");
                self.state = SwapchainState::Invalidated;
            }
        }
        Ok(status)
    }

    /// Present the held image once `wait` is signaled
    pub fn present(&mut self, wait: &dyn Semaphore) -> Result<PresentStatus> {
        let image_index = self
            .acquired_image()
            .ok_or_else(|| Error::InvalidOperation(format!("cannot present in state {:?}", self.state)))?;
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation("no swapchain".to_string()))?;

        let status = swapchain.present(image_index, wait)?;
        self.state = SwapchainState::Presenting;
        if status.needs_recreate() {
            engine_debug!(SOURCE, "Present returned {:?}, swapchain invalidated", status);
            self.state = SwapchainState::Invalidated;
        }
        self.apply_pending_resize();
        Ok(status)
    }

    /// Give up the held image without presenting it
    ///
    /// Returns the discarded index. The swapchain must be recreated before
    /// the next acquire.
    pub fn discard_acquired(&mut self) -> Option<u32> {
        let image_index = self.acquired_image()?;
        self.discarded_images += 1;
        engine_warn!(SOURCE, "Discarding acquired image {} without presenting", image_index);
        self.state = SwapchainState::Invalidated;
        self.apply_pending_resize();
        Some(image_index)
    }

    /// Rebuild the swapchain and depth target at the current extent
    ///
    /// Waits for the device to go idle first. Returns `false` (and enters
    /// `Suspended`) when the surface has zero area.
    pub fn recreate(&mut self, device: &dyn GraphicsDevice) -> Result<bool> {
        device.wait_idle()?;
        self.discard_acquired();
        self.resize_pending = false;

        if self.desc.extent.is_zero_area() {
            self.state = SwapchainState::Suspended;
            return Ok(false);
        }

        let swapchain = match self.swapchain.as_mut() {
            Some(swapchain) => swapchain,
            None => {
                self.create(device)?;
                return Ok(self.state == SwapchainState::Created);
            }
        };

        match swapchain.recreate(&self.desc)? {
            RecreateStatus::Recreated => {
                let extent = swapchain.extent();
                let image_count = swapchain.image_count();
                self.depth_target = None;
                self.depth_target = self.build_depth_target(device, extent)?;
                self.recreate_count += 1;
                self.state = SwapchainState::Created;
                engine_info!(
                    SOURCE,
                    "Swapchain recreated: {} images, {}x{}",
                    image_count,
                    extent.width,
                    extent.height
                );
                Ok(true)
            }
            RecreateStatus::ZeroArea => {
                self.depth_target = None;
                self.state = SwapchainState::Suspended;
                engine_info!(SOURCE, "Surface has zero area, rendering suspended");
                Ok(false)
            }
        }
    }

    /// Release the swapchain and depth target
    pub fn destroy(&mut self) {
        self.depth_target = None;
        self.swapchain = None;
        self.state = SwapchainState::Uninitialized;
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    pub fn needs_recreate(&self) -> bool {
        self.state == SwapchainState::Invalidated
    }

    pub fn is_suspended(&self) -> bool {
        self.state == SwapchainState::Suspended
    }

    pub fn acquired_image(&self) -> Option<u32> {
        match self.state {
            SwapchainState::Acquiring { image_index } => Some(image_index),
            _ => None,
        }
    }

    pub fn swapchain(&self) -> Option<&dyn Swapchain> {
        self.swapchain.as_deref()
    }

    pub fn depth_target(&self) -> Option<&Arc<dyn Texture>> {
        self.depth_target.as_ref()
    }

    /// Requested extent (last resize)
    pub fn requested_extent(&self) -> Extent2D {
        self.desc.extent
    }

    pub fn recreate_count(&self) -> u64 {
        self.recreate_count
    }

    pub fn discarded_images(&self) -> u64 {
        self.discarded_images
    }

    fn apply_pending_resize(&mut self) {
        if !self.resize_pending {
            return;
        }
        self.resize_pending = false;
        self.state = if self.desc.extent.is_zero_area() {
            SwapchainState::Suspended
        } else {
            SwapchainState::Invalidated
        };
    }

    fn build_depth_target(&self, device: &dyn GraphicsDevice, extent: Extent2D) -> Result<Option<Arc<dyn Texture>>> {
        if !self.depth_enabled {
            return Ok(None);
        }
        let desc = TextureDesc::new(
            "swapchain depth",
            extent.width,
            extent.height,
            SWAPCHAIN_DEPTH_FORMAT,
            TextureUsage::DepthStencil,
        );
        Ok(Some(device.create_texture(desc)?))
    }
}

#[cfg(test)]
#[path = "swapchain_manager_tests.rs"]
mod tests;
