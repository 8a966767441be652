/// Immediate swapchain over a `HeadlessSurface`

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireStatus, Extent2D, PresentMode, PresentStatus, RecreateStatus, Semaphore, Swapchain, SwapchainConfig,
    SwapchainDesc, TextureDesc, TextureFormat, TextureUsage,
};
use crate::immediate::{DeviceEvent, DeviceShared, HeadlessSurface, ImmediateSemaphore, TexelStorage};

/// One presentable image; counted by the probe while alive
struct SwapchainImage {
    storage: Arc<TexelStorage>,
    acquired: bool,
    shared: Arc<DeviceShared>,
}

impl Drop for SwapchainImage {
    fn drop(&mut self) {
        self.shared.probe.image_destroyed();
    }
}

pub struct ImmediateSwapchain {
    shared: Arc<DeviceShared>,
    surface: Arc<HeadlessSurface>,
    config: SwapchainConfig,
    images: Vec<SwapchainImage>,
    next_image: u32,
}

impl ImmediateSwapchain {
    pub(crate) fn new(shared: Arc<DeviceShared>, surface: Arc<HeadlessSurface>, desc: &SwapchainDesc) -> Result<Self> {
        let config = negotiate(&surface, desc)?;
        if config.extent.is_zero_area() {
            return Err(Error::InvalidResource("surface has zero area".to_string()));
        }
        let mut swapchain = Self { shared, surface, config, images: Vec::new(), next_image: 0 };
        swapchain.build_images();
        swapchain.shared.probe.record(DeviceEvent::SwapchainCreated {
            image_count: config.image_count,
            extent: config.extent,
        });
        Ok(swapchain)
    }

    /// Texel storage of image `image_index`
    pub fn image(&self, image_index: u32) -> Result<&Arc<TexelStorage>> {
        self.images
            .get(image_index as usize)
            .map(|image| &image.storage)
            .ok_or_else(|| Error::InvalidOperation(format!("swapchain has no image {}", image_index)))
    }

    fn build_images(&mut self) {
        self.images.clear();
        self.next_image = 0;
        for index in 0..self.config.image_count {
            let desc = TextureDesc::new(
                format!("swapchain image {}", index),
                self.config.extent.width,
                self.config.extent.height,
                self.config.format,
                TextureUsage::RenderTarget,
            );
            self.shared.probe.image_created();
            self.images.push(SwapchainImage {
                storage: Arc::new(TexelStorage::unaccounted(desc)),
                acquired: false,
                shared: self.shared.clone(),
            });
        }
    }

    /// The window system no longer matches the images
    fn is_out_of_date(&self) -> bool {
        let extent = self.surface.extent();
        extent.is_zero_area() || (!self.surface.follows_swapchain() && extent != self.config.extent)
    }
}

fn negotiate(surface: &HeadlessSurface, desc: &SwapchainDesc) -> Result<SwapchainConfig> {
    if surface.follows_swapchain() {
        surface.resize(desc.extent.width, desc.extent.height);
    }
    surface.capabilities().negotiate(desc)
}

impl Swapchain for ImmediateSwapchain {
    fn acquire_next_image(&mut self, signal: &dyn Semaphore, _timeout_ns: u64) -> Result<AcquireStatus> {
        if self.surface.take_acquire_out_of_date() || self.is_out_of_date() {
            self.shared.probe.record(DeviceEvent::AcquireOutOfDate);
            return Ok(AcquireStatus::NeedsRecreate);
        }

        let count = self.images.len() as u32;
        let image_index = (0..count)
            .map(|step| (self.next_image + step) % count)
            .find(|&index| !self.images[index as usize].acquired)
            .ok_or_else(|| Error::InvalidOperation("every swapchain image is already acquired".to_string()))?;

        ImmediateSemaphore::downcast(signal)?.signal()?;
        self.images[image_index as usize].acquired = true;
        self.next_image = (image_index + 1) % count;
        self.shared.probe.record(DeviceEvent::ImageAcquired { image_index });
        Ok(AcquireStatus::Success { image_index, suboptimal: false })
    }

    fn present(&mut self, image_index: u32, wait: &dyn Semaphore) -> Result<PresentStatus> {
        let image = self
            .images
            .get_mut(image_index as usize)
            .filter(|image| image.acquired)
            .ok_or_else(|| Error::InvalidOperation(format!("present of image {} that was not acquired", image_index)))?;
        ImmediateSemaphore::downcast(wait)?.consume()?;
        image.acquired = false;

        let status = if self.surface.take_present_out_of_date() || self.is_out_of_date() {
            PresentStatus::OutOfDate
        } else if self.surface.take_present_suboptimal() {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Presented
        };
        self.shared.probe.record(DeviceEvent::ImagePresented { image_index, status });
        Ok(status)
    }

    fn recreate(&mut self, desc: &SwapchainDesc) -> Result<RecreateStatus> {
        let config = negotiate(&self.surface, desc)?;
        if config.extent.is_zero_area() {
            self.images.clear();
            return Ok(RecreateStatus::ZeroArea);
        }
        self.config = config;
        self.build_images();
        self.shared.probe.record(DeviceEvent::SwapchainRecreated {
            image_count: config.image_count,
            extent: config.extent,
        });
        Ok(RecreateStatus::Recreated)
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn extent(&self) -> Extent2D {
        self.config.extent
    }

    fn format(&self) -> TextureFormat {
        self.config.format
    }

    fn present_mode(&self) -> PresentMode {
        self.config.present_mode
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "immediate_swapchain_tests.rs"]
mod tests;
