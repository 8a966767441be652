/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Presentation only: acquire, present and recreate. Rendering into an image
/// goes through `CommandList::begin_rendering` with `RenderTarget::Swapchain`.
/// Semaphores belong to the caller's frame slots, not to the swapchain.

use ash::vk;
use kerberos_engine::kerberos::render::{
    AcquireStatus, Extent2D, PresentMode, PresentStatus, RecreateStatus, Semaphore, SurfaceCapabilities, Swapchain,
    SwapchainConfig, SwapchainDesc, TextureFormat,
};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{present_mode_to_vk, texture_format_to_vk, vk_to_present_mode, vk_to_texture_format};
use crate::vulkan_sync::vk_semaphore;

/// Surface limits as the engine-side negotiation sees them
///
/// Formats the engine has no name for are skipped. FIFO is always offered.
pub(crate) fn surface_capabilities(
    caps: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    present_modes: &[vk::PresentModeKHR],
) -> SurfaceCapabilities {
    // u32::MAX means the window system lets the swapchain pick the extent
    let current_extent = if caps.current_extent.width == u32::MAX {
        None
    } else {
        Some(Extent2D::new(caps.current_extent.width, caps.current_extent.height))
    };

    let mut modes: Vec<PresentMode> = present_modes.iter().filter_map(|&mode| vk_to_present_mode(mode)).collect();
    if !modes.contains(&PresentMode::Vsync) {
        modes.push(PresentMode::Vsync);
    }

    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent,
        min_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
        max_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
        formats: formats.iter().filter_map(|f| vk_to_texture_format(f.format)).collect(),
        present_modes: modes,
    }
}

/// Vulkan swapchain implementation
pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl VulkanSwapchain {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SwapchainDesc) -> Result<Self> {
        if desc.extent.is_zero_area() {
            engine_error!(
                LOG_SOURCE,
                "Cannot create swapchain with zero-area extent {}x{}",
                desc.extent.width,
                desc.extent.height
            );
            return Err(Error::InvalidResource(format!(
                "swapchain extent {}x{} has zero area",
                desc.extent.width, desc.extent.height
            )));
        }

        let mut swapchain = Self {
            ctx,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            config: SwapchainConfig {
                image_count: 0,
                extent: desc.extent,
                format: TextureFormat::B8G8R8A8_SRGB,
                present_mode: desc.present_mode,
            },
        };
        match swapchain.build(desc)? {
            RecreateStatus::Recreated => Ok(swapchain),
            RecreateStatus::ZeroArea => Err(Error::InvalidResource(
                "surface has zero area, swapchain cannot be created yet".to_string(),
            )),
        }
    }

    /// Swapchain image handle
    pub(crate) fn image(&self, index: u32) -> Result<vk::Image> {
        self.images.get(index as usize).copied().ok_or_else(|| {
            Error::InvalidOperation(format!("swapchain image index {} out of range (count: {})", index, self.images.len()))
        })
    }

    pub(crate) fn view(&self, index: u32) -> Result<vk::ImageView> {
        self.views.get(index as usize).copied().ok_or_else(|| {
            Error::InvalidOperation(format!("swapchain image index {} out of range (count: {})", index, self.views.len()))
        })
    }

    pub(crate) fn vk_format(&self) -> vk::Format {
        texture_format_to_vk(self.config.format)
    }

    fn destroy_images(&mut self) {
        unsafe {
            for &view in &self.views {
                self.ctx.device.destroy_image_view(view, None);
            }
        }
        self.views.clear();
        self.images.clear();
    }

    /// Negotiate with the surface and (re)create images, retiring the old swapchain
    fn build(&mut self, desc: &SwapchainDesc) -> Result<RecreateStatus> {
        let ctx = self.ctx.clone();
        unsafe {
            let caps = ctx
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;
            let surface_formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;
            let present_modes = ctx
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to query present modes: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get present modes: {:?}", e))
                })?;

            let capabilities = surface_capabilities(&caps, &surface_formats, &present_modes);
            let config = capabilities.negotiate(desc)?;

            self.destroy_images();
            let old_swapchain = self.swapchain;

            if config.extent.is_zero_area() {
                if old_swapchain != vk::SwapchainKHR::null() {
                    ctx.swapchain_loader.destroy_swapchain(old_swapchain, None);
                    self.swapchain = vk::SwapchainKHR::null();
                }
                self.config.extent = config.extent;
                engine_debug!(LOG_SOURCE, "Surface has zero area, swapchain released");
                return Ok(RecreateStatus::ZeroArea);
            }

            let format = texture_format_to_vk(config.format);
            let color_space = surface_formats
                .iter()
                .find(|f| f.format == format)
                .map(|f| f.color_space)
                .unwrap_or(vk::ColorSpaceKHR::SRGB_NONLINEAR);

            let queue_families = [ctx.graphics_queue_family, ctx.present_queue_family];
            let mut create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(ctx.surface)
                .min_image_count(config.image_count)
                .image_format(format)
                .image_color_space(color_space)
                .image_extent(vk::Extent2D { width: config.extent.width, height: config.extent.height })
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                .pre_transform(caps.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode_to_vk(config.present_mode))
                .clipped(true)
                .old_swapchain(old_swapchain);
            create_info = if ctx.graphics_queue_family != ctx.present_queue_family {
                create_info.image_sharing_mode(vk::SharingMode::CONCURRENT).queue_family_indices(&queue_families)
            } else {
                create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            };

            let created = ctx.swapchain_loader.create_swapchain(&create_info, None);
            if old_swapchain != vk::SwapchainKHR::null() {
                ctx.swapchain_loader.destroy_swapchain(old_swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.swapchain = created.map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create swapchain: {:?}", e);
                Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
            })?;

            self.images = ctx.swapchain_loader.get_swapchain_images(self.swapchain).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to get swapchain images: {:?}", e);
                Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
            })?;

            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = ctx.device.create_image_view(&view_info, None).map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to create swapchain image view: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create image view: {:?}", e))
                })?;
                self.views.push(view);
            }

            self.config = SwapchainConfig { image_count: self.images.len() as u32, ..config };
            engine_info!(
                LOG_SOURCE,
                "Swapchain {}x{} with {} images ({:?}, {:?})",
                config.extent.width,
                config.extent.height,
                self.images.len(),
                config.format,
                config.present_mode
            );
            Ok(RecreateStatus::Recreated)
        }
    }
}

impl Swapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self, signal: &dyn Semaphore, timeout_ns: u64) -> Result<AcquireStatus> {
        if self.swapchain == vk::SwapchainKHR::null() {
            return Ok(AcquireStatus::NeedsRecreate);
        }
        let semaphore = vk_semaphore(signal)?;
        unsafe {
            match self.ctx.swapchain_loader.acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null()) {
                Ok((image_index, suboptimal)) => Ok(AcquireStatus::Success { image_index, suboptimal }),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    engine_debug!(LOG_SOURCE, "Swapchain out of date during acquire");
                    Ok(AcquireStatus::NeedsRecreate)
                }
                Err(vk::Result::ERROR_DEVICE_LOST) => {
                    engine_error!(LOG_SOURCE, "Device lost during acquire");
                    Err(Error::DeviceLost("device lost during acquire".to_string()))
                }
                Err(e) => Err(engine_err!(LOG_SOURCE, "Failed to acquire next swapchain image: {:?}", e)),
            }
        }
    }

    fn present(&mut self, image_index: u32, wait: &dyn Semaphore) -> Result<PresentStatus> {
        if self.swapchain == vk::SwapchainKHR::null() {
            return Ok(PresentStatus::OutOfDate);
        }
        self.image(image_index)?;
        let wait_semaphores = [vk_semaphore(wait)?];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let _queue = self.ctx.lock_queue()?;
        unsafe {
            match self.ctx.swapchain_loader.queue_present(self.ctx.present_queue, &present_info) {
                Ok(false) => Ok(PresentStatus::Presented),
                Ok(true) => Ok(PresentStatus::Suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    engine_debug!(LOG_SOURCE, "Swapchain out of date during present");
                    Ok(PresentStatus::OutOfDate)
                }
                Err(vk::Result::ERROR_DEVICE_LOST) => {
                    engine_error!(LOG_SOURCE, "Device lost during present");
                    Err(Error::DeviceLost("device lost during present".to_string()))
                }
                Err(e) => Err(engine_err!(LOG_SOURCE, "Failed to present swapchain image: {:?}", e)),
            }
        }
    }

    fn recreate(&mut self, desc: &SwapchainDesc) -> Result<RecreateStatus> {
        if desc.extent.is_zero_area() {
            self.destroy_images();
            if self.swapchain != vk::SwapchainKHR::null() {
                unsafe {
                    self.ctx.swapchain_loader.destroy_swapchain(self.swapchain, None);
                }
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.config.extent = desc.extent;
            engine_debug!(LOG_SOURCE, "Window has zero area, swapchain released");
            return Ok(RecreateStatus::ZeroArea);
        }
        let status = self.build(desc)?;
        if status == RecreateStatus::Recreated && self.config.present_mode != desc.present_mode {
            engine_warn!(LOG_SOURCE, "Recreated with {:?} instead of {:?}", self.config.present_mode, desc.present_mode);
        }
        Ok(status)
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

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        // In-flight presents may still reference the images
        if let Err(e) = self.ctx.wait_idle() {
            engine_warn!(LOG_SOURCE, "Failed to wait idle before destroying swapchain: {}", e);
        }
        self.destroy_images();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.ctx.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

/// Downcast an engine swapchain; swapchains from another backend are rejected
pub(crate) fn vk_swapchain(swapchain: &dyn Swapchain) -> Result<&VulkanSwapchain> {
    swapchain
        .as_any()
        .downcast_ref::<VulkanSwapchain>()
        .ok_or_else(|| Error::InvalidOperation("swapchain does not belong to the Vulkan backend".to_string()))
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
