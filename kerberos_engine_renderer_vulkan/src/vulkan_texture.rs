/// Texture - Vulkan implementation of the Texture trait
///
/// Images are device-local. Each image tracks the layout it will be in once
/// everything recorded so far has executed; command lists read and update
/// that layout as they record transitions. Submission order on the single
/// graphics queue matches recording order, so the tracked layout is exact.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::{AllocationError, MemoryLocation};
use kerberos_engine::kerberos::render::{Texture, TextureDesc};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_err, engine_error, engine_warn};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::RawBuffer;
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{aspect_mask, initial_layout, layout_sync, texture_format_to_vk, texture_usage_to_vk};
use crate::vulkan_upload::PendingUpload;

/// Record a layout transition of a whole single-mip image
pub(crate) unsafe fn image_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access) = layout_sync(old_layout);
    let (dst_stage, dst_access) = layout_sync(new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    device.cmd_pipeline_barrier(
        command_buffer,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Image handle and its tracked layout
pub(crate) struct ImageState {
    pub(crate) image: vk::Image,
    pub(crate) aspect: vk::ImageAspectFlags,
    layout: Mutex<vk::ImageLayout>,
}

impl ImageState {
    pub(crate) fn layout(&self) -> vk::ImageLayout {
        *self.layout.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a transition to `new_layout` and remember it
    ///
    /// Read-only to read-only needs no barrier; anything that writes does.
    pub(crate) unsafe fn transition(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
    ) {
        let mut layout = self.layout.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let read_only = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        if *layout == read_only && new_layout == read_only {
            return;
        }
        image_barrier(device, command_buffer, self.image, self.aspect, *layout, new_layout);
        *layout = new_layout;
    }
}

/// Vulkan texture implementation
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    desc: TextureDesc,
    pub(crate) state: Arc<ImageState>,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl VulkanTexture {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: TextureDesc) -> Result<Self> {
        desc.validate().map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let format = texture_format_to_vk(desc.format);
        let aspect = aspect_mask(desc.format);

        unsafe {
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(texture_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create image for texture '{}': {:?}", desc.label, e);
                match e {
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                        Error::OutOfMemory
                    }
                    _ => Error::InvalidResource(format!("texture '{}': image creation failed: {:?}", desc.label, e)),
                }
            })?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = match ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name: &desc.label,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }),
                Err(_) => {
                    ctx.device.destroy_image(image, None);
                    return Err(engine_err!(LOG_SOURCE, "Allocator lock poisoned"));
                }
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(AllocationError::OutOfMemory) => {
                    ctx.device.destroy_image(image, None);
                    engine_error!(LOG_SOURCE, "Out of GPU memory allocating texture '{}'", desc.label);
                    return Err(Error::OutOfMemory);
                }
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(engine_err!(LOG_SOURCE, "Failed to allocate memory for texture '{}': {:?}", desc.label, e));
                }
            };

            // From here the texture owns image and memory; its Drop cleans up on failure
            let mut texture = Self {
                ctx: ctx.clone(),
                desc,
                state: Arc::new(ImageState { image, aspect, layout: Mutex::new(vk::ImageLayout::UNDEFINED) }),
                view: vk::ImageView::null(),
                allocation: Some(allocation),
            };

            if let Some(allocation) = &texture.allocation {
                ctx.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to bind memory for texture '{}': {:?}", texture.desc.label, e))?;
            }

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
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            texture.view = ctx.device.create_image_view(&view_info, None).map_err(|e| {
                engine_err!(LOG_SOURCE, "Failed to create image view for texture '{}': {:?}", texture.desc.label, e)
            })?;

            // Leave UNDEFINED now so every later barrier has a real source layout
            let target_layout = initial_layout(texture.desc.usage);
            let state = texture.state.clone();
            ctx.one_shot(|device, command_buffer| {
                state.transition(device, command_buffer, target_layout);
            })?;

            Ok(texture)
        }
    }
}

impl Texture for VulkanTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn set_data(&self, data: &[u8]) -> Result<()> {
        self.desc.validate_upload(data.len()).map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let mut staging = RawBuffer::new(
            &self.ctx,
            &format!("{} (staging)", self.desc.label),
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(e) = staging.write(0, data) {
            staging.release(&self.ctx);
            return Err(e);
        }

        let upload = PendingUpload::image(self.state.clone(), self.desc.width, self.desc.height, staging);
        match self.ctx.pending_uploads.lock() {
            Ok(mut pending) => {
                pending.push(upload);
                Ok(())
            }
            Err(_) => {
                upload.release(&self.ctx);
                Err(engine_err!(LOG_SOURCE, "Upload queue lock poisoned"))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        let image = self.state.image;
        crate::vulkan_upload::cancel_uploads(&self.ctx, |upload| upload.targets_image(image));

        unsafe {
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }

            if let Some(allocation) = self.allocation.take() {
                match self.ctx.allocator.lock() {
                    Ok(mut allocator) => {
                        if let Err(e) = allocator.free(allocation) {
                            engine_warn!(LOG_SOURCE, "Failed to free texture memory: {:?}", e);
                        }
                    }
                    Err(_) => engine_warn!(LOG_SOURCE, "Allocator lock poisoned, leaking texture memory"),
                }
            }

            self.ctx.device.destroy_image(image, None);
        }
    }
}

/// Downcast an engine texture; textures from another backend are rejected
pub(crate) fn vk_texture(texture: &dyn Texture) -> Result<&VulkanTexture> {
    texture
        .as_any()
        .downcast_ref::<VulkanTexture>()
        .ok_or_else(|| Error::InvalidOperation(format!("texture '{}' does not belong to the Vulkan backend", texture.desc().label)))
}
