/// Framebuffer - Vulkan implementation of the Framebuffer trait
///
/// Owns one texture per attachment. With dynamic rendering there is no
/// VkFramebuffer object: command lists render straight into the attachment
/// views.

use ash::vk;
use gpu_allocator::MemoryLocation;
use kerberos_engine::kerberos::render::{Framebuffer, FramebufferAttachments, FramebufferDesc, Texture};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_debug, engine_error};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::RawBuffer;
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_texture::{vk_texture, VulkanTexture};

/// Vulkan framebuffer implementation
pub struct VulkanFramebuffer {
    ctx: Arc<GpuContext>,
    attachments: Mutex<FramebufferAttachments>,
}

impl VulkanFramebuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: FramebufferDesc) -> Result<Self> {
        let attachments = Self::create_attachments(&ctx, desc)?;
        Ok(Self { ctx, attachments: Mutex::new(attachments) })
    }

    fn create_attachments(ctx: &Arc<GpuContext>, desc: FramebufferDesc) -> Result<FramebufferAttachments> {
        let attachments = FramebufferAttachments::build(desc, |texture_desc| {
            Ok(Arc::new(VulkanTexture::new(ctx.clone(), texture_desc)?) as Arc<dyn Texture>)
        })
        .map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        engine_debug!(
            LOG_SOURCE,
            "Created framebuffer '{}' {}x{} ({} color, depth: {})",
            attachments.desc.label,
            attachments.desc.width,
            attachments.desc.height,
            attachments.colors.len(),
            attachments.depth.is_some()
        );
        Ok(attachments)
    }

    fn snapshot(&self) -> FramebufferAttachments {
        self.attachments.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl Framebuffer for VulkanFramebuffer {
    fn desc(&self) -> FramebufferDesc {
        self.snapshot().desc
    }

    fn attachments(&self) -> FramebufferAttachments {
        self.snapshot()
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        let mut attachments = self.attachments.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if attachments.desc.width == width && attachments.desc.height == height {
            return Ok(());
        }
        let desc = attachments.desc.resized(width, height).map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;
        // Recorded command lists hold their own references to the old textures
        *attachments = Self::create_attachments(&self.ctx, desc)?;
        Ok(())
    }

    fn read_pixel(&self, attachment: usize, x: u32, y: u32) -> Result<i32> {
        let attachments = self.snapshot();
        let desc = &attachments.desc;
        desc.validate_int_access(attachment, x, y).map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;
        let texture = attachments
            .colors
            .get(attachment)
            .ok_or_else(|| Error::InvalidOperation(format!("framebuffer '{}': no color attachment {}", desc.label, attachment)))?;
        let state = vk_texture(texture.as_ref())?.state.clone();

        self.ctx.wait_idle()?;

        let readback = RawBuffer::new(
            &self.ctx,
            &format!("{} (readback)", desc.label),
            4,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
        )?;

        let restore_layout = state.layout();
        let copied = self.ctx.one_shot(|device, command_buffer| unsafe {
            state.transition(device, command_buffer, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: state.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: x as i32, y: y as i32, z: 0 })
                .image_extent(vk::Extent3D { width: 1, height: 1, depth: 1 });
            device.cmd_copy_image_to_buffer(
                command_buffer,
                state.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.buffer,
                &[region],
            );
            state.transition(device, command_buffer, restore_layout);
        });

        let value = copied.and_then(|()| readback.read(0, 4));
        readback.release(&self.ctx);
        let bytes = value?;
        Ok(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcast an engine framebuffer; framebuffers from another backend are rejected
pub(crate) fn vk_framebuffer(framebuffer: &dyn Framebuffer) -> Result<&VulkanFramebuffer> {
    framebuffer
        .as_any()
        .downcast_ref::<VulkanFramebuffer>()
        .ok_or_else(|| Error::InvalidOperation(format!("framebuffer '{}' does not belong to the Vulkan backend", framebuffer.desc().label)))
}
