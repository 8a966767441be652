/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// A thin factory over the shared `GpuContext`: every object it creates holds
/// an `Arc` to the context, so the context (and with it the VkDevice) is
/// destroyed only after the last resource is gone.

use ash::vk;
use kerberos_engine::kerberos::render::{
    Buffer, BufferDesc, CommandList, DeviceInfo, Fence, Framebuffer, FramebufferDesc, GraphicsDevice, Pipeline,
    PipelineDesc, Semaphore, Shader, ShaderDesc, SubmitInfo, Swapchain, SwapchainDesc, Texture, TextureDesc,
    WindowHandleSource,
};
use kerberos_engine::kerberos::{BackendKind, Error, RendererConfig, Result};
use kerberos_engine::{engine_debug, engine_error};
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::{vk_command_list, VulkanCommandList};
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_frame_buffer::VulkanFramebuffer;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::VulkanSwapchain;
use crate::vulkan_sync::{vk_fence, vk_semaphore, VulkanFence, VulkanSemaphore};
use crate::vulkan_texture::VulkanTexture;

/// Vulkan graphics device
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    info: DeviceInfo,
}

impl VulkanGraphicsDevice {
    /// Create a device presenting to `window`
    pub fn new(window: &dyn WindowHandleSource, config: &RendererConfig) -> Result<Self> {
        let ctx = Arc::new(GpuContext::new(window, config)?);
        let info = DeviceInfo {
            backend: BackendKind::Vulkan,
            device_name: ctx.device_name.clone(),
            separate_present_queue: ctx.graphics_queue_family != ctx.present_queue_family,
        };
        Ok(Self { ctx, info })
    }
}

/// Log a creation failure with the resource label and pass the error on
fn creation_failed(kind: &str, label: &str, error: Error) -> Error {
    engine_error!(LOG_SOURCE, "Failed to create {} '{}': {}", kind, label, error);
    error
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        let label = desc.label.clone();
        let buffer = VulkanBuffer::new(self.ctx.clone(), desc).map_err(|e| creation_failed("buffer", &label, e))?;
        engine_debug!(LOG_SOURCE, "Created buffer '{}'", label);
        Ok(Arc::new(buffer))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        let label = desc.label.clone();
        let texture = VulkanTexture::new(self.ctx.clone(), desc).map_err(|e| creation_failed("texture", &label, e))?;
        engine_debug!(LOG_SOURCE, "Created texture '{}'", label);
        Ok(Arc::new(texture))
    }

    fn create_framebuffer(&self, desc: FramebufferDesc) -> Result<Arc<dyn Framebuffer>> {
        let label = desc.label.clone();
        let framebuffer =
            VulkanFramebuffer::new(self.ctx.clone(), desc).map_err(|e| creation_failed("framebuffer", &label, e))?;
        Ok(Arc::new(framebuffer))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        let label = desc.label.clone();
        let shader = VulkanShader::new(self.ctx.clone(), desc).map_err(|e| creation_failed("shader", &label, e))?;
        engine_debug!(LOG_SOURCE, "Created shader '{}'", label);
        Ok(Arc::new(shader))
    }

    fn create_pipeline(&self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        let label = desc.label.clone();
        let pipeline =
            VulkanPipeline::new(self.ctx.clone(), desc).map_err(|e| creation_failed("pipeline", &label, e))?;
        engine_debug!(LOG_SOURCE, "Created pipeline '{}'", label);
        Ok(Arc::new(pipeline))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(self.ctx.clone())?))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>> {
        Ok(Box::new(VulkanFence::new(self.ctx.clone(), signaled)?))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>> {
        Ok(Box::new(VulkanSemaphore::new(self.ctx.clone())?))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>> {
        Ok(Box::new(VulkanSwapchain::new(self.ctx.clone(), desc)?))
    }

    fn submit(&self, submit: &SubmitInfo<'_>) -> Result<()> {
        let command_list = vk_command_list(submit.command_list)?;
        if command_list.is_recording() {
            return Err(Error::InvalidOperation("submit() of a command list that is still recording".to_string()));
        }

        let command_buffers = [command_list.command_buffer];
        let wait_semaphores: Vec<vk::Semaphore> = submit.wait_semaphore.map(vk_semaphore).transpose()?.into_iter().collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            wait_semaphores.iter().map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT).collect();
        let signal_semaphores: Vec<vk::Semaphore> =
            submit.signal_semaphore.map(vk_semaphore).transpose()?.into_iter().collect();
        let fence = submit.fence.map(vk_fence).transpose()?.unwrap_or(vk::Fence::null());

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let _queue = self.ctx.lock_queue()?;
        unsafe {
            self.ctx.device.queue_submit(self.ctx.graphics_queue, &[submit_info], fence).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to submit command buffer: {:?}", e);
                match e {
                    vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost("device lost during submit".to_string()),
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                        Error::OutOfMemory
                    }
                    _ => Error::BackendError(format!("Failed to submit command buffer: {:?}", e)),
                }
            })
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }
}
