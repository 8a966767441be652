/// CommandList - Vulkan implementation of the CommandList trait
///
/// Each command list owns a pool with one primary command buffer. Rendering
/// uses dynamic rendering, so targets are plain image views and layout
/// transitions are recorded here as targets are entered and left.
///
/// Everything the recorded commands reference (bound resources, staging
/// buffers of drained uploads) is held until the next `begin()`, which the
/// caller only issues after the previous submission's fence has signaled.

use ash::vk;
use kerberos_engine::kerberos::render::{
    Buffer, BufferUsage, CommandList, IndexType, Pipeline, Rect2D, RenderTarget, RenderTargetLayout, Texture,
    TextureFormat, Viewport, MAX_PUSH_CONSTANT_SIZE, MAX_TEXTURE_SLOTS, MAX_UNIFORM_BINDINGS,
};
use kerberos_engine::graphics_device::Swapchain;
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_error, engine_trace};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_buffer::{vk_buffer, RawBuffer};
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{index_type_to_vk, uniform_descriptor_binding};
use crate::vulkan_frame_buffer::vk_framebuffer;
use crate::vulkan_pipeline::vk_pipeline;
use crate::vulkan_swapchain::vk_swapchain;
use crate::vulkan_texture::{image_barrier, vk_texture, ImageState};
use crate::vulkan_upload::take_pending;

/// One color attachment of the current target
struct ColorAttachment {
    view: vk::ImageView,
    format: TextureFormat,
    /// Tracked offscreen texture; `None` for a swapchain image
    state: Option<Arc<ImageState>>,
}

struct DepthAttachment {
    view: vk::ImageView,
    format: TextureFormat,
    state: Arc<ImageState>,
}

/// Target between `begin_rendering` and `end_rendering`
struct ActiveTarget {
    colors: Vec<ColorAttachment>,
    depth: Option<DepthAttachment>,
    extent: vk::Extent2D,
    layout: RenderTargetLayout,
}

/// Swapchain images entered during one recording
///
/// The first entry of an image discards its old content. Later entries keep
/// what earlier passes drew. Every entered image goes to presentation layout
/// when the recording ends.
#[derive(Default)]
struct PresentImageTracker {
    entered: Vec<vk::Image>,
}

impl PresentImageTracker {
    /// Layout `image` is in when a pass enters it
    fn enter(&mut self, image: vk::Image) -> vk::ImageLayout {
        if self.entered.contains(&image) {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            self.entered.push(image);
            vk::ImageLayout::UNDEFINED
        }
    }

    /// Images to move to `PRESENT_SRC_KHR`; leaves the tracker empty
    fn finish(&mut self) -> Vec<vk::Image> {
        std::mem::take(&mut self.entered)
    }

    fn reset(&mut self) {
        self.entered.clear();
    }
}

/// Vulkan command list implementation
pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    is_recording: bool,
    target: Option<ActiveTarget>,
    present_images: PresentImageTracker,
    pipeline: Option<Arc<dyn Pipeline>>,
    vertex_buffers: Vec<Option<(Arc<dyn Buffer>, u64)>>,
    index_buffer: Option<(Arc<dyn Buffer>, u64, IndexType)>,
    held_textures: Vec<Arc<dyn Texture>>,
    held_pipelines: Vec<Arc<dyn Pipeline>>,
    held_buffers: Vec<Arc<dyn Buffer>>,
    staging: Vec<RawBuffer>,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&pool_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create command pool: {:?}", e);
                Error::BackendError(format!("Failed to create command pool: {:?}", e))
            })?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    engine_error!(LOG_SOURCE, "Failed to allocate command buffer: {:?}", e);
                    return Err(Error::BackendError(format!("Failed to allocate command buffers: {:?}", e)));
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer,
                is_recording: false,
                target: None,
                present_images: PresentImageTracker::default(),
                pipeline: None,
                vertex_buffers: Vec::new(),
                index_buffer: None,
                held_textures: Vec::new(),
                held_pipelines: Vec::new(),
                held_buffers: Vec::new(),
                staging: Vec::new(),
            })
        }
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn require_recording(&self, command: &str) -> Result<()> {
        if !self.is_recording {
            return Err(Error::InvalidOperation(format!("{} recorded outside begin()/end()", command)));
        }
        Ok(())
    }

    fn require_target(&self, command: &str) -> Result<&ActiveTarget> {
        self.require_recording(command)?;
        self.target
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation(format!("{} recorded outside begin_rendering()", command)))
    }

    /// Record every queued upload ahead of the commands that follow
    fn record_pending_uploads(&mut self) {
        let pending = take_pending(&self.ctx);
        if pending.is_empty() {
            return;
        }
        engine_trace!(LOG_SOURCE, "Recording {} pending upload(s)", pending.len());
        for upload in pending {
            let staging = unsafe { upload.record(&self.ctx.device, self.command_buffer) };
            self.staging.push(staging);
        }
    }

    /// Drop everything held for the previous submission
    fn release_held(&mut self) {
        for staging in self.staging.drain(..) {
            staging.release(&self.ctx);
        }
        self.held_textures.clear();
        self.held_pipelines.clear();
        self.held_buffers.clear();
    }

    fn clear_rect(&self, extent: vk::Extent2D) -> vk::ClearRect {
        vk::ClearRect {
            rect: vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent },
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Checks shared by `draw` and `draw_indexed`
    fn validate_draw(&self, command: &str) -> Result<&Arc<dyn Pipeline>> {
        let target = self.require_target(command)?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation(format!("{} without a bound pipeline", command)))?;
        let desc = pipeline.desc();
        if desc.target != target.layout {
            return Err(Error::InvalidOperation(format!(
                "pipeline '{}' was built for {:?}, target is {:?}",
                desc.label, desc.target, target.layout
            )));
        }
        for binding in 0..desc.vertex_layouts.len() {
            if self.vertex_buffers.get(binding).and_then(|b| b.as_ref()).is_none() {
                return Err(Error::InvalidOperation(format!(
                    "pipeline '{}' reads vertex binding {} but no buffer is bound",
                    desc.label, binding
                )));
            }
        }
        Ok(pipeline)
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::InvalidOperation("command list already recording".to_string()));
        }

        // The previous submission has completed by contract
        self.release_held();
        self.target = None;
        self.present_images.reset();
        self.pipeline = None;
        self.vertex_buffers.clear();
        self.index_buffer = None;

        unsafe {
            self.ctx
                .device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::BackendError(format!("Failed to reset command buffer: {:?}", e)))?;

            let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.ctx
                .device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("Failed to begin command buffer: {:?}", e)))?;
        }

        self.is_recording = true;
        self.record_pending_uploads();
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_recording("end")?;
        if self.target.is_some() {
            return Err(Error::InvalidOperation("end() inside begin_rendering()".to_string()));
        }

        let device = &self.ctx.device;
        unsafe {
            for image in self.present_images.finish() {
                image_barrier(
                    device,
                    self.command_buffer,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
            }
            device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| Error::BackendError(format!("Failed to end command buffer: {:?}", e)))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn begin_rendering(&mut self, target: RenderTarget<'_>) -> Result<()> {
        self.require_recording("begin_rendering")?;
        if self.target.is_some() {
            return Err(Error::InvalidOperation("begin_rendering() while already rendering".to_string()));
        }

        // Uploads queued since begin() must land before this pass reads them
        self.record_pending_uploads();

        let mut present_image = None;
        let active = match target {
            RenderTarget::Swapchain { swapchain, image_index, depth } => {
                let swapchain = vk_swapchain(swapchain)?;
                let image = swapchain.image(image_index)?;
                let view = swapchain.view(image_index)?;
                let extent = swapchain.extent();

                present_image = Some(image);
                let depth = match depth {
                    Some(texture) => {
                        let vk_depth = vk_texture(texture.as_ref())?;
                        let depth_desc = texture.desc();
                        if depth_desc.width != extent.width || depth_desc.height != extent.height {
                            return Err(Error::InvalidOperation(format!(
                                "depth attachment '{}' is {}x{}, swapchain is {}x{}",
                                depth_desc.label, depth_desc.width, depth_desc.height, extent.width, extent.height
                            )));
                        }
                        self.held_textures.push(texture.clone());
                        Some(DepthAttachment {
                            view: vk_depth.view,
                            format: texture.desc().format,
                            state: vk_depth.state.clone(),
                        })
                    }
                    None => None,
                };

                ActiveTarget {
                    colors: vec![ColorAttachment { view, format: swapchain.format(), state: None }],
                    layout: RenderTargetLayout {
                        color_formats: vec![swapchain.format()],
                        depth_format: depth.as_ref().map(|d| d.format),
                    },
                    depth,
                    extent: vk::Extent2D { width: extent.width, height: extent.height },
                }
            }
            RenderTarget::Framebuffer(framebuffer) => {
                vk_framebuffer(framebuffer)?;
                let attachments = framebuffer.attachments();
                let desc = &attachments.desc;

                let mut colors = Vec::with_capacity(attachments.colors.len());
                for texture in &attachments.colors {
                    let vk_color = vk_texture(texture.as_ref())?;
                    colors.push(ColorAttachment {
                        view: vk_color.view,
                        format: texture.desc().format,
                        state: Some(vk_color.state.clone()),
                    });
                    self.held_textures.push(texture.clone());
                }

                let depth = match &attachments.depth {
                    Some(texture) => {
                        let vk_depth = vk_texture(texture.as_ref())?;
                        self.held_textures.push(texture.clone());
                        Some(DepthAttachment {
                            view: vk_depth.view,
                            format: texture.desc().format,
                            state: vk_depth.state.clone(),
                        })
                    }
                    None => None,
                };

                ActiveTarget {
                    colors,
                    depth,
                    extent: vk::Extent2D { width: desc.width, height: desc.height },
                    layout: RenderTargetLayout {
                        color_formats: desc.color_formats.clone(),
                        depth_format: desc.depth_format,
                    },
                }
            }
        };

        let device = &self.ctx.device;
        unsafe {
            // Enter attachment layouts
            if let Some(image) = present_image {
                let old_layout = self.present_images.enter(image);
                image_barrier(
                    device,
                    self.command_buffer,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    old_layout,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                );
            }
            for color in &active.colors {
                if let Some(state) = &color.state {
                    state.transition(device, self.command_buffer, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                }
            }
            if let Some(depth) = &active.depth {
                if depth.state.layout() != vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
                    depth.state.transition(device, self.command_buffer, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
                }
            }

            let color_infos: Vec<vk::RenderingAttachmentInfo> = active
                .colors
                .iter()
                .map(|color| {
                    vk::RenderingAttachmentInfo::default()
                        .image_view(color.view)
                        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                        .load_op(vk::AttachmentLoadOp::LOAD)
                        .store_op(vk::AttachmentStoreOp::STORE)
                })
                .collect();
            let depth_info = active.depth.as_ref().map(|depth| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(depth.view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            });

            let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: active.extent };
            let mut rendering_info = vk::RenderingInfo::default()
                .render_area(render_area)
                .layer_count(1)
                .color_attachments(&color_infos);
            if let Some(depth_info) = &depth_info {
                rendering_info = rendering_info.depth_attachment(depth_info);
                if active.depth.as_ref().is_some_and(|d| d.format.has_stencil()) {
                    rendering_info = rendering_info.stencil_attachment(depth_info);
                }
            }
            device.cmd_begin_rendering(self.command_buffer, &rendering_info);

            // Full-target defaults; set_viewport/set_scissor override
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: active.extent.width as f32,
                height: active.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }

        self.target = Some(active);
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.require_target("end_rendering")?;
        let target = match self.target.take() {
            Some(target) => target,
            None => return Err(Error::InvalidOperation("end_rendering recorded outside begin_rendering()".to_string())),
        };

        let device = &self.ctx.device;
        unsafe {
            device.cmd_end_rendering(self.command_buffer);

            // Offscreen colors become sampleable; swapchain images stay
            // attachments until end()
            for color in &target.colors {
                if let Some(state) = &color.state {
                    state.transition(device, self.command_buffer, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                }
            }
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;
        let vk_scissor = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        };
        unsafe {
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        let vk_pipeline = vk_pipeline(pipeline.as_ref())?;
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, vk_pipeline.pipeline);
        }
        self.pipeline = Some(pipeline.clone());
        self.held_pipelines.push(pipeline.clone());
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        self.require_recording("bind_vertex_buffer")?;
        let desc = buffer.desc();
        if desc.usage != BufferUsage::Vertex {
            return Err(Error::InvalidOperation(format!("buffer '{}' is not a vertex buffer", desc.label)));
        }
        if offset >= desc.size {
            return Err(Error::InvalidOperation(format!(
                "vertex buffer '{}' bound at offset {} past its end",
                desc.label, offset
            )));
        }
        let vk_buf = vk_buffer(buffer.as_ref())?.vk_buffer();
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(self.command_buffer, binding, &[vk_buf], &[offset]);
        }

        let binding = binding as usize;
        if self.vertex_buffers.len() <= binding {
            self.vertex_buffers.resize(binding + 1, None);
        }
        self.vertex_buffers[binding] = Some((buffer.clone(), offset));
        self.held_buffers.push(buffer.clone());
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;
        let desc = buffer.desc();
        if desc.usage != BufferUsage::Index {
            return Err(Error::InvalidOperation(format!("buffer '{}' is not an index buffer", desc.label)));
        }
        if offset >= desc.size {
            return Err(Error::InvalidOperation(format!(
                "index buffer '{}' bound at offset {} past its end",
                desc.label, offset
            )));
        }
        if offset % index_type.size_bytes() as u64 != 0 {
            return Err(Error::InvalidOperation(format!(
                "index buffer offset {} is not aligned to {:?}",
                offset, index_type
            )));
        }
        let vk_buf = vk_buffer(buffer.as_ref())?.vk_buffer();
        unsafe {
            self.ctx
                .device
                .cmd_bind_index_buffer(self.command_buffer, vk_buf, offset, index_type_to_vk(index_type));
        }
        self.index_buffer = Some((buffer.clone(), offset, index_type));
        self.held_buffers.push(buffer.clone());
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, texture: &Arc<dyn Texture>) -> Result<()> {
        self.require_recording("bind_texture")?;
        if slot >= MAX_TEXTURE_SLOTS {
            return Err(Error::InvalidOperation(format!(
                "texture slot {} out of range (max {})",
                slot, MAX_TEXTURE_SLOTS
            )));
        }
        if !texture.desc().usage.is_sampled() {
            return Err(Error::InvalidOperation(format!(
                "texture '{}' was not created for sampling",
                texture.desc().label
            )));
        }
        let vk_tex = vk_texture(texture.as_ref())?;

        let read_only = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        if vk_tex.state.layout() != read_only {
            // No barriers inside a dynamic rendering scope
            if self.target.is_some() {
                return Err(Error::InvalidOperation(format!(
                    "texture '{}' is not readable while it is being rendered to",
                    texture.desc().label
                )));
            }
            unsafe {
                vk_tex.state.transition(&self.ctx.device, self.command_buffer, read_only);
            }
        }

        let image_info = [vk::DescriptorImageInfo {
            sampler: self.ctx.sampler,
            image_view: vk_tex.view,
            image_layout: read_only,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_binding(slot)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe {
            self.ctx.push_descriptor.cmd_push_descriptor_set(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.ctx.pipeline_layout,
                0,
                &[write],
            );
        }
        self.held_textures.push(texture.clone());
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.require_recording("bind_uniform_buffer")?;
        let desc = buffer.desc();
        let binding = desc
            .usage
            .uniform_binding()
            .ok_or_else(|| Error::InvalidOperation(format!("buffer '{}' is not a uniform buffer", desc.label)))?;
        if binding >= MAX_UNIFORM_BINDINGS {
            return Err(Error::InvalidOperation(format!(
                "uniform binding {} out of range (max {})",
                binding, MAX_UNIFORM_BINDINGS
            )));
        }
        let vk_buf = vk_buffer(buffer.as_ref())?.vk_buffer();

        let buffer_info = [vk::DescriptorBufferInfo { buffer: vk_buf, offset: 0, range: vk::WHOLE_SIZE }];
        let write = vk::WriteDescriptorSet::default()
            .dst_binding(uniform_descriptor_binding(binding))
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);
        unsafe {
            self.ctx.push_descriptor.cmd_push_descriptor_set(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.ctx.pipeline_layout,
                0,
                &[write],
            );
        }
        self.held_buffers.push(buffer.clone());
        Ok(())
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.require_recording("push_constants")?;
        let end = offset as usize + data.len();
        if end > MAX_PUSH_CONSTANT_SIZE as usize {
            return Err(Error::InvalidOperation(format!(
                "push constants [{}..{}) exceed {} bytes",
                offset, end, MAX_PUSH_CONSTANT_SIZE
            )));
        }
        // Vulkan addresses push constants in 4-byte units
        if offset % 4 != 0 || data.len() % 4 != 0 {
            return Err(Error::InvalidOperation(format!(
                "push constants [{}..{}) are not 4-byte aligned",
                offset, end
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        unsafe {
            self.ctx.device.cmd_push_constants(
                self.command_buffer,
                self.ctx.pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                offset,
                data,
            );
        }
        Ok(())
    }

    fn clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        let target = self.require_target("clear_color")?;
        let attachments: Vec<vk::ClearAttachment> = target
            .colors
            .iter()
            .enumerate()
            .filter(|(_, attachment)| !attachment.format.is_integer())
            .map(|(index, _)| vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: index as u32,
                clear_value: vk::ClearValue { color: vk::ClearColorValue { float32: color } },
            })
            .collect();
        if attachments.is_empty() {
            return Ok(());
        }
        let rect = self.clear_rect(target.extent);
        unsafe {
            self.ctx.device.cmd_clear_attachments(self.command_buffer, &attachments, &[rect]);
        }
        Ok(())
    }

    fn clear_depth(&mut self, depth: f32) -> Result<()> {
        let target = self.require_target("clear_depth")?;
        let attachment = target
            .depth
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation("clear_depth without a depth attachment".to_string()))?;
        let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
        if attachment.format.has_stencil() {
            aspect_mask |= vk::ImageAspectFlags::STENCIL;
        }
        let clear = vk::ClearAttachment {
            aspect_mask,
            color_attachment: 0,
            clear_value: vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 } },
        };
        let rect = self.clear_rect(target.extent);
        unsafe {
            self.ctx.device.cmd_clear_attachments(self.command_buffer, &[clear], &[rect]);
        }
        Ok(())
    }

    fn clear_attachment_int(&mut self, attachment: u32, value: i32) -> Result<()> {
        let target = self.require_target("clear_attachment_int")?;
        let color = target
            .colors
            .get(attachment as usize)
            .ok_or_else(|| Error::InvalidOperation(format!("no color attachment {}", attachment)))?;
        if !color.format.is_integer() {
            return Err(Error::InvalidOperation(format!(
                "attachment {} is {:?}, not an integer format",
                attachment, color.format
            )));
        }
        let clear = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: attachment,
            clear_value: vk::ClearValue { color: vk::ClearColorValue { int32: [value, 0, 0, 0] } },
        };
        let rect = self.clear_rect(target.extent);
        unsafe {
            self.ctx.device.cmd_clear_attachments(self.command_buffer, &[clear], &[rect]);
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        let pipeline = self.validate_draw("draw")?;
        let last = first_vertex as u64 + vertex_count as u64;
        for (binding, layout) in pipeline.desc().vertex_layouts.iter().enumerate() {
            if let Some(Some((buffer, offset))) = self.vertex_buffers.get(binding) {
                if last * layout.stride as u64 > buffer.desc().size - offset {
                    return Err(Error::InvalidOperation(format!(
                        "draw of vertices {}..{} overruns vertex buffer '{}'",
                        first_vertex,
                        last,
                        buffer.desc().label
                    )));
                }
            }
        }
        unsafe {
            self.ctx.device.cmd_draw(self.command_buffer, vertex_count, 1, first_vertex, 0);
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.validate_draw("draw_indexed")?;
        let (buffer, offset, index_type) = self
            .index_buffer
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation("draw_indexed without an index buffer".to_string()))?;
        let end = (first_index as u64 + index_count as u64) * index_type.size_bytes() as u64;
        if end > buffer.desc().size - offset {
            return Err(Error::InvalidOperation(format!(
                "draw of indices {}..{} overruns index buffer '{}'",
                first_index,
                first_index as u64 + index_count as u64,
                buffer.desc().label
            )));
        }
        unsafe {
            self.ctx
                .device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, first_index, vertex_offset, 0);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // A submitted buffer may still be executing
        if let Err(e) = self.ctx.wait_idle() {
            engine_error!(LOG_SOURCE, "Failed to wait idle before destroying command list: {}", e);
        }
        self.release_held();
        unsafe {
            // Destroying the pool frees its command buffer
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Downcast an engine command list; lists from another backend are rejected
pub(crate) fn vk_command_list(command_list: &dyn CommandList) -> Result<&VulkanCommandList> {
    command_list
        .as_any()
        .downcast_ref::<VulkanCommandList>()
        .ok_or_else(|| Error::InvalidOperation("command list does not belong to the Vulkan backend".to_string()))
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
