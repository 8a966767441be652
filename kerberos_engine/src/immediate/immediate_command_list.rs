/// ImmediateCommandList - validates and executes commands as they are recorded
///
/// Clears write texel storage immediately. Draws are validated against the
/// bound pipeline, buffers and target, then counted in the device event log;
/// they never rasterize, so the target's texels keep their cleared values.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, CommandList, Extent2D, Framebuffer, IndexType, Pipeline, Rect2D, RenderTarget, RenderTargetLayout,
    Swapchain, Texture, Viewport, MAX_PUSH_CONSTANT_SIZE, MAX_TEXTURE_SLOTS, MAX_UNIFORM_BINDINGS,
};
use crate::immediate::{
    encode_color, encode_depth, DeviceEvent, DeviceShared, ImmediateFramebuffer, ImmediateSwapchain,
    ImmediateTexture, TexelStorage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

struct BoundTarget {
    colors: Vec<Arc<TexelStorage>>,
    depth: Option<Arc<TexelStorage>>,
    layout: RenderTargetLayout,
}

pub struct ImmediateCommandList {
    id: u64,
    shared: Arc<DeviceShared>,
    state: RecordingState,
    target: Option<BoundTarget>,
    pipeline: Option<Arc<dyn Pipeline>>,
    vertex_buffers: Vec<Option<(Arc<dyn Buffer>, u64)>>,
    index_buffer: Option<(Arc<dyn Buffer>, u64, IndexType)>,
    textures: [Option<Arc<dyn Texture>>; MAX_TEXTURE_SLOTS as usize],
    uniform_buffers: [Option<Arc<dyn Buffer>>; MAX_UNIFORM_BINDINGS as usize],
    push_constants: [u8; MAX_PUSH_CONSTANT_SIZE as usize],
    viewport: Option<Viewport>,
    scissor: Option<Rect2D>,
    draw_count: u32,
}

impl ImmediateCommandList {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self {
            id: shared.next_id(),
            shared,
            state: RecordingState::Initial,
            target: None,
            pipeline: None,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            textures: Default::default(),
            uniform_buffers: Default::default(),
            push_constants: [0; MAX_PUSH_CONSTANT_SIZE as usize],
            viewport: None,
            scissor: None,
            draw_count: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Recording has ended and the list can be submitted
    pub fn is_executable(&self) -> bool {
        self.state == RecordingState::Executable
    }

    /// Draws recorded since the last `begin`
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn scissor(&self) -> Option<Rect2D> {
        self.scissor
    }

    pub fn bound_texture(&self, slot: u32) -> Option<&Arc<dyn Texture>> {
        self.textures.get(slot as usize).and_then(|t| t.as_ref())
    }

    pub fn bound_uniform_buffer(&self, binding: u32) -> Option<&Arc<dyn Buffer>> {
        self.uniform_buffers.get(binding as usize).and_then(|b| b.as_ref())
    }

    pub fn push_constant_data(&self) -> &[u8] {
        &self.push_constants
    }

    fn require_recording(&self, command: &str) -> Result<()> {
        if self.state != RecordingState::Recording {
            return Err(Error::InvalidOperation(format!(
                "{} recorded outside begin()/end() (command list {})",
                command, self.id
            )));
        }
        Ok(())
    }

    fn require_target(&self, command: &str) -> Result<&BoundTarget> {
        self.require_recording(command)?;
        self.target
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation(format!("{} recorded outside begin_rendering()", command)))
    }

    /// Checks shared by `draw` and `draw_indexed`; returns the bound pipeline
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

    fn record_draw(&mut self, count: u32, indexed: bool) {
        self.draw_count += 1;
        self.shared.probe.record(DeviceEvent::Draw { command_list: self.id, count, indexed });
    }
}

impl CommandList for ImmediateCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.state == RecordingState::Recording {
            return Err(Error::InvalidOperation(format!("command list {} already recording", self.id)));
        }
        self.state = RecordingState::Recording;
        self.target = None;
        self.pipeline = None;
        self.vertex_buffers.clear();
        self.index_buffer = None;
        self.textures = Default::default();
        self.uniform_buffers = Default::default();
        self.viewport = None;
        self.scissor = None;
        self.draw_count = 0;
        self.shared.probe.record(DeviceEvent::CommandListBegin { command_list: self.id });
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_recording("end")?;
        if self.target.is_some() {
            return Err(Error::InvalidOperation("end() inside begin_rendering()".to_string()));
        }
        self.state = RecordingState::Executable;
        Ok(())
    }

    fn begin_rendering(&mut self, target: RenderTarget<'_>) -> Result<()> {
        self.require_recording("begin_rendering")?;
        if self.target.is_some() {
            return Err(Error::InvalidOperation("begin_rendering() while already rendering".to_string()));
        }

        let bound = match target {
            RenderTarget::Swapchain { swapchain, image_index, depth } => {
                let swapchain = swapchain
                    .as_any()
                    .downcast_ref::<ImmediateSwapchain>()
                    .ok_or_else(|| Error::InvalidOperation("swapchain belongs to another backend".to_string()))?;
                let depth = match depth {
                    Some(texture) => Some(ImmediateTexture::downcast(texture.as_ref())?.storage().clone()),
                    None => None,
                };
                BoundTarget {
                    colors: vec![swapchain.image(image_index)?.clone()],
                    layout: RenderTargetLayout {
                        color_formats: vec![swapchain.format()],
                        depth_format: depth.as_ref().map(|d| d.desc().format),
                    },
                    depth,
                }
            }
            RenderTarget::Framebuffer(framebuffer) => {
                let framebuffer = framebuffer
                    .as_any()
                    .downcast_ref::<ImmediateFramebuffer>()
                    .ok_or_else(|| Error::InvalidOperation("framebuffer belongs to another backend".to_string()))?;
                let storages = framebuffer.storages()?;
                BoundTarget {
                    colors: storages.colors,
                    depth: storages.depth,
                    layout: RenderTargetLayout {
                        color_formats: storages.desc.color_formats,
                        depth_format: storages.desc.depth_format,
                    },
                }
            }
        };

        let extents: Vec<Extent2D> = bound
            .colors
            .iter()
            .chain(bound.depth.iter())
            .map(|storage| Extent2D::new(storage.desc().width, storage.desc().height))
            .collect();
        if extents.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(Error::InvalidOperation(format!("attachment extents differ: {:?}", extents)));
        }

        self.target = Some(bound);
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.require_target("end_rendering")?;
        self.target = None;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        self.viewport = Some(viewport);
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;
        self.scissor = Some(scissor);
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        self.pipeline = Some(pipeline.clone());
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        self.require_recording("bind_vertex_buffer")?;
        if offset >= buffer.desc().size {
            return Err(Error::InvalidOperation(format!(
                "vertex buffer '{}' bound at offset {} past its end",
                buffer.desc().label,
                offset
            )));
        }
        let binding = binding as usize;
        if self.vertex_buffers.len() <= binding {
            self.vertex_buffers.resize(binding + 1, None);
        }
        self.vertex_buffers[binding] = Some((buffer.clone(), offset));
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;
        if offset >= buffer.desc().size {
            return Err(Error::InvalidOperation(format!(
                "index buffer '{}' bound at offset {} past its end",
                buffer.desc().label,
                offset
            )));
        }
        if offset % index_type.size_bytes() as u64 != 0 {
            return Err(Error::InvalidOperation(format!(
                "index buffer offset {} is not aligned to {:?}",
                offset, index_type
            )));
        }
        self.index_buffer = Some((buffer.clone(), offset, index_type));
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
        ImmediateTexture::downcast(texture.as_ref())?;
        if !texture.desc().usage.is_sampled() {
            return Err(Error::InvalidOperation(format!(
                "texture '{}' was not created for sampling",
                texture.desc().label
            )));
        }
        self.textures[slot as usize] = Some(texture.clone());
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.require_recording("bind_uniform_buffer")?;
        let desc = buffer.desc();
        let binding = desc
            .usage
            .uniform_binding()
            .ok_or_else(|| Error::InvalidOperation(format!("buffer '{}' is not a uniform buffer", desc.label)))?;
        let slot = self.uniform_buffers.get_mut(binding as usize).ok_or_else(|| {
            Error::InvalidOperation(format!("uniform binding {} out of range (max {})", binding, MAX_UNIFORM_BINDINGS))
        })?;
        *slot = Some(buffer.clone());
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
        self.push_constants[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        let target = self.require_target("clear_color")?;
        for storage in target.colors.iter().filter(|s| !s.desc().format.is_integer()) {
            storage.fill(&encode_color(storage.desc().format, color))?;
        }
        Ok(())
    }

    fn clear_depth(&mut self, depth: f32) -> Result<()> {
        let target = self.require_target("clear_depth")?;
        let storage = target
            .depth
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation("clear_depth without a depth attachment".to_string()))?;
        storage.fill(&encode_depth(storage.desc().format, depth))
    }

    fn clear_attachment_int(&mut self, attachment: u32, value: i32) -> Result<()> {
        let target = self.require_target("clear_attachment_int")?;
        let storage = target
            .colors
            .get(attachment as usize)
            .ok_or_else(|| Error::InvalidOperation(format!("no color attachment {}", attachment)))?;
        if !storage.desc().format.is_integer() {
            return Err(Error::InvalidOperation(format!(
                "attachment {} is {:?}, not an integer format",
                attachment,
                storage.desc().format
            )));
        }
        storage.fill(&value.to_le_bytes())
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
        self.record_draw(vertex_count, false);
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, _vertex_offset: i32) -> Result<()> {
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
        self.record_draw(index_count, true);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "immediate_command_list_tests.rs"]
mod tests;
