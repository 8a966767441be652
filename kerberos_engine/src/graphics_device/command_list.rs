/// CommandList trait - for recording rendering commands

use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{Buffer, Framebuffer, IndexType, Pipeline, Swapchain, Texture};

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering `width` x `height` with the full depth range
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Where `begin_rendering` draws
pub enum RenderTarget<'a> {
    /// An acquired swapchain image, plus the swapchain's depth target
    Swapchain {
        swapchain: &'a dyn Swapchain,
        image_index: u32,
        depth: Option<&'a Arc<dyn Texture>>,
    },
    /// An offscreen framebuffer and all its attachments
    Framebuffer(&'a dyn Framebuffer),
}

/// Command list for recording rendering commands
///
/// Commands are recorded between `begin()` and `end()` and later submitted via
/// `GraphicsDevice::submit()`. Immediate backends execute each command as it
/// is recorded; explicit backends serialize into a command buffer.
///
/// Recording a command in the wrong state (outside `begin`/`end`, drawing
/// outside `begin_rendering`, drawing without a pipeline) returns
/// `Error::InvalidOperation`.
pub trait CommandList: Send {
    /// Begin recording commands
    ///
    /// Resets whatever was recorded before. The caller must have observed the
    /// fence of the previous submission signaled.
    fn begin(&mut self) -> Result<()>;

    /// End recording commands
    fn end(&mut self) -> Result<()>;

    /// Begin rendering into `target`
    ///
    /// Attachments are loaded, not cleared: clears are explicit commands.
    fn begin_rendering(&mut self, target: RenderTarget<'_>) -> Result<()>;

    /// End rendering into the current target
    fn end_rendering(&mut self) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Bind a vertex buffer at `binding`
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()>;

    /// Bind a texture to a sampler slot (`slot < MAX_TEXTURE_SLOTS`)
    fn bind_texture(&mut self, slot: u32, texture: &Arc<dyn Texture>) -> Result<()>;

    /// Bind a uniform buffer at the binding it was created with
    fn bind_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()>;

    /// Write push constants, visible to vertex and fragment stages
    ///
    /// `offset + data.len()` must not exceed `MAX_PUSH_CONSTANT_SIZE`.
    fn push_constants(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// Clear every float color attachment of the current target
    ///
    /// Integer attachments are left alone; use `clear_attachment_int`.
    fn clear_color(&mut self, color: [f32; 4]) -> Result<()>;

    /// Clear the depth attachment of the current target
    fn clear_depth(&mut self, depth: f32) -> Result<()>;

    /// Clear one integer color attachment to `value`
    fn clear_attachment_int(&mut self, attachment: u32, value: i32) -> Result<()>;

    /// Draw non-indexed primitives
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Draw indexed primitives
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}
