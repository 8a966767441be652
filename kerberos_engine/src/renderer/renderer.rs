/// Renderer facade - the frame loop
///
/// ```text
/// begin_frame -> (set_*/bind_*/clear*/draw*)* -> end_frame -> present
/// ```
///
/// `begin_frame` waits on the current slot's fence, acquires an image and
/// starts recording; `end_frame` submits; `present` queues the image and
/// moves to the next slot. Resize notifications are recorded immediately and
/// applied at the next `begin_frame`/`present` boundary.

use std::sync::Arc;

use glam::Vec4;

use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireStatus, Buffer, CompareOp, Extent2D, Framebuffer, GraphicsDevice, PipelineDesc, PresentStatus, Rect2D,
    RenderTarget, RenderTargetLayout, SwapchainDesc, Texture, VertexArray, Viewport,
};
use crate::renderer::{
    BackendRegistry, FrameSynchronizer, PipelineCache, RenderState, RetainedResource, SurfaceTarget,
    SwapchainManager, SwapchainState,
};
use crate::{engine_debug, engine_error, engine_info, engine_warn};

const SOURCE: &str = "kerberos::renderer";

/// Facts about the frame `begin_frame` started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame slot in `0..frames_in_flight`
    pub slot_index: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// 1-based count of started frames
    pub frame_number: u64,
    pub extent: Extent2D,
}

/// Outcome of `begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Recording; call the draw methods, then `end_frame` and `present`
    Ready(FrameInfo),
    /// The surface has zero area; nothing was waited on or acquired
    Suspended,
    /// The swapchain stayed out of date after one recreation; try again next frame
    Dropped,
}

/// Where the renderer is in the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Recording { image_index: u32 },
    Submitted { image_index: u32 },
}

/// Counters since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub frames_suspended: u64,
    pub draw_calls: u64,
    pub swapchain_recreations: u64,
    pub discarded_images: u64,
    pub pipelines_cached: usize,
    pub pipeline_cache_hits: u64,
    pub pipeline_cache_misses: u64,
}

/// Frame-loop facade over one graphics device
///
/// Field order is teardown order.
pub struct Renderer {
    pipelines: PipelineCache,
    frames: FrameSynchronizer,
    swapchain: SwapchainManager,
    device: Arc<dyn GraphicsDevice>,
    config: RendererConfig,
    state: RenderState,
    phase: FramePhase,
    frame_number: u64,
    stats: RendererStats,
    shut_down: bool,
}

impl Renderer {
    /// Create the device for `config.backend` and the swapchain for `surface`
    pub fn new(registry: &BackendRegistry, surface: SurfaceTarget<'_>, config: RendererConfig) -> Result<Self> {
        config.validate()?;
        crate::log::set_min_severity(config.log_level);
        let extent = surface.extent();
        let device = registry.create_device(&surface, &config)?;
        Self::with_device(device, extent, config)
    }

    /// Build the renderer around an existing device
    pub fn with_device(device: Arc<dyn GraphicsDevice>, extent: Extent2D, config: RendererConfig) -> Result<Self> {
        config.validate()?;

        let frames = FrameSynchronizer::new(device.clone(), config.frames_in_flight, config.fence_timeout_ns)?;
        let mut swapchain = SwapchainManager::new(
            SwapchainDesc {
                extent,
                min_image_count: config.min_image_count,
                present_mode: config.present_mode,
            },
            config.depth_buffer,
        );
        swapchain.create(device.as_ref())?;

        engine_info!(
            SOURCE,
            "Renderer ready on {} ({} frames in flight)",
            device.info().device_name,
            config.frames_in_flight
        );

        Ok(Self {
            pipelines: PipelineCache::new(),
            frames,
            swapchain,
            device,
            config,
            state: RenderState::default(),
            phase: FramePhase::Idle,
            frame_number: 0,
            stats: RendererStats::default(),
            shut_down: false,
        })
    }

    /// Device used to create resources
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn swapchain_state(&self) -> SwapchainState {
        self.swapchain.state()
    }

    /// Extent of the live swapchain, if any
    pub fn swapchain_extent(&self) -> Option<Extent2D> {
        self.swapchain.swapchain().map(|s| s.extent())
    }

    pub fn swapchain_image_count(&self) -> Option<u32> {
        self.swapchain.swapchain().map(|s| s.image_count())
    }

    /// Slot the next (or current) frame uses
    pub fn current_slot(&self) -> usize {
        self.frames.current_index()
    }

    pub fn frames_in_flight(&self) -> Result<usize> {
        self.frames.in_flight_count()
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            swapchain_recreations: self.swapchain.recreate_count(),
            discarded_images: self.swapchain.discarded_images(),
            pipelines_cached: self.pipelines.len(),
            pipeline_cache_hits: self.pipelines.hits(),
            pipeline_cache_misses: self.pipelines.misses(),
            ..self.stats
        }
    }

    // ===== FRAME LOOP =====

    /// Start a frame
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        self.ensure_alive()?;
        if self.phase != FramePhase::Idle {
            return Err(Error::InvalidOperation(format!("begin_frame called in phase {:?}", self.phase)));
        }

        if self.swapchain.needs_recreate() {
            self.recreate_swapchain()?;
        }
        if self.swapchain.is_suspended() {
            self.stats.frames_suspended += 1;
            return Ok(FrameStatus::Suspended);
        }

        self.frames.wait_for_current()?;

        let timeout = self.config.fence_timeout_ns;
        let image_index = match self.swapchain.acquire_next(self.frames.image_available(), timeout)? {
            AcquireStatus::Success { image_index, .. } => image_index,
            AcquireStatus::NeedsRecreate => {
                if !self.recreate_swapchain()? {
                    self.stats.frames_suspended += 1;
                    return Ok(FrameStatus::Suspended);
                }
                match self.swapchain.acquire_next(self.frames.image_available(), timeout)? {
                    AcquireStatus::Success { image_index, .. } => image_index,
                    AcquireStatus::NeedsRecreate => {
                        engine_warn!(SOURCE, "Swapchain still out of date after recreation, frame dropped");
                        self.stats.frames_dropped += 1;
                        return Ok(FrameStatus::Dropped);
                    }
                }
            }
        };

        let extent = self.swapchain_extent().unwrap_or_default();
        self.frames.command_list_mut().begin()?;
        self.phase = FramePhase::Recording { image_index };
        self.frame_number += 1;
        self.begin_target()?;

        Ok(FrameStatus::Ready(FrameInfo {
            slot_index: self.frames.current_index(),
            image_index,
            frame_number: self.frame_number,
            extent,
        }))
    }

    /// Finish recording and submit the frame
    pub fn end_frame(&mut self) -> Result<()> {
        let image_index = self.recording_image()?;
        let cmd = self.frames.command_list_mut();
        cmd.end_rendering()?;
        cmd.end()?;
        self.frames.submit_current()?;

        self.state.framebuffer = None;
        self.state.bound_pipeline = None;
        self.phase = FramePhase::Submitted { image_index };
        Ok(())
    }

    /// Present the submitted frame and move to the next slot
    ///
    /// `OutOfDate` and `Suboptimal` are not errors: the swapchain is
    /// recreated before this returns.
    pub fn present(&mut self) -> Result<PresentStatus> {
        if !matches!(self.phase, FramePhase::Submitted { .. }) {
            return Err(Error::InvalidOperation(format!("present called in phase {:?}", self.phase)));
        }

        let status = self.swapchain.present(self.frames.render_finished())?;
        self.frames.advance();
        self.phase = FramePhase::Idle;

        if status != PresentStatus::OutOfDate {
            self.stats.frames_presented += 1;
        }
        if status.needs_recreate() {
            engine_debug!(SOURCE, "Present returned {:?}, recreating swapchain", status);
            self.recreate_swapchain()?;
        }
        Ok(status)
    }

    /// Abandon the current frame without presenting it
    ///
    /// The acquired image is discarded and the swapchain recreated. Commands
    /// already recorded are still submitted, so uploads drained into the
    /// frame's command list reach the GPU.
    pub fn discard_frame(&mut self) -> Result<()> {
        match self.phase {
            FramePhase::Idle => Err(Error::InvalidOperation("no frame to discard".to_string())),
            FramePhase::Recording { .. } => {
                let cmd = self.frames.command_list_mut();
                if let Err(e) = cmd.end_rendering() {
                    engine_debug!(SOURCE, "Discarded frame had no open target: {}", e);
                }
                match cmd.end() {
                    Ok(()) => {
                        // Consumes the acquire signal; the slot is not advanced
                        self.frames.submit_current()?;
                        self.retire_discarded_submission()?;
                    }
                    Err(e) => {
                        engine_warn!(SOURCE, "Discarded frame could not be closed, its commands are dropped: {}", e);
                        // Never submitted: the acquire signal has no waiter
                        self.frames.replace_image_available()?;
                    }
                }
                self.finish_discard()
            }
            FramePhase::Submitted { .. } => {
                self.retire_discarded_submission()?;
                self.frames.advance();
                self.finish_discard()
            }
        }
    }

    /// Wait for the discarded submission, then swap out its render-finished
    /// semaphore, which stays signaled with no present to wait on it
    fn retire_discarded_submission(&mut self) -> Result<()> {
        self.frames.wait_for_current()?;
        self.frames.replace_render_finished()
    }

    fn finish_discard(&mut self) -> Result<()> {
        self.swapchain.discard_acquired();
        self.state.framebuffer = None;
        self.state.bound_pipeline = None;
        self.phase = FramePhase::Idle;
        self.recreate_swapchain()?;
        Ok(())
    }

    /// Window resize callback
    ///
    /// A zero width or height suspends rendering until a nonzero resize.
    pub fn on_surface_resized(&mut self, width: u32, height: u32) {
        self.swapchain.notify_resized(Extent2D::new(width, height));
    }

    // ===== STATE =====

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        let viewport = Viewport { x, y, width, height, min_depth: 0.0, max_depth: 1.0 };
        self.state.viewport = Some(viewport);
        if self.is_recording() {
            self.frames.command_list_mut().set_viewport(viewport)?;
        }
        Ok(())
    }

    /// `None` restores the full-target scissor
    pub fn set_scissor(&mut self, scissor: Option<Rect2D>) -> Result<()> {
        self.state.scissor = scissor;
        if self.is_recording() {
            let extent = self.target_extent();
            let rect = scissor.unwrap_or_else(|| Rect2D::full(extent.width, extent.height));
            self.frames.command_list_mut().set_scissor(rect)?;
        }
        Ok(())
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.state.clear_color = color;
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.state.set_depth_test(enabled);
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.state.set_depth_write(enabled);
    }

    pub fn set_depth_func(&mut self, op: CompareOp) {
        self.state.set_depth_func(op);
    }

    // ===== RECORDING =====

    /// Clear color attachments to the clear color and depth to 1.0
    pub fn clear(&mut self) -> Result<()> {
        self.recording_image()?;
        let color = self.state.clear_color.to_array();
        let has_depth = self.target_layout().depth_format.is_some();
        let cmd = self.frames.command_list_mut();
        cmd.clear_color(color)?;
        if has_depth {
            cmd.clear_depth(1.0)?;
        }
        Ok(())
    }

    /// Clear only the depth attachment
    pub fn clear_depth(&mut self) -> Result<()> {
        self.recording_image()?;
        if self.target_layout().depth_format.is_none() {
            return Err(Error::InvalidOperation("current target has no depth attachment".to_string()));
        }
        self.frames.command_list_mut().clear_depth(1.0)
    }

    /// Clear integer color attachment `index` of the bound framebuffer
    pub fn clear_attachment(&mut self, index: u32, value: i32) -> Result<()> {
        self.recording_image()?;
        self.frames.command_list_mut().clear_attachment_int(index, value)
    }

    /// Render the rest of the frame into `framebuffer`, or back to the swapchain with `None`
    pub fn bind_framebuffer(&mut self, framebuffer: Option<Arc<dyn Framebuffer>>) -> Result<()> {
        self.recording_image()?;
        self.frames.command_list_mut().end_rendering()?;
        if let Some(framebuffer) = &framebuffer {
            self.frames.retain(RetainedResource::Framebuffer(framebuffer.clone()));
            // A resize mid-flight replaces the attachments this frame renders to
            let attachments = framebuffer.attachments();
            for texture in attachments.colors.into_iter().chain(attachments.depth) {
                self.frames.retain(RetainedResource::Texture(texture));
            }
        }
        self.state.framebuffer = framebuffer;
        self.begin_target()
    }

    /// Select the pipeline description used by subsequent draws
    ///
    /// Creation is deferred to the first draw, when the target is known.
    pub fn bind_pipeline(&mut self, desc: PipelineDesc) -> Result<()> {
        desc.validate_shaders()?;
        self.state.pipeline = Some(desc);
        Ok(())
    }

    pub fn bind_texture(&mut self, slot: u32, texture: &Arc<dyn Texture>) -> Result<()> {
        self.recording_image()?;
        self.frames.command_list_mut().bind_texture(slot, texture)?;
        self.frames.retain(RetainedResource::Texture(texture.clone()));
        Ok(())
    }

    /// Bind a uniform buffer at the binding it was created with
    pub fn bind_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.recording_image()?;
        self.frames.command_list_mut().bind_uniform_buffer(buffer)?;
        self.frames.retain(RetainedResource::Buffer(buffer.clone()));
        Ok(())
    }

    pub fn push_constants(&mut self, data: &[u8]) -> Result<()> {
        self.recording_image()?;
        self.frames.command_list_mut().push_constants(0, data)
    }

    /// Draw `index_count` indices of `vertex_array`; 0 draws the whole index buffer
    pub fn draw_indexed(&mut self, vertex_array: &Arc<VertexArray>, index_count: u32) -> Result<()> {
        self.recording_image()?;
        let (index_buffer, index_type) = vertex_array.index_buffer().ok_or_else(|| {
            Error::InvalidOperation(format!("vertex array '{}' has no index buffer", vertex_array.label()))
        })?;
        let available = vertex_array.index_count();
        let count = if index_count == 0 { available } else { index_count };
        if count > available {
            return Err(Error::InvalidOperation(format!(
                "draw of {} indices exceeds the {} in '{}'",
                count,
                available,
                vertex_array.label()
            )));
        }

        self.prepare_draw(vertex_array)?;
        let cmd = self.frames.command_list_mut();
        cmd.bind_index_buffer(index_buffer, 0, *index_type)?;
        cmd.draw_indexed(count, 0, 0)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Draw `vertex_count` vertices of `vertex_array` without indices
    pub fn draw_array(&mut self, vertex_array: &Arc<VertexArray>, vertex_count: u32) -> Result<()> {
        self.recording_image()?;
        self.prepare_draw(vertex_array)?;
        self.frames.command_list_mut().draw(vertex_count, 0)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    // ===== DEVICE =====

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.device.wait_idle()?;
        if self.phase == FramePhase::Idle {
            self.frames.release_all();
        }
        Ok(())
    }

    /// Drop every cached pipeline (e.g. after shader hot-reload)
    pub fn invalidate_pipelines(&mut self) -> Result<()> {
        if self.phase != FramePhase::Idle {
            return Err(Error::InvalidOperation("cannot invalidate pipelines mid-frame".to_string()));
        }
        self.device.wait_idle()?;
        self.frames.release_all();
        self.pipelines.clear();
        self.state.bound_pipeline = None;
        engine_info!(SOURCE, "Pipeline cache cleared");
        Ok(())
    }

    /// Ordered teardown: idle, pipelines, frame slots, swapchain
    ///
    /// Called by `Drop`; calling it explicitly surfaces the error.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let idle = self.device.wait_idle();
        self.pipelines.clear();
        self.state = RenderState::default();
        self.frames.release_all();
        self.swapchain.destroy();
        self.phase = FramePhase::Idle;
        engine_info!(SOURCE, "Renderer shut down after {} frames", self.frame_number);
        idle
    }

    // ===== INTERNALS =====

    fn ensure_alive(&self) -> Result<()> {
        if self.shut_down {
            return Err(Error::InvalidOperation("renderer has been shut down".to_string()));
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        matches!(self.phase, FramePhase::Recording { .. })
    }

    fn recording_image(&self) -> Result<u32> {
        match self.phase {
            FramePhase::Recording { image_index } => Ok(image_index),
            phase => Err(Error::InvalidOperation(format!("not recording (phase {:?})", phase))),
        }
    }

    /// Attachment formats of the current target
    fn target_layout(&self) -> RenderTargetLayout {
        match &self.state.framebuffer {
            Some(framebuffer) => {
                let desc = framebuffer.desc();
                RenderTargetLayout { color_formats: desc.color_formats, depth_format: desc.depth_format }
            }
            None => RenderTargetLayout {
                color_formats: self.swapchain.swapchain().map(|s| vec![s.format()]).unwrap_or_default(),
                depth_format: self.swapchain.depth_target().map(|t| t.desc().format),
            },
        }
    }

    fn target_extent(&self) -> Extent2D {
        match &self.state.framebuffer {
            Some(framebuffer) => {
                let desc = framebuffer.desc();
                Extent2D::new(desc.width, desc.height)
            }
            None => self.swapchain_extent().unwrap_or_default(),
        }
    }

    /// Begin rendering into the current target and apply viewport/scissor
    fn begin_target(&mut self) -> Result<()> {
        let image_index = self.recording_image()?;
        let extent = self.target_extent();
        let viewport = self.state.viewport.unwrap_or_else(|| Viewport::full(extent.width, extent.height));
        let scissor = self.state.scissor.unwrap_or_else(|| Rect2D::full(extent.width, extent.height));

        let target = match &self.state.framebuffer {
            Some(framebuffer) => RenderTarget::Framebuffer(framebuffer.as_ref()),
            None => {
                let swapchain = self
                    .swapchain
                    .swapchain()
                    .ok_or_else(|| Error::InvalidOperation("no swapchain to render to".to_string()))?;
                RenderTarget::Swapchain {
                    swapchain,
                    image_index,
                    depth: self.swapchain.depth_target(),
                }
            }
        };

        let cmd = self.frames.command_list_mut();
        cmd.begin_rendering(target)?;
        cmd.set_viewport(viewport)?;
        cmd.set_scissor(scissor)?;
        self.state.bound_pipeline = None;
        Ok(())
    }

    /// Bind the effective pipeline and the vertex buffers of `vertex_array`
    fn prepare_draw(&mut self, vertex_array: &Arc<VertexArray>) -> Result<()> {
        let layout = self.target_layout();
        let desc = self
            .state
            .effective_pipeline(&layout)
            .ok_or_else(|| Error::InvalidOperation("draw without a bound pipeline".to_string()))?;

        let key = desc.cache_key();
        if self.state.bound_pipeline.as_ref() != Some(&key) {
            let pipeline = self.pipelines.get_or_create(self.device.as_ref(), &desc).map_err(|e| {
                engine_error!(SOURCE, "Pipeline '{}' unavailable: {}", desc.label, e);
                e
            })?;
            self.frames.command_list_mut().bind_pipeline(&pipeline)?;
            self.frames.retain(RetainedResource::Pipeline(pipeline));
            self.state.bound_pipeline = Some(key);
        }

        for (binding, buffer) in vertex_array.vertex_buffers().iter().enumerate() {
            self.frames.command_list_mut().bind_vertex_buffer(binding as u32, buffer, 0)?;
        }
        self.frames.retain(RetainedResource::VertexArray(vertex_array.clone()));
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        let recreated = self.swapchain.recreate(self.device.as_ref())?;
        self.frames.release_all();
        Ok(recreated)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            engine_error!(SOURCE, "Renderer shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
