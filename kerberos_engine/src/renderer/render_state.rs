/// Value-semantics render state set by the application between draws

use std::sync::Arc;

use glam::Vec4;

use crate::graphics_device::{
    CompareOp, DepthState, Framebuffer, PipelineDesc, PipelineKey, Rect2D, RenderTargetLayout, Viewport,
};

pub struct RenderState {
    pub clear_color: Vec4,
    /// `None` means the full extent of the current target
    pub viewport: Option<Viewport>,
    pub scissor: Option<Rect2D>,
    pub depth: DepthState,
    /// Description selected with `bind_pipeline`
    pub pipeline: Option<PipelineDesc>,
    /// Offscreen target for the rest of the frame
    pub framebuffer: Option<Arc<dyn Framebuffer>>,
    /// Key of the pipeline bound in the command list, to skip redundant binds
    pub bound_pipeline: Option<PipelineKey>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            viewport: None,
            scissor: None,
            depth: DepthState::default(),
            pipeline: None,
            framebuffer: None,
            bound_pipeline: None,
        }
    }
}

impl RenderState {
    pub fn set_depth_test(&mut self, enabled: bool) {
        self.depth.test_enable = enabled;
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.depth.write_enable = enabled;
    }

    pub fn set_depth_func(&mut self, op: CompareOp) {
        self.depth.compare_op = op;
    }

    /// The pipeline a draw into `target` actually needs
    ///
    /// Depth state comes from the `set_depth_*` calls and the attachment
    /// formats from the current target, whatever the bound description says.
    pub fn effective_pipeline(&self, target: &RenderTargetLayout) -> Option<PipelineDesc> {
        let mut desc = self.pipeline.clone()?;
        desc.depth = self.depth;
        desc.target = target.clone();
        Some(desc)
    }
}

#[cfg(test)]
#[path = "render_state_tests.rs"]
mod tests;
