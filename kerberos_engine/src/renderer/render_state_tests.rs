//! Unit tests for render_state.rs

use glam::Vec4;

use crate::graphics_device::{
    BlendMode, CompareOp, DepthState, GraphicsDevice, PipelineDesc, RenderTargetLayout, ShaderDesc, ShaderStage,
    TextureFormat,
};
use crate::immediate::{HeadlessSurface, ImmediateGraphicsDevice};
use crate::renderer::RenderState;

fn desc() -> PipelineDesc {
    let device = ImmediateGraphicsDevice::new(HeadlessSurface::new(4, 4));
    let shader = |stage| {
        device
            .create_shader(ShaderDesc { label: "s".to_string(), code: vec![0; 4], stage, entry_point: "main".to_string() })
            .unwrap()
    };
    PipelineDesc::new("mesh", shader(ShaderStage::Vertex), shader(ShaderStage::Fragment), Vec::new())
}

fn swapchain_layout() -> RenderTargetLayout {
    RenderTargetLayout {
        color_formats: vec![TextureFormat::B8G8R8A8_SRGB],
        depth_format: Some(TextureFormat::D32_FLOAT),
    }
}

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_default_state() {
    let state = RenderState::default();
    assert_eq!(state.clear_color, Vec4::new(0.0, 0.0, 0.0, 1.0));
    assert_eq!(state.depth, DepthState { test_enable: true, write_enable: true, compare_op: CompareOp::Less });
    assert!(state.viewport.is_none());
    assert!(state.pipeline.is_none());
    assert!(state.framebuffer.is_none());
}

#[test]
fn test_depth_setters() {
    let mut state = RenderState::default();
    state.set_depth_test(false);
    state.set_depth_write(false);
    state.set_depth_func(CompareOp::GreaterEqual);
    assert!(!state.depth.test_enable);
    assert!(!state.depth.write_enable);
    assert_eq!(state.depth.compare_op, CompareOp::GreaterEqual);
}

// ============================================================================
// EFFECTIVE PIPELINE
// ============================================================================

#[test]
fn test_no_pipeline_bound() {
    let state = RenderState::default();
    assert!(state.effective_pipeline(&swapchain_layout()).is_none());
}

#[test]
fn test_effective_pipeline_takes_target_and_depth() {
    let mut state = RenderState::default();
    let mut bound = desc();
    bound.depth.compare_op = CompareOp::Always;
    bound.blend = BlendMode::AlphaBlend;
    state.pipeline = Some(bound);
    state.set_depth_write(false);

    let effective = state.effective_pipeline(&swapchain_layout()).unwrap();
    assert_eq!(effective.target, swapchain_layout());
    assert!(!effective.depth.write_enable);
    // Global depth state wins over the bound description
    assert_eq!(effective.depth.compare_op, CompareOp::Less);
    assert_eq!(effective.blend, BlendMode::AlphaBlend);
}

#[test]
fn test_effective_pipeline_key_changes_with_state() {
    let mut state = RenderState::default();
    state.pipeline = Some(desc());
    let before = state.effective_pipeline(&swapchain_layout()).unwrap().cache_key();

    state.set_depth_test(false);
    let after = state.effective_pipeline(&swapchain_layout()).unwrap().cache_key();
    assert_ne!(before, after);

    let offscreen = RenderTargetLayout { color_formats: vec![TextureFormat::R32_SINT], depth_format: None };
    let other_target = state.effective_pipeline(&offscreen).unwrap().cache_key();
    assert_ne!(after, other_target);
}
