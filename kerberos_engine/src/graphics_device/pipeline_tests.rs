//! Unit tests for pipeline.rs

use std::any::Any;
use std::sync::Arc;

use crate::graphics_device::{
    BlendMode, CompareOp, DepthState, IndexType, PipelineDesc, RenderTargetLayout, Shader,
    ShaderStage, TextureFormat, VertexAttribute, VertexFormat, VertexLayout,
};

struct TestShader {
    label: String,
    stage: ShaderStage,
}

impl Shader for TestShader {
    fn label(&self) -> &str {
        &self.label
    }

    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        "main"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn shader(label: &str, stage: ShaderStage) -> Arc<dyn Shader> {
    Arc::new(TestShader { label: label.to_string(), stage })
}

fn color_target() -> RenderTargetLayout {
    RenderTargetLayout {
        color_formats: vec![TextureFormat::B8G8R8A8_SRGB],
        depth_format: Some(TextureFormat::D32_FLOAT),
    }
}

fn mesh_desc() -> PipelineDesc {
    let mut desc = PipelineDesc::new(
        "mesh",
        shader("mesh.vert", ShaderStage::Vertex),
        shader("mesh.frag", ShaderStage::Fragment),
        vec![VertexLayout::packed(&[VertexFormat::Float3, VertexFormat::Float2])],
    );
    desc.target = color_target();
    desc
}

// ============================================================================
// FORMAT SIZE TESTS
// ============================================================================

#[test]
fn test_index_type_size() {
    assert_eq!(IndexType::U16.size_bytes(), 2);
    assert_eq!(IndexType::U32.size_bytes(), 4);
}

#[test]
fn test_vertex_format_size() {
    assert_eq!(VertexFormat::Float.size_bytes(), 4);
    assert_eq!(VertexFormat::Float3.size_bytes(), 12);
    assert_eq!(VertexFormat::Int4.size_bytes(), 16);
    assert_eq!(VertexFormat::UByte4Norm.size_bytes(), 4);
}

// ============================================================================
// VERTEX LAYOUT TESTS
// ============================================================================

#[test]
fn test_packed_layout_offsets_and_stride() {
    let layout = VertexLayout::packed(&[
        VertexFormat::Float3,
        VertexFormat::Float3,
        VertexFormat::Float2,
        VertexFormat::UByte4Norm,
    ]);
    assert_eq!(layout.stride, 36);
    let offsets: Vec<u32> = layout.attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12, 24, 32]);
    let locations: Vec<u32> = layout.attributes.iter().map(|a| a.location).collect();
    assert_eq!(locations, vec![0, 1, 2, 3]);
}

#[test]
fn test_packed_empty_layout() {
    let layout = VertexLayout::packed(&[]);
    assert_eq!(layout.stride, 0);
    assert!(layout.attributes.is_empty());
}

// ============================================================================
// DESCRIPTOR VALIDATION TESTS
// ============================================================================

#[test]
fn test_default_fixed_function_state() {
    let desc = mesh_desc();
    assert_eq!(desc.depth, DepthState { test_enable: true, write_enable: true, compare_op: CompareOp::Less });
    assert_eq!(desc.blend, BlendMode::Opaque);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_swapped_stages_rejected() {
    let mut desc = mesh_desc();
    std::mem::swap(&mut desc.vertex_shader, &mut desc.fragment_shader);
    assert!(desc.validate().is_err());
}

#[test]
fn test_empty_target_layout_rejected() {
    let mut desc = mesh_desc();
    desc.target = RenderTargetLayout::default();
    assert!(desc.validate().is_err());
}

#[test]
fn test_attribute_past_stride_rejected() {
    let mut desc = mesh_desc();
    desc.vertex_layouts = vec![VertexLayout {
        stride: 8,
        attributes: vec![VertexAttribute { location: 0, format: VertexFormat::Float3, offset: 0 }],
    }];
    assert!(desc.validate().is_err());
}

// ============================================================================
// CACHE KEY TESTS
// ============================================================================

#[test]
fn test_cache_key_equal_for_clone() {
    let desc = mesh_desc();
    assert_eq!(desc.cache_key(), desc.clone().cache_key());
}

#[test]
fn test_cache_key_ignores_label() {
    let desc = mesh_desc();
    let mut renamed = desc.clone();
    renamed.label = "mesh (copy)".to_string();
    assert_eq!(desc.cache_key(), renamed.cache_key());
}

#[test]
fn test_cache_key_changes_with_depth_func() {
    let desc = mesh_desc();
    let mut other = desc.clone();
    other.depth.compare_op = CompareOp::LessEqual;
    assert_ne!(desc.cache_key(), other.cache_key());
}

#[test]
fn test_cache_key_changes_with_target_formats() {
    let desc = mesh_desc();
    let mut other = desc.clone();
    other.target.color_formats.push(TextureFormat::R32_SINT);
    assert_ne!(desc.cache_key(), other.cache_key());
}

#[test]
fn test_cache_key_distinguishes_shader_objects() {
    let desc = mesh_desc();
    let mut other = desc.clone();
    other.vertex_shader = shader("mesh.vert", ShaderStage::Vertex);
    assert_ne!(desc.cache_key(), other.cache_key());
}
