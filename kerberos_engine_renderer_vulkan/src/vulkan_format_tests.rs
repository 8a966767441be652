//! Unit tests for Vulkan format conversion functions
//!
//! Tests pure format conversion functions without requiring GPU.
//! Validates correct mapping between engine enums and Vulkan enums.

use ash::vk;
use kerberos_engine::kerberos::render::{
    BlendMode, BufferUsage, CompareOp, CullMode, IndexType, PresentMode, TextureFormat, TextureUsage, VertexFormat,
    MAX_TEXTURE_SLOTS, MAX_UNIFORM_BINDINGS,
};

use super::*;

const ALL_TEXTURE_FORMATS: [TextureFormat; 8] = [
    TextureFormat::R8G8B8A8_SRGB,
    TextureFormat::R8G8B8A8_UNORM,
    TextureFormat::B8G8R8A8_SRGB,
    TextureFormat::B8G8R8A8_UNORM,
    TextureFormat::R32_SINT,
    TextureFormat::R32G32B32A32_SFLOAT,
    TextureFormat::D32_FLOAT,
    TextureFormat::D24_UNORM_S8_UINT,
];

// ============================================================================
// TEXTURE FORMAT CONVERSION TESTS
// ============================================================================

#[test]
fn test_texture_format_to_vk_color_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::B8G8R8A8_SRGB), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(texture_format_to_vk(TextureFormat::R8G8B8A8_UNORM), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::R32_SINT), vk::Format::R32_SINT);
}

#[test]
fn test_texture_format_to_vk_depth_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::D32_FLOAT), vk::Format::D32_SFLOAT);
    assert_eq!(texture_format_to_vk(TextureFormat::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
}

#[test]
fn test_every_texture_format_maps_back() {
    for format in ALL_TEXTURE_FORMATS {
        assert_eq!(vk_to_texture_format(texture_format_to_vk(format)), Some(format));
    }
}

#[test]
fn test_unknown_surface_format_is_skipped() {
    assert_eq!(vk_to_texture_format(vk::Format::A2B10G10R10_UNORM_PACK32), None);
    assert_eq!(vk_to_texture_format(vk::Format::R16G16B16A16_SFLOAT), None);
}

#[test]
fn test_aspect_masks() {
    assert_eq!(aspect_mask(TextureFormat::R8G8B8A8_SRGB), vk::ImageAspectFlags::COLOR);
    assert_eq!(aspect_mask(TextureFormat::D32_FLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        aspect_mask(TextureFormat::D24_UNORM_S8_UINT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

// ============================================================================
// USAGE AND LAYOUT TESTS
// ============================================================================

#[test]
fn test_texture_usage_flags() {
    let sampled = texture_usage_to_vk(TextureUsage::Sampled);
    assert!(sampled.contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST));
    assert!(!sampled.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));

    // Render targets can be read back
    let target = texture_usage_to_vk(TextureUsage::RenderTarget);
    assert!(target.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC));

    assert_eq!(
        texture_usage_to_vk(TextureUsage::DepthStencil),
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
    );
}

#[test]
fn test_initial_layouts() {
    assert_eq!(initial_layout(TextureUsage::Sampled), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(
        initial_layout(TextureUsage::SampledAndRenderTarget),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    );
    assert_eq!(initial_layout(TextureUsage::RenderTarget), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(
        initial_layout(TextureUsage::DepthStencil),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
}

#[test]
fn test_layout_sync_stages() {
    let (stage, access) = layout_sync(vk::ImageLayout::UNDEFINED);
    assert_eq!(stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert!(access.is_empty());

    let (stage, access) = layout_sync(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(stage, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);

    let (stage, _) = layout_sync(vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);

    let (stage, access) = layout_sync(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    assert!(stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    assert!(access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
}

// ============================================================================
// VERTEX INPUT TESTS
// ============================================================================

#[test]
fn test_vertex_format_to_vk() {
    assert_eq!(vertex_format_to_vk(VertexFormat::Float), vk::Format::R32_SFLOAT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Float3), vk::Format::R32G32B32_SFLOAT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Int2), vk::Format::R32G32_SINT);
    assert_eq!(vertex_format_to_vk(VertexFormat::UByte4Norm), vk::Format::R8G8B8A8_UNORM);
}

#[test]
fn test_index_type_to_vk() {
    assert_eq!(index_type_to_vk(IndexType::U16), vk::IndexType::UINT16);
    assert_eq!(index_type_to_vk(IndexType::U32), vk::IndexType::UINT32);
}

// ============================================================================
// FIXED-FUNCTION STATE TESTS
// ============================================================================

#[test]
fn test_compare_op_to_vk() {
    assert_eq!(compare_op_to_vk(CompareOp::Less), vk::CompareOp::LESS);
    assert_eq!(compare_op_to_vk(CompareOp::LessEqual), vk::CompareOp::LESS_OR_EQUAL);
    assert_eq!(compare_op_to_vk(CompareOp::GreaterEqual), vk::CompareOp::GREATER_OR_EQUAL);
    assert_eq!(compare_op_to_vk(CompareOp::Always), vk::CompareOp::ALWAYS);
}

#[test]
fn test_cull_mode_to_vk() {
    assert_eq!(cull_mode_to_vk(CullMode::None), vk::CullModeFlags::NONE);
    assert_eq!(cull_mode_to_vk(CullMode::Back), vk::CullModeFlags::BACK);
}

#[test]
fn test_alpha_blend_state() {
    let state = blend_attachment_to_vk(BlendMode::AlphaBlend, TextureFormat::B8G8R8A8_SRGB);
    assert_eq!(state.blend_enable, vk::TRUE);
    assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
}

#[test]
fn test_integer_attachment_never_blends() {
    for blend in [BlendMode::Opaque, BlendMode::AlphaBlend, BlendMode::Additive] {
        let state = blend_attachment_to_vk(blend, TextureFormat::R32_SINT);
        assert_eq!(state.blend_enable, vk::FALSE);
    }
}

// ============================================================================
// PRESENT MODE TESTS
// ============================================================================

#[test]
fn test_present_modes() {
    assert_eq!(present_mode_to_vk(PresentMode::Vsync), vk::PresentModeKHR::FIFO);
    assert_eq!(present_mode_to_vk(PresentMode::TripleBuffer), vk::PresentModeKHR::MAILBOX);
    assert_eq!(vk_to_present_mode(vk::PresentModeKHR::IMMEDIATE), Some(PresentMode::Immediate));
    assert_eq!(vk_to_present_mode(vk::PresentModeKHR::FIFO_RELAXED), None);
}

// ============================================================================
// BUFFER USAGE TESTS
// ============================================================================

#[test]
fn test_buffer_usage_flags() {
    assert_eq!(buffer_usage_to_vk(BufferUsage::Vertex), vk::BufferUsageFlags::VERTEX_BUFFER);
    assert_eq!(buffer_usage_to_vk(BufferUsage::Index), vk::BufferUsageFlags::INDEX_BUFFER);
    assert_eq!(buffer_usage_to_vk(BufferUsage::Uniform { binding: 3 }), vk::BufferUsageFlags::UNIFORM_BUFFER);
}

#[test]
fn test_uniform_uploads_are_visible_to_shader_stages() {
    let (stages, access) = buffer_read_scope(BufferUsage::Uniform { binding: 0 });
    assert!(stages.contains(vk::PipelineStageFlags::VERTEX_SHADER));
    assert!(stages.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    assert_eq!(access, vk::AccessFlags::UNIFORM_READ);

    let (stages, access) = buffer_read_scope(BufferUsage::Index);
    assert_eq!(stages, vk::PipelineStageFlags::VERTEX_INPUT);
    assert_eq!(access, vk::AccessFlags::INDEX_READ);
}

#[test]
fn test_uniform_bindings_follow_texture_slots() {
    assert_eq!(uniform_descriptor_binding(0), MAX_TEXTURE_SLOTS);
    assert_eq!(uniform_descriptor_binding(MAX_UNIFORM_BINDINGS - 1), SET0_BINDING_COUNT - 1);
}
