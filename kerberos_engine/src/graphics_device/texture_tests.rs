//! Unit tests for texture.rs

use crate::error::Error;
use crate::graphics_device::{TextureDesc, TextureFormat, TextureUsage};

fn rgba(width: u32, height: u32) -> TextureDesc {
    TextureDesc::new("albedo", width, height, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled)
}

// ============================================================================
// FORMAT TESTS
// ============================================================================

#[test]
fn test_bytes_per_pixel() {
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::B8G8R8A8_SRGB.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R32_SINT.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), 16);
    assert_eq!(TextureFormat::D32_FLOAT.bytes_per_pixel(), 4);
}

#[test]
fn test_format_classes() {
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(TextureFormat::D24_UNORM_S8_UINT.has_stencil());
    assert!(!TextureFormat::D32_FLOAT.has_stencil());
    assert!(TextureFormat::R32_SINT.is_integer());
    assert!(!TextureFormat::R8G8B8A8_SRGB.is_integer());
}

// ============================================================================
// DESCRIPTOR VALIDATION TESTS
// ============================================================================

#[test]
fn test_zero_extent_rejected() {
    assert!(matches!(rgba(0, 64).validate(), Err(Error::InvalidResource(_))));
    assert!(matches!(rgba(64, 0).validate(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_depth_format_requires_depth_usage() {
    let desc = TextureDesc::new("depth", 8, 8, TextureFormat::D32_FLOAT, TextureUsage::Sampled);
    assert!(desc.validate().is_err());

    let desc = TextureDesc::new("depth", 8, 8, TextureFormat::D32_FLOAT, TextureUsage::DepthStencil);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_color_format_rejects_depth_usage() {
    let desc = TextureDesc::new("color", 8, 8, TextureFormat::R8G8B8A8_UNORM, TextureUsage::DepthStencil);
    assert!(desc.validate().is_err());
}

// ============================================================================
// UPLOAD SIZE TESTS
// ============================================================================

#[test]
fn test_byte_size_64x64_rgba8() {
    assert_eq!(rgba(64, 64).byte_size(), 16384);
}

#[test]
fn test_upload_exact_size_accepted() {
    assert!(rgba(64, 64).validate_upload(16384).is_ok());
}

#[test]
fn test_upload_short_and_long_rejected() {
    let desc = rgba(64, 64);
    assert!(desc.validate_upload(16383).is_err());
    assert!(desc.validate_upload(16385).is_err());
    match desc.validate_upload(100) {
        Err(Error::InvalidResource(msg)) => {
            assert!(msg.contains("expected 16384 bytes"));
            assert!(msg.contains("got 100"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_upload_to_depth_rejected() {
    let desc = TextureDesc::new("depth", 2, 2, TextureFormat::D32_FLOAT, TextureUsage::DepthStencil);
    assert!(desc.validate_upload(16).is_err());
}

#[test]
fn test_upload_to_render_target_only_texture_rejected() {
    let desc = TextureDesc::new("rt", 2, 2, TextureFormat::R8G8B8A8_UNORM, TextureUsage::RenderTarget);
    assert!(matches!(desc.validate_upload(16), Err(Error::InvalidOperation(_))));

    let desc = TextureDesc::new("rt", 2, 2, TextureFormat::R8G8B8A8_UNORM, TextureUsage::SampledAndRenderTarget);
    assert!(desc.validate_upload(16).is_ok());
}
