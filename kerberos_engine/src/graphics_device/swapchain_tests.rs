//! Unit tests for swapchain.rs (surface negotiation)

use crate::error::Error;
use crate::graphics_device::{
    Extent2D, PresentMode, PresentStatus, SurfaceCapabilities, SwapchainDesc, TextureFormat,
};

fn caps() -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: 2,
        max_image_count: 8,
        current_extent: None,
        min_extent: Extent2D::new(1, 1),
        max_extent: Extent2D::new(4096, 4096),
        formats: vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::B8G8R8A8_SRGB],
        present_modes: vec![PresentMode::Vsync, PresentMode::Immediate],
    }
}

fn desc(width: u32, height: u32) -> SwapchainDesc {
    SwapchainDesc {
        extent: Extent2D::new(width, height),
        min_image_count: 2,
        present_mode: PresentMode::Vsync,
    }
}

// ============================================================================
// IMAGE COUNT TESTS
// ============================================================================

#[test]
fn test_image_count_is_surface_min_plus_one() {
    let config = caps().negotiate(&desc(1280, 720)).unwrap();
    assert_eq!(config.image_count, 3);
}

#[test]
fn test_image_count_honors_larger_request() {
    let mut d = desc(1280, 720);
    d.min_image_count = 5;
    assert_eq!(caps().negotiate(&d).unwrap().image_count, 5);
}

#[test]
fn test_image_count_clamped_to_surface_max() {
    let mut c = caps();
    c.max_image_count = 3;
    let mut d = desc(1280, 720);
    d.min_image_count = 6;
    assert_eq!(c.negotiate(&d).unwrap().image_count, 3);
}

#[test]
fn test_image_count_never_below_two() {
    let mut c = caps();
    c.min_image_count = 0;
    let mut d = desc(1280, 720);
    d.min_image_count = 1;
    assert_eq!(c.negotiate(&d).unwrap().image_count, 2);
}

#[test]
fn test_unbounded_max_image_count() {
    let mut c = caps();
    c.max_image_count = 0;
    let mut d = desc(1280, 720);
    d.min_image_count = 16;
    assert_eq!(c.negotiate(&d).unwrap().image_count, 16);
}

#[test]
fn test_single_image_surface_rejected() {
    let mut c = caps();
    c.min_image_count = 1;
    c.max_image_count = 1;
    assert!(matches!(c.negotiate(&desc(1280, 720)), Err(Error::InitializationFailed(_))));
}

// ============================================================================
// FORMAT TESTS
// ============================================================================

#[test]
fn test_bgra_srgb_preferred() {
    let config = caps().negotiate(&desc(1280, 720)).unwrap();
    assert_eq!(config.format, TextureFormat::B8G8R8A8_SRGB);
}

#[test]
fn test_rgba_srgb_second_choice() {
    let mut c = caps();
    c.formats = vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::R8G8B8A8_SRGB];
    assert_eq!(c.negotiate(&desc(1280, 720)).unwrap().format, TextureFormat::R8G8B8A8_SRGB);
}

#[test]
fn test_first_format_fallback() {
    let mut c = caps();
    c.formats = vec![TextureFormat::B8G8R8A8_UNORM, TextureFormat::R8G8B8A8_UNORM];
    assert_eq!(c.negotiate(&desc(1280, 720)).unwrap().format, TextureFormat::B8G8R8A8_UNORM);
}

#[test]
fn test_no_formats_rejected() {
    let mut c = caps();
    c.formats.clear();
    assert!(c.negotiate(&desc(1280, 720)).is_err());
}

// ============================================================================
// EXTENT TESTS
// ============================================================================

#[test]
fn test_fixed_current_extent_wins() {
    let mut c = caps();
    c.current_extent = Some(Extent2D::new(800, 600));
    assert_eq!(c.negotiate(&desc(1280, 720)).unwrap().extent, Extent2D::new(800, 600));
}

#[test]
fn test_requested_extent_clamped() {
    let mut c = caps();
    c.max_extent = Extent2D::new(1024, 1024);
    assert_eq!(c.negotiate(&desc(1280, 720)).unwrap().extent, Extent2D::new(1024, 720));
}

#[test]
fn test_zero_area_detection() {
    assert!(Extent2D::new(0, 720).is_zero_area());
    assert!(Extent2D::new(1280, 0).is_zero_area());
    assert!(!Extent2D::new(1, 1).is_zero_area());
}

// ============================================================================
// PRESENT MODE TESTS
// ============================================================================

#[test]
fn test_vsync_always_available() {
    let mut c = caps();
    c.present_modes.clear();
    assert_eq!(c.negotiate(&desc(1280, 720)).unwrap().present_mode, PresentMode::Vsync);
}

#[test]
fn test_immediate_when_offered() {
    let mut d = desc(1280, 720);
    d.present_mode = PresentMode::Immediate;
    assert_eq!(caps().negotiate(&d).unwrap().present_mode, PresentMode::Immediate);
}

#[test]
fn test_triple_buffer_falls_back_to_vsync() {
    let mut d = desc(1280, 720);
    d.present_mode = PresentMode::TripleBuffer;
    assert_eq!(caps().negotiate(&d).unwrap().present_mode, PresentMode::Vsync);
}

#[test]
fn test_triple_buffer_when_offered() {
    let mut c = caps();
    c.present_modes.push(PresentMode::TripleBuffer);
    let mut d = desc(1280, 720);
    d.present_mode = PresentMode::TripleBuffer;
    assert_eq!(c.negotiate(&d).unwrap().present_mode, PresentMode::TripleBuffer);
}

// ============================================================================
// STATUS TESTS
// ============================================================================

#[test]
fn test_present_status_recreate_flag() {
    assert!(!PresentStatus::Presented.needs_recreate());
    assert!(PresentStatus::Suboptimal.needs_recreate());
    assert!(PresentStatus::OutOfDate.needs_recreate());
}
