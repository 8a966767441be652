//! Unit tests for surface capability conversion
//!
//! The Vulkan surface query results are plain structs, so the conversion into
//! engine-side `SurfaceCapabilities` and the negotiation on top of it run
//! without a GPU.

use super::*;

fn caps(current: (u32, u32), min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_images,
        max_image_count: max_images,
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        ..Default::default()
    }
}

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR }
}

fn desc(width: u32, height: u32, present_mode: PresentMode) -> SwapchainDesc {
    SwapchainDesc { extent: Extent2D::new(width, height), min_image_count: 2, present_mode }
}

// ============================================================================
// EXTENT TESTS
// ============================================================================

#[test]
fn test_fixed_extent_is_reported() {
    let converted = surface_capabilities(&caps((800, 600), 2, 8), &[], &[vk::PresentModeKHR::FIFO]);
    assert_eq!(converted.current_extent, Some(Extent2D::new(800, 600)));
    assert_eq!(converted.max_extent, Extent2D::new(4096, 4096));
}

#[test]
fn test_undefined_extent_lets_the_request_win() {
    let converted = surface_capabilities(
        &caps((u32::MAX, u32::MAX), 2, 8),
        &[surface_format(vk::Format::B8G8R8A8_SRGB)],
        &[vk::PresentModeKHR::FIFO],
    );
    assert_eq!(converted.current_extent, None);

    let config = converted.negotiate(&desc(1280, 720, PresentMode::Vsync)).unwrap();
    assert_eq!(config.extent, Extent2D::new(1280, 720));
}

#[test]
fn test_minimized_surface_reports_zero_extent() {
    let converted = surface_capabilities(
        &caps((0, 0), 2, 8),
        &[surface_format(vk::Format::B8G8R8A8_SRGB)],
        &[vk::PresentModeKHR::FIFO],
    );
    let config = converted.negotiate(&desc(800, 600, PresentMode::Vsync)).unwrap();
    assert!(config.extent.is_zero_area());
}

// ============================================================================
// FORMAT AND PRESENT MODE TESTS
// ============================================================================

#[test]
fn test_unknown_formats_are_skipped() {
    let converted = surface_capabilities(
        &caps((800, 600), 2, 8),
        &[
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ],
        &[vk::PresentModeKHR::FIFO],
    );
    assert_eq!(converted.formats, vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::B8G8R8A8_SRGB]);

    let config = converted.negotiate(&desc(800, 600, PresentMode::Vsync)).unwrap();
    assert_eq!(config.format, TextureFormat::B8G8R8A8_SRGB);
}

#[test]
fn test_fifo_is_always_offered() {
    let converted = surface_capabilities(&caps((800, 600), 2, 8), &[], &[vk::PresentModeKHR::IMMEDIATE]);
    assert!(converted.present_modes.contains(&PresentMode::Vsync));
    assert!(converted.present_modes.contains(&PresentMode::Immediate));
}

#[test]
fn test_missing_mailbox_falls_back_to_vsync() {
    let converted = surface_capabilities(
        &caps((800, 600), 2, 8),
        &[surface_format(vk::Format::B8G8R8A8_SRGB)],
        &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
    );
    let config = converted.negotiate(&desc(800, 600, PresentMode::TripleBuffer)).unwrap();
    assert_eq!(config.present_mode, PresentMode::Vsync);
}

// ============================================================================
// IMAGE COUNT TESTS
// ============================================================================

#[test]
fn test_image_count_respects_surface_minimum() {
    let converted = surface_capabilities(
        &caps((800, 600), 3, 0),
        &[surface_format(vk::Format::B8G8R8A8_SRGB)],
        &[vk::PresentModeKHR::FIFO],
    );
    assert_eq!(converted.max_image_count, 0);

    let config = converted.negotiate(&desc(800, 600, PresentMode::Vsync)).unwrap();
    assert_eq!(config.image_count, 4);
}
