//! Integration tests for VulkanGraphicsDevice
//!
//! Everything except the registry test needs a GPU and a display, so those
//! tests are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_device_tests -- --ignored

use kerberos_engine::kerberos::immediate::HeadlessSurface;
use kerberos_engine::kerberos::render::{
    Buffer, BufferDesc, BufferUsage, CommandList, Fence, Framebuffer, FramebufferDesc, GraphicsDevice, RenderTarget,
    ShaderDesc, ShaderStage, SubmitInfo, Texture, TextureDesc, TextureFormat, TextureUsage,
};
use kerberos_engine::kerberos::{
    BackendKind, BackendRegistry, Error, FrameStatus, Renderer, RendererConfig, SurfaceTarget,
};
use kerberos_engine_renderer_vulkan::VulkanGraphicsDevice;
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Helper to create a hidden test window for Vulkan
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Vulkan GraphicsDevice Test")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn test_config() -> RendererConfig {
    RendererConfig { backend: BackendKind::Vulkan, enable_validation: false, ..RendererConfig::default() }
}

// ============================================================================
// REGISTRY TESTS
// ============================================================================

#[test]
fn test_register_adds_vulkan_backend() {
    let mut registry = BackendRegistry::new();
    assert!(!registry.is_registered(BackendKind::Vulkan));

    kerberos_engine_renderer_vulkan::register(&mut registry);
    assert!(registry.is_registered(BackendKind::Vulkan));
}

#[test]
fn test_headless_surface_is_rejected() {
    let mut registry = BackendRegistry::new();
    kerberos_engine_renderer_vulkan::register(&mut registry);

    let surface = SurfaceTarget::Headless(HeadlessSurface::new(64, 64));
    let result = registry.create_device(&surface, &test_config());
    if BackendKind::Vulkan.is_available_on_host() {
        assert!(matches!(result, Err(Error::UnsupportedBackend(_))));
    }
}

// ============================================================================
// RESOURCE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_create_buffer_and_upload() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let buffer = device.create_buffer(BufferDesc::new("vertices", 256, BufferUsage::Vertex)).unwrap();
    assert_eq!(buffer.desc().size, 256);
    buffer.set_data(0, &[1u8; 128]).unwrap();

    // Overflowing writes are rejected before anything is staged
    let overflow = buffer.set_data(200, &[0u8; 64]);
    assert!(matches!(overflow, Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_texture_upload_size_must_match() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let texture = device
        .create_texture(TextureDesc::new("albedo", 4, 4, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled))
        .unwrap();
    texture.set_data(&[255u8; 64]).unwrap();
    assert!(matches!(texture.set_data(&[255u8; 60]), Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_rejects_zero_extent_texture() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let result = device.create_texture(TextureDesc::new("empty", 0, 16, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_rejects_non_spirv_shader() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let result = device.create_shader(ShaderDesc {
        label: "garbage".to_string(),
        code: vec![0xAB; 64],
        stage: ShaderStage::Vertex,
        entry_point: "main".to_string(),
    });
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// SYNC TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_fence_states() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let fence = device.create_fence(true).unwrap();
    assert!(fence.is_signaled().unwrap());
    assert!(fence.wait(0).unwrap());

    fence.reset().unwrap();
    assert!(!fence.is_signaled().unwrap());
    assert!(!fence.wait(1_000).unwrap());
}

// ============================================================================
// COMMAND LIST TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_command_list_state_errors() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let mut command_list = device.create_command_list().unwrap();
    assert!(matches!(command_list.draw(3, 0), Err(Error::InvalidOperation(_))));

    command_list.begin().unwrap();
    assert!(matches!(command_list.begin(), Err(Error::InvalidOperation(_))));
    assert!(matches!(command_list.clear_color([0.0; 4]), Err(Error::InvalidOperation(_))));
    assert!(matches!(command_list.push_constants(120, &[0u8; 16]), Err(Error::InvalidOperation(_))));
    command_list.end().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_picking_round_trip() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let framebuffer = device
        .create_framebuffer(FramebufferDesc {
            label: "picking".to_string(),
            width: 16,
            height: 16,
            color_formats: vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::R32_SINT],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })
        .unwrap();

    let mut command_list = device.create_command_list().unwrap();
    command_list.begin().unwrap();
    command_list.begin_rendering(RenderTarget::Framebuffer(framebuffer.as_ref())).unwrap();
    command_list.clear_color([0.1, 0.2, 0.3, 1.0]).unwrap();
    command_list.clear_depth(1.0).unwrap();
    command_list.clear_attachment_int(1, 42).unwrap();
    // The float attachment is not an integer target
    assert!(matches!(command_list.clear_attachment_int(0, 1), Err(Error::InvalidOperation(_))));
    command_list.end_rendering().unwrap();
    command_list.end().unwrap();

    let fence = device.create_fence(false).unwrap();
    device
        .submit(&SubmitInfo {
            command_list: command_list.as_ref(),
            wait_semaphore: None,
            signal_semaphore: None,
            fence: Some(fence.as_ref()),
        })
        .unwrap();
    assert!(fence.wait(5_000_000_000).unwrap());

    assert_eq!(framebuffer.read_pixel(1, 7, 9).unwrap(), 42);
    assert!(matches!(framebuffer.read_pixel(0, 0, 0), Err(Error::InvalidOperation(_))));
    assert!(matches!(framebuffer.read_pixel(1, 16, 0), Err(Error::InvalidOperation(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_uniform_buffer_upload_and_bind() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let camera = device.create_buffer(BufferDesc::new("camera", 128, BufferUsage::Uniform { binding: 1 })).unwrap();
    camera.set_data(64, &[0u8; 64]).unwrap();
    assert!(matches!(camera.set_data(96, &[0u8; 64]), Err(Error::InvalidResource(_))));
    let vertices = device.create_buffer(BufferDesc::new("vertices", 64, BufferUsage::Vertex)).unwrap();

    let mut command_list = device.create_command_list().unwrap();
    command_list.begin().unwrap();
    command_list.bind_uniform_buffer(&camera).unwrap();
    assert!(matches!(command_list.bind_uniform_buffer(&vertices), Err(Error::InvalidOperation(_))));
    command_list.end().unwrap();

    let fence = device.create_fence(false).unwrap();
    device
        .submit(&SubmitInfo {
            command_list: command_list.as_ref(),
            wait_semaphore: None,
            signal_semaphore: None,
            fence: Some(fence.as_ref()),
        })
        .unwrap();
    assert!(fence.wait(5_000_000_000).unwrap());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_framebuffer_resize() {
    let (window, _event_loop) = create_test_window();
    let device = VulkanGraphicsDevice::new(&window, &test_config()).unwrap();

    let framebuffer = device
        .create_framebuffer(FramebufferDesc {
            label: "ids".to_string(),
            width: 8,
            height: 8,
            color_formats: vec![TextureFormat::R32_SINT],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })
        .unwrap();
    assert!(matches!(framebuffer.resize(0, 8), Err(Error::InvalidResource(_))));
    framebuffer.resize(24, 12).unwrap();
    assert_eq!(framebuffer.depth_attachment().unwrap().desc().width, 24);

    let mut command_list = device.create_command_list().unwrap();
    command_list.begin().unwrap();
    command_list.begin_rendering(RenderTarget::Framebuffer(framebuffer.as_ref())).unwrap();
    command_list.clear_attachment_int(0, 5).unwrap();
    command_list.end_rendering().unwrap();
    command_list.end().unwrap();

    let fence = device.create_fence(false).unwrap();
    device
        .submit(&SubmitInfo {
            command_list: command_list.as_ref(),
            wait_semaphore: None,
            signal_semaphore: None,
            fence: Some(fence.as_ref()),
        })
        .unwrap();
    assert!(fence.wait(5_000_000_000).unwrap());

    assert_eq!(framebuffer.read_pixel(0, 23, 11).unwrap(), 5);
    assert!(framebuffer.read_pixel(0, 24, 0).is_err());
}

// ============================================================================
// RENDERER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_renderer_clears_and_presents() {
    let (window, _event_loop) = create_test_window();
    let size = window.inner_size();

    let mut registry = BackendRegistry::with_default_backends();
    kerberos_engine_renderer_vulkan::register(&mut registry);
    let surface = SurfaceTarget::Window { window: &window, width: size.width, height: size.height };
    let mut renderer = Renderer::new(&registry, surface, test_config()).unwrap();

    for _ in 0..4 {
        match renderer.begin_frame().unwrap() {
            FrameStatus::Ready(_) => {
                renderer.clear().unwrap();
                renderer.clear_depth().unwrap();
                renderer.end_frame().unwrap();
                renderer.present().unwrap();
            }
            FrameStatus::Suspended | FrameStatus::Dropped => {}
        }
    }
    renderer.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_upload_survives_discarded_frame() {
    let (window, _event_loop) = create_test_window();
    let size = window.inner_size();

    let mut registry = BackendRegistry::new();
    kerberos_engine_renderer_vulkan::register(&mut registry);
    let surface = SurfaceTarget::Window { window: &window, width: size.width, height: size.height };
    let mut renderer = Renderer::new(&registry, surface, test_config()).unwrap();

    let framebuffer = renderer
        .device()
        .create_framebuffer(FramebufferDesc {
            label: "ids".to_string(),
            width: 4,
            height: 4,
            color_formats: vec![TextureFormat::R32_SINT],
            depth_format: None,
        })
        .unwrap();
    let texels: Vec<u8> = (0..16i32).flat_map(|i| (i + 100).to_ne_bytes()).collect();
    framebuffer.color_attachment(0).unwrap().set_data(&texels).unwrap();

    // The upload is recorded into this frame's command list
    if let FrameStatus::Ready(_) = renderer.begin_frame().unwrap() {
        renderer.discard_frame().unwrap();
    }
    renderer.wait_idle().unwrap();

    assert_eq!(framebuffer.read_pixel(0, 2, 3).unwrap(), 114);
}
