//! Unit tests for immediate_device.rs

use std::sync::Arc;

use crate::error::Error;
use crate::graphics_device::{
    BufferDesc, BufferUsage, Fence, Framebuffer, FramebufferDesc, GraphicsDevice, PipelineDesc, RenderTarget,
    RenderTargetLayout, ShaderDesc, ShaderStage, SubmitInfo, TextureDesc, TextureFormat, TextureUsage,
};
use crate::immediate::{DeviceEvent, HeadlessSurface, ImmediateBuffer, ImmediateGraphicsDevice, ImmediateTexture};

fn device() -> ImmediateGraphicsDevice {
    ImmediateGraphicsDevice::new(HeadlessSurface::new(320, 240))
}

fn shader_desc(stage: ShaderStage) -> ShaderDesc {
    ShaderDesc { label: format!("{:?}", stage), code: vec![1, 2, 3, 4], stage, entry_point: "main".to_string() }
}

// ============================================================================
// RESOURCE CREATION TESTS
// ============================================================================

#[test]
fn test_create_buffer_and_write() {
    let device = device();
    let buffer = device.create_buffer(BufferDesc::new("vb", 8, BufferUsage::Vertex)).unwrap();
    buffer.set_data(4, &[9, 8, 7, 6]).unwrap();

    let immediate = buffer.as_any().downcast_ref::<ImmediateBuffer>().unwrap();
    assert_eq!(immediate.read_data().unwrap(), vec![0, 0, 0, 0, 9, 8, 7, 6]);
}

#[test]
fn test_rejected_buffer_write_leaves_contents() {
    let device = device();
    let buffer = device.create_buffer(BufferDesc::new("vb", 4, BufferUsage::Vertex)).unwrap();
    buffer.set_data(0, &[1, 2, 3, 4]).unwrap();
    assert!(buffer.set_data(2, &[5, 5, 5]).is_err());

    let immediate = buffer.as_any().downcast_ref::<ImmediateBuffer>().unwrap();
    assert_eq!(immediate.read_data().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_zero_size_buffer_rejected() {
    let result = device().create_buffer(BufferDesc::new("empty", 0, BufferUsage::Index));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_wrong_size_texture_upload_rejected() {
    let device = device();
    let texture = device
        .create_texture(TextureDesc::new("albedo", 64, 64, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled))
        .unwrap();
    texture.set_data(&vec![0x11; 16384]).unwrap();

    assert!(matches!(texture.set_data(&vec![0xFF; 1000]), Err(Error::InvalidResource(_))));

    let immediate = texture.as_any().downcast_ref::<ImmediateTexture>().unwrap();
    assert!(immediate.read_data().unwrap().iter().all(|&b| b == 0x11));
}

#[test]
fn test_memory_limit_gives_out_of_memory() {
    let device = device();
    device.set_memory_limit(Some(1024));
    let first = device.create_buffer(BufferDesc::new("a", 1000, BufferUsage::Vertex)).unwrap();
    let second = device.create_buffer(BufferDesc::new("b", 100, BufferUsage::Vertex));
    assert!(matches!(second, Err(Error::OutOfMemory)));

    drop(first);
    assert_eq!(device.allocated_bytes(), 0);
    assert!(device.create_buffer(BufferDesc::new("b", 100, BufferUsage::Vertex)).is_ok());
}

#[test]
fn test_framebuffer_attachments_created() {
    let device = device();
    let framebuffer = device
        .create_framebuffer(FramebufferDesc {
            label: "gbuffer".to_string(),
            width: 16,
            height: 8,
            color_formats: vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::R32_SINT],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })
        .unwrap();
    assert_eq!(framebuffer.color_attachment(1).unwrap().desc().format, TextureFormat::R32_SINT);
    assert_eq!(framebuffer.depth_attachment().unwrap().desc().width, 16);
    assert!(framebuffer.color_attachment(2).is_none());
}

#[test]
fn test_read_pixel_requires_integer_attachment() {
    let device = device();
    let framebuffer = device
        .create_framebuffer(FramebufferDesc {
            label: "picking".to_string(),
            width: 4,
            height: 4,
            color_formats: vec![TextureFormat::R8G8B8A8_UNORM, TextureFormat::R32_SINT],
            depth_format: None,
        })
        .unwrap();
    assert_eq!(framebuffer.read_pixel(1, 3, 3).unwrap(), 0);
    assert!(matches!(framebuffer.read_pixel(0, 0, 0), Err(Error::InvalidOperation(_))));
    assert!(framebuffer.read_pixel(1, 4, 0).is_err());
}

fn ids_framebuffer(device: &ImmediateGraphicsDevice, width: u32, height: u32) -> Arc<dyn Framebuffer> {
    device
        .create_framebuffer(FramebufferDesc {
            label: "ids".to_string(),
            width,
            height,
            color_formats: vec![TextureFormat::R32_SINT],
            depth_format: None,
        })
        .unwrap()
}

#[test]
fn test_framebuffer_resize_recreates_attachments() {
    let device = device();
    let framebuffer = ids_framebuffer(&device, 4, 4);
    let before = framebuffer.color_attachment(0).unwrap();
    assert!(framebuffer.read_pixel(0, 6, 6).is_err());

    framebuffer.resize(8, 8).unwrap();
    assert_eq!((framebuffer.desc().width, framebuffer.desc().height), (8, 8));
    let after = framebuffer.color_attachment(0).unwrap();
    assert_eq!((after.desc().width, after.desc().height), (8, 8));
    assert_eq!(framebuffer.read_pixel(0, 7, 7).unwrap(), 0);

    // References taken before the resize keep the old texture
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.desc().width, 4);
    drop(before);
    assert_eq!(device.allocated_bytes(), 8 * 8 * 4);
}

#[test]
fn test_framebuffer_resize_to_same_extent_is_noop() {
    let device = device();
    let framebuffer = ids_framebuffer(&device, 4, 4);
    let before = framebuffer.color_attachment(0).unwrap();
    framebuffer.resize(4, 4).unwrap();
    assert!(Arc::ptr_eq(&before, &framebuffer.color_attachment(0).unwrap()));
}

#[test]
fn test_rejected_framebuffer_resize_keeps_attachments() {
    let device = device();
    let framebuffer = ids_framebuffer(&device, 4, 4);
    assert!(matches!(framebuffer.resize(0, 4), Err(Error::InvalidResource(_))));

    device.set_memory_limit(Some(256));
    assert!(matches!(framebuffer.resize(16, 16), Err(Error::OutOfMemory)));
    assert_eq!(framebuffer.desc().width, 4);
    assert_eq!(framebuffer.color_attachment(0).unwrap().desc().width, 4);
    assert_eq!(device.allocated_bytes(), 4 * 4 * 4);
}

#[test]
fn test_resized_framebuffer_renders_at_new_extent() {
    let device = device();
    let framebuffer = ids_framebuffer(&device, 4, 4);
    framebuffer.resize(6, 3).unwrap();

    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    cmd.begin_rendering(RenderTarget::Framebuffer(framebuffer.as_ref())).unwrap();
    cmd.clear_attachment_int(0, 77).unwrap();
    cmd.end_rendering().unwrap();
    cmd.end().unwrap();

    assert_eq!(framebuffer.read_pixel(0, 5, 2).unwrap(), 77);
    assert!(framebuffer.read_pixel(0, 5, 3).is_err());
}

#[test]
fn test_pipeline_requires_stage_match() {
    let device = device();
    let vs = device.create_shader(shader_desc(ShaderStage::Vertex)).unwrap();
    let fs = device.create_shader(shader_desc(ShaderStage::Fragment)).unwrap();

    let mut desc = PipelineDesc::new("mesh", vs.clone(), fs.clone(), Vec::new());
    desc.target = RenderTargetLayout { color_formats: vec![TextureFormat::B8G8R8A8_SRGB], depth_format: None };
    assert!(device.create_pipeline(desc.clone()).is_ok());

    desc.vertex_shader = fs;
    assert!(device.create_pipeline(desc).is_err());
}

#[test]
fn test_empty_shader_rejected() {
    let mut desc = shader_desc(ShaderStage::Vertex);
    desc.code.clear();
    assert!(device().create_shader(desc).is_err());
}

// ============================================================================
// QUEUE AND FENCE TESTS
// ============================================================================

fn submit_empty(device: &ImmediateGraphicsDevice, fence: &dyn Fence) {
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    cmd.end().unwrap();
    fence.reset().unwrap();
    device
        .submit(&SubmitInfo { command_list: cmd.as_ref(), wait_semaphore: None, signal_semaphore: None, fence: Some(fence) })
        .unwrap();
}

#[test]
fn test_fence_signals_on_wait() {
    let device = device();
    let fence = device.create_fence(true).unwrap();
    submit_empty(&device, fence.as_ref());

    assert!(!fence.is_signaled().unwrap());
    assert_eq!(device.pending_submissions(), 1);
    assert!(fence.wait(1_000).unwrap());
    assert!(fence.is_signaled().unwrap());
    assert_eq!(device.pending_submissions(), 0);
}

#[test]
fn test_fence_wait_retires_in_submission_order() {
    let device = device();
    let first = device.create_fence(true).unwrap();
    let second = device.create_fence(true).unwrap();
    submit_empty(&device, first.as_ref());
    submit_empty(&device, second.as_ref());

    assert!(second.wait(1_000).unwrap());
    assert!(first.is_signaled().unwrap());
}

#[test]
fn test_stalled_device_times_out() {
    let device = device();
    let fence = device.create_fence(true).unwrap();
    submit_empty(&device, fence.as_ref());
    device.set_stalled(true);

    assert!(!fence.wait(1_000).unwrap());
    assert!(matches!(device.wait_idle(), Err(Error::DeviceLost(_))));

    device.set_stalled(false);
    assert!(fence.wait(1_000).unwrap());
}

#[test]
fn test_reset_of_pending_fence_rejected() {
    let device = device();
    let fence = device.create_fence(true).unwrap();
    submit_empty(&device, fence.as_ref());
    assert!(fence.reset().is_err());
}

#[test]
fn test_submit_requires_ended_command_list() {
    let device = device();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    let result = device.submit(&SubmitInfo {
        command_list: cmd.as_ref(),
        wait_semaphore: None,
        signal_semaphore: None,
        fence: None,
    });
    assert!(matches!(result, Err(Error::InvalidOperation(_))));
}

#[test]
fn test_submit_requires_unsignaled_fence() {
    let device = device();
    let fence = device.create_fence(true).unwrap();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    cmd.end().unwrap();
    let result = device.submit(&SubmitInfo {
        command_list: cmd.as_ref(),
        wait_semaphore: None,
        signal_semaphore: None,
        fence: Some(fence.as_ref()),
    });
    assert!(result.is_err());
}

#[test]
fn test_submit_wait_semaphore_must_be_signaled() {
    let device = device();
    let semaphore = device.create_semaphore().unwrap();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    cmd.end().unwrap();
    let result = device.submit(&SubmitInfo {
        command_list: cmd.as_ref(),
        wait_semaphore: Some(semaphore.as_ref()),
        signal_semaphore: None,
        fence: None,
    });
    assert!(result.is_err());
}

#[test]
fn test_wait_idle_signals_everything() {
    let device = device();
    let fences: Vec<_> = (0..3).map(|_| device.create_fence(true).unwrap()).collect();
    for fence in &fences {
        submit_empty(&device, fence.as_ref());
    }
    device.wait_idle().unwrap();
    assert!(fences.iter().all(|f| f.is_signaled().unwrap()));
    assert_eq!(device.probe().count(|e| matches!(e, DeviceEvent::FenceSignaled { .. })), 3);
    assert_eq!(device.probe().events().last(), Some(&DeviceEvent::WaitIdle));
}

#[test]
fn test_window_target_follows_requested_extent() {
    let surface = HeadlessSurface::following(crate::graphics_device::Extent2D::new(800, 600));
    let device = ImmediateGraphicsDevice::new(Arc::clone(&surface));
    assert!(device.surface().follows_swapchain());
    assert_eq!(device.surface().capabilities().current_extent, None);
}
