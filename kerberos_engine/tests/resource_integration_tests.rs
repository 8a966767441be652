//! Integration tests for resource creation and upload
//!
//! Resources are created through the renderer's device, the way an
//! application would, on the immediate backend. No GPU required.
//!
//! Run with: cargo test --test resource_integration_tests

use std::sync::Arc;

use kerberos_engine::glam::Vec3;
use kerberos_engine::kerberos::immediate::{HeadlessSurface, ImmediateBuffer, ImmediateGraphicsDevice, ImmediateTexture};
use kerberos_engine::kerberos::render::{
    BufferDesc, BufferUsage, Extent2D, FramebufferDesc, GraphicsDevice, IndexType, PipelineDesc, ShaderDesc, ShaderStage,
    Texture, TextureDesc, TextureFormat, TextureUsage, VertexArray, VertexFormat, VertexLayout,
};
use kerberos_engine::kerberos::{BackendKind, Error, FrameStatus, Renderer, RendererConfig};

fn renderer() -> (Arc<ImmediateGraphicsDevice>, Renderer) {
    let device = Arc::new(ImmediateGraphicsDevice::new(HeadlessSurface::new(128, 128)));
    let config = RendererConfig { backend: BackendKind::Immediate, frames_in_flight: 2, ..Default::default() };
    let renderer = Renderer::with_device(device.clone(), Extent2D::new(128, 128), config).unwrap();
    (device, renderer)
}

fn texels(texture: &Arc<dyn Texture>) -> Vec<u8> {
    texture.as_any().downcast_ref::<ImmediateTexture>().unwrap().read_data().unwrap()
}

// ============================================================================
// TEXTURE TESTS
// ============================================================================

#[test]
fn test_integration_wrong_size_texture_upload() {
    let (_device, renderer) = renderer();
    let texture = renderer
        .device()
        .create_texture(TextureDesc::new("albedo", 64, 64, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled))
        .unwrap();
    assert_eq!(texture.desc().byte_size(), 64 * 64 * 4);

    let original: Vec<u8> = (0..64 * 64 * 4).map(|i| (i % 251) as u8).collect();
    texture.set_data(&original).unwrap();

    let result = texture.set_data(&vec![0u8; 64 * 64 * 3]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(texels(&texture), original);
}

#[test]
fn test_integration_depth_texture_not_uploadable() {
    let (_device, renderer) = renderer();
    let depth = renderer
        .device()
        .create_texture(TextureDesc::new("shadow", 32, 32, TextureFormat::D32_FLOAT, TextureUsage::DepthStencil))
        .unwrap();
    assert!(depth.set_data(&vec![0u8; 32 * 32 * 4]).is_err());
}

#[test]
fn test_integration_bound_texture_outlives_application_handle() {
    let (device, mut renderer) = renderer();
    let texture = device
        .create_texture(TextureDesc::new("decal", 4, 4, TextureFormat::R8G8B8A8_UNORM, TextureUsage::Sampled))
        .unwrap();

    match renderer.begin_frame().unwrap() {
        FrameStatus::Ready(_) => {}
        other => panic!("frame not ready: {:?}", other),
    }
    renderer.bind_texture(0, &texture).unwrap();
    renderer.end_frame().unwrap();
    renderer.present().unwrap();

    // The frame slot keeps it alive until its fence is observed
    assert!(Arc::strong_count(&texture) > 1);

    for _ in 0..2 {
        assert!(matches!(renderer.begin_frame().unwrap(), FrameStatus::Ready(_)));
        renderer.end_frame().unwrap();
        renderer.present().unwrap();
    }
    assert_eq!(Arc::strong_count(&texture), 1);
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
fn test_integration_pod_upload() {
    let (_device, renderer) = renderer();
    let buffer = renderer
        .device()
        .create_buffer(BufferDesc::new("positions", 36, BufferUsage::Vertex))
        .unwrap();

    let positions = [Vec3::new(0.0, 1.0, 0.0), Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0)];
    buffer.set_pod_data(0, &positions).unwrap();

    let bytes = buffer.as_any().downcast_ref::<ImmediateBuffer>().unwrap().read_data().unwrap();
    assert_eq!(&bytes[..], bytemuck::cast_slice::<Vec3, u8>(&positions));

    // One vertex too many
    assert!(buffer.set_pod_data(12, &positions).is_err());
}

#[test]
fn test_integration_out_of_memory() {
    let (device, renderer) = renderer();
    let baseline = device.allocated_bytes();
    device.set_memory_limit(Some(baseline + 4096));

    let big = renderer.device().create_buffer(BufferDesc::new("big", 8192, BufferUsage::Vertex));
    assert!(matches!(big, Err(Error::OutOfMemory)));
    assert!(!Error::OutOfMemory.is_fatal());

    assert!(renderer.device().create_buffer(BufferDesc::new("small", 1024, BufferUsage::Vertex)).is_ok());
}

// ============================================================================
// FRAMEBUFFER / DRAW TESTS
// ============================================================================

#[test]
fn test_integration_object_id_picking() {
    let (_device, mut renderer) = renderer();
    let device = renderer.device().clone();

    let ids = device
        .create_framebuffer(FramebufferDesc {
            label: "object ids".to_string(),
            width: 32,
            height: 32,
            color_formats: vec![TextureFormat::R32_SINT],
            depth_format: Some(TextureFormat::D32_FLOAT),
        })
        .unwrap();

    let shader = |stage| {
        device
            .create_shader(ShaderDesc { label: "id".to_string(), code: vec![0; 4], stage, entry_point: "main".to_string() })
            .unwrap()
    };
    let pipeline = PipelineDesc::new(
        "id pass",
        shader(ShaderStage::Vertex),
        shader(ShaderStage::Fragment),
        vec![VertexLayout::packed(&[VertexFormat::Float3])],
    );

    let vertices = device.create_buffer(BufferDesc::new("quad", 48, BufferUsage::Vertex)).unwrap();
    let indices = device.create_buffer(BufferDesc::new("quad indices", 24, BufferUsage::Index)).unwrap();
    indices.set_pod_data(0, &[0u32, 1, 2, 2, 3, 0]).unwrap();
    let mut quad = VertexArray::new("quad");
    quad.add_vertex_buffer(vertices).unwrap();
    quad.set_index_buffer(indices, IndexType::U32).unwrap();
    let quad = Arc::new(quad);
    assert_eq!(quad.index_count(), 6);

    assert!(matches!(renderer.begin_frame().unwrap(), FrameStatus::Ready(_)));
    renderer.bind_framebuffer(Some(ids.clone())).unwrap();
    renderer.clear_attachment(0, -1).unwrap();
    renderer.clear_depth().unwrap();
    renderer.bind_pipeline(pipeline).unwrap();
    renderer.draw_indexed(&quad, 0).unwrap();
    renderer.clear_attachment(0, 7).unwrap();
    renderer.end_frame().unwrap();
    renderer.present().unwrap();
    renderer.wait_idle().unwrap();

    assert_eq!(ids.read_pixel(0, 0, 0).unwrap(), 7);
    assert_eq!(ids.read_pixel(0, 31, 31).unwrap(), 7);
    assert!(ids.read_pixel(0, 32, 0).is_err());
    assert_eq!(renderer.stats().draw_calls, 1);
}
