//! Unit tests for vertex_array.rs

use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{Buffer, BufferDesc, BufferUsage, IndexType, VertexArray};

struct TestBuffer {
    desc: BufferDesc,
}

impl Buffer for TestBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn set_data(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.desc.validate_write(offset, data.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn buffer(size: u64, usage: BufferUsage) -> Arc<dyn Buffer> {
    Arc::new(TestBuffer { desc: BufferDesc::new("test", size, usage) })
}

// ============================================================================
// VERTEX BUFFER TESTS
// ============================================================================

#[test]
fn test_vertex_buffers_keep_binding_order() {
    let mut vao = VertexArray::new("quad");
    let positions = buffer(48, BufferUsage::Vertex);
    let uvs = buffer(32, BufferUsage::Vertex);
    vao.add_vertex_buffer(positions.clone()).unwrap();
    vao.add_vertex_buffer(uvs.clone()).unwrap();
    assert_eq!(vao.vertex_buffers().len(), 2);
    assert!(Arc::ptr_eq(&vao.vertex_buffers()[0], &positions));
    assert!(Arc::ptr_eq(&vao.vertex_buffers()[1], &uvs));
}

#[test]
fn test_index_buffer_rejected_as_vertex_buffer() {
    let mut vao = VertexArray::new("quad");
    assert!(vao.add_vertex_buffer(buffer(12, BufferUsage::Index)).is_err());
    assert!(vao.vertex_buffers().is_empty());
}

// ============================================================================
// INDEX BUFFER TESTS
// ============================================================================

#[test]
fn test_index_count_u16() {
    let mut vao = VertexArray::new("quad");
    vao.set_index_buffer(buffer(12, BufferUsage::Index), IndexType::U16).unwrap();
    assert_eq!(vao.index_count(), 6);
}

#[test]
fn test_index_count_u32() {
    let mut vao = VertexArray::new("quad");
    vao.set_index_buffer(buffer(24, BufferUsage::Index), IndexType::U32).unwrap();
    assert_eq!(vao.index_count(), 6);
}

#[test]
fn test_no_index_buffer_counts_zero() {
    let vao = VertexArray::new("points");
    assert_eq!(vao.index_count(), 0);
    assert!(vao.index_buffer().is_none());
}

#[test]
fn test_misaligned_index_buffer_rejected() {
    let mut vao = VertexArray::new("quad");
    assert!(vao.set_index_buffer(buffer(10, BufferUsage::Index), IndexType::U32).is_err());
    assert!(vao.index_buffer().is_none());
}

#[test]
fn test_vertex_buffer_rejected_as_index_buffer() {
    let mut vao = VertexArray::new("quad");
    assert!(vao.set_index_buffer(buffer(12, BufferUsage::Vertex), IndexType::U16).is_err());
}
