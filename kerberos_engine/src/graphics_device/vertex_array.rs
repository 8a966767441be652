/// VertexArray - vertex buffers plus an optional index buffer drawn together

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferUsage, IndexType};

/// Backend-agnostic aggregate of the buffers a draw call consumes
///
/// Vertex buffers are bound in insertion order (binding 0, 1, ...), matching
/// `PipelineDesc::vertex_layouts`.
pub struct VertexArray {
    label: String,
    vertex_buffers: Vec<Arc<dyn Buffer>>,
    index_buffer: Option<(Arc<dyn Buffer>, IndexType)>,
}

impl VertexArray {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), vertex_buffers: Vec::new(), index_buffer: None }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append a vertex buffer at the next binding index
    pub fn add_vertex_buffer(&mut self, buffer: Arc<dyn Buffer>) -> Result<()> {
        if buffer.desc().usage != BufferUsage::Vertex {
            return Err(Error::InvalidResource(format!(
                "vertex array '{}': buffer '{}' is not a vertex buffer",
                self.label,
                buffer.desc().label
            )));
        }
        self.vertex_buffers.push(buffer);
        Ok(())
    }

    /// Set (or replace) the index buffer
    pub fn set_index_buffer(&mut self, buffer: Arc<dyn Buffer>, index_type: IndexType) -> Result<()> {
        let desc = buffer.desc();
        if desc.usage != BufferUsage::Index {
            return Err(Error::InvalidResource(format!(
                "vertex array '{}': buffer '{}' is not an index buffer",
                self.label, desc.label
            )));
        }
        if desc.size % index_type.size_bytes() as u64 != 0 {
            return Err(Error::InvalidResource(format!(
                "vertex array '{}': index buffer size {} is not a multiple of {:?}",
                self.label, desc.size, index_type
            )));
        }
        self.index_buffer = Some((buffer, index_type));
        Ok(())
    }

    pub fn vertex_buffers(&self) -> &[Arc<dyn Buffer>] {
        &self.vertex_buffers
    }

    pub fn index_buffer(&self) -> Option<&(Arc<dyn Buffer>, IndexType)> {
        self.index_buffer.as_ref()
    }

    /// Number of indices the index buffer holds, 0 without one
    pub fn index_count(&self) -> u32 {
        match &self.index_buffer {
            Some((buffer, index_type)) => (buffer.desc().size / index_type.size_bytes() as u64) as u32,
            None => 0,
        }
    }
}

impl std::fmt::Debug for VertexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexArray")
            .field("label", &self.label)
            .field("vertex_buffers", &self.vertex_buffers.len())
            .field("index_count", &self.index_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "vertex_array_tests.rs"]
mod tests;
