/// Buffer trait and buffer descriptor

use std::any::Any;

use crate::error::{Error, Result};
use crate::graphics_device::MAX_UNIFORM_BINDINGS;

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform buffer read by shaders at `binding` (`< MAX_UNIFORM_BINDINGS`)
    Uniform { binding: u32 },
}

impl BufferUsage {
    /// Shader binding of a uniform buffer
    pub fn uniform_binding(self) -> Option<u32> {
        match self {
            BufferUsage::Uniform { binding } => Some(binding),
            _ => None,
        }
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label used in logs and validation output
    pub label: String,
    /// Size in bytes, fixed for the lifetime of the buffer
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
}

impl BufferDesc {
    pub fn new(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self { label: label.into(), size, usage }
    }

    /// Reject descriptors no backend can allocate
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidResource(format!(
                "buffer '{}': size must be greater than zero",
                self.label
            )));
        }
        if let Some(binding) = self.usage.uniform_binding() {
            if binding >= MAX_UNIFORM_BINDINGS {
                return Err(Error::InvalidResource(format!(
                    "buffer '{}': uniform binding {} out of range (max {})",
                    self.label, binding, MAX_UNIFORM_BINDINGS
                )));
            }
        }
        Ok(())
    }

    /// Check that a write of `len` bytes at `offset` fits inside the buffer
    ///
    /// Called by every backend before touching storage, so a rejected
    /// write leaves the buffer unchanged.
    pub fn validate_write(&self, offset: u64, len: usize) -> Result<()> {
        if len == 0 {
            return Err(Error::InvalidResource(format!(
                "buffer '{}': empty write",
                self.label
            )));
        }
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::InvalidResource(format!(
                "buffer '{}': write of {} bytes at offset {} exceeds capacity {}",
                self.label, len, offset, self.size
            ))),
        }
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types.
/// The buffer is destroyed when the last `Arc` is dropped; frame slots keep
/// their own `Arc` until the GPU is done with it.
pub trait Buffer: Send + Sync {
    /// Creation descriptor (never changes)
    fn desc(&self) -> &BufferDesc;

    /// Write `data` at `offset`
    ///
    /// Fails without writing anything if the range does not fit the buffer.
    /// Explicit backends stage the data and copy it on the GPU timeline
    /// before the next recorded draw.
    fn set_data(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

impl dyn Buffer {
    /// Write a slice of plain-old-data values at `offset`
    pub fn set_pod_data<T: bytemuck::Pod>(&self, offset: u64, values: &[T]) -> Result<()> {
        self.set_data(offset, bytemuck::cast_slice(values))
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
