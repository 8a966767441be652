/// Buffer - Vulkan implementation of the Buffer trait
///
/// Vertex and index buffers live in device-local memory. `set_data` stages
/// the bytes in host-visible memory and queues a copy that the next command
/// list records before any draw.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::{AllocationError, MemoryLocation};
use kerberos_engine::kerberos::render::{Buffer, BufferDesc};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_err, engine_error, engine_warn};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{buffer_read_scope, buffer_usage_to_vk};
use crate::vulkan_upload::PendingUpload;

/// A VkBuffer plus its memory, freed explicitly with `release`
///
/// Used for device buffers, staging and read-back. It holds no context
/// reference so it can sit in the context's own upload queue.
pub(crate) struct RawBuffer {
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub(crate) size: u64,
}

impl RawBuffer {
    pub(crate) fn new(
        ctx: &GpuContext,
        label: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create buffer '{}' ({} bytes): {:?}", label, size, e);
                match e {
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                        Error::OutOfMemory
                    }
                    _ => Error::BackendError(format!("Failed to create buffer '{}': {:?}", label, e)),
                }
            })?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = match ctx.allocator.lock() {
                    Ok(allocator) => allocator,
                    Err(_) => {
                        ctx.device.destroy_buffer(buffer, None);
                        return Err(engine_err!(LOG_SOURCE, "Allocator lock poisoned"));
                    }
                };
                allocator.allocate(&AllocationCreateDesc {
                    name: label,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(match e {
                        AllocationError::OutOfMemory => {
                            engine_error!(LOG_SOURCE, "Out of GPU memory allocating buffer '{}' ({} bytes)", label, size);
                            Error::OutOfMemory
                        }
                        e => engine_err!(LOG_SOURCE, "Failed to allocate memory for buffer '{}': {:?}", label, e),
                    });
                }
            };

            let mut raw = Self { buffer, allocation: Some(allocation), size };
            let bind = match &raw.allocation {
                Some(allocation) => ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()),
                None => Ok(()),
            };
            if let Err(e) = bind {
                raw.release(ctx);
                return Err(engine_err!(LOG_SOURCE, "Failed to bind memory for buffer '{}': {:?}", label, e));
            }
            Ok(raw)
        }
    }

    /// Copy `data` into host-visible memory at `offset`
    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| engine_err!(LOG_SOURCE, "Buffer is not CPU-accessible"))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > mapped.len() {
            return Err(engine_err!(LOG_SOURCE, "Mapped write of {} bytes at {} overruns {}", data.len(), start, mapped.len()));
        }
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of host-visible memory at `offset`
    pub(crate) fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mapped = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_else(|| engine_err!(LOG_SOURCE, "Buffer is not CPU-accessible"))?;
        let start = offset as usize;
        mapped
            .get(start..start + len)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| engine_err!(LOG_SOURCE, "Mapped read of {} bytes at {} overruns {}", len, start, mapped.len()))
    }

    /// Free memory and destroy the buffer
    pub(crate) fn release(mut self, ctx: &GpuContext) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                match ctx.allocator.lock() {
                    Ok(mut allocator) => {
                        if let Err(e) = allocator.free(allocation) {
                            engine_warn!(LOG_SOURCE, "Failed to free buffer memory: {:?}", e);
                        }
                    }
                    Err(_) => engine_warn!(LOG_SOURCE, "Allocator lock poisoned, leaking buffer memory"),
                }
            }
            ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    desc: BufferDesc,
    raw: Option<RawBuffer>,
}

impl VulkanBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: BufferDesc) -> Result<Self> {
        desc.validate().map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let usage = buffer_usage_to_vk(desc.usage) | vk::BufferUsageFlags::TRANSFER_DST;

        let raw = RawBuffer::new(&ctx, &desc.label, desc.size, usage, MemoryLocation::GpuOnly)?;
        Ok(Self { ctx, desc, raw: Some(raw) })
    }

    pub(crate) fn vk_buffer(&self) -> vk::Buffer {
        self.raw.as_ref().map(|raw| raw.buffer).unwrap_or_default()
    }
}

impl Buffer for VulkanBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn set_data(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.desc.validate_write(offset, data.len()).map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let mut staging = RawBuffer::new(
            &self.ctx,
            &format!("{} (staging)", self.desc.label),
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(e) = staging.write(0, data) {
            staging.release(&self.ctx);
            return Err(e);
        }

        let upload = PendingUpload::buffer(self.vk_buffer(), offset, buffer_read_scope(self.desc.usage), staging);
        match self.ctx.pending_uploads.lock() {
            Ok(mut pending) => {
                pending.push(upload);
                Ok(())
            }
            Err(_) => {
                upload.release(&self.ctx);
                Err(engine_err!(LOG_SOURCE, "Upload queue lock poisoned"))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            crate::vulkan_upload::cancel_uploads(&self.ctx, |upload| upload.targets_buffer(raw.buffer));
            raw.release(&self.ctx);
        }
    }
}

/// Downcast an engine buffer; buffers from another backend are rejected
pub(crate) fn vk_buffer(buffer: &dyn Buffer) -> Result<&VulkanBuffer> {
    buffer
        .as_any()
        .downcast_ref::<VulkanBuffer>()
        .ok_or_else(|| Error::InvalidOperation(format!("buffer '{}' does not belong to the Vulkan backend", buffer.desc().label)))
}
