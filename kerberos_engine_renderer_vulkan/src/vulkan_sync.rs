/// Fence and semaphore - Vulkan implementations of the sync traits

use ash::vk;
use kerberos_engine::kerberos::render::{Fence, Semaphore};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::{engine_err, engine_error};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};

pub struct VulkanFence {
    ctx: Arc<GpuContext>,
    pub(crate) fence: vk::Fence,
}

impl VulkanFence {
    pub(crate) fn new(ctx: Arc<GpuContext>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe {
            ctx.device.create_fence(&create_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create fence: {:?}", e);
                if e == vk::Result::ERROR_OUT_OF_HOST_MEMORY || e == vk::Result::ERROR_OUT_OF_DEVICE_MEMORY {
                    Error::OutOfMemory
                } else {
                    Error::BackendError(format!("Failed to create fence: {:?}", e))
                }
            })?
        };
        Ok(Self { ctx, fence })
    }
}

impl Fence for VulkanFence {
    fn wait(&self, timeout_ns: u64) -> Result<bool> {
        unsafe {
            match self.ctx.device.wait_for_fences(&[self.fence], true, timeout_ns) {
                Ok(()) => Ok(true),
                Err(vk::Result::TIMEOUT) => Ok(false),
                Err(vk::Result::ERROR_DEVICE_LOST) => {
                    engine_error!(LOG_SOURCE, "Device lost while waiting for fence");
                    Err(Error::DeviceLost("device lost while waiting for fence".to_string()))
                }
                Err(e) => Err(engine_err!(LOG_SOURCE, "Failed to wait for fence: {:?}", e)),
            }
        }
    }

    fn reset(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_fences(&[self.fence])
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to reset fence: {:?}", e))
        }
    }

    fn is_signaled(&self) -> Result<bool> {
        unsafe {
            self.ctx
                .device
                .get_fence_status(self.fence)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to query fence status: {:?}", e))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_fence(self.fence, None);
        }
    }
}

pub struct VulkanSemaphore {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanSemaphore {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            ctx.device.create_semaphore(&create_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create semaphore: {:?}", e);
                Error::BackendError(format!("Failed to create semaphore: {:?}", e))
            })?
        };
        Ok(Self { ctx, semaphore })
    }
}

impl Semaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Downcast an engine fence; fences from another backend are rejected
pub(crate) fn vk_fence(fence: &dyn Fence) -> Result<vk::Fence> {
    fence
        .as_any()
        .downcast_ref::<VulkanFence>()
        .map(|f| f.fence)
        .ok_or_else(|| Error::InvalidOperation("fence does not belong to the Vulkan backend".to_string()))
}

/// Downcast an engine semaphore; semaphores from another backend are rejected
pub(crate) fn vk_semaphore(semaphore: &dyn Semaphore) -> Result<vk::Semaphore> {
    semaphore
        .as_any()
        .downcast_ref::<VulkanSemaphore>()
        .map(|s| s.semaphore)
        .ok_or_else(|| Error::InvalidOperation("semaphore does not belong to the Vulkan backend".to_string()))
}
