/*!
# Kerberos Engine - Vulkan Renderer Backend

Vulkan implementation of the Kerberos render-backend traits.

This crate implements the `kerberos_engine` device and resource traits with
`ash` for Vulkan bindings and `gpu-allocator` for memory management. It needs
Vulkan 1.3 (dynamic rendering) and `VK_KHR_push_descriptor`.

The backend is selected at runtime through a `BackendRegistry`:

```no_run
use kerberos_engine::kerberos::{BackendRegistry, RendererConfig};

let mut registry = BackendRegistry::with_default_backends();
kerberos_engine_renderer_vulkan::register(&mut registry);
let config = RendererConfig::load_from_path("kerberos.toml").unwrap_or_default();
```
*/

mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_context;
mod vulkan_device;
mod vulkan_format;
mod vulkan_frame_buffer;
mod vulkan_pipeline;
mod vulkan_shader;
mod vulkan_swapchain;
mod vulkan_sync;
mod vulkan_texture;
mod vulkan_upload;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_device::VulkanGraphicsDevice;
pub use vulkan_frame_buffer::VulkanFramebuffer;
pub use vulkan_pipeline::VulkanPipeline;
pub use vulkan_shader::VulkanShader;
pub use vulkan_swapchain::VulkanSwapchain;
pub use vulkan_sync::{VulkanFence, VulkanSemaphore};
pub use vulkan_texture::VulkanTexture;

// Validation statistics (only with the vulkan-validation feature)
#[cfg(feature = "vulkan-validation")]
pub use debug::{print_validation_stats_report, validation_stats, ValidationStats};

use kerberos_engine::engine_error;
use kerberos_engine::kerberos::render::GraphicsDevice;
use kerberos_engine::kerberos::{BackendKind, BackendRegistry, Error, SurfaceTarget};
use std::sync::Arc;

/// Register the Vulkan backend factory
///
/// The factory needs a real window; a headless target is rejected with
/// `Error::UnsupportedBackend`.
pub fn register(registry: &mut BackendRegistry) {
    registry.register(
        BackendKind::Vulkan,
        Box::new(|surface, config| match surface {
            SurfaceTarget::Window { window, .. } => {
                let device: Arc<dyn GraphicsDevice> = Arc::new(VulkanGraphicsDevice::new(*window, config)?);
                Ok(device)
            }
            SurfaceTarget::Headless(_) => {
                engine_error!(vulkan_context::LOG_SOURCE, "The Vulkan backend cannot present to a headless surface");
                Err(Error::UnsupportedBackend("vulkan requires a window surface".to_string()))
            }
        }),
    );
}
