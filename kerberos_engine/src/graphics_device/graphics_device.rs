/// GraphicsDevice trait - main device interface for creating resources and submitting commands

use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, Fence, Framebuffer, FramebufferDesc, Pipeline, PipelineDesc,
    Semaphore, Shader, ShaderDesc, Swapchain, SwapchainDesc, Texture, TextureDesc,
};
use crate::renderer::BackendKind;

/// One queue submission
///
/// Waits on `wait_semaphore` at the color-attachment-output stage, then
/// signals `signal_semaphore` and `fence` when the work completes.
pub struct SubmitInfo<'a> {
    pub command_list: &'a dyn CommandList,
    pub wait_semaphore: Option<&'a dyn Semaphore>,
    pub signal_semaphore: Option<&'a dyn Semaphore>,
    pub fence: Option<&'a dyn Fence>,
}

/// Static facts about a device, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub backend: BackendKind,
    pub device_name: String,
    /// Presentation goes through a different queue family than graphics
    pub separate_present_queue: bool,
}

/// Main graphics device trait
///
/// This is the central factory interface for creating GPU resources and
/// submitting commands. A device is created for one surface by a backend
/// factory (see `BackendRegistry`) and shared as `Arc<dyn GraphicsDevice>`.
///
/// Creation failures are logged with the resource label. Zero sizes, zero
/// extents and unsupported format/usage combinations give
/// `Error::InvalidResource`; allocation failure gives `Error::OutOfMemory`.
pub trait GraphicsDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Create a buffer
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create an offscreen framebuffer and its attachment textures
    fn create_framebuffer(&self, desc: FramebufferDesc) -> Result<Arc<dyn Framebuffer>>;

    /// Create a shader
    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>>;

    /// Create a graphics pipeline
    fn create_pipeline(&self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>>;

    /// Create a command list for recording rendering commands
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>>;

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>>;

    /// Create the swapchain for the device's surface
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>>;

    /// Submit a recorded command list for execution on the GPU
    fn submit(&self, submit: &SubmitInfo<'_>) -> Result<()>;

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;
}
