/// ImmediateGraphicsDevice - CPU-executed implementation of GraphicsDevice
///
/// Commands take effect on CPU-side texel storage as they are recorded.
/// Submissions are still queued and retired asynchronously (on a fence wait
/// or `wait_idle`), so the frame loop sees the same fence/semaphore protocol
/// as with an explicit backend. Every operation is recorded in the
/// `DeviceProbe`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, DeviceInfo, Fence, Framebuffer, FramebufferDesc, GraphicsDevice,
    Pipeline, PipelineDesc, Semaphore, Shader, ShaderDesc, SubmitInfo, Swapchain, SwapchainDesc, Texture,
    TextureDesc,
};
use crate::immediate::{
    DeviceEvent, DeviceProbe, FenceState, HeadlessSurface, ImmediateBuffer, ImmediateCommandList, ImmediateFence,
    ImmediateFramebuffer, ImmediatePipeline, ImmediateSemaphore, ImmediateShader, ImmediateSwapchain,
    ImmediateTexture, TexelStorage,
};
use crate::renderer::{BackendKind, SurfaceTarget};
use crate::{engine_error, engine_info};

const SOURCE: &str = "kerberos::immediate";

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::BackendError(format!("{} lock poisoned", what)))
}

/// Log a creation failure with the resource label and pass the error on
pub(crate) fn creation_failed(kind: &str, label: &str, error: Error) -> Error {
    engine_error!(SOURCE, "Failed to create {} '{}': {}", kind, label, error);
    error
}

struct PendingSubmission {
    fence: Option<Arc<FenceState>>,
    /// Id of the semaphore this submission signals
    signal_semaphore: Option<u64>,
}

/// State shared by the device and every object it created
pub(crate) struct DeviceShared {
    pub(crate) probe: DeviceProbe,
    queue: Mutex<VecDeque<PendingSubmission>>,
    stalled: AtomicBool,
    memory_limit: AtomicU64,
    allocated: AtomicU64,
    next_id: AtomicU64,
}

impl DeviceShared {
    fn new() -> Self {
        Self {
            probe: DeviceProbe::default(),
            queue: Mutex::new(VecDeque::new()),
            stalled: AtomicBool::new(false),
            memory_limit: AtomicU64::new(u64::MAX),
            allocated: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Whether a queued submission carries fence `fence_id`
    pub(crate) fn is_pending(&self, fence_id: u64) -> Result<bool> {
        let queue = lock(&self.queue, "queue")?;
        Ok(queue
            .iter()
            .any(|submission| submission.fence.as_ref().is_some_and(|f| f.id == fence_id)))
    }

    fn retire_front(&self, queue: &mut VecDeque<PendingSubmission>) -> Option<u64> {
        let submission = queue.pop_front()?;
        let fence = submission.fence?;
        fence.signaled.store(true, Ordering::SeqCst);
        self.probe.record(DeviceEvent::FenceSignaled { fence: fence.id });
        Some(fence.id)
    }

    /// Complete submissions in order until the one carrying `fence_id`
    pub(crate) fn retire_through(&self, fence_id: u64) -> Result<()> {
        let mut queue = lock(&self.queue, "queue")?;
        let position = queue
            .iter()
            .position(|submission| submission.fence.as_ref().is_some_and(|f| f.id == fence_id));
        if let Some(position) = position {
            for _ in 0..=position {
                self.retire_front(&mut queue);
            }
        }
        Ok(())
    }

    /// Complete every queued submission
    pub(crate) fn retire_all(&self) -> Result<()> {
        if self.is_stalled() {
            return Err(Error::DeviceLost("device stopped making progress".to_string()));
        }
        let mut queue = lock(&self.queue, "queue")?;
        while !queue.is_empty() {
            self.retire_front(&mut queue);
        }
        Ok(())
    }

    fn enqueue(&self, fence: Option<Arc<FenceState>>, signal_semaphore: Option<u64>) -> Result<()> {
        lock(&self.queue, "queue")?.push_back(PendingSubmission { fence, signal_semaphore });
        Ok(())
    }

    /// Whether a queued submission still signals semaphore `semaphore_id`
    pub(crate) fn signals_pending(&self, semaphore_id: u64) -> bool {
        let queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        queue.iter().any(|submission| submission.signal_semaphore == Some(semaphore_id))
    }

    fn pending(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Account `bytes` of device memory against the configured limit
    pub(crate) fn reserve(self: &Arc<Self>, bytes: u64) -> Result<MemoryReservation> {
        let limit = self.memory_limit.load(Ordering::SeqCst);
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |allocated| {
                allocated.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map_err(|_| Error::OutOfMemory)?;
        Ok(MemoryReservation { shared: self.clone(), bytes })
    }
}

/// Device memory owned by one resource; released on drop
pub(crate) struct MemoryReservation {
    shared: Arc<DeviceShared>,
    bytes: u64,
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.shared.allocated.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// CPU-executed graphics device
pub struct ImmediateGraphicsDevice {
    info: DeviceInfo,
    shared: Arc<DeviceShared>,
    surface: Arc<HeadlessSurface>,
}

impl ImmediateGraphicsDevice {
    /// Device presenting to `surface`
    pub fn new(surface: Arc<HeadlessSurface>) -> Self {
        engine_info!(SOURCE, "Immediate device created ({}x{} surface)", surface.extent().width, surface.extent().height);
        Self {
            info: DeviceInfo {
                backend: BackendKind::Immediate,
                device_name: "Kerberos immediate device".to_string(),
                separate_present_queue: false,
            },
            shared: Arc::new(DeviceShared::new()),
            surface,
        }
    }

    /// Device for a renderer surface target
    ///
    /// Platform windows are not drawn into: their swapchain images live in
    /// CPU memory at whatever extent the renderer requests.
    pub fn for_target(target: &SurfaceTarget<'_>) -> Self {
        match target {
            SurfaceTarget::Headless(surface) => Self::new(surface.clone()),
            SurfaceTarget::Window { .. } => Self::new(HeadlessSurface::following(target.extent())),
        }
    }

    pub fn probe(&self) -> &DeviceProbe {
        &self.shared.probe
    }

    pub fn surface(&self) -> &Arc<HeadlessSurface> {
        &self.surface
    }

    /// Stop retiring work: fence waits time out and `wait_idle` fails
    pub fn set_stalled(&self, stalled: bool) {
        self.shared.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Cap total resource memory; `None` removes the cap
    pub fn set_memory_limit(&self, limit: Option<u64>) {
        self.shared.memory_limit.store(limit.unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.shared.allocated.load(Ordering::SeqCst)
    }

    /// Submissions not yet retired
    pub fn pending_submissions(&self) -> usize {
        self.shared.pending()
    }

    fn create_texture_storage(&self, desc: TextureDesc) -> Result<Arc<TexelStorage>> {
        desc.validate()?;
        let memory = self.shared.reserve(desc.byte_size())?;
        Ok(Arc::new(TexelStorage::new(desc, memory)))
    }
}

impl GraphicsDevice for ImmediateGraphicsDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        let label = desc.label.clone();
        let build = || -> Result<Arc<dyn Buffer>> {
            desc.validate()?;
            let memory = self.shared.reserve(desc.size)?;
            Ok(Arc::new(ImmediateBuffer::new(desc, memory)))
        };
        build().map_err(|e| creation_failed("buffer", &label, e))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        let label = desc.label.clone();
        let storage = self
            .create_texture_storage(desc)
            .map_err(|e| creation_failed("texture", &label, e))?;
        Ok(Arc::new(ImmediateTexture::new(storage)))
    }

    fn create_framebuffer(&self, desc: FramebufferDesc) -> Result<Arc<dyn Framebuffer>> {
        let label = desc.label.clone();
        let framebuffer = ImmediateFramebuffer::new(desc, self.shared.clone())
            .map_err(|e| creation_failed("framebuffer", &label, e))?;
        Ok(Arc::new(framebuffer))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        let label = desc.label.clone();
        desc.validate().map_err(|e| creation_failed("shader", &label, e))?;
        Ok(Arc::new(ImmediateShader::new(desc)))
    }

    fn create_pipeline(&self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        let label = desc.label.clone();
        let build = || -> Result<Arc<dyn Pipeline>> {
            desc.validate()?;
            for shader in [&desc.vertex_shader, &desc.fragment_shader] {
                if shader.as_any().downcast_ref::<ImmediateShader>().is_none() {
                    return Err(Error::InvalidResource(format!(
                        "shader '{}' belongs to another backend",
                        shader.label()
                    )));
                }
            }
            Ok(Arc::new(ImmediatePipeline::new(desc)))
        };
        build().map_err(|e| creation_failed("pipeline", &label, e))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(ImmediateCommandList::new(self.shared.clone())))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>> {
        Ok(Box::new(ImmediateFence::new(self.shared.clone(), signaled)))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>> {
        Ok(Box::new(ImmediateSemaphore::new(self.shared.clone())))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn Swapchain>> {
        let swapchain = ImmediateSwapchain::new(self.shared.clone(), self.surface.clone(), desc)
            .map_err(|e| creation_failed("swapchain", "swapchain", e))?;
        Ok(Box::new(swapchain))
    }

    fn submit(&self, submit: &SubmitInfo<'_>) -> Result<()> {
        let command_list = submit
            .command_list
            .as_any()
            .downcast_ref::<ImmediateCommandList>()
            .ok_or_else(|| Error::InvalidOperation("command list belongs to another backend".to_string()))?;
        if !command_list.is_executable() {
            return Err(Error::InvalidOperation(format!(
                "command list {} submitted before end()",
                command_list.id()
            )));
        }

        let fence = match submit.fence {
            Some(fence) => {
                let fence = fence
                    .as_any()
                    .downcast_ref::<ImmediateFence>()
                    .ok_or_else(|| Error::InvalidOperation("fence belongs to another backend".to_string()))?;
                if fence.is_signaled()? {
                    return Err(Error::InvalidOperation(format!(
                        "fence {} submitted while still signaled",
                        fence.id()
                    )));
                }
                Some(fence.state().clone())
            }
            None => None,
        };
        if let Some(wait) = submit.wait_semaphore {
            ImmediateSemaphore::downcast(wait)?.consume()?;
        }
        let signal_semaphore = match submit.signal_semaphore {
            Some(signal) => {
                let signal = ImmediateSemaphore::downcast(signal)?;
                signal.signal()?;
                Some(signal.id())
            }
            None => None,
        };

        let fence_id = fence.as_ref().map(|f| f.id);
        self.shared.enqueue(fence, signal_semaphore)?;
        self.shared.probe.record(DeviceEvent::Submitted { command_list: command_list.id(), fence: fence_id });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.shared.retire_all()?;
        self.shared.probe.record(DeviceEvent::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
#[path = "immediate_device_tests.rs"]
mod tests;
