/// Frame synchronizer - the ring of frame slots
///
/// Each slot owns a command list, an in-flight fence (created signaled), an
/// image-available semaphore, a render-finished semaphore and the resources
/// its last submission referenced. Slot `i` is reused only after its fence
/// has been observed signaled, which is also the moment its retained
/// resources are released.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, CommandList, Fence, Framebuffer, GraphicsDevice, Pipeline, Semaphore, SubmitInfo, Texture,
    VertexArray,
};
use crate::{engine_error, engine_trace};

const SOURCE: &str = "kerberos::frame_sync";

/// A resource kept alive until the GPU is done with a slot
#[derive(Clone)]
pub enum RetainedResource {
    Buffer(Arc<dyn Buffer>),
    Texture(Arc<dyn Texture>),
    Framebuffer(Arc<dyn Framebuffer>),
    Pipeline(Arc<dyn Pipeline>),
    VertexArray(Arc<VertexArray>),
}

struct FrameSlot {
    command_list: Box<dyn CommandList>,
    in_flight: Box<dyn Fence>,
    image_available: Box<dyn Semaphore>,
    render_finished: Box<dyn Semaphore>,
    retained: Vec<RetainedResource>,
}

pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    current: usize,
    fence_timeout_ns: u64,
    submitted: u64,
    device: Arc<dyn GraphicsDevice>,
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` slots with signaled fences
    pub fn new(device: Arc<dyn GraphicsDevice>, frames_in_flight: u32, fence_timeout_ns: u64) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InitializationFailed("frames_in_flight must be at least 1".to_string()));
        }
        let slots = (0..frames_in_flight)
            .map(|_| {
                Ok(FrameSlot {
                    command_list: device.create_command_list()?,
                    in_flight: device.create_fence(true)?,
                    image_available: device.create_semaphore()?,
                    render_finished: device.create_semaphore()?,
                    retained: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots, current: 0, fence_timeout_ns, submitted: 0, device })
    }

    /// Number of slots (K)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Total submissions so far
    pub fn submitted_frames(&self) -> u64 {
        self.submitted
    }

    /// Block until the current slot's previous submission has completed
    ///
    /// Expiry of the timeout means the GPU stopped making progress and is
    /// reported as `Error::DeviceLost`. On success the slot's retained
    /// resources are released.
    pub fn wait_for_current(&mut self) -> Result<()> {
        let index = self.current;
        let slot = &mut self.slots[index];
        engine_trace!(SOURCE, "Waiting on slot {}", index);
        if !slot.in_flight.wait(self.fence_timeout_ns)? {
            engine_error!(
                SOURCE,
                "Fence of slot {} not signaled after {} ns",
                index,
                self.fence_timeout_ns
            );
            return Err(Error::DeviceLost(format!(
                "fence wait on frame slot {} timed out",
                index
            )));
        }
        slot.retained.clear();
        Ok(())
    }

    pub fn command_list_mut(&mut self) -> &mut dyn CommandList {
        self.slots[self.current].command_list.as_mut()
    }

    pub fn image_available(&self) -> &dyn Semaphore {
        self.slots[self.current].image_available.as_ref()
    }

    pub fn render_finished(&self) -> &dyn Semaphore {
        self.slots[self.current].render_finished.as_ref()
    }

    /// Keep `resource` alive until the current slot's fence next signals
    pub fn retain(&mut self, resource: RetainedResource) {
        self.slots[self.current].retained.push(resource);
    }

    pub fn retained_count(&self) -> usize {
        self.slots[self.current].retained.len()
    }

    /// Reset the current fence and submit the current command list
    ///
    /// The submission waits on image-available and signals render-finished
    /// plus the fence.
    pub fn submit_current(&mut self) -> Result<()> {
        let slot = &self.slots[self.current];
        slot.in_flight.reset()?;
        self.device.submit(&SubmitInfo {
            command_list: slot.command_list.as_ref(),
            wait_semaphore: Some(slot.image_available.as_ref()),
            signal_semaphore: Some(slot.render_finished.as_ref()),
            fence: Some(slot.in_flight.as_ref()),
        })?;
        self.submitted += 1;
        engine_trace!(SOURCE, "Submitted slot {} (frame {})", self.current, self.submitted);
        Ok(())
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// New image-available semaphore for the current slot
    ///
    /// Needed after an acquired image is discarded: the old semaphore is
    /// signaled with no pending wait and cannot be handed to acquire again.
    pub fn replace_image_available(&mut self) -> Result<()> {
        let semaphore = self.device.create_semaphore()?;
        self.slots[self.current].image_available = semaphore;
        Ok(())
    }

    /// New render-finished semaphore for the current slot
    pub fn replace_render_finished(&mut self) -> Result<()> {
        let semaphore = self.device.create_semaphore()?;
        self.slots[self.current].render_finished = semaphore;
        Ok(())
    }

    /// Number of slots whose fence is unsignaled
    pub fn in_flight_count(&self) -> Result<usize> {
        let mut count = 0;
        for slot in &self.slots {
            if !slot.in_flight.is_signaled()? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Drop every slot's retained resources
    ///
    /// Only valid once the device is idle.
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.retained.clear();
        }
    }
}

#[cfg(test)]
#[path = "frame_sync_tests.rs"]
mod tests;
