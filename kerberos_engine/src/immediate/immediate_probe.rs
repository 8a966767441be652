/// Device probe - an ordered log of what the immediate device was asked to do

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::graphics_device::{Extent2D, PresentStatus};

/// One observable device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    CommandListBegin { command_list: u64 },
    Submitted { command_list: u64, fence: Option<u64> },
    Draw { command_list: u64, count: u32, indexed: bool },
    /// `signaled` is the outcome of the wait
    FenceWaited { fence: u64, signaled: bool },
    FenceReset { fence: u64 },
    /// The queue retired the submission carrying this fence
    FenceSignaled { fence: u64 },
    ImageAcquired { image_index: u32 },
    AcquireOutOfDate,
    ImagePresented { image_index: u32, status: PresentStatus },
    SwapchainCreated { image_count: u32, extent: Extent2D },
    SwapchainRecreated { image_count: u32, extent: Extent2D },
    /// `in_use` when a queued submission still signals it
    SemaphoreDestroyed { semaphore: u64, in_use: bool },
    WaitIdle,
}

#[derive(Default)]
pub struct DeviceProbe {
    events: Mutex<Vec<DeviceEvent>>,
    live_images: AtomicUsize,
}

impl DeviceProbe {
    pub(crate) fn record(&self, event: DeviceEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }

    /// Snapshot of every event so far
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    /// Swapchain images currently alive across all swapchains
    pub fn live_images(&self) -> usize {
        self.live_images.load(Ordering::SeqCst)
    }

    pub(crate) fn image_created(&self) {
        self.live_images.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn image_destroyed(&self) {
        self.live_images.fetch_sub(1, Ordering::SeqCst);
    }
}
