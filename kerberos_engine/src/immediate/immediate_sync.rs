/// Immediate fences and semaphores
///
/// Submissions sit in the device's simulated queue until someone waits: a
/// fence wait retires every submission up to and including the one carrying
/// that fence, in submission order.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{Fence, Semaphore};
use crate::immediate::{DeviceEvent, DeviceShared};
use crate::engine_warn;

pub(crate) struct FenceState {
    pub(crate) id: u64,
    pub(crate) signaled: AtomicBool,
}

pub struct ImmediateFence {
    state: Arc<FenceState>,
    shared: Arc<DeviceShared>,
}

impl ImmediateFence {
    pub(crate) fn new(shared: Arc<DeviceShared>, signaled: bool) -> Self {
        let state = Arc::new(FenceState { id: shared.next_id(), signaled: AtomicBool::new(signaled) });
        Self { state, shared }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub(crate) fn state(&self) -> &Arc<FenceState> {
        &self.state
    }
}

impl Fence for ImmediateFence {
    fn wait(&self, _timeout_ns: u64) -> Result<bool> {
        if !self.state.signaled.load(Ordering::SeqCst) {
            if self.shared.is_stalled() {
                engine_warn!("kerberos::immediate", "Fence {} wait expired on a stalled device", self.state.id);
            } else {
                self.shared.retire_through(self.state.id)?;
            }
        }
        let signaled = self.state.signaled.load(Ordering::SeqCst);
        self.shared.probe.record(DeviceEvent::FenceWaited { fence: self.state.id, signaled });
        Ok(signaled)
    }

    fn reset(&self) -> Result<()> {
        if self.shared.is_pending(self.state.id)? {
            return Err(Error::InvalidOperation(format!(
                "fence {} reset while its submission is pending",
                self.state.id
            )));
        }
        self.state.signaled.store(false, Ordering::SeqCst);
        self.shared.probe.record(DeviceEvent::FenceReset { fence: self.state.id });
        Ok(())
    }

    fn is_signaled(&self) -> Result<bool> {
        Ok(self.state.signaled.load(Ordering::SeqCst))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Binary semaphore: signaled by acquire or submit, consumed by submit or present
pub struct ImmediateSemaphore {
    id: u64,
    signaled: AtomicBool,
    shared: Arc<DeviceShared>,
}

impl ImmediateSemaphore {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self { id: shared.next_id(), signaled: AtomicBool::new(false), shared }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// Signal; a semaphore that is already signaled cannot be signaled again
    pub(crate) fn signal(&self) -> Result<()> {
        if self.signaled.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidOperation(format!(
                "semaphore {} signaled twice without a wait",
                self.id
            )));
        }
        Ok(())
    }

    /// Consume a pending signal
    pub(crate) fn consume(&self) -> Result<()> {
        if !self.signaled.swap(false, Ordering::SeqCst) {
            return Err(Error::InvalidOperation(format!(
                "wait on semaphore {} that has no pending signal",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn downcast(semaphore: &dyn Semaphore) -> Result<&ImmediateSemaphore> {
        semaphore
            .as_any()
            .downcast_ref::<ImmediateSemaphore>()
            .ok_or_else(|| Error::InvalidOperation("semaphore belongs to another backend".to_string()))
    }
}

impl Semaphore for ImmediateSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for ImmediateSemaphore {
    fn drop(&mut self) {
        let in_use = self.shared.signals_pending(self.id);
        if in_use {
            engine_warn!("kerberos::immediate", "Semaphore {} destroyed while a pending submission signals it", self.id);
        }
        self.shared.probe.record(DeviceEvent::SemaphoreDestroyed { semaphore: self.id, in_use });
    }
}
