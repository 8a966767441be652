/// CPU/GPU synchronization primitives

use std::any::Any;

use crate::error::Result;

/// CPU-observable completion signal for a submission
pub trait Fence: Send + Sync {
    /// Block until the fence is signaled or `timeout_ns` expires
    ///
    /// Returns `Ok(false)` on timeout.
    fn wait(&self, timeout_ns: u64) -> Result<bool>;

    /// Return the fence to the unsignaled state
    fn reset(&self) -> Result<()>;

    /// Non-blocking status query
    fn is_signaled(&self) -> Result<bool>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

/// GPU-side ordering signal between acquire, submit and present
pub trait Semaphore: Send + Sync {
    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}
