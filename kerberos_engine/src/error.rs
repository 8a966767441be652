//! Error types for the Kerberos engine
//!
//! This module defines the error types used throughout the engine,
//! including device initialization, presentation, and resource management,
//! plus the `engine_err!` family of macros that log and build errors in one step.

use std::fmt;

/// Result type for Kerberos engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kerberos engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, poisoned lock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (zero size, bad format, size mismatch on upload, shader rejected)
    InvalidResource(String),

    /// Initialization failed (device, queue family, surface, swapchain)
    InitializationFailed(String),

    /// The requested backend is not registered or not available on this host
    UnsupportedBackend(String),

    /// The device stopped responding (fence wait timed out, device lost)
    DeviceLost(String),

    /// Operation called in the wrong frame or recording state
    InvalidOperation(String),
}

impl Error {
    /// Whether the error leaves the rendering context unusable
    ///
    /// Fatal errors require tearing down and rebuilding the whole `Renderer`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InitializationFailed(_) | Error::UnsupportedBackend(_) | Error::DeviceLost(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::UnsupportedBackend(msg) => write!(f, "Unsupported backend: {}", msg),
            Error::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR and evaluate to `Error::BackendError` with the same message
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("kerberos::vulkan", "Failed to reset fence: {:?}", e);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::kerberos::Error::BackendError(message)
    }};
}

/// Log an ERROR and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log a WARN and evaluate to `Error::BackendError` with the same message
#[macro_export]
macro_rules! engine_warn_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_warn!($source, "{}", message);
        $crate::kerberos::Error::BackendError(message)
    }};
}

/// Log a WARN and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! engine_bail_warn {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_warn_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
