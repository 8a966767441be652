/*!
# Kerberos Engine

Render-backend abstraction and GPU frame synchronization for the Kerberos
3D engine.

Identical high-level draw calls run on interchangeable backends (the
CPU-executed immediate backend in this crate, Vulkan in
`kerberos_engine_renderer_vulkan`), while the frame loop keeps the CPU at
most `frames_in_flight` frames ahead of the GPU.

## Architecture

- **GraphicsDevice**: factory for GPU resources, command lists and sync objects
- **Buffer / Texture / Framebuffer / Shader / Pipeline**: resource traits
- **SwapchainManager**: swapchain lifecycle state machine
- **FrameSynchronizer**: ring of frame slots (command list, fence, semaphores)
- **Renderer**: `begin_frame` / draw / `end_frame` / `present` facade

Backend implementations provide concrete types that implement these traits
and register a factory in a `BackendRegistry`.
*/

// Internal modules
mod error;
pub mod log;
pub mod config;
pub mod graphics_device;
pub mod renderer;
pub mod immediate;

// Main kerberos namespace module
pub mod kerberos {
    // Error types
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::RendererConfig;

    // Frame-loop facade
    pub use crate::renderer::{
        BackendKind, BackendRegistry, FrameInfo, FrameStatus, Renderer, RendererStats, SurfaceTarget,
    };

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{
            is_enabled, reset_logger, set_logger, set_min_severity, DefaultLogger, LogEntry, LogSeverity,
            Logger,
        };
    }

    // Render sub-module with all device and resource types
    pub mod render {
        pub use crate::graphics_device::*;
        pub use crate::renderer::*;
    }

    // Immediate backend and its device event log
    pub mod immediate {
        pub use crate::immediate::*;
    }
}

// Re-export math library at crate root
pub use glam;
