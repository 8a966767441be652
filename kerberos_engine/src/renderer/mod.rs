/// Renderer module - backend selection, frame loop and swapchain lifecycle

// Module declarations
pub mod backend;
pub mod frame_sync;
pub mod pipeline_cache;
pub mod render_state;
pub mod renderer;
pub mod swapchain_manager;

// Re-export everything from renderer.rs
pub use renderer::*;

// Re-export from other modules
pub use backend::*;
pub use frame_sync::*;
pub use pipeline_cache::*;
pub use render_state::*;
pub use swapchain_manager::*;
