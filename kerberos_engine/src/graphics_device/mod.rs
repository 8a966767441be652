/// Graphics device module - backend-agnostic resource and device traits

// Module declarations
pub mod graphics_device;
pub mod texture;
pub mod buffer;
pub mod shader;
pub mod pipeline;
pub mod command_list;
pub mod swapchain;
pub mod frame_buffer;
pub mod vertex_array;
pub mod sync;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use texture::*;
pub use buffer::*;
pub use shader::*;
pub use pipeline::*;
pub use command_list::*;
pub use swapchain::*;
pub use frame_buffer::*;
pub use vertex_array::*;
pub use sync::*;
