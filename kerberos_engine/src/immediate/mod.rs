/// Immediate backend - CPU-executed GraphicsDevice with an inspectable event log

pub mod immediate_command_list;
pub mod immediate_device;
pub mod immediate_probe;
pub mod immediate_resources;
pub mod immediate_surface;
pub mod immediate_swapchain;
pub mod immediate_sync;

pub use immediate_command_list::*;
pub use immediate_device::ImmediateGraphicsDevice;
pub use immediate_probe::*;
pub use immediate_resources::*;
pub use immediate_surface::*;
pub use immediate_swapchain::*;
pub use immediate_sync::*;

pub(crate) use immediate_device::{lock, DeviceShared, MemoryReservation};
pub(crate) use immediate_resources::{encode_color, encode_depth};
pub(crate) use immediate_sync::FenceState;
