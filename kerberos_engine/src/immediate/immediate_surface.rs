/// Headless surface - a presentable target driven by the caller
///
/// Tests resize it and inject out-of-date/suboptimal results the way a real
/// window system would report them. A *following* surface has no extent of its
/// own and adopts whatever the swapchain asks for; the immediate backend uses
/// one when given a platform window.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::graphics_device::{Extent2D, PresentMode, SurfaceCapabilities, TextureFormat};

pub struct HeadlessSurface {
    extent: Mutex<Extent2D>,
    follows_swapchain: bool,
    min_image_count: AtomicU32,
    max_image_count: AtomicU32,
    present_modes: Mutex<Vec<PresentMode>>,
    acquire_out_of_date: AtomicU32,
    present_out_of_date: AtomicU32,
    present_suboptimal: AtomicU32,
}

impl HeadlessSurface {
    /// Surface with a fixed extent, changed only by `resize`
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self::with_mode(Extent2D::new(width, height), false))
    }

    /// Surface that takes the extent the swapchain requests
    pub fn following(extent: Extent2D) -> Arc<Self> {
        Arc::new(Self::with_mode(extent, true))
    }

    fn with_mode(extent: Extent2D, follows_swapchain: bool) -> Self {
        Self {
            extent: Mutex::new(extent),
            follows_swapchain,
            min_image_count: AtomicU32::new(2),
            max_image_count: AtomicU32::new(8),
            present_modes: Mutex::new(vec![PresentMode::Vsync, PresentMode::Immediate, PresentMode::TripleBuffer]),
            acquire_out_of_date: AtomicU32::new(0),
            present_out_of_date: AtomicU32::new(0),
            present_suboptimal: AtomicU32::new(0),
        }
    }

    pub fn extent(&self) -> Extent2D {
        *self.extent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulate the window system changing the surface size
    pub fn resize(&self, width: u32, height: u32) {
        *self.extent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Extent2D::new(width, height);
    }

    pub fn follows_swapchain(&self) -> bool {
        self.follows_swapchain
    }

    /// The next `count` acquires report out-of-date
    pub fn inject_acquire_out_of_date(&self, count: u32) {
        self.acquire_out_of_date.fetch_add(count, Ordering::SeqCst);
    }

    /// The next `count` presents report out-of-date
    pub fn inject_present_out_of_date(&self, count: u32) {
        self.present_out_of_date.fetch_add(count, Ordering::SeqCst);
    }

    /// The next `count` presents report suboptimal
    pub fn inject_present_suboptimal(&self, count: u32) {
        self.present_suboptimal.fetch_add(count, Ordering::SeqCst);
    }

    /// `max == 0` means unbounded
    pub fn set_image_count_limits(&self, min: u32, max: u32) {
        self.min_image_count.store(min, Ordering::SeqCst);
        self.max_image_count.store(max, Ordering::SeqCst);
    }

    pub fn set_present_modes(&self, modes: Vec<PresentMode>) {
        *self.present_modes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = modes;
    }

    pub fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: self.min_image_count.load(Ordering::SeqCst),
            max_image_count: self.max_image_count.load(Ordering::SeqCst),
            current_extent: if self.follows_swapchain { None } else { Some(self.extent()) },
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(16384, 16384),
            formats: vec![TextureFormat::B8G8R8A8_SRGB, TextureFormat::R8G8B8A8_SRGB],
            present_modes: self.present_modes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone(),
        }
    }

    pub(crate) fn take_acquire_out_of_date(&self) -> bool {
        take_one(&self.acquire_out_of_date)
    }

    pub(crate) fn take_present_out_of_date(&self) -> bool {
        take_one(&self.present_out_of_date)
    }

    pub(crate) fn take_present_suboptimal(&self) -> bool {
        take_one(&self.present_suboptimal)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
