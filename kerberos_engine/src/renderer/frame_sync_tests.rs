//! Unit tests for frame_sync.rs

use std::sync::Arc;

use crate::error::Error;
use crate::graphics_device::{
    AcquireStatus, BufferDesc, BufferUsage, Extent2D, GraphicsDevice, PresentMode, Swapchain, SwapchainDesc,
};
use crate::immediate::{DeviceEvent, HeadlessSurface, ImmediateGraphicsDevice};
use crate::renderer::{FrameSynchronizer, RetainedResource};

fn setup(frames_in_flight: u32) -> (Arc<ImmediateGraphicsDevice>, FrameSynchronizer) {
    let device = Arc::new(ImmediateGraphicsDevice::new(HeadlessSurface::new(64, 64)));
    let frames = FrameSynchronizer::new(device.clone(), frames_in_flight, 1_000_000).unwrap();
    (device, frames)
}

fn swapchain(device: &ImmediateGraphicsDevice) -> Box<dyn Swapchain> {
    device
        .create_swapchain(&SwapchainDesc {
            extent: Extent2D::new(64, 64),
            min_image_count: 2,
            present_mode: PresentMode::Vsync,
        })
        .unwrap()
}

// ============================================================================
// CONSTRUCTION TESTS
// ============================================================================

#[test]
fn test_new_creates_signaled_slots() {
    let (_device, frames) = setup(3);
    assert_eq!(frames.slot_count(), 3);
    assert_eq!(frames.current_index(), 0);
    assert_eq!(frames.in_flight_count().unwrap(), 0);
}

#[test]
fn test_zero_frames_in_flight_rejected() {
    let device: Arc<dyn GraphicsDevice> = Arc::new(ImmediateGraphicsDevice::new(HeadlessSurface::new(8, 8)));
    assert!(matches!(
        FrameSynchronizer::new(device, 0, 1_000),
        Err(Error::InitializationFailed(_))
    ));
}

#[test]
fn test_first_wait_returns_immediately() {
    let (device, mut frames) = setup(2);
    frames.wait_for_current().unwrap();
    assert_eq!(device.probe().count(|e| matches!(e, DeviceEvent::FenceWaited { signaled: true, .. })), 1);
    assert_eq!(device.probe().count(|e| matches!(e, DeviceEvent::FenceSignaled { .. })), 0);
}

// ============================================================================
// SUBMISSION TESTS
// ============================================================================

#[test]
fn test_submit_without_image_signal_fails() {
    let (_device, mut frames) = setup(2);
    frames.wait_for_current().unwrap();
    frames.command_list_mut().begin().unwrap();
    frames.command_list_mut().end().unwrap();

    // Nothing signaled image-available, so the queue wait has no producer
    assert!(frames.submit_current().is_err());
}

#[test]
fn test_slots_cycle_and_fences_track_submissions() {
    let (device, mut frames) = setup(2);
    let mut swapchain = swapchain(&device);

    for frame in 0..4 {
        assert_eq!(frames.current_index(), frame % 2);
        frames.wait_for_current().unwrap();
        let status = swapchain.acquire_next_image(frames.image_available(), u64::MAX).unwrap();
        let image_index = match status {
            AcquireStatus::Success { image_index, .. } => image_index,
            AcquireStatus::NeedsRecreate => unreachable!(),
        };
        frames.command_list_mut().begin().unwrap();
        frames.command_list_mut().end().unwrap();
        frames.submit_current().unwrap();
        swapchain.present(image_index, frames.render_finished()).unwrap();
        frames.advance();
    }

    assert_eq!(frames.submitted_frames(), 4);
    // The two most recent submissions are still queued
    assert_eq!(frames.in_flight_count().unwrap(), 2);
    assert_eq!(device.pending_submissions(), 2);

    device.wait_idle().unwrap();
    assert_eq!(frames.in_flight_count().unwrap(), 0);
}

#[test]
fn test_stalled_device_reports_device_lost() {
    let (device, mut frames) = setup(1);
    let mut swapchain = swapchain(&device);

    frames.wait_for_current().unwrap();
    swapchain.acquire_next_image(frames.image_available(), u64::MAX).unwrap();
    frames.command_list_mut().begin().unwrap();
    frames.command_list_mut().end().unwrap();
    frames.submit_current().unwrap();
    frames.advance();

    device.set_stalled(true);
    let error = frames.wait_for_current().unwrap_err();
    assert!(matches!(error, Error::DeviceLost(_)));
    assert!(error.is_fatal());
}

// ============================================================================
// RETENTION TESTS
// ============================================================================

#[test]
fn test_retained_resources_released_after_wait() {
    let (device, mut frames) = setup(1);
    let buffer = device.create_buffer(BufferDesc::new("transient", 64, BufferUsage::Vertex)).unwrap();

    frames.retain(RetainedResource::Buffer(buffer.clone()));
    assert_eq!(frames.retained_count(), 1);
    assert_eq!(Arc::strong_count(&buffer), 2);

    frames.wait_for_current().unwrap();
    assert_eq!(frames.retained_count(), 0);
    assert_eq!(Arc::strong_count(&buffer), 1);
}

#[test]
fn test_retained_resources_kept_when_wait_fails() {
    let (device, mut frames) = setup(1);
    let mut swapchain = swapchain(&device);
    let buffer = device.create_buffer(BufferDesc::new("in use", 64, BufferUsage::Vertex)).unwrap();

    frames.wait_for_current().unwrap();
    swapchain.acquire_next_image(frames.image_available(), u64::MAX).unwrap();
    frames.command_list_mut().begin().unwrap();
    frames.command_list_mut().end().unwrap();
    frames.retain(RetainedResource::Buffer(buffer.clone()));
    frames.submit_current().unwrap();

    device.set_stalled(true);
    assert!(frames.wait_for_current().is_err());
    assert_eq!(frames.retained_count(), 1);

    device.set_stalled(false);
    frames.wait_for_current().unwrap();
    assert_eq!(Arc::strong_count(&buffer), 1);
}

#[test]
fn test_release_all() {
    let (device, mut frames) = setup(2);
    let buffer = device.create_buffer(BufferDesc::new("b", 4, BufferUsage::Index)).unwrap();
    frames.retain(RetainedResource::Buffer(buffer.clone()));
    frames.advance();
    frames.retain(RetainedResource::Buffer(buffer.clone()));
    assert_eq!(Arc::strong_count(&buffer), 3);

    frames.release_all();
    assert_eq!(Arc::strong_count(&buffer), 1);
}

#[test]
fn test_replace_image_available() {
    let (device, mut frames) = setup(1);
    let mut swapchain = swapchain(&device);

    swapchain.acquire_next_image(frames.image_available(), u64::MAX).unwrap();
    // The signal is orphaned; a fresh semaphore can be handed to acquire again
    frames.replace_image_available().unwrap();
    assert!(swapchain.acquire_next_image(frames.image_available(), u64::MAX).is_ok());
}
