//! Unit tests for swapchain image layout tracking
//!
//! The tracker only sees image handles, so it runs without a GPU.

use super::*;
use ash::vk::Handle;

fn image(raw: u64) -> vk::Image {
    vk::Image::from_raw(raw)
}

// ============================================================================
// PRESENT IMAGE TRACKER TESTS
// ============================================================================

#[test]
fn test_first_entry_discards_content() {
    let mut tracker = PresentImageTracker::default();
    assert_eq!(tracker.enter(image(1)), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_reentry_keeps_content() {
    let mut tracker = PresentImageTracker::default();
    tracker.enter(image(1));
    assert_eq!(tracker.enter(image(1)), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(tracker.enter(image(1)), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(tracker.finish(), vec![image(1)]);
}

#[test]
fn test_finish_hands_over_every_entered_image_once() {
    let mut tracker = PresentImageTracker::default();
    tracker.enter(image(1));
    tracker.enter(image(2));
    assert_eq!(tracker.finish(), vec![image(1), image(2)]);
    assert!(tracker.finish().is_empty());
}

#[test]
fn test_reset_starts_a_new_recording() {
    let mut tracker = PresentImageTracker::default();
    tracker.enter(image(7));
    tracker.reset();
    assert_eq!(tracker.enter(image(7)), vk::ImageLayout::UNDEFINED);
}
