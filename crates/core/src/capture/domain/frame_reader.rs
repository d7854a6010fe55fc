use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::shared::frame::Frame;

use super::camera_backend::{CameraEvent, EventSender};

/// Frame-delivery surface between the capture hardware and the consumer.
///
/// Holds at most one pending frame. A newer frame overwrites an unconsumed
/// older one, so the consumer always acquires the latest image and a slow
/// consumer never builds a backlog.
pub struct FrameReader {
    width: u32,
    height: u32,
    latest: Mutex<Option<Frame>>,
    closed: AtomicBool,
    overwritten: AtomicU64,
    events: EventSender,
}

impl FrameReader {
    pub fn new(width: u32, height: u32, events: EventSender) -> Self {
        Self {
            width,
            height,
            latest: Mutex::new(None),
            closed: AtomicBool::new(false),
            overwritten: AtomicU64::new(0),
            events,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Producer side. Returns `false` once the reader is closed.
    ///
    /// `FrameAvailable` is posted only when the slot goes from empty to
    /// full; a pending notification already covers a replaced frame.
    pub fn publish(&self, frame: Frame) -> bool {
        if self.is_closed() {
            return false;
        }
        let replaced = self.slot().replace(frame);
        if replaced.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        } else {
            let _ = self.events.send(CameraEvent::FrameAvailable);
        }
        true
    }

    /// Consumer side: takes the newest pending frame, if any.
    pub fn acquire_latest(&self) -> Option<Frame> {
        self.slot().take()
    }

    /// Stops accepting frames and drops any pending one.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slot().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frames replaced before anyone acquired them.
    pub fn overwritten_frames(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Frame>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
