//! Raw frame queue and its re-entrancy guard
//!
//! Frames are enqueued as soon as they arrive and drained a few at a time.
//! While a REST load is in flight the guard stays held, so arrivals only
//! enqueue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Unbounded FIFO of raw data frames
#[derive(Debug, Default)]
pub struct FeedQueue {
    frames: VecDeque<String>,
    enqueued: u64,
}

impl FeedQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame
    pub fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
        self.enqueued += 1;
    }

    /// Take the oldest frame
    pub fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Frames waiting
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames enqueued since the queue was created
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued
    }

    /// Drop everything waiting
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Non-blocking guard that keeps queue processing single-entry
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    busy: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create a released guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` if someone already holds it
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GuardPermit {
                busy: self.busy.clone(),
            })
    }

    /// Whether the guard is held
    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held guard; released on drop
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct GuardPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
