//! Completion records shared between submitters and the event agent.
//!
//! A submitter books an `EventItem` before its task reaches the CQ. When
//! the engine posts an `EqEntry` for that slot, the event agent finishes
//! the oldest booking of the slot through its `Completion`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// One-shot completion flag plus the engine status word
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
    cancelled: AtomicBool,
    status: AtomicU32,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the status, then publish completion
    pub fn complete(&self, status: u32) {
        self.status.store(status, Ordering::Relaxed);
        self.done.store(true, Ordering::Release);
    }

    /// Status reported to waiters of a cancelled command
    pub const CANCELLED: u32 = u32::MAX;

    /// The command was withdrawn before reaching the engine; its booking
    /// is skipped by the event agent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.complete(Self::CANCELLED);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Status word; meaningful once `is_done()`
    #[inline]
    pub fn status(&self) -> u32 {
        self.status.load(Ordering::Relaxed)
    }

    /// Spin until done, running `poll` between checks
    ///
    /// In polled configurations `poll` is what moves the hardware along.
    pub fn wait_with<F: FnMut()>(&self, mut poll: F) -> u32 {
        let mut spins = 0u32;
        while !self.is_done() {
            poll();
            spins = spins.wrapping_add(1);
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        }
        self.status()
    }
}

/// An expected completion, booked before the task is queued
#[derive(Debug, Clone)]
pub struct EventItem {
    pub slot_id: u8,
    pub done: Arc<Completion>,
}

impl EventItem {
    pub fn new(slot_id: u8) -> Self {
        Self { slot_id, done: Completion::new() }
    }
}

/// One event-queue record as read from hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqEntry {
    pub slot_id: u8,
    pub status: u32,
}
