//! Hardware slot allocator
//!
//! Each session owns one slot (a hardware execution context) for its
//! lifetime. Freed ids are reused LIFO; fresh ids are handed out lowest
//! first.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use te_core::constants::MAX_SLOT_NUM;
use te_core::{te_warn, SpinLock, TeError, TeResult};

pub struct SlotPool {
    tag: &'static str,
    /// Recycled ids
    free: SpinLock<Vec<u8>>,
    /// Next never-used id
    next_fresh: AtomicU8,
    /// Bit per allocated id
    in_use: AtomicU32,
}

const _: () = assert!(MAX_SLOT_NUM <= 32);

impl SlotPool {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            free: SpinLock::new(Vec::with_capacity(MAX_SLOT_NUM)),
            next_fresh: AtomicU8::new(0),
            in_use: AtomicU32::new(0),
        }
    }

    /// Allocate a slot id; `NoMem` when all slots are taken
    pub fn alloc(&self) -> TeResult<u8> {
        let id = {
            let mut free = self.free.lock();
            match free.pop() {
                Some(id) => id,
                None => {
                    let fresh = self.next_fresh.load(Ordering::Relaxed);
                    if fresh as usize >= MAX_SLOT_NUM {
                        return Err(TeError::NoMem);
                    }
                    self.next_fresh.store(fresh + 1, Ordering::Relaxed);
                    fresh
                }
            }
        };
        self.in_use.fetch_or(1 << id, Ordering::AcqRel);
        Ok(id)
    }

    /// Return a slot id; freeing an id that is not allocated is ignored
    pub fn free(&self, id: u8) {
        if id as usize >= MAX_SLOT_NUM {
            te_warn!("{}: free of invalid slot {}", self.tag, id);
            return;
        }
        let prev = self.in_use.fetch_and(!(1 << id), Ordering::AcqRel);
        if prev & (1 << id) == 0 {
            te_warn!("{}: double free of slot {}", self.tag, id);
            return;
        }
        self.free.lock().push(id);
    }

    pub fn is_allocated(&self, id: u8) -> bool {
        (id as usize) < MAX_SLOT_NUM && self.in_use.load(Ordering::Acquire) & (1 << id) != 0
    }

    pub fn allocated(&self) -> usize {
        self.in_use.load(Ordering::Acquire).count_ones() as usize
    }
}
