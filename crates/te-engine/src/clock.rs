//! Module clock reference count
//!
//! The engine clock must run while any task is between submit and
//! completion. Submit takes a reference; the event agent drops it when
//! the matching completion is delivered.

use std::sync::atomic::{AtomicU32, Ordering};

use te_core::{te_dbg, te_warn};

#[derive(Debug)]
pub struct ModuleClock {
    tag: &'static str,
    refs: AtomicU32,
    /// 0->1 transitions, for diagnostics
    enables: AtomicU32,
}

impl ModuleClock {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, refs: AtomicU32::new(0), enables: AtomicU32::new(0) }
    }

    /// Take a reference; the first one turns the clock on
    pub fn get(&self) {
        if self.refs.fetch_add(1, Ordering::AcqRel) == 0 {
            self.enables.fetch_add(1, Ordering::Relaxed);
            te_dbg!("{}: clock on", self.tag);
        }
    }

    /// Drop a reference; the last one turns the clock off
    pub fn put(&self) {
        let prev = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
        match prev {
            Ok(1) => te_dbg!("{}: clock off", self.tag),
            Ok(_) => {}
            Err(_) => {
                te_warn!("{}: clock put without get", self.tag);
                debug_assert!(false, "clock reference underflow");
            }
        }
    }

    #[inline]
    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.refs() > 0
    }

    pub fn enable_count(&self) -> u32 {
        self.enables.load(Ordering::Relaxed)
    }
}
