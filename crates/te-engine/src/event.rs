//! Event Agent: matches EQ records to booked completions
//!
//! Bookings are kept per slot in bounded lock-free queues so `book` never
//! allocates and can run under the command agent's spinlock. The engine
//! completes commands of one slot in order, so each EQ record finishes
//! the oldest booking of its slot.
//!
//! Popping a slot queue goes through the slot's gate, so `unbook` can
//! rotate the queue without `dispatch` seeing it half done.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use te_core::constants::MAX_SLOT_NUM;
use te_core::{te_trace, te_warn};
use te_core::{Completion, EqEntry, EventAgent, EventItem, Hwa, SpinLock, TeError, TeResult};

use crate::clock::ModuleClock;
use crate::config::EngineConfig;
use crate::fatal::OrFatal;
use crate::module::EngineKind;

/// Largest EQ batch read in one step
pub const EQ_BATCH_MAX: usize = 64;

struct SlotQueue {
    gate: SpinLock<()>,
    items: ArrayQueue<EventItem>,
}

pub struct SlotEventAgent<H: Hwa> {
    kind: EngineKind,
    hwa: Arc<H>,
    clk: Arc<ModuleClock>,
    slots: Box<[SlotQueue]>,
    eq_batch: usize,
}

impl<H: Hwa> SlotEventAgent<H> {
    pub fn new(kind: EngineKind, hwa: Arc<H>, clk: Arc<ModuleClock>, config: &EngineConfig) -> Self {
        let slots = (0..MAX_SLOT_NUM)
            .map(|_| SlotQueue {
                gate: SpinLock::new(()),
                items: ArrayQueue::new(config.event_depth),
            })
            .collect();
        Self {
            kind,
            hwa,
            clk,
            slots,
            eq_batch: config.eq_batch.clamp(1, EQ_BATCH_MAX),
        }
    }

    /// Bookings not yet completed on `slot_id`
    pub fn outstanding(&self, slot_id: u8) -> usize {
        self.slots.get(slot_id as usize).map_or(0, |q| q.items.len())
    }

    pub fn total_outstanding(&self) -> usize {
        self.slots.iter().map(|q| q.items.len()).sum()
    }

    fn deliver(&self, e: &EqEntry) -> bool {
        let Some(q) = self.slots.get(e.slot_id as usize) else {
            te_warn!("{}: eq record for invalid slot {}", self.kind.tag(), e.slot_id);
            return false;
        };
        let next = {
            let _gate = q.gate.lock();
            q.items.pop()
        };
        match next {
            Some(item) => {
                te_trace!("{}: slot {} done, status {:#x}", self.kind.tag(), e.slot_id, e.status);
                item.done.complete(e.status);
                self.clk.put();
                true
            }
            None => {
                te_warn!(
                    "{}: unexpected eq record for slot {} (status {:#x}), dropped",
                    self.kind.tag(),
                    e.slot_id,
                    e.status
                );
                false
            }
        }
    }
}

impl<H: Hwa> EventAgent for SlotEventAgent<H> {
    fn book(&self, item: EventItem) -> TeResult<()> {
        let q = self
            .slots
            .get(item.slot_id as usize)
            .ok_or(TeError::BadParams)?;
        q.items.push(item).map_err(|_| TeError::Busy)
    }

    fn unbook(&self, slot_id: u8, done: &Arc<Completion>) -> bool {
        let Some(q) = self.slots.get(slot_id as usize) else {
            return false;
        };
        let _gate = q.gate.lock();
        let mut found = false;
        // one full rotation keeps the remaining bookings in order
        for _ in 0..q.items.len() {
            let Some(item) = q.items.pop() else { break };
            if !found && Arc::ptr_eq(&item.done, done) {
                found = true;
                continue;
            }
            let _ = q.items.push(item);
        }
        found
    }

    fn dispatch(&self) -> usize {
        let tag = self.kind.tag();
        let mut buf = [EqEntry::default(); EQ_BATCH_MAX];
        let batch = &mut buf[..self.eq_batch];
        let mut delivered = 0;
        loop {
            let n = self.hwa.eq_read(batch).or_fatal(tag, "eq_read");
            for e in &batch[..n] {
                if self.deliver(e) {
                    delivered += 1;
                }
            }
            if n < batch.len() {
                break;
            }
        }
        delivered
    }
}
