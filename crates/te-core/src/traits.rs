//! Collaborator contracts consumed by the engine.
//!
//! The command agent never touches registers directly; it talks to an
//! `Hwa` and books completions with an `EventAgent`. Both are injected
//! at construction, so a software model can stand in for the hardware.

use std::sync::Arc;

use crate::completion::{Completion, EqEntry, EventItem};
use crate::error::{HwResult, TeResult};

/// Snapshot of the queue status registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwaStat {
    /// Free CQ words
    pub cq_avail_slots: u32,
    /// EQ records waiting to be read
    pub eq_pending: u32,
}

/// Register accessors for one command/event queue pair
///
/// **Contract:**
/// - Every call is non-blocking with bounded latency; callers hold a
///   spinlock across them.
/// - A non-`Ok` return means the driver's view of the hardware is wrong.
///   The engine treats it as fatal.
pub trait Hwa: Send + Sync {
    fn state(&self) -> HwResult<HwaStat>;

    /// Write the function (header) word of a command
    fn cq_write_func(&self, word: u32) -> HwResult<()>;

    /// Write parameter words of the command in progress
    fn cq_write_para(&self, words: &[u32]) -> HwResult<()>;

    /// Arm (`true`) or disarm the CQ watermark interrupt
    fn cqwm_ctrl(&self, enable: bool) -> HwResult<()>;

    /// Pop up to `out.len()` EQ records; returns how many were written
    fn eq_read(&self, out: &mut [EqEntry]) -> HwResult<usize>;
}

/// Books and delivers command completions
pub trait EventAgent: Send + Sync {
    /// Register an expected completion. Must not allocate or block.
    /// `Busy` if the slot cannot take another booking.
    fn book(&self, item: EventItem) -> TeResult<()>;

    /// Withdraw the booking on `slot_id` that completes `done`, for a
    /// command that will never reach the hardware. Called under the same
    /// lock as `book`; must not allocate. Returns whether it was found.
    fn unbook(&self, slot_id: u8, done: &Arc<Completion>) -> bool;

    /// Deliver whatever the hardware has reported; returns the count
    fn dispatch(&self) -> usize;
}
