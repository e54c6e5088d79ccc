//! Compile-time defaults for `EngineConfig`

/// Hardware CQ depth in words
pub const CQ_DEPTH: u32 = 32;

/// CQ watermark level
pub const CQ_WM: u32 = 24;

/// Upper bound of the fill threshold
pub const FILL_CQ_THRESH: u32 = 16;

/// Bookings each slot can hold in the event agent
pub const EVENT_DEPTH: usize = 16;

/// EQ records read per dispatch step
pub const EQ_BATCH: usize = 16;

/// Preallocated tasks per slot FIFO
pub const SLOT_QUEUE_DEPTH: usize = 8;

cfg_if::cfg_if! {
    if #[cfg(feature = "irq")] {
        /// Completions arrive by interrupt
        pub const IRQ_MODE: bool = true;
    } else {
        /// Completions are polled; submit runs a dispatch pass
        pub const IRQ_MODE: bool = false;
    }
}
