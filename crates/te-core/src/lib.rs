//! # te-core
//!
//! Core types and traits for the TrustEngine (Merak) command/event core.
//!
//! This crate is platform-agnostic and contains no hardware access.
//! Register accessors are consumed through the `Hwa` trait; the engine
//! that drives them lives in `te-engine`.
//!
//! ## Modules
//!
//! - `error` - Driver result codes and hardware status type
//! - `spinlock` - Non-sleeping ticket lock for agent state
//! - `tlog` - Leveled stderr logging macros
//! - `cmd` - Raw command word layout (CMDID / SLOTID / NPARA)
//! - `memlist` - Scatter/gather byte-stream views over DMA buffers
//! - `linklist` - Hardware link-list wire format
//! - `completion` - Completion handle and event records
//! - `traits` - HWA and Event Agent contracts

pub mod error;
pub mod spinlock;
pub mod tlog;
pub mod cmd;
pub mod memlist;
pub mod linklist;
pub mod completion;
pub mod traits;

// Re-exports for convenience
pub use error::{HwError, HwResult, TeError, TeResult};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use tlog::{set_flush, set_log_level, LogLevel};
pub use cmd::{CmdBuf, CmdId};
pub use memlist::{MemEnt, MemList, MlBp};
pub use linklist::{LinkEntry, LinkList};
pub use completion::{Completion, EqEntry, EventItem};
pub use traits::{EventAgent, Hwa, HwaStat};

/// Hardware layout constants
pub mod constants {
    /// Number of hardware slots per command queue
    pub const MAX_SLOT_NUM: usize = 32;

    /// Size of one CQ word in bytes
    pub const WORD_SIZE: usize = 4;

    /// Largest region a single link-list entry can describe (31-bit size field)
    pub const LL_MAX_SIZE: usize = 0x7FFF_FFFF;

    /// Session key length for the 3GPP algorithms (bytes)
    pub const SESS_KEY_LEN: usize = 16;

    /// MAC-I length (bytes)
    pub const MAC_LEN: usize = 4;
}
