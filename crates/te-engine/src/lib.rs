//! # te-engine
//!
//! Command/event engine for the TrustEngine (Merak) crypto accelerator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Session (f8 / f9 / UEA2 / UIA2 / EIA3)                  │
//! │  init → setkey → start → update… → finish                │
//! └────────────────────────┬────────────────────────────────┘
//!                          │ exec(slot, words)
//! ┌────────────────────────▼────────────────────────────────┐
//! │  Module (SCA | HASH)                                     │
//! │  ┌──────────────┐   book   ┌──────────────────────────┐  │
//! │  │  CmdAgent    │─────────▶│  SlotEventAgent          │  │
//! │  │  32 slot     │          │  per-slot bookings       │  │
//! │  │  FIFOs, RR   │          │  EQ → Completion         │  │
//! │  └──────┬───────┘          └────────────▲─────────────┘  │
//! │         │ fill                          │ dispatch       │
//! └─────────┼───────────────────────────────┼────────────────┘
//!           ▼                               │
//!        Hwa: CQ write ─── engine ─── EQ read
//! ```
//!
//! ## Crate Structure
//!
//! - `config` - Engine configuration with env overrides
//! - `agent` - Command Agent (tasks, per-slot FIFOs, CQ fill)
//! - `event` - Event Agent (completion booking and dispatch)
//! - `module` - Module context, poll and interrupt entry points
//! - `clock` - Clock reference count
//! - `slot` - Slot id allocator
//! - `session` - Cipher/integrity session lifecycle
//! - `sim` - Software model of the queue registers

pub mod agent;
pub mod clock;
pub mod config;
pub mod event;
mod fatal;
pub mod module;
pub mod session;
pub mod sim;
pub mod slot;

pub use agent::{CmdAgent, Task};
pub use clock::ModuleClock;
pub use config::{ConfigError, EngineConfig};
pub use event::SlotEventAgent;
pub use fatal::hw_fatal;
pub use module::{EngineKind, IrqStat, Module};
pub use session::{IvParams, SessAlg, SessState, Session};
pub use sim::SimHwa;
pub use slot::SlotPool;
