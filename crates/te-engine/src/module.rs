//! Module context: one engine instance (SCA or hash)
//!
//! Owns the register handle, the clock reference count, the slot pool and
//! both agents, and provides the poll/interrupt entry points that keep
//! the command queue moving.

use std::ops::BitOr;
use std::sync::Arc;

use te_core::{te_info, te_trace};
use te_core::{EventAgent, EventItem, Hwa, TeError, TeResult};

use crate::agent::{CmdAgent, Task};
use crate::clock::ModuleClock;
use crate::config::{ConfigError, EngineConfig};
use crate::event::SlotEventAgent;
use crate::fatal::OrFatal;
use crate::slot::SlotPool;

/// Engine flavour; only affects log tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Sca,
    Hash,
}

impl EngineKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EngineKind::Sca => "sca",
            EngineKind::Hash => "hash",
        }
    }
}

/// Interrupt status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqStat(pub u32);

impl IrqStat {
    /// EQ has records
    pub const EQ: IrqStat = IrqStat(1 << 0);
    /// CQ dropped below the watermark
    pub const CQ_WM: IrqStat = IrqStat(1 << 1);

    pub const fn empty() -> Self {
        IrqStat(0)
    }

    pub const fn contains(self, other: IrqStat) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for IrqStat {
    type Output = IrqStat;

    fn bitor(self, rhs: IrqStat) -> IrqStat {
        IrqStat(self.0 | rhs.0)
    }
}

pub struct Module<H: Hwa> {
    kind: EngineKind,
    config: EngineConfig,
    hwa: Arc<H>,
    clk: Arc<ModuleClock>,
    slots: SlotPool,
    events: Arc<SlotEventAgent<H>>,
    agent: CmdAgent<H, SlotEventAgent<H>>,
}

impl<H: Hwa> Module<H> {
    pub fn new(kind: EngineKind, hwa: Arc<H>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let tag = kind.tag();
        let clk = Arc::new(ModuleClock::new(tag));
        let events = Arc::new(SlotEventAgent::new(kind, Arc::clone(&hwa), Arc::clone(&clk), &config));
        let agent = CmdAgent::new(kind, Arc::clone(&hwa), Arc::clone(&events), Arc::clone(&clk), &config);
        te_info!(
            "{}: module up, {} mode, cq_thresh={}",
            tag,
            if config.irq_mode { "irq" } else { "poll" },
            agent.cq_thresh()
        );
        Ok(Self {
            kind,
            config,
            hwa,
            clk,
            slots: SlotPool::new(tag),
            events,
            agent,
        })
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hwa(&self) -> &Arc<H> {
        &self.hwa
    }

    pub fn clock(&self) -> &ModuleClock {
        &self.clk
    }

    pub fn agent(&self) -> &CmdAgent<H, SlotEventAgent<H>> {
        &self.agent
    }

    pub fn events(&self) -> &SlotEventAgent<H> {
        &self.events
    }

    pub fn alloc_slot(&self) -> TeResult<u8> {
        self.slots.alloc()
    }

    pub fn free_slot(&self, slot_id: u8) {
        self.slots.free(slot_id)
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn submit(&self, task: Arc<Task>, item: EventItem) -> TeResult<()> {
        self.agent.submit(task, item)
    }

    pub fn cancel(&self, task: &Arc<Task>) -> TeResult<()> {
        self.agent.cancel(task)
    }

    /// Polling trigger: deliver completions, then refill the CQ
    pub fn poll(&self) -> usize {
        let done = self.events.dispatch();
        self.agent.fill();
        done
    }

    /// Interrupt entry
    pub fn irq(&self, stat: IrqStat) {
        te_trace!("{}: irq {:#x}", self.kind.tag(), stat.0);
        if stat.contains(IrqStat::EQ) {
            self.events.dispatch();
        }
        if stat.contains(IrqStat::CQ_WM) {
            self.hwa.cqwm_ctrl(false).or_fatal(self.kind.tag(), "cqwm_ctrl");
            self.agent.fill();
        }
    }

    /// Run one command on `slot_id` and wait for its completion
    ///
    /// A non-zero engine status is returned as `TeError::Engine`.
    pub fn exec(&self, slot_id: u8, words: Vec<u32>) -> TeResult<()> {
        let task = Task::prepare(slot_id, words)?;
        let item = EventItem::new(slot_id);
        let done = Arc::clone(&item.done);
        self.submit(task, item)?;
        let status = if self.config.irq_mode {
            done.wait_with(|| {})
        } else {
            done.wait_with(|| {
                self.poll();
            })
        };
        match status {
            0 => Ok(()),
            st => Err(TeError::Engine(st)),
        }
    }
}
