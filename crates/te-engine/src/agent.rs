//! Command Agent: multiplexes per-slot command FIFOs onto the shared CQ
//!
//! Each hardware slot has its own FIFO of prepared tasks. `fill` drains
//! them into the command queue round-robin, one task at a time, writing
//! as many words as the hardware has room for. A task that does not fit
//! stays `cur` and resumes on the next trigger (submit, dispatch, or the
//! CQ watermark interrupt).
//!
//! Per task: unqueued -> queued(slot) -> draining(cur, offs > 0) -> done.
//! Only queued tasks can be cancelled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use te_core::constants::{MAX_SLOT_NUM, WORD_SIZE};
use te_core::{cmd, te_dbg, te_trace, te_warn};
use te_core::{Completion, EventAgent, EventItem, Hwa, SpinLock, TeError, TeResult};

use crate::clock::ModuleClock;
use crate::config::EngineConfig;
use crate::fatal::OrFatal;
use crate::module::EngineKind;

/// A raw command bound to a slot, drained into the CQ word by word
#[derive(Debug)]
pub struct Task {
    slot_id: u8,
    cmd: Box<[u32]>,
    /// Bytes already written to the CQ; only moved under the agent lock
    offs: AtomicUsize,
    /// Booked completion, set once on submit
    done: OnceLock<Arc<Completion>>,
}

impl Task {
    /// Bind `words` to `slot_id` and stamp the id into the header
    pub fn prepare(slot_id: u8, mut words: Vec<u32>) -> TeResult<Arc<Task>> {
        if slot_id as usize >= MAX_SLOT_NUM || words.is_empty() {
            return Err(TeError::BadParams);
        }
        words[0] = cmd::set_slotid(words[0], slot_id);
        Ok(Arc::new(Task {
            slot_id,
            cmd: words.into_boxed_slice(),
            offs: AtomicUsize::new(0),
            done: OnceLock::new(),
        }))
    }

    #[inline]
    pub fn slot_id(&self) -> u8 {
        self.slot_id
    }

    /// Command length in bytes
    #[inline]
    pub fn cmd_len(&self) -> usize {
        self.cmd.len() * WORD_SIZE
    }

    /// Bytes drained so far
    #[inline]
    pub fn offset(&self) -> usize {
        self.offs.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_drained(&self) -> bool {
        self.offset() == self.cmd_len()
    }

    pub fn cmd_id(&self) -> u8 {
        cmd::cmdid(self.cmd[0])
    }

    pub fn words(&self) -> &[u32] {
        &self.cmd
    }
}

struct AgentState {
    queues: [VecDeque<Arc<Task>>; MAX_SLOT_NUM],
    /// Last slot the sweep picked from
    qidx: usize,
    cur: Option<Arc<Task>>,
}

impl AgentState {
    /// Next task in round-robin order, starting after `qidx`
    fn next_task(&mut self) -> Option<Arc<Task>> {
        for _ in 0..MAX_SLOT_NUM {
            self.qidx = (self.qidx + 1) % MAX_SLOT_NUM;
            if let Some(task) = self.queues[self.qidx].pop_front() {
                return Some(task);
            }
        }
        None
    }

    fn pending(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum::<usize>() + self.cur.is_some() as usize
    }
}

/// What one fill pass did, logged once the agent lock is released
#[derive(Debug, Default)]
struct FillReport {
    completed: usize,
    /// CQ room and threshold when the pass wrote nothing
    starved: Option<(usize, u32)>,
    /// Slot, bytes written and command length of the task left in `cur`
    stalled: Option<(u8, usize, usize)>,
}

impl FillReport {
    fn trace(&self, tag: &str) {
        if let Some((room, thresh)) = self.starved {
            te_trace!("{}: cq room {} below thresh {}", tag, room, thresh);
        }
        if let Some((slot, offs, len)) = self.stalled {
            te_trace!("{}: slot {} stalled at {}/{}", tag, slot, offs, len);
        }
    }
}

pub struct CmdAgent<H: Hwa, E: EventAgent> {
    kind: EngineKind,
    hwa: Arc<H>,
    events: Arc<E>,
    clk: Arc<ModuleClock>,
    cq_thresh: u32,
    irq_mode: bool,
    state: SpinLock<AgentState>,
}

impl<H: Hwa, E: EventAgent> CmdAgent<H, E> {
    pub fn new(
        kind: EngineKind,
        hwa: Arc<H>,
        events: Arc<E>,
        clk: Arc<ModuleClock>,
        config: &EngineConfig,
    ) -> Self {
        let cq_thresh = config.cq_thresh();
        let depth = config.slot_queue_depth;
        te_dbg!(
            "{}: cmd agent up, cq_depth={} wm={} cq_thresh={}",
            kind.tag(),
            config.cq_depth,
            config.cq_watermark,
            cq_thresh
        );
        Self {
            kind,
            hwa,
            events,
            clk,
            cq_thresh,
            irq_mode: config.irq_mode,
            state: SpinLock::new(AgentState {
                queues: std::array::from_fn(|_| VecDeque::with_capacity(depth)),
                // first sweep starts at slot 0
                qidx: MAX_SLOT_NUM - 1,
                cur: None,
            }),
        }
    }

    /// Book the completion, queue the task and start draining
    ///
    /// A booking failure is returned with no queue or CQ change and the
    /// clock reference count back where it was. A task is submitted at
    /// most once.
    pub fn submit(&self, task: Arc<Task>, item: EventItem) -> TeResult<()> {
        if item.slot_id != task.slot_id || task.done.get().is_some() {
            return Err(TeError::BadParams);
        }
        let slot_id = task.slot_id;
        let cmd_id = task.cmd_id();
        // taken before the lock: the first reference logs
        self.clk.get();
        let filled = {
            let mut st = self.state.lock();
            if task.done.get().is_some() {
                Err(TeError::BadParams)
            } else {
                let done = Arc::clone(&item.done);
                self.events.book(item).map(|()| {
                    let _ = task.done.set(done);
                    st.queues[slot_id as usize].push_back(task);
                    self.fill_locked(&mut st)
                })
            }
        };
        let report = match filled {
            Ok(report) => report,
            Err(e) => {
                self.clk.put();
                return Err(e);
            }
        };
        te_trace!("{}: queued slot {} cmd {:#x}", self.kind.tag(), slot_id, cmd_id);
        report.trace(self.kind.tag());
        if !self.irq_mode {
            self.events.dispatch();
        }
        Ok(())
    }

    /// Remove a task that has not started draining
    ///
    /// Its booking is withdrawn and marked cancelled, and its clock
    /// reference dropped. `NoData` if it is already draining or done.
    pub fn cancel(&self, task: &Arc<Task>) -> TeResult<()> {
        let unbooked = {
            let mut st = self.state.lock();
            let q = &mut st.queues[task.slot_id as usize];
            let pos = q
                .iter()
                .position(|t| Arc::ptr_eq(t, task))
                .ok_or(TeError::NoData)?;
            q.remove(pos);
            task.done
                .get()
                .is_some_and(|done| self.events.unbook(task.slot_id, done))
        };
        if !unbooked {
            te_warn!("{}: no booking for cancelled task on slot {}", self.kind.tag(), task.slot_id);
        }
        if let Some(done) = task.done.get() {
            done.cancel();
        }
        self.clk.put();
        te_dbg!("{}: cancelled task on slot {}", self.kind.tag(), task.slot_id);
        Ok(())
    }

    /// Drain queued tasks into the CQ; returns how many finished draining
    pub fn fill(&self) -> usize {
        let report = {
            let mut st = self.state.lock();
            self.fill_locked(&mut st)
        };
        report.trace(self.kind.tag());
        report.completed
    }

    fn fill_locked(&self, st: &mut AgentState) -> FillReport {
        let tag = self.kind.tag();
        let stat = self.hwa.state().or_fatal(tag, "state");
        let mut room = stat.cq_avail_slots as usize;
        let mut report = FillReport::default();
        if room < self.cq_thresh as usize {
            report.starved = Some((room, self.cq_thresh));
            return report;
        }

        while room > 0 {
            let task = match st.cur.clone() {
                Some(task) => task,
                None => match st.next_task() {
                    Some(task) => {
                        st.cur = Some(Arc::clone(&task));
                        task
                    }
                    None => break,
                },
            };

            let mut offs = task.offs.load(Ordering::Relaxed);
            if offs == 0 {
                self.hwa.cq_write_func(task.cmd[0]).or_fatal(tag, "cq_write_func");
                offs = WORD_SIZE;
                room -= 1;
            }

            let start = offs / WORD_SIZE;
            let n = room.min(task.cmd.len() - start);
            if n > 0 {
                self.hwa
                    .cq_write_para(&task.cmd[start..start + n])
                    .or_fatal(tag, "cq_write_para");
                offs += n * WORD_SIZE;
                room -= n;
            }
            task.offs.store(offs, Ordering::Release);

            if offs < task.cmd_len() {
                if report.completed == 0 {
                    self.hwa.cqwm_ctrl(true).or_fatal(tag, "cqwm_ctrl");
                }
                report.stalled = Some((task.slot_id, offs, task.cmd_len()));
                break;
            }
            st.cur = None;
            report.completed += 1;
        }
        report
    }

    pub fn cq_thresh(&self) -> u32 {
        self.cq_thresh
    }

    /// Tasks queued or draining
    pub fn pending(&self) -> usize {
        self.state.lock().pending()
    }

    /// Slot the round-robin sweep picked last
    pub fn qidx(&self) -> usize {
        self.state.lock().qidx
    }

    pub fn is_irq_mode(&self) -> bool {
        self.irq_mode
    }
}

impl<H: Hwa, E: EventAgent> Drop for CmdAgent<H, E> {
    fn drop(&mut self) {
        let pending = self.state.get_mut().pending();
        if pending > 0 {
            te_warn!("{}: cmd agent destroyed with {} task(s) in flight", self.kind.tag(), pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CqPath, SimHwa};
    use std::sync::atomic::AtomicU32;
    use te_core::{CmdBuf, CmdId};

    /// Event agent that only counts, optionally refusing bookings
    #[derive(Default)]
    struct CountingEvents {
        booked: AtomicU32,
        unbooked: AtomicU32,
        dispatched: AtomicU32,
        refuse: std::sync::atomic::AtomicBool,
    }

    impl EventAgent for CountingEvents {
        fn book(&self, _item: EventItem) -> TeResult<()> {
            if self.refuse.load(Ordering::Relaxed) {
                return Err(TeError::Busy);
            }
            self.booked.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn unbook(&self, _slot_id: u8, _done: &Arc<Completion>) -> bool {
            self.unbooked.fetch_add(1, Ordering::Relaxed);
            true
        }

        fn dispatch(&self) -> usize {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
            0
        }
    }

    struct Rig {
        hwa: Arc<SimHwa>,
        events: Arc<CountingEvents>,
        clk: Arc<ModuleClock>,
        agent: CmdAgent<SimHwa, CountingEvents>,
    }

    fn rig(room: u32, config: EngineConfig) -> Rig {
        let hwa = Arc::new(SimHwa::new(room));
        let events = Arc::new(CountingEvents::default());
        let clk = Arc::new(ModuleClock::new("sca"));
        let agent = CmdAgent::new(
            EngineKind::Sca,
            Arc::clone(&hwa),
            Arc::clone(&events),
            Arc::clone(&clk),
            &config,
        );
        Rig { hwa, events, clk, agent }
    }

    /// One word per fill call once room is handed out by the test
    fn trickle_config() -> EngineConfig {
        EngineConfig::new().fill_cq_thresh(1).irq_mode(true)
    }

    fn task(slot: u8, nparams: u32) -> Arc<Task> {
        let mut b = CmdBuf::new(CmdId::Update, 1);
        for i in 0..nparams {
            b = b.push(0x100 * slot as u32 + i);
        }
        Task::prepare(slot, b.finish()).unwrap()
    }

    fn submit(r: &Rig, t: &Arc<Task>) {
        r.agent.submit(Arc::clone(t), EventItem::new(t.slot_id())).unwrap();
    }

    #[test]
    fn test_prepare_stamps_slot() {
        let words = CmdBuf::new(CmdId::Start, 2).push(9).finish();
        let t = Task::prepare(13, words).unwrap();
        assert_eq!(cmd::slotid(t.words()[0]), 13);
        assert_eq!(t.cmd_id(), CmdId::Start as u8);
        assert_eq!(t.cmd_len(), 8);
        assert_eq!(t.offset(), 0);

        assert_eq!(Task::prepare(32, vec![0]).unwrap_err(), TeError::BadParams);
        assert_eq!(Task::prepare(0, vec![]).unwrap_err(), TeError::BadParams);
    }

    #[test]
    fn test_thresh_from_config() {
        let r = rig(0, EngineConfig::new().cq_depth(32).irq_mode(true));
        assert!(r.agent.cq_thresh() <= crate::config::defaults::FILL_CQ_THRESH);
    }

    #[test]
    fn test_below_thresh_writes_nothing() {
        let cfg = EngineConfig::new().cq_depth(32).irq_mode(true);
        let thresh = cfg.cq_thresh();
        let r = rig(thresh - 1, cfg);
        let t = task(0, 2);
        submit(&r, &t);
        assert_eq!(r.hwa.write_count(), 0);
        assert_eq!(t.offset(), 0);
        assert_eq!(r.agent.fill(), 0);
        assert_eq!(r.hwa.write_count(), 0);

        r.hwa.consume(1);
        assert_eq!(r.agent.fill(), 1);
        assert!(t.is_drained());
        assert_eq!(r.hwa.write_count(), 3);
    }

    #[test]
    fn test_func_then_para_paths() {
        let r = rig(16, trickle_config());
        let t = task(4, 3);
        submit(&r, &t);
        let w = r.hwa.writes();
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].path, CqPath::Func);
        assert_eq!(cmd::slotid(w[0].word), 4);
        assert!(w[1..].iter().all(|x| x.path == CqPath::Para));
        assert_eq!(r.agent.pending(), 0);
        assert!(!r.hwa.wm_enabled());
    }

    #[test]
    fn test_round_robin_visits_every_slot() {
        let r = rig(0, trickle_config());
        let tasks = [task(0, 2), task(3, 2), task(7, 2)];
        for t in &tasks {
            submit(&r, t);
        }
        assert_eq!(r.agent.pending(), 3);

        // each task is 3 words, one word per call
        for _ in 0..9 {
            r.hwa.consume(1);
            r.agent.fill();
        }
        assert!(tasks.iter().all(|t| t.is_drained()));
        let slots: Vec<u8> = r.hwa.func_words().iter().map(|&w| cmd::slotid(w)).collect();
        assert_eq!(slots, vec![0, 3, 7]);
        assert_eq!(r.agent.qidx(), 7);
    }

    #[test]
    fn test_busy_slot_does_not_starve_others() {
        let r = rig(0, trickle_config());
        let a1 = task(0, 0);
        let a2 = task(0, 0);
        let a3 = task(0, 0);
        let b = task(5, 0);
        for t in [&a1, &a2, &a3, &b] {
            submit(&r, t);
        }
        r.hwa.consume(4);
        assert_eq!(r.agent.fill(), 4);
        let slots: Vec<u8> = r.hwa.func_words().iter().map(|&w| cmd::slotid(w)).collect();
        assert_eq!(slots, vec![0, 5, 0, 0]);
    }

    #[test]
    fn test_fifo_within_slot() {
        let r = rig(0, trickle_config());
        let first = task(2, 1);
        let second = task(2, 1);
        submit(&r, &first);
        submit(&r, &second);
        r.hwa.consume(2);
        r.agent.fill();
        assert!(first.is_drained());
        assert_eq!(second.offset(), 0);
    }

    #[test]
    fn test_partial_resumes_and_arms_wm_once() {
        let r = rig(0, trickle_config());
        let t = task(1, 5);
        submit(&r, &t);
        r.hwa.consume(2);
        assert_eq!(r.agent.fill(), 0);
        assert_eq!(t.offset(), 8);
        assert!(r.hwa.wm_enabled());
        assert_eq!(r.hwa.wm_arms(), 1);

        r.hwa.consume(4);
        assert_eq!(r.agent.fill(), 1);
        assert!(t.is_drained());
        assert_eq!(r.hwa.func_words().len(), 1);
        assert_eq!(r.hwa.write_count(), 6);
    }

    #[test]
    fn test_no_wm_after_a_completion() {
        let r = rig(0, trickle_config());
        let short = task(0, 0);
        let long = task(1, 8);
        submit(&r, &short);
        submit(&r, &long);
        r.hwa.consume(3);
        assert_eq!(r.agent.fill(), 1);
        assert!(long.offset() > 0 && !long.is_drained());
        assert!(!r.hwa.wm_enabled());
    }

    #[test]
    fn test_cancel_queued_and_drained() {
        let r = rig(0, trickle_config());
        let drained = task(6, 0);
        let queued = task(6, 0);
        submit(&r, &drained);
        submit(&r, &queued);
        r.hwa.consume(1);
        r.agent.fill();
        assert!(drained.is_drained());

        assert_eq!(r.agent.cancel(&drained), Err(TeError::NoData));
        assert_eq!(r.clk.refs(), 2);
        assert_eq!(r.agent.cancel(&queued), Ok(()));
        assert_eq!(r.agent.cancel(&queued), Err(TeError::NoData));
        assert_eq!(r.clk.refs(), 1);
        assert!(queued.done.get().unwrap().is_cancelled());
        assert_eq!(r.events.unbooked.load(Ordering::Relaxed), 1);

        r.hwa.consume(4);
        assert_eq!(r.agent.fill(), 0);
        assert_eq!(r.hwa.func_words().len(), 1);
        assert_eq!(r.agent.pending(), 0);
    }

    #[test]
    fn test_cancel_draining_is_nodata() {
        let r = rig(0, trickle_config());
        let t = task(9, 4);
        submit(&r, &t);
        r.hwa.consume(1);
        r.agent.fill();
        assert_eq!(t.offset(), 4);
        assert_eq!(r.agent.cancel(&t), Err(TeError::NoData));
    }

    #[test]
    fn test_booking_failure_is_atomic() {
        let r = rig(16, trickle_config());
        r.events.refuse.store(true, Ordering::Relaxed);
        let t = task(3, 1);
        assert_eq!(r.agent.submit(Arc::clone(&t), EventItem::new(3)), Err(TeError::Busy));
        assert_eq!(r.agent.pending(), 0);
        assert_eq!(r.clk.refs(), 0);
        assert_eq!(r.hwa.write_count(), 0);
        assert_eq!(r.hwa.state_calls(), 0);
    }

    #[test]
    fn test_submit_takes_clock_ref() {
        let r = rig(16, trickle_config());
        submit(&r, &task(0, 1));
        submit(&r, &task(1, 1));
        assert_eq!(r.clk.refs(), 2);
        assert_eq!(r.events.booked.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_resubmit_rejected() {
        let r = rig(16, trickle_config());
        let t = task(3, 1);
        submit(&r, &t);
        assert_eq!(r.agent.submit(Arc::clone(&t), EventItem::new(3)), Err(TeError::BadParams));
        assert_eq!(r.events.booked.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_mismatched_item_rejected() {
        let r = rig(16, trickle_config());
        let t = task(3, 1);
        assert_eq!(r.agent.submit(t, EventItem::new(4)), Err(TeError::BadParams));
        assert_eq!(r.events.booked.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_poll_mode_dispatches_after_submit() {
        let r = rig(16, EngineConfig::new().irq_mode(false));
        submit(&r, &task(0, 1));
        assert_eq!(r.events.dispatched.load(Ordering::Relaxed), 1);

        let r = rig(16, EngineConfig::new().irq_mode(true));
        submit(&r, &task(0, 1));
        assert_eq!(r.events.dispatched.load(Ordering::Relaxed), 0);
    }

    #[test]
    #[cfg(not(feature = "abort-on-fatal"))]
    #[should_panic(expected = "hardware contract violation in cq_write_para")]
    fn test_write_failure_is_fatal() {
        let r = rig(16, trickle_config());
        r.hwa.fail_next_para();
        submit(&r, &task(0, 2));
    }

    #[test]
    #[cfg(not(feature = "abort-on-fatal"))]
    #[should_panic(expected = "hardware contract violation in state")]
    fn test_state_failure_is_fatal() {
        let r = rig(16, trickle_config());
        r.hwa.fail_next_state();
        r.agent.fill();
    }

    #[test]
    fn test_concurrent_submit_and_fill() {
        let r = Arc::new(rig(0, trickle_config().slot_queue_depth(2)));
        let mut handles = vec![];
        for slot in 0..4u8 {
            let r = Arc::clone(&r);
            handles.push(std::thread::spawn(move || {
                let tasks: Vec<_> = (0..8).map(|_| task(slot, 2)).collect();
                for t in &tasks {
                    submit(&r, t);
                    r.hwa.consume(3);
                    r.agent.fill();
                }
                tasks
            }));
        }
        let tasks: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        r.hwa.consume(128);
        while r.agent.fill() > 0 {}
        assert!(tasks.iter().all(|t| t.is_drained()));
        assert_eq!(r.hwa.write_count(), 32 * 3);
    }
}
