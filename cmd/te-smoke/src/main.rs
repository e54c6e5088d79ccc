//! TrustEngine End-to-End Smoke Test
//!
//! Drives the full stack over the software HWA model:
//!   Part A: Memory lists: truncate/restore, tail copy, xor, link lists
//!   Part B: Command agent: threshold, round-robin, watermark, cancel
//!   Part C: Sessions: cipher and MAC lifecycles, clone, state checks
//!   Part D: Concurrency: many sessions from many threads, irq mode
//!
//! Run: ./target/release/te-smoke
//! (TE_LOG_LEVEL=debug for engine logs)

use std::sync::Arc;
use std::thread;

use te_core::constants::MAC_LEN;
use te_core::{cmd, CmdBuf, CmdId, EventItem, LinkList, MemList, TeError};
use te_engine::{
    EngineConfig, EngineKind, IrqStat, IvParams, Module, SessAlg, SessState, Session, SimHwa, Task,
};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

const KEY: [u8; 16] = [0x5A; 16];

fn iv(count: u32) -> IvParams {
    IvParams { count, bearer_or_fresh: 0x0C, direction: 0 }
}

fn poll_module(hwa: Arc<SimHwa>, config: EngineConfig) -> Option<Module<SimHwa>> {
    match Module::new(EngineKind::Sca, hwa, config) {
        Ok(m) => Some(m),
        Err(e) => {
            println!("\nFATAL: module setup failed: {}", e);
            None
        }
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Memory lists
// ════════════════════════════════════════════════════════════

fn test_memlist(t: &mut TestRunner) {
    t.section("Part A: Memory lists");

    let mut a = [0xA0u8, 0xA1, 0xA2];
    let mut b = [0xB0u8, 0xB1, 0xB2, 0xB3, 0xB4];
    let mut ml = MemList::from_slices([&mut a[..], &mut b[..]]);

    // A1: tail copy spans both entries, list untouched
    let mut out = [0u8; 6];
    let r = ml.copy_from_tail(&mut out, 6);
    t.check("copy_from_tail(6) spans entries", r.is_ok() && out == [0xA2, 0xB0, 0xB1, 0xB2, 0xB3, 0xB4],
        &format!("{:?} {:02x?}", r, out));
    t.check("total_len unchanged", ml.total_len() == 8, &format!("{}", ml.total_len()));

    // A2: truncate tail, restore
    let mut tail = [0u8; 3];
    let bp = ml.truncate_from_tail(Some(&mut tail), 3);
    t.check("truncate_from_tail(3) keeps 5", ml.total_len() == 5 && tail == [0xB2, 0xB3, 0xB4],
        &format!("len {} tail {:02x?}", ml.total_len(), tail));
    let r = ml.restore(&bp);
    t.check("restore after tail truncate", r.is_ok() && ml.total_len() == 8 && ml.nent() == 2,
        &format!("{:?} len {}", r, ml.total_len()));

    // A3: truncate head past the end is an input error
    t.check("truncate_from_head(9) -> BadInputLen",
        ml.truncate_from_head(9) == Err(TeError::BadInputLen), "accepted");

    // A4: xor twice restores
    let mut plain = *b"trustengine!";
    let mut c1 = [0u8; 5];
    let mut c2 = [0u8; 7];
    let mut d = [0u8; 12];
    let ks: Vec<u8> = (0..12u8).map(|i| i.wrapping_mul(37) ^ 0x5C).collect();
    let input = MemList::from_slices([&mut plain[..]]);
    let mut cipher = MemList::from_slices([&mut c1[..], &mut c2[..]]);
    let mut back = MemList::from_slices([&mut d[..]]);
    let ok = cipher.xor(&input, &ks, 12).is_ok() && back.xor(&cipher, &ks, 12).is_ok();
    let mut flat = [0u8; 12];
    let ok = ok && back.copy(0, &mut flat).is_ok();
    t.check("xor involution across partitions", ok && &flat == b"trustengine!",
        &format!("{:?}", String::from_utf8_lossy(&flat)));

    // A5: link list ends with sentinel and parses back
    match LinkList::from_memlist(&cipher, true) {
        Ok(ll) => {
            let parsed = LinkList::parse(&ll.to_bytes());
            t.check("link list: 2 entries + sentinel", ll.byte_len() == 48,
                &format!("{} bytes", ll.byte_len()));
            t.check("link list parses back",
                parsed.map(|p| p.total_size() == 12 && p.entries().iter().all(|e| e.nonsecure()))
                    .unwrap_or(false),
                "mismatch");
        }
        Err(e) => t.fail("link list from memlist", &format!("{}", e)),
    }
}

// ════════════════════════════════════════════════════════════
// Part B: Command agent
// ════════════════════════════════════════════════════════════

fn test_agent(t: &mut TestRunner) {
    t.section("Part B: Command agent");

    let hwa = Arc::new(SimHwa::new(0));
    let config = EngineConfig::new().irq_mode(true);
    let Some(m) = poll_module(Arc::clone(&hwa), config.clone()) else {
        t.fail("module setup", "config rejected");
        return;
    };
    let thresh = m.agent().cq_thresh();
    t.check(&format!("cq_thresh {} <= fill constant", thresh), thresh <= config.fill_cq_thresh,
        &format!("{}", thresh));

    // B1: below threshold nothing is written
    let tasks: Vec<Arc<Task>> = [0u8, 3, 7]
        .iter()
        .filter_map(|&s| Task::prepare(s, CmdBuf::new(CmdId::Update, 1).push(s as u32).push(1).finish()).ok())
        .collect();
    for task in &tasks {
        if let Err(e) = m.submit(Arc::clone(task), EventItem::new(task.slot_id())) {
            t.fail("submit", &format!("{}", e));
        }
    }
    hwa.set_room(thresh - 1);
    m.agent().fill();
    t.check("room below thresh -> no CQ writes", hwa.write_count() == 0,
        &format!("{} writes", hwa.write_count()));

    // B2: room for everything drains round-robin
    hwa.set_room(thresh.max(9));
    m.agent().fill();
    let order: Vec<u8> = hwa.func_words().iter().map(|&w| cmd::slotid(w)).collect();
    t.check("round-robin order 0,3,7", order == [0, 3, 7], &format!("{:?}", order));
    t.check("all tasks drained", tasks.iter().all(|t| t.is_drained()), "partial");

    // B3: a long command stalls and arms the watermark
    let long = CmdBuf::new(CmdId::Update, 1).push_bytes(&[0xEE; 64]).finish();
    let long_len = long.len() as u32;
    match Task::prepare(9, long) {
        Ok(task) => {
            let _ = m.submit(Arc::clone(&task), EventItem::new(9));
            hwa.set_room(thresh);
            m.agent().fill();
            t.check("partial drain arms watermark", hwa.wm_enabled() && !task.is_drained(),
                &format!("offs {}", task.offset()));
            hwa.set_room(long_len);
            m.irq(IrqStat::CQ_WM);
            t.check("watermark irq resumes drain", task.is_drained(),
                &format!("offs {}", task.offset()));
        }
        Err(e) => t.fail("prepare long task", &format!("{}", e)),
    }

    // B4: cancel
    hwa.set_room(0);
    if let Ok(task) = Task::prepare(2, CmdBuf::new(CmdId::Start, 1).finish()) {
        let _ = m.submit(Arc::clone(&task), EventItem::new(2));
        t.check("cancel queued task", m.cancel(&task).is_ok(), "not found");
        t.check("cancel twice -> NoData", m.cancel(&task) == Err(TeError::NoData), "found");
        t.check("cancelled booking withdrawn", m.events().outstanding(2) == 0,
            &format!("{} booked", m.events().outstanding(2)));
    }

    // Settle outstanding bookings so the clock drops
    for s in [0u8, 3, 7, 9] {
        hwa.post(s, 0);
    }
    m.irq(IrqStat::EQ);
    t.check("clock off once idle", !m.clock().is_on(), &format!("refs {}", m.clock().refs()));
}

// ════════════════════════════════════════════════════════════
// Part C: Sessions
// ════════════════════════════════════════════════════════════

fn test_sessions(t: &mut TestRunner) {
    t.section("Part C: Sessions");

    let hwa = Arc::new(SimHwa::new(32).with_auto_complete());
    let Some(m) = poll_module(Arc::clone(&hwa), EngineConfig::new().irq_mode(false)) else {
        t.fail("module setup", "config rejected");
        return;
    };

    // C1: cipher
    match Session::init(&m, SessAlg::Uea2) {
        Ok(mut s) => {
            let mut data = [0x42u8; 40];
            let mut out = [0u8; 40];
            let ok = s.setkey(&KEY).is_ok()
                && s.start(&iv(1)).is_ok()
                && s.update(&mut data, Some(&mut out)).is_ok();
            t.check("UEA2 setkey/start/update", ok && s.state() == SessState::Update,
                &format!("{:?}", s.state()));
            t.check("cipher finish -> BadParams",
                s.finish(&mut [0u8; MAC_LEN]) == Err(TeError::BadParams), "accepted");
        }
        Err(e) => t.fail("UEA2 init", &format!("{}", e)),
    }

    // C2: MAC with clone
    match Session::init(&m, SessAlg::Eia3) {
        Ok(mut s) => {
            let mut tag = [0u8; MAC_LEN];
            t.check("update before start -> BadState",
                s.update(&mut [1u8; 8], None) == Err(TeError::BadState), "accepted");
            let ok = s.setkey(&KEY).is_ok() && s.start(&iv(7)).is_ok();
            let copy = s.clone_session();
            t.check("clone_session", copy.as_ref().map(|c| c.state() == SessState::Start).unwrap_or(false),
                "clone failed");
            let mut msg = [0x33u8; 20];
            let ok = ok && s.update(&mut msg, None).is_ok() && s.finish(&mut tag).is_ok();
            t.check("EIA3 update/finish", ok && s.state() == SessState::Done, &format!("{:?}", s.state()));
            if let Ok(mut c) = copy {
                let mut part = [0x33u8; 20];
                let ml = MemList::from_slices([&mut part[..]]);
                t.check("clone finup", c.finup(&ml, 20, &mut tag).is_ok(), "finup failed");
            }
        }
        Err(e) => t.fail("EIA3 init", &format!("{}", e)),
    }

    t.check("slots released", m.slots().allocated() == 0, &format!("{}", m.slots().allocated()));
    t.check("clock off", !m.clock().is_on(), &format!("refs {}", m.clock().refs()));
}

// ════════════════════════════════════════════════════════════
// Part D: Concurrency
// ════════════════════════════════════════════════════════════

fn test_concurrency(t: &mut TestRunner) {
    t.section("Part D: Concurrency");

    // D1: poll mode, 8 threads x 16 sessions
    let hwa = Arc::new(SimHwa::new(64).with_auto_complete());
    let Some(m) = poll_module(Arc::clone(&hwa), EngineConfig::new().cq_depth(64).irq_mode(false)) else {
        t.fail("module setup", "config rejected");
        return;
    };
    let m = Arc::new(m);
    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let mut ok = 0u32;
                for n in 0..16 {
                    let Ok(mut s) = Session::init(&*m, SessAlg::Uia2) else { continue };
                    let mut msg = [i as u8; 32];
                    let mut tag = [0u8; MAC_LEN];
                    if s.setkey(&KEY).is_ok()
                        && s.start(&IvParams { count: n, bearer_or_fresh: i, direction: 1 }).is_ok()
                        && s.update(&mut msg, None).is_ok()
                        && s.finish(&mut tag).is_ok()
                    {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();
    let done: u32 = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    t.check("128 MAC sessions across 8 threads", done == 128, &format!("{} ok", done));
    t.check("no task left queued", m.agent().pending() == 0, &format!("{}", m.agent().pending()));

    // D2: irq mode with an interrupt thread
    let hwa = Arc::new(SimHwa::new(32).with_auto_complete());
    let Some(m) = poll_module(Arc::clone(&hwa), EngineConfig::new().irq_mode(true)) else {
        t.fail("module setup", "config rejected");
        return;
    };
    let m = Arc::new(m);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let irq = {
        let (m, hwa, stop) = (Arc::clone(&m), Arc::clone(&hwa), Arc::clone(&stop));
        thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Acquire) {
                if hwa.eq_len() > 0 {
                    m.irq(IrqStat::EQ | IrqStat::CQ_WM);
                }
                thread::yield_now();
            }
        })
    };
    let ok = match Session::init(&*m, SessAlg::F8) {
        Ok(mut s) => {
            let mut data = [7u8; 16];
            let mut out = [0u8; 16];
            s.setkey(&KEY).is_ok() && s.start(&iv(3)).is_ok() && s.update(&mut data, Some(&mut out)).is_ok()
        }
        Err(_) => false,
    };
    stop.store(true, std::sync::atomic::Ordering::Release);
    let _ = irq.join();
    t.check("irq mode F8 session", ok, "session failed");
}

// ════════════════════════════════════════════════════════════

fn main() {
    println!("=== TrustEngine End-to-End Smoke Test ===");

    let config = EngineConfig::from_env();
    if let Err(e) = config.validate() {
        println!("\nFATAL: {}", e);
        std::process::exit(1);
    }
    config.print();

    let mut t = TestRunner::new();

    test_memlist(&mut t);
    test_agent(&mut t);
    test_sessions(&mut t);
    test_concurrency(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
