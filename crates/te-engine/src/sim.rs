//! Software model of the CQ/EQ register pair
//!
//! Records every CQ word with the path it came through and can complete
//! commands on its own once their parameter words have arrived, so the
//! engine runs end to end without hardware.

use std::collections::VecDeque;

use te_core::cmd;
use te_core::{EqEntry, HwError, HwResult, Hwa, HwaStat, SpinLock};

/// -ENOSPC
const ERR_NOSPC: i32 = -28;
/// -EIO
const ERR_IO: i32 = -5;

/// Which register a CQ word was written through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqPath {
    Func,
    Para,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqWrite {
    pub path: CqPath,
    pub word: u32,
}

#[derive(Debug, Default)]
struct Faults {
    state: bool,
    func: bool,
    para: bool,
    wm: bool,
    eq: bool,
}

/// Command being framed by the auto-completer
#[derive(Debug)]
struct Frame {
    slot: u8,
    left: usize,
    words: u32,
}

#[derive(Debug, Default)]
struct SimState {
    room: u32,
    writes: Vec<CqWrite>,
    wm_enabled: bool,
    wm_arms: u32,
    state_calls: u32,
    eq: VecDeque<EqEntry>,
    auto_complete: bool,
    frame: Option<Frame>,
    faults: Faults,
}

impl SimState {
    /// Close the frame once its NPARA words are in
    fn settle(&mut self) {
        let done = matches!(&self.frame, Some(f) if f.left == 0);
        if !done {
            return;
        }
        if let Some(f) = self.frame.take() {
            self.eq.push_back(EqEntry { slot_id: f.slot, status: 0 });
            // the engine has consumed the command
            self.room += f.words;
        }
    }
}

pub struct SimHwa {
    inner: SpinLock<SimState>,
}

impl SimHwa {
    /// A queue with `room` free words
    pub fn new(room: u32) -> Self {
        Self {
            inner: SpinLock::new(SimState { room, ..Default::default() }),
        }
    }

    /// Post a zero status for every command once it is fully written,
    /// and give its words back to the queue
    pub fn with_auto_complete(self) -> Self {
        self.inner.lock().auto_complete = true;
        self
    }

    pub fn set_auto_complete(&self, on: bool) {
        self.inner.lock().auto_complete = on;
    }

    pub fn room(&self) -> u32 {
        self.inner.lock().room
    }

    pub fn set_room(&self, room: u32) {
        self.inner.lock().room = room;
    }

    /// The engine drained `n` words
    pub fn consume(&self, n: u32) {
        self.inner.lock().room += n;
    }

    /// Every CQ write so far, in order
    pub fn writes(&self) -> Vec<CqWrite> {
        self.inner.lock().writes.clone()
    }

    /// CQ words only, in order
    pub fn words(&self) -> Vec<u32> {
        self.inner.lock().writes.iter().map(|w| w.word).collect()
    }

    /// Header words only, in order
    pub fn func_words(&self) -> Vec<u32> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|w| w.path == CqPath::Func)
            .map(|w| w.word)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }

    pub fn wm_enabled(&self) -> bool {
        self.inner.lock().wm_enabled
    }

    /// Times the watermark interrupt went from disarmed to armed
    pub fn wm_arms(&self) -> u32 {
        self.inner.lock().wm_arms
    }

    pub fn state_calls(&self) -> u32 {
        self.inner.lock().state_calls
    }

    /// Queue an EQ record by hand
    pub fn post(&self, slot_id: u8, status: u32) {
        self.inner.lock().eq.push_back(EqEntry { slot_id, status });
    }

    pub fn eq_len(&self) -> usize {
        self.inner.lock().eq.len()
    }

    pub fn fail_next_state(&self) {
        self.inner.lock().faults.state = true;
    }

    pub fn fail_next_func(&self) {
        self.inner.lock().faults.func = true;
    }

    pub fn fail_next_para(&self) {
        self.inner.lock().faults.para = true;
    }

    pub fn fail_next_wm(&self) {
        self.inner.lock().faults.wm = true;
    }

    pub fn fail_next_eq(&self) {
        self.inner.lock().faults.eq = true;
    }
}

impl Hwa for SimHwa {
    fn state(&self) -> HwResult<HwaStat> {
        let mut s = self.inner.lock();
        s.state_calls += 1;
        if std::mem::take(&mut s.faults.state) {
            return Err(HwError(ERR_IO));
        }
        Ok(HwaStat {
            cq_avail_slots: s.room,
            eq_pending: s.eq.len() as u32,
        })
    }

    fn cq_write_func(&self, word: u32) -> HwResult<()> {
        let mut s = self.inner.lock();
        if std::mem::take(&mut s.faults.func) {
            return Err(HwError(ERR_IO));
        }
        if s.room == 0 {
            return Err(HwError(ERR_NOSPC));
        }
        s.room -= 1;
        s.writes.push(CqWrite { path: CqPath::Func, word });
        if s.auto_complete {
            s.frame = Some(Frame {
                slot: cmd::slotid(word),
                left: cmd::npara(word),
                words: 1 + cmd::npara(word) as u32,
            });
            s.settle();
        }
        Ok(())
    }

    fn cq_write_para(&self, words: &[u32]) -> HwResult<()> {
        let mut s = self.inner.lock();
        if std::mem::take(&mut s.faults.para) {
            return Err(HwError(ERR_IO));
        }
        if (s.room as usize) < words.len() {
            return Err(HwError(ERR_NOSPC));
        }
        s.room -= words.len() as u32;
        s.writes
            .extend(words.iter().map(|&word| CqWrite { path: CqPath::Para, word }));
        if let Some(f) = s.frame.as_mut() {
            f.left = f.left.saturating_sub(words.len());
        }
        s.settle();
        Ok(())
    }

    fn cqwm_ctrl(&self, enable: bool) -> HwResult<()> {
        let mut s = self.inner.lock();
        if std::mem::take(&mut s.faults.wm) {
            return Err(HwError(ERR_IO));
        }
        if enable && !s.wm_enabled {
            s.wm_arms += 1;
        }
        s.wm_enabled = enable;
        Ok(())
    }

    fn eq_read(&self, out: &mut [EqEntry]) -> HwResult<usize> {
        let mut s = self.inner.lock();
        if std::mem::take(&mut s.faults.eq) {
            return Err(HwError(ERR_IO));
        }
        let n = out.len().min(s.eq.len());
        for (dst, e) in out.iter_mut().zip(s.eq.drain(..n)) {
            *dst = e;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use te_core::{CmdBuf, CmdId};

    #[test]
    fn test_room_accounting() {
        let hwa = SimHwa::new(3);
        hwa.cq_write_func(0x8000_0000).unwrap();
        hwa.cq_write_para(&[1, 2]).unwrap();
        assert_eq!(hwa.room(), 0);
        assert_eq!(hwa.cq_write_para(&[3]), Err(HwError(ERR_NOSPC)));
        hwa.consume(2);
        assert_eq!(hwa.state().unwrap().cq_avail_slots, 2);
        assert_eq!(hwa.func_words(), vec![0x8000_0000]);
        assert_eq!(hwa.words(), vec![0x8000_0000, 1, 2]);
    }

    #[test]
    fn test_auto_complete_frames_by_npara() {
        let hwa = SimHwa::new(8).with_auto_complete();
        let words = CmdBuf::new(CmdId::Update, 1).push(7).push(8).finish();
        let hdr = cmd::set_slotid(words[0], 5);
        hwa.cq_write_func(hdr).unwrap();
        hwa.cq_write_para(&words[1..2]).unwrap();
        assert_eq!(hwa.eq_len(), 0);
        hwa.cq_write_para(&words[2..]).unwrap();
        assert_eq!(hwa.eq_len(), 1);
        assert_eq!(hwa.room(), 8);

        let mut out = [EqEntry::default(); 4];
        assert_eq!(hwa.eq_read(&mut out), Ok(1));
        assert_eq!(out[0], EqEntry { slot_id: 5, status: 0 });
    }

    #[test]
    fn test_header_only_command_completes() {
        let hwa = SimHwa::new(4).with_auto_complete();
        let words = CmdBuf::new(CmdId::Init, 0).finish();
        hwa.cq_write_func(cmd::set_slotid(words[0], 2)).unwrap();
        assert_eq!(hwa.eq_len(), 1);
    }

    #[test]
    fn test_faults_fire_once() {
        let hwa = SimHwa::new(4);
        hwa.fail_next_func();
        assert!(hwa.cq_write_func(1).is_err());
        assert!(hwa.cq_write_func(1).is_ok());
        hwa.fail_next_state();
        assert!(hwa.state().is_err());
        assert!(hwa.state().is_ok());
    }

    #[test]
    fn test_wm_arm_count() {
        let hwa = SimHwa::new(0);
        hwa.cqwm_ctrl(true).unwrap();
        hwa.cqwm_ctrl(true).unwrap();
        assert_eq!(hwa.wm_arms(), 1);
        hwa.cqwm_ctrl(false).unwrap();
        hwa.cqwm_ctrl(true).unwrap();
        assert_eq!(hwa.wm_arms(), 2);
        assert!(hwa.wm_enabled());
    }
}
