//! 3GPP cipher and integrity sessions (f8, f9, UEA2, UIA2, EIA3)
//!
//! A session owns one hardware slot for its lifetime and walks a fixed
//! lifecycle:
//!
//! ```text
//!   Init --setkey--> Ready --start--> Start --update--> Update
//!                      ^                ^                 |
//!                      |                +------start------+ (any keyed state)
//!                      +---setkey--- Done <---finish/finup-+ (MAC only)
//! ```
//!
//! Every operation checks the state before building a command; a call in
//! the wrong state returns `BadState` and nothing reaches the engine.
//! Data is handed to the engine as hardware link lists built from the
//! caller's memory lists.

use te_core::constants::{MAC_LEN, SESS_KEY_LEN};
use te_core::{te_dbg, CmdBuf, CmdId, Hwa, LinkList, MemList, TeError, TeResult};

use crate::module::Module;

/// Largest bearer id for the ciphering algorithms (5 bits)
const BEARER_MAX: u32 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessAlg {
    /// KASUMI f8 ciphering
    F8,
    /// KASUMI f9 integrity
    F9,
    /// SNOW 3G ciphering
    Uea2,
    /// SNOW 3G integrity
    Uia2,
    /// ZUC integrity
    Eia3,
}

impl SessAlg {
    /// Produces a MAC rather than ciphertext
    pub fn is_mac(&self) -> bool {
        matches!(self, SessAlg::F9 | SessAlg::Uia2 | SessAlg::Eia3)
    }

    /// Selector for the header ALG field
    pub fn engine_alg(&self) -> u8 {
        match self {
            SessAlg::F8 => 0x1,
            SessAlg::F9 => 0x2,
            SessAlg::Uea2 => 0x3,
            SessAlg::Uia2 => 0x4,
            SessAlg::Eia3 => 0x5,
        }
    }

    /// Takes a 5-bit bearer in the IV; otherwise a 32-bit FRESH value
    fn uses_bearer(&self) -> bool {
        matches!(self, SessAlg::F8 | SessAlg::Uea2 | SessAlg::Eia3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessState {
    Init,
    Ready,
    Start,
    Update,
    Done,
}

/// Per-message IV inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IvParams {
    pub count: u32,
    /// Bearer for f8/UEA2/EIA3, FRESH for f9/UIA2
    pub bearer_or_fresh: u32,
    /// 0 uplink, 1 downlink
    pub direction: u8,
}

pub struct Session<'m, H: Hwa> {
    module: &'m Module<H>,
    slot_id: u8,
    alg: SessAlg,
    state: SessState,
}

impl<'m, H: Hwa> Session<'m, H> {
    /// Allocate a slot and initialize a context for `alg` on it
    pub fn init(module: &'m Module<H>, alg: SessAlg) -> TeResult<Self> {
        let slot_id = module.alloc_slot()?;
        let sess = Session { module, slot_id, alg, state: SessState::Init };
        sess.run(CmdBuf::new(CmdId::Init, alg.engine_alg()))?;
        te_dbg!("{}: {:?} session on slot {}", module.kind().tag(), alg, slot_id);
        Ok(sess)
    }

    pub fn slot_id(&self) -> u8 {
        self.slot_id
    }

    pub fn alg(&self) -> SessAlg {
        self.alg
    }

    pub fn state(&self) -> SessState {
        self.state
    }

    fn expect(&self, allowed: &[SessState]) -> TeResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TeError::BadState)
        }
    }

    fn run(&self, cmd: CmdBuf) -> TeResult<()> {
        self.module.exec(self.slot_id, cmd.finish())
    }

    fn cmd(&self, id: CmdId) -> CmdBuf {
        CmdBuf::new(id, self.alg.engine_alg())
    }

    pub fn setkey(&mut self, key: &[u8]) -> TeResult<()> {
        self.expect(&[SessState::Init, SessState::Ready, SessState::Done])?;
        if key.len() != SESS_KEY_LEN {
            return Err(TeError::BadParams);
        }
        self.run(self.cmd(CmdId::SetKey).push_bytes(key))?;
        self.state = SessState::Ready;
        Ok(())
    }

    pub fn start(&mut self, iv: &IvParams) -> TeResult<()> {
        self.expect(&[SessState::Ready, SessState::Start, SessState::Update, SessState::Done])?;
        if iv.direction > 1 || (self.alg.uses_bearer() && iv.bearer_or_fresh > BEARER_MAX) {
            return Err(TeError::BadParams);
        }
        self.run(
            self.cmd(CmdId::Start)
                .push(iv.count)
                .push(iv.bearer_or_fresh)
                .push(iv.direction as u32),
        )?;
        self.state = SessState::Start;
        Ok(())
    }

    /// Feed `len` bytes of `input`; cipher sessions write the same amount
    /// to `output`, MAC sessions take none
    pub fn uplist(&mut self, input: &MemList<'_>, output: Option<&MemList<'_>>, len: usize) -> TeResult<()> {
        self.expect(&[SessState::Start, SessState::Update])?;
        if self.alg.is_mac() == output.is_some() {
            return Err(TeError::BadParams);
        }
        let nbytes = data_len(len)?;
        if input.total_len() < len || output.is_some_and(|o| o.total_len() < len) {
            return Err(TeError::BadInputLen);
        }
        let src = link_list(input, len)?;
        let mut cmd = self.cmd(CmdId::Update).push_u64(src.bus_addr()).push(nbytes);
        let dst = match output {
            Some(out) => Some(link_list(out, len)?),
            None => None,
        };
        if let Some(dst) = &dst {
            cmd = cmd.push_u64(dst.bus_addr());
        }
        self.run(cmd)?;
        self.state = SessState::Update;
        Ok(())
    }

    /// Flat-buffer form of `uplist`
    pub fn update(&mut self, input: &mut [u8], output: Option<&mut [u8]>) -> TeResult<()> {
        let len = input.len();
        let src = MemList::from_slices([input]);
        match output {
            Some(out) => {
                let dst = MemList::from_slices([out]);
                self.uplist(&src, Some(&dst), len)
            }
            None => self.uplist(&src, None, len),
        }
    }

    /// Close a MAC computation; the engine writes the MAC to `tag`
    pub fn finish(&mut self, tag: &mut [u8]) -> TeResult<()> {
        if !self.alg.is_mac() {
            return Err(TeError::BadParams);
        }
        self.expect(&[SessState::Start, SessState::Update])?;
        if tag.len() < MAC_LEN {
            return Err(TeError::BadParams);
        }
        self.run(self.cmd(CmdId::Finish).push_u64(tag.as_mut_ptr() as usize as u64))?;
        self.state = SessState::Done;
        Ok(())
    }

    /// Last `len` bytes of a MAC computation plus finish in one command
    pub fn finup(&mut self, input: &MemList<'_>, len: usize, tag: &mut [u8]) -> TeResult<()> {
        if !self.alg.is_mac() {
            return Err(TeError::BadParams);
        }
        self.expect(&[SessState::Start, SessState::Update])?;
        if tag.len() < MAC_LEN {
            return Err(TeError::BadParams);
        }
        let nbytes = data_len(len)?;
        if input.total_len() < len {
            return Err(TeError::BadInputLen);
        }
        let src = link_list(input, len)?;
        self.run(
            self.cmd(CmdId::Finup)
                .push_u64(src.bus_addr())
                .push(nbytes)
                .push_u64(tag.as_mut_ptr() as usize as u64),
        )?;
        self.state = SessState::Done;
        Ok(())
    }

    /// Copy this context into a fresh slot
    pub fn clone_session(&self) -> TeResult<Session<'m, H>> {
        let slot_id = self.module.alloc_slot()?;
        let copy = Session {
            module: self.module,
            slot_id,
            alg: self.alg,
            state: self.state,
        };
        self.run(self.cmd(CmdId::Clone).push(slot_id as u32))?;
        Ok(copy)
    }
}

impl<H: Hwa> Drop for Session<'_, H> {
    fn drop(&mut self) {
        self.module.free_slot(self.slot_id);
    }
}

fn data_len(len: usize) -> TeResult<u32> {
    if len == 0 {
        return Err(TeError::BadInputLen);
    }
    u32::try_from(len).map_err(|_| TeError::BadInputLen)
}

/// Link list for the first `len` bytes of `ml`
fn link_list(ml: &MemList<'_>, len: usize) -> TeResult<LinkList> {
    let view = ml.clone_range(0, len)?;
    LinkList::from_memlist(&view, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::module::EngineKind;
    use crate::sim::SimHwa;
    use std::sync::Arc;
    use te_core::cmd;

    const KEY: [u8; 16] = [0x2B; 16];

    fn module() -> (Arc<SimHwa>, Module<SimHwa>) {
        let hwa = Arc::new(SimHwa::new(32).with_auto_complete());
        let m = Module::new(EngineKind::Sca, Arc::clone(&hwa), EngineConfig::new().irq_mode(false))
            .unwrap();
        (hwa, m)
    }

    /// (cmdid, slotid) of every header written so far
    fn sent(hwa: &SimHwa) -> Vec<(u8, u8)> {
        hwa.func_words()
            .iter()
            .map(|&w| (cmd::cmdid(w), cmd::slotid(w)))
            .collect()
    }

    fn iv() -> IvParams {
        IvParams { count: 0x398A_59B4, bearer_or_fresh: 0x15, direction: 1 }
    }

    #[test]
    fn test_alg_classes() {
        assert!(SessAlg::F9.is_mac());
        assert!(SessAlg::Uia2.is_mac());
        assert!(SessAlg::Eia3.is_mac());
        assert!(!SessAlg::F8.is_mac());
        assert!(!SessAlg::Uea2.is_mac());
    }

    #[test]
    fn test_cipher_lifecycle() {
        let (hwa, m) = module();
        let mut s = Session::init(&m, SessAlg::Uea2).unwrap();
        assert_eq!(s.state(), SessState::Init);
        s.setkey(&KEY).unwrap();
        s.start(&iv()).unwrap();

        let mut input = [0x11u8; 24];
        let mut output = [0u8; 24];
        s.update(&mut input, Some(&mut output)).unwrap();
        s.update(&mut input, Some(&mut output)).unwrap();
        assert_eq!(s.state(), SessState::Update);

        let slot = s.slot_id();
        let ops: Vec<u8> = sent(&hwa).iter().map(|&(c, _)| c).collect();
        assert_eq!(
            ops,
            vec![
                CmdId::Init as u8,
                CmdId::SetKey as u8,
                CmdId::Start as u8,
                CmdId::Update as u8,
                CmdId::Update as u8
            ]
        );
        assert!(sent(&hwa).iter().all(|&(_, sl)| sl == slot));
        assert!(hwa.func_words().iter().all(|&w| cmd::alg(w) == SessAlg::Uea2.engine_alg()));

        // restart with a new IV
        s.start(&iv()).unwrap();
        assert_eq!(s.state(), SessState::Start);
    }

    #[test]
    fn test_mac_lifecycle() {
        let (hwa, m) = module();
        let mut s = Session::init(&m, SessAlg::Eia3).unwrap();
        s.setkey(&KEY).unwrap();
        s.start(&iv()).unwrap();
        let mut a = [1u8; 5];
        let mut b = [2u8; 7];
        let ml = MemList::from_slices([&mut a[..], &mut b[..]]);
        s.uplist(&ml, None, 12).unwrap();
        let mut tag = [0u8; MAC_LEN];
        s.finish(&mut tag).unwrap();
        assert_eq!(s.state(), SessState::Done);

        // a finished context takes a new key or a new IV
        s.start(&iv()).unwrap();
        s.finup(&ml, 8, &mut tag).unwrap();
        assert_eq!(s.state(), SessState::Done);
        s.setkey(&KEY).unwrap();
        assert_eq!(s.state(), SessState::Ready);

        let last = *hwa.func_words().iter().rev().nth(1).unwrap();
        assert_eq!(cmd::cmdid(last), CmdId::Finup as u8);
    }

    #[test]
    fn test_wrong_state_sends_nothing() {
        let (hwa, m) = module();
        let mut s = Session::init(&m, SessAlg::F9).unwrap();
        let before = hwa.write_count();

        let mut data = [0u8; 8];
        let mut tag = [0u8; 4];
        assert_eq!(s.start(&iv()), Err(TeError::BadState));
        assert_eq!(s.update(&mut data, None), Err(TeError::BadState));
        assert_eq!(s.finish(&mut tag), Err(TeError::BadState));

        s.setkey(&KEY).unwrap();
        let before_ready = hwa.write_count();
        assert!(before_ready > before);
        assert_eq!(s.update(&mut data, None), Err(TeError::BadState));
        assert_eq!(s.finish(&mut tag), Err(TeError::BadState));
        assert_eq!(hwa.write_count(), before_ready);
        assert_eq!(s.state(), SessState::Ready);
    }

    #[test]
    fn test_parameter_checks() {
        let (hwa, m) = module();
        let mut mac = Session::init(&m, SessAlg::Uia2).unwrap();
        let mut ciph = Session::init(&m, SessAlg::F8).unwrap();

        assert_eq!(mac.setkey(&KEY[..15]), Err(TeError::BadParams));
        mac.setkey(&KEY).unwrap();
        ciph.setkey(&KEY).unwrap();

        // FRESH is a full word for f9/UIA2, bearer is 5 bits for f8
        mac.start(&IvParams { count: 1, bearer_or_fresh: 0xFFFF_FFFF, direction: 0 }).unwrap();
        assert_eq!(
            ciph.start(&IvParams { count: 1, bearer_or_fresh: 0x20, direction: 0 }),
            Err(TeError::BadParams)
        );
        assert_eq!(
            ciph.start(&IvParams { count: 1, bearer_or_fresh: 0, direction: 2 }),
            Err(TeError::BadParams)
        );
        ciph.start(&iv()).unwrap();

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        let mut short = [0u8; 8];
        let mut tag = [0u8; 3];
        let before = hwa.write_count();
        assert_eq!(mac.update(&mut a, Some(&mut b)), Err(TeError::BadParams));
        assert_eq!(ciph.update(&mut a, None), Err(TeError::BadParams));
        assert_eq!(ciph.update(&mut a, Some(&mut short)), Err(TeError::BadInputLen));
        assert_eq!(ciph.update(&mut [], Some(&mut b)), Err(TeError::BadInputLen));
        assert_eq!(mac.finish(&mut tag), Err(TeError::BadParams));
        assert_eq!(ciph.finish(&mut b), Err(TeError::BadParams));
        assert_eq!(hwa.write_count(), before);
        assert_eq!(ciph.state(), SessState::Start);
    }

    #[test]
    fn test_uplist_marshals_link_lists() {
        let (hwa, m) = module();
        let mut s = Session::init(&m, SessAlg::Uea2).unwrap();
        s.setkey(&KEY).unwrap();
        s.start(&iv()).unwrap();
        hwa.clear_writes();

        let mut a = [0u8; 10];
        let mut b = [0u8; 10];
        let mut out = [0u8; 32];
        let input = MemList::from_slices([&mut a[..], &mut b[..]]);
        let output = MemList::from_slices([&mut out[..]]);
        s.uplist(&input, Some(&output), 14).unwrap();

        let words = hwa.words();
        // header, src addr (2), len, dst addr (2)
        assert_eq!(words.len(), 6);
        assert_eq!(cmd::npara(words[0]), 5);
        assert_eq!(words[3], 14);
        assert_ne!(words[1] as u64 | (words[2] as u64) << 32, 0);
    }

    #[test]
    fn test_clone_session() {
        let (hwa, m) = module();
        let mut s = Session::init(&m, SessAlg::Uia2).unwrap();
        s.setkey(&KEY).unwrap();
        let c = s.clone_session().unwrap();
        assert_ne!(c.slot_id(), s.slot_id());
        assert_eq!(c.alg(), SessAlg::Uia2);
        assert_eq!(c.state(), SessState::Ready);

        let words = hwa.words();
        let hdr = words[words.len() - 2];
        assert_eq!(cmd::cmdid(hdr), CmdId::Clone as u8);
        assert_eq!(cmd::slotid(hdr), s.slot_id());
        assert_eq!(words[words.len() - 1], c.slot_id() as u32);
        assert_eq!(m.slots().allocated(), 2);
    }

    #[test]
    fn test_drop_frees_slot() {
        let (_, m) = module();
        {
            let _a = Session::init(&m, SessAlg::F8).unwrap();
            let _b = Session::init(&m, SessAlg::F9).unwrap();
            assert_eq!(m.slots().allocated(), 2);
        }
        assert_eq!(m.slots().allocated(), 0);
    }

    #[test]
    fn test_failed_init_releases_slot() {
        let hwa = Arc::new(SimHwa::new(32));
        let m = Module::new(EngineKind::Hash, Arc::clone(&hwa), EngineConfig::new().irq_mode(false))
            .unwrap();
        let slot = m.slots().alloc().unwrap();
        m.slots().free(slot);
        hwa.post(slot, 0x9);
        assert_eq!(Session::init(&m, SessAlg::F9).err(), Some(TeError::Engine(0x9)));
        assert_eq!(m.slots().allocated(), 0);
    }
}
