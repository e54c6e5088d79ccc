//! Raw command word layout
//!
//! Word 0 of every CQ command is a header the hardware decodes:
//!
//! ```text
//!  31      24 23  21 20    16 15  12 11            0
//! +----------+------+--------+------+---------------+
//! |  CMDID   | rsvd | SLOTID | ALG  |     NPARA     |
//! +----------+------+--------+------+---------------+
//! ```
//!
//! SLOTID must be stamped into the header before the command is queued;
//! the hardware routes on the embedded id, not on driver bookkeeping.

use crate::constants::MAX_SLOT_NUM;

const CMDID_SHIFT: u32 = 24;
const CMDID_MASK: u32 = 0xFF;
const SLOTID_SHIFT: u32 = 16;
const SLOTID_MASK: u32 = 0x1F;
const ALG_SHIFT: u32 = 12;
const ALG_MASK: u32 = 0xF;
const NPARA_MASK: u32 = 0xFFF;

const _: () = assert!(MAX_SLOT_NUM <= (SLOTID_MASK as usize) + 1);

/// Command id field
#[inline]
pub const fn cmdid(word: u32) -> u8 {
    ((word >> CMDID_SHIFT) & CMDID_MASK) as u8
}

/// Slot id field
#[inline]
pub const fn slotid(word: u32) -> u8 {
    ((word >> SLOTID_SHIFT) & SLOTID_MASK) as u8
}

/// Algorithm selector field
#[inline]
pub const fn alg(word: u32) -> u8 {
    ((word >> ALG_SHIFT) & ALG_MASK) as u8
}

/// Parameter word count field
#[inline]
pub const fn npara(word: u32) -> usize {
    (word & NPARA_MASK) as usize
}

/// Replace the slot id field, leaving every other bit untouched
#[inline]
pub const fn set_slotid(word: u32, slot: u8) -> u32 {
    (word & !(SLOTID_MASK << SLOTID_SHIFT)) | (((slot as u32) & SLOTID_MASK) << SLOTID_SHIFT)
}

/// Opcodes issued by the session layer
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdId {
    Init = 0x80,
    SetKey = 0x81,
    Start = 0x82,
    Update = 0x83,
    Finish = 0x84,
    Finup = 0x85,
    Clone = 0x86,
}

impl CmdId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x80 => Some(CmdId::Init),
            0x81 => Some(CmdId::SetKey),
            0x82 => Some(CmdId::Start),
            0x83 => Some(CmdId::Update),
            0x84 => Some(CmdId::Finish),
            0x85 => Some(CmdId::Finup),
            0x86 => Some(CmdId::Clone),
            _ => None,
        }
    }
}

/// Builder for a raw command buffer
///
/// The slot id is left zero here; `Task::prepare` stamps it.
#[derive(Debug, Clone)]
pub struct CmdBuf {
    words: Vec<u32>,
}

impl CmdBuf {
    pub fn new(id: CmdId, alg_sel: u8) -> Self {
        let hdr = ((id as u32) << CMDID_SHIFT) | (((alg_sel as u32) & ALG_MASK) << ALG_SHIFT);
        let mut words = Vec::with_capacity(8);
        words.push(hdr);
        Self { words }
    }

    pub fn push(mut self, word: u32) -> Self {
        self.words.push(word);
        self
    }

    /// 64-bit value as two words, low word first
    pub fn push_u64(self, v: u64) -> Self {
        self.push(v as u32).push((v >> 32) as u32)
    }

    /// Bytes packed little-endian into words; a short tail is zero padded
    pub fn push_bytes(mut self, bytes: &[u8]) -> Self {
        for chunk in bytes.chunks(4) {
            let mut w = [0u8; 4];
            w[..chunk.len()].copy_from_slice(chunk);
            self.words.push(u32::from_le_bytes(w));
        }
        self
    }

    /// Seal NPARA and hand out the words
    pub fn finish(mut self) -> Vec<u32> {
        let n = (self.words.len() - 1) as u32;
        debug_assert!(n <= NPARA_MASK);
        self.words[0] = (self.words[0] & !NPARA_MASK) | (n & NPARA_MASK);
        self.words
    }
}
