//! Hardware link-list format
//!
//! Data buffers reach the engine as a link list in memory: 16-byte
//! records of a 64-bit bus address followed by a 64-bit attribute word,
//! both little-endian. The attribute word carries the region size in
//! bits 0..=30 and the non-secure flag in bit 31; the upper half is zero.
//! A record of `{addr: 0, val: !0}` ends the list.

use crate::constants::LL_MAX_SIZE;
use crate::error::{TeError, TeResult};
use crate::memlist::MemList;

const SIZE_MASK: u64 = LL_MAX_SIZE as u64;
const NS_BIT: u64 = 1 << 31;

/// Size of one encoded record
pub const LINK_ENTRY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEntry {
    pub addr: u64,
    pub val: u64,
}

impl LinkEntry {
    pub const SENTINEL: LinkEntry = LinkEntry { addr: 0, val: u64::MAX };

    pub fn new(addr: u64, size: usize, nonsecure: bool) -> Self {
        assert!(size <= LL_MAX_SIZE, "linklist: region of {} bytes", size);
        let mut val = size as u64 & SIZE_MASK;
        if nonsecure {
            val |= NS_BIT;
        }
        Self { addr, val }
    }

    #[inline]
    pub fn size(&self) -> usize {
        (self.val & SIZE_MASK) as usize
    }

    #[inline]
    pub fn nonsecure(&self) -> bool {
        self.val & NS_BIT != 0
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    pub fn to_le_bytes(&self) -> [u8; LINK_ENTRY_SIZE] {
        let mut b = [0u8; LINK_ENTRY_SIZE];
        b[..8].copy_from_slice(&self.addr.to_le_bytes());
        b[8..].copy_from_slice(&self.val.to_le_bytes());
        b
    }

    pub fn from_le_bytes(b: &[u8; LINK_ENTRY_SIZE]) -> Self {
        let mut a = [0u8; 8];
        let mut v = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        v.copy_from_slice(&b[8..]);
        Self { addr: u64::from_le_bytes(a), val: u64::from_le_bytes(v) }
    }
}

/// Encoded link list, sentinel included, kept in hardware byte order
///
/// The backing store is 8-byte aligned; `bus_addr` points at it and
/// stays valid while the `LinkList` lives.
#[derive(Debug, Clone)]
pub struct LinkList {
    words: Vec<u64>,
}

impl LinkList {
    pub fn from_entries(ents: &[LinkEntry]) -> Self {
        let mut words = Vec::with_capacity((ents.len() + 1) * 2);
        for e in ents.iter().chain(core::iter::once(&LinkEntry::SENTINEL)) {
            words.push(e.addr.to_le());
            words.push(e.val.to_le());
        }
        Self { words }
    }

    /// One record per active region; regions above `LL_MAX_SIZE` are split
    pub fn from_memlist(ml: &MemList<'_>, nonsecure: bool) -> TeResult<Self> {
        let mut ents = Vec::new();
        ents.try_reserve(ml.nent()).map_err(|_| TeError::NoMem)?;
        for ent in ml.ents() {
            let mut addr = ent.addr();
            let mut left = ent.len();
            while left > 0 {
                let n = left.min(LL_MAX_SIZE);
                ents.push(LinkEntry::new(addr, n, nonsecure));
                addr += n as u64;
                left -= n;
            }
        }
        Ok(Self::from_entries(&ents))
    }

    /// Parse records up to and including the sentinel
    pub fn parse(bytes: &[u8]) -> TeResult<Self> {
        let mut ents = Vec::new();
        for chunk in bytes.chunks_exact(LINK_ENTRY_SIZE) {
            let mut rec = [0u8; LINK_ENTRY_SIZE];
            rec.copy_from_slice(chunk);
            let e = LinkEntry::from_le_bytes(&rec);
            if e.is_sentinel() {
                return Ok(Self::from_entries(&ents));
            }
            ents.push(e);
        }
        Err(TeError::BadParams)
    }

    /// Records, sentinel excluded
    pub fn entries(&self) -> Vec<LinkEntry> {
        self.words
            .chunks_exact(2)
            .map(|w| LinkEntry { addr: u64::from_le(w[0]), val: u64::from_le(w[1]) })
            .filter(|e| !e.is_sentinel())
            .collect()
    }

    /// Sum of region sizes
    pub fn total_size(&self) -> usize {
        self.entries().iter().map(|e| e.size()).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[inline]
    pub fn bus_addr(&self) -> u64 {
        self.words.as_ptr() as usize as u64
    }

    /// Encoded size in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.words.len() * 8
    }
}
