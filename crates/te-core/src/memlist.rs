//! Memory lists: one logical byte stream over discontiguous buffers
//!
//! A `MemList` is an ordered run of `MemEnt` views (pointer + length).
//! Cipher and MAC operations address arbitrary byte ranges of the stream
//! without linearizing it first. Views never own memory; `clone_range`
//! and `dup_range` produce new views that alias the same buffers.
//!
//! Truncation is destructive but reversible: it shrinks `nent` and one
//! entry's length, and returns an `MlBp` that `restore` uses to put the
//! list back exactly. Entries past `nent` are retained for that purpose.
//!
//! Views alias caller memory through raw pointers, so neither `MemEnt`
//! nor `MemList` is `Send` or `Sync`: every list built over a buffer
//! stays on the thread that borrowed it.

use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use crate::error::{TeError, TeResult};

/// View over one contiguous region
///
/// `cap` is the region length the view was built with; `len` is the
/// live length and never exceeds `cap`.
#[derive(Clone, Copy)]
pub struct MemEnt<'a> {
    ptr: NonNull<u8>,
    len: usize,
    cap: usize,
    _buf: PhantomData<&'a mut [u8]>,
}

impl<'a> MemEnt<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        let cap = buf.len();
        Self {
            ptr: NonNull::from(buf).cast::<u8>(),
            len: cap,
            cap,
            _buf: PhantomData,
        }
    }

    /// View over caller-managed memory (e.g. a DMA mapping)
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for `'a`,
    /// and nothing may hold a Rust reference into that range while the
    /// view is used.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> TeResult<Self> {
        let ptr = NonNull::new(ptr).ok_or(TeError::BadParams)?;
        Ok(Self { ptr, len, cap: len, _buf: PhantomData })
    }

    /// Placeholder for preallocated list storage
    pub const fn empty() -> Self {
        Self { ptr: NonNull::dangling(), len: 0, cap: 0, _buf: PhantomData }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Bus address handed to hardware
    #[inline]
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    /// Sub-view `[off, off + len)`
    fn slice(&self, off: usize, len: usize) -> MemEnt<'a> {
        assert!(off <= self.len && len <= self.len - off, "memlist: slice out of range");
        MemEnt {
            // Safety: in bounds of the region per the assert above
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(off)) },
            len,
            cap: len,
            _buf: PhantomData,
        }
    }

    fn read(&self, off: usize, out: &mut [u8]) {
        assert!(off <= self.len && out.len() <= self.len - off);
        // Safety: range checked; copy tolerates overlap with `out`
        unsafe { ptr::copy(self.ptr.as_ptr().add(off), out.as_mut_ptr(), out.len()) }
    }

    fn write(&self, off: usize, src: &[u8]) {
        assert!(off <= self.len && src.len() <= self.len - off);
        // Safety: range checked; copy tolerates overlap with `src`
        unsafe { ptr::copy(src.as_ptr(), self.ptr.as_ptr().add(off), src.len()) }
    }
}

impl core::fmt::Debug for MemEnt<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemEnt")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .field("cap", &self.cap)
            .finish()
    }
}

/// Break point: enough to undo one truncation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MlBp {
    /// Active entry count before the cut
    pub nent: usize,
    /// Index of the entry holding the cut point
    pub ind: usize,
    /// Original length of that entry
    pub len: usize,
    /// Cut point inside that entry (its length after the cut)
    pub offset: usize,
}

/// Ordered list of views forming one logical stream
///
/// Clones alias the same buffers, so a list cannot leave its thread:
///
/// ```compile_fail
/// use te_core::MemList;
///
/// let mut buf = [0u8; 16];
/// let ml = MemList::from_slices([&mut buf[..]]);
/// let alias = ml.clone();
/// std::thread::scope(|s| {
///     s.spawn(move || {
///         let mut alias = alias;
///         alias.fill(0, &[0xaa; 4])
///     });
/// });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemList<'a> {
    ents: Vec<MemEnt<'a>>,
    nent: usize,
}

impl<'a> MemList<'a> {
    pub fn new(ents: Vec<MemEnt<'a>>) -> Self {
        let nent = ents.len();
        Self { ents, nent }
    }

    pub fn from_slices<I>(bufs: I) -> Self
    where
        I: IntoIterator<Item = &'a mut [u8]>,
    {
        Self::new(bufs.into_iter().map(MemEnt::new).collect())
    }

    /// Empty list with `n` preallocated entry slots, for `dup_range`
    pub fn with_capacity(n: usize) -> Self {
        Self { ents: vec![MemEnt::empty(); n], nent: 0 }
    }

    #[inline]
    pub fn nent(&self) -> usize {
        self.nent
    }

    /// Active entries
    #[inline]
    pub fn ents(&self) -> &[MemEnt<'a>] {
        &self.ents[..self.nent]
    }

    /// Preallocated entry slots (active or not)
    #[inline]
    pub fn storage_len(&self) -> usize {
        self.ents.len()
    }

    pub fn total_len(&self) -> usize {
        self.ents().iter().map(|e| e.len).sum()
    }

    /// Visit `len` bytes from `offset` one contiguous piece at a time.
    /// Range must already be validated.
    fn for_each_piece(&self, mut offset: usize, mut len: usize, mut f: impl FnMut(&MemEnt<'a>, usize, usize)) {
        for ent in self.ents() {
            if len == 0 {
                break;
            }
            if offset >= ent.len {
                offset -= ent.len;
                continue;
            }
            let n = (ent.len - offset).min(len);
            f(ent, offset, n);
            offset = 0;
            len -= n;
        }
        debug_assert_eq!(len, 0);
    }

    fn check_range(&self, offset: usize, len: usize) -> TeResult<()> {
        let end = offset.checked_add(len).ok_or(TeError::BadParams)?;
        if end > self.total_len() {
            return Err(TeError::BadParams);
        }
        Ok(())
    }

    fn read_range(&self, offset: usize, out: &mut [u8]) {
        let mut pos = 0;
        self.for_each_piece(offset, out.len(), |ent, off, n| {
            ent.read(off, &mut out[pos..pos + n]);
            pos += n;
        });
    }

    cfg_if::cfg_if! {
        if #[cfg(feature = "debug-assertions")] {
            fn check_shape(&self) {
                assert!(self.nent <= self.ents.len(), "memlist: nent past storage");
                for e in &self.ents {
                    assert!(e.len <= e.cap, "memlist: entry grown past its region");
                }
            }
        } else {
            #[inline(always)]
            fn check_shape(&self) {}
        }
    }

    /// Drop `remainder` bytes from the end of the stream
    ///
    /// With `out`, the dropped bytes land in `out[..remainder]` in stream
    /// order. `remainder == 0` changes nothing and records the last
    /// entry's shape.
    ///
    /// # Panics
    ///
    /// If `remainder` exceeds the total length or `out` is too short.
    /// Both are caller bugs.
    pub fn truncate_from_tail(&mut self, out: Option<&mut [u8]>, remainder: usize) -> MlBp {
        let total = self.total_len();
        assert!(
            remainder <= total,
            "memlist: truncate {} bytes from a {} byte list",
            remainder,
            total
        );
        if self.nent == 0 {
            return MlBp::default();
        }
        if remainder == 0 {
            let ind = self.nent - 1;
            let len = self.ents[ind].len;
            return MlBp { nent: self.nent, ind, len, offset: len };
        }

        if let Some(buf) = out {
            assert!(buf.len() >= remainder, "memlist: tail buffer too short");
            self.read_range(total - remainder, &mut buf[..remainder]);
        }

        let mut left = remainder;
        let mut ind = self.nent - 1;
        while self.ents[ind].len < left {
            left -= self.ents[ind].len;
            ind -= 1;
        }

        let len = self.ents[ind].len;
        let offset = len - left;
        let bp = MlBp { nent: self.nent, ind, len, offset };
        self.ents[ind].len = offset;
        self.nent = ind + (offset > 0) as usize;
        self.check_shape();
        bp
    }

    /// Keep only the first `len` bytes of the stream
    pub fn truncate_from_head(&mut self, len: usize) -> TeResult<MlBp> {
        if len > self.total_len() {
            return Err(TeError::BadInputLen);
        }
        if self.nent == 0 {
            return Ok(MlBp::default());
        }

        let mut cum = 0;
        let mut ind = 0;
        while ind < self.nent - 1 && cum + self.ents[ind].len < len {
            cum += self.ents[ind].len;
            ind += 1;
        }

        let orig = self.ents[ind].len;
        let offset = len - cum;
        let bp = MlBp { nent: self.nent, ind, len: orig, offset };
        self.ents[ind].len = offset;
        self.nent = ind + (offset > 0) as usize;
        self.check_shape();
        Ok(bp)
    }

    /// Undo a truncation recorded in `bp`
    pub fn restore(&mut self, bp: &MlBp) -> TeResult<()> {
        if bp.nent == 0 {
            self.nent = 0;
            return Ok(());
        }
        if bp.nent > self.ents.len() || bp.ind >= bp.nent || bp.offset > bp.len {
            return Err(TeError::BadParams);
        }
        let ent = &mut self.ents[bp.ind];
        if ent.len != bp.offset || bp.len > ent.cap {
            return Err(TeError::BadParams);
        }
        ent.len = bp.len;
        self.nent = bp.nent;
        self.check_shape();
        Ok(())
    }

    /// Read the last `size` bytes into `buf` without touching the shape
    pub fn copy_from_tail(&self, buf: &mut [u8], size: usize) -> TeResult<()> {
        let total = self.total_len();
        if size > total {
            return Err(TeError::BadInputLen);
        }
        if buf.len() < size {
            return Err(TeError::BadParams);
        }
        self.read_range(total - size, &mut buf[..size]);
        Ok(())
    }

    fn count_nodes(&self, offset: usize, len: usize) -> usize {
        let mut nodes = 0;
        self.for_each_piece(offset, len, |_, _, _| nodes += 1);
        nodes
    }

    /// New list viewing `[offset, offset + len)` of this one; no data copy
    pub fn clone_range(&self, offset: usize, len: usize) -> TeResult<MemList<'a>> {
        if len == 0 {
            return Err(TeError::BadParams);
        }
        self.check_range(offset, len)?;

        let nodes = self.count_nodes(offset, len);
        let mut ents = Vec::new();
        ents.try_reserve_exact(nodes).map_err(|_| TeError::NoMem)?;
        self.for_each_piece(offset, len, |ent, off, n| ents.push(ent.slice(off, n)));
        Ok(MemList::new(ents))
    }

    /// Like `clone_range`, but into `dst`'s preallocated storage
    pub fn dup_range(&self, dst: &mut MemList<'a>, offset: usize, len: usize) -> TeResult<()> {
        if len == 0 {
            return Err(TeError::BadParams);
        }
        self.check_range(offset, len)?;

        let nodes = self.count_nodes(offset, len);
        if nodes > dst.ents.len() {
            return Err(TeError::BadParams);
        }
        let mut i = 0;
        self.for_each_piece(offset, len, |ent, off, n| {
            dst.ents[i] = ent.slice(off, n);
            i += 1;
        });
        dst.nent = nodes;
        Ok(())
    }

    /// `self[i] = input[i] ^ keystream[i]` for the first `len` bytes
    ///
    /// `self` and `input` may view the same memory.
    pub fn xor(&mut self, input: &MemList<'_>, keystream: &[u8], len: usize) -> TeResult<()> {
        if keystream.len() < len || self.total_len() < len || input.total_len() < len {
            return Err(TeError::BadParams);
        }

        let (mut di, mut doff) = (0usize, 0usize);
        let (mut ii, mut ioff) = (0usize, 0usize);
        let mut done = 0;
        while done < len {
            while self.ents[di].len == doff {
                di += 1;
                doff = 0;
            }
            while input.ents[ii].len == ioff {
                ii += 1;
                ioff = 0;
            }
            let d = &self.ents[di];
            let s = &input.ents[ii];
            let n = (d.len - doff).min(s.len - ioff).min(len - done);
            let ks = &keystream[done..done + n];
            // Safety: both ranges are inside their regions; byte-wise raw
            // access stays correct when the two regions alias.
            unsafe {
                let dp = d.ptr.as_ptr().add(doff);
                let sp = s.ptr.as_ptr().add(ioff);
                for (k, kb) in ks.iter().enumerate() {
                    dp.add(k).write(sp.add(k).read() ^ kb);
                }
            }
            doff += n;
            ioff += n;
            done += n;
        }
        Ok(())
    }

    /// Write `src` into the stream at `offset`
    pub fn fill(&mut self, offset: usize, src: &[u8]) -> TeResult<()> {
        self.check_range(offset, src.len())?;
        let mut pos = 0;
        self.for_each_piece(offset, src.len(), |ent, off, n| {
            ent.write(off, &src[pos..pos + n]);
            pos += n;
        });
        Ok(())
    }

    /// Read `out.len()` bytes of the stream from `offset`
    pub fn copy(&self, offset: usize, out: &mut [u8]) -> TeResult<()> {
        self.check_range(offset, out.len())?;
        self.read_range(offset, out);
        Ok(())
    }
}
