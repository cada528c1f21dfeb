//! R+ tree cursor: the payload layer for one variable's byte sequence.
//!
//! Leaves form a doubly linked chain (`prev`/`next`, `0` meaning "no
//! sibling" since pgno 0 is always the root page and can never be a leaf).
//! Addressing walks the chain summing each leaf's `used` length rather than
//! descending through a tree-shaped routing structure; an emptied leaf is
//! spliced out of the chain and freed rather than left to accumulate. See
//! DESIGN.md for why the flat-chain scope cut was made.
//!
//! A cursor is a small state machine. `enter_transaction` binds the tid an
//! op will run under and moves the cursor to `Permissive`; each op moves
//! through `Seeking`/`Seeked` and its own `Dl*` state while it holds page
//! latches, then back to `Seeked`. `leave_transaction` unbinds the tid;
//! `cleanup` drops the cursor back to `Unseeked`.

use crate::error::{Error, Result};
use crate::lock::{LockMode, LockType};
use crate::page::rptree::LeafView;
use crate::page::{PageType, Pgno};
use crate::pager::Pager;
use crate::wal::record::Tid;

const NO_SIBLING: Pgno = 0;

/// A fixed-size, fixed-stride run of elements: `start, start+step, ...` for
/// `nelems` elements, each `size` bytes (size lives alongside, not on the
/// stride, since it is shared by every element in one call).
#[derive(Debug, Clone, Copy)]
pub struct Stride {
    pub start: u64,
    pub step: u64,
    pub nelems: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unseeked,
    Seeking,
    Seeked,
    Permissive,
    DlReading,
    DlInserting,
    DlRemoving,
    DlWriting,
    InRebalancing,
}

pub struct RptCursor {
    head: Pgno,
    total_size: u64,
    state: CursorState,
    tid: Option<Tid>,
}

impl RptCursor {
    /// Allocates a new, empty tree and returns a cursor over it.
    pub fn new(pager: &Pager, tid: Tid) -> Result<Self> {
        let (pgno, idx) = pager.new_page(tid, PageType::RptLeaf)?;
        pager.with_shadow_mut(idx, |leaf| -> Result<()> {
            leaf.as_leaf_mut().set_prev(NO_SIBLING);
            leaf.as_leaf_mut().set_next(NO_SIBLING);
            leaf.as_leaf_mut().set_range(0, 0);
            leaf.as_leaf_mut().set_payload(&[])?;
            Ok(())
        })?;
        pager.release(tid, idx)?;
        Ok(RptCursor {
            head: pgno,
            total_size: 0,
            state: CursorState::Unseeked,
            tid: None,
        })
    }

    /// Opens an existing tree rooted at `head`, computing `total_size` by
    /// walking the leaf chain once.
    pub fn open(pager: &Pager, head: Pgno) -> Result<Self> {
        let mut total = 0u64;
        let mut pgno = head;
        loop {
            let idx = pager.get(pgno, Some(PageType::RptLeaf))?;
            let (used, next) = pager.with_page(idx, |p| (p.as_leaf().used() as u64, p.as_leaf().next()));
            pager.release_shared(idx);
            total += used;
            if next == NO_SIBLING {
                break;
            }
            pgno = next;
        }
        Ok(RptCursor {
            head,
            total_size: total,
            state: CursorState::Unseeked,
            tid: None,
        })
    }

    pub fn root(&self) -> Pgno {
        self.head
    }

    pub fn size(&self) -> u64 {
        self.total_size
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Binds `tid` to this cursor and moves it to `Permissive`; ops below
    /// require this to have been called first.
    pub fn enter_transaction(&mut self, tid: Tid) {
        self.tid = Some(tid);
        self.state = CursorState::Permissive;
    }

    /// Unbinds the cursor's tid. Does not release any pages -- every op
    /// below already releases its own latches before returning.
    pub fn leave_transaction(&mut self) {
        self.tid = None;
        if self.state != CursorState::Unseeked {
            self.state = CursorState::Seeked;
        }
    }

    /// Returns the cursor to `Unseeked`, forgetting any bound transaction.
    pub fn cleanup(&mut self) {
        self.tid = None;
        self.state = CursorState::Unseeked;
    }

    fn bound_tid(&self) -> Result<Tid> {
        self.tid
            .ok_or_else(|| Error::InvalidArgument("cursor op called without enter_transaction".into()))
    }

    /// Finds the leaf whose span contains `offset`, returning its pgno and
    /// the cumulative offset at which it starts. Valid for `offset` in
    /// `[0, total_size]` (the end-of-tree position resolves to the last
    /// leaf, for appends).
    fn locate(&self, pager: &Pager, offset: u64) -> Result<(Pgno, u64)> {
        let mut pgno = self.head;
        let mut start = 0u64;
        loop {
            let idx = pager.get(pgno, Some(PageType::RptLeaf))?;
            let (used, next) = pager.with_page(idx, |p| (p.as_leaf().used() as u64, p.as_leaf().next()));
            pager.release_shared(idx);
            if offset < start + used || next == NO_SIBLING {
                return Ok((pgno, start));
            }
            start += used;
            pgno = next;
        }
    }

    fn lock_tree(&self, pager: &Pager, tid: Tid, mode: LockMode) {
        pager.acquire_lock(tid, LockType::Rptree, self.head, mode);
    }

    /// `nelems == 0` is always a no-op regardless of `step`. Beyond one
    /// element, `step == 0` would alias every element onto the same offset,
    /// so it's rejected.
    fn validate_stride(stride: Stride) -> Result<bool> {
        if stride.nelems == 0 {
            return Ok(true);
        }
        if stride.nelems > 1 && stride.step == 0 {
            return Err(Error::InvalidArgument("stride step of 0 with more than one element".into()));
        }
        Ok(false)
    }

    // ---- insert ------------------------------------------------------------

    pub fn insert(&mut self, pager: &Pager, byte_off: u64, data: &[u8]) -> Result<()> {
        let tid = self.bound_tid()?;
        let byte_off = byte_off.min(self.total_size);
        self.lock_tree(pager, tid, LockMode::X);
        self.state = CursorState::Seeking;
        self.state = CursorState::DlInserting;
        let chunk_len = (LeafView::capacity() / 2).max(1);
        let mut off = byte_off;
        for chunk in data.chunks(chunk_len) {
            self.insert_chunk(pager, tid, off, chunk)?;
            off += chunk.len() as u64;
        }
        self.total_size += data.len() as u64;
        self.state = CursorState::Seeked;
        Ok(())
    }

    fn insert_chunk(&mut self, pager: &Pager, tid: Tid, offset: u64, chunk: &[u8]) -> Result<()> {
        let (pgno, start) = self.locate(pager, offset)?;
        let local = (offset - start) as usize;
        let idx = pager.get_writable(pgno, Some(PageType::RptLeaf))?;
        let used = pager.with_shadow(idx, |p| p.as_leaf().used());
        if used + chunk.len() <= LeafView::capacity() {
            let mut buf = pager.with_shadow(idx, |p| p.as_leaf().payload().to_vec());
            buf.splice(local..local, chunk.iter().copied());
            pager.with_shadow_mut(idx, |p| p.as_leaf_mut().set_payload(&buf))?;
            pager.release(tid, idx)?;
            return Ok(());
        }

        self.state = CursorState::InRebalancing;
        let mut combined = pager.with_shadow(idx, |p| p.as_leaf().payload().to_vec());
        combined.splice(local..local, chunk.iter().copied());
        let mid = combined.len() / 2;
        let right = combined.split_off(mid);
        let left = combined;
        pager.with_shadow_mut(idx, |p| p.as_leaf_mut().set_payload(&left))?;
        let old_next = pager.with_shadow(idx, |p| p.as_leaf().next());

        let (new_pgno, new_idx) = pager.new_page(tid, PageType::RptLeaf)?;
        pager.with_shadow_mut(new_idx, |leaf| -> Result<()> {
            leaf.as_leaf_mut().set_payload(&right)?;
            leaf.as_leaf_mut().set_prev(pgno);
            leaf.as_leaf_mut().set_next(old_next);
            Ok(())
        })?;
        pager.with_shadow_mut(idx, |p| p.as_leaf_mut().set_next(new_pgno));

        if old_next != NO_SIBLING {
            let nxt_idx = pager.get_writable(old_next, Some(PageType::RptLeaf))?;
            pager.with_shadow_mut(nxt_idx, |p| p.as_leaf_mut().set_prev(new_pgno));
            pager.release(tid, nxt_idx)?;
        }
        pager.release(tid, new_idx)?;
        pager.release(tid, idx)?;
        self.state = CursorState::DlInserting;
        Ok(())
    }

    // ---- write / read --------------------------------------------------------

    pub fn write(&mut self, pager: &Pager, src: &[u8], size: usize, stride: Stride) -> Result<()> {
        let tid = self.bound_tid()?;
        if Self::validate_stride(stride)? {
            return Ok(());
        }
        self.lock_tree(pager, tid, LockMode::X);
        self.state = CursorState::DlWriting;
        for i in 0..stride.nelems {
            let off = stride.start + (i as u64) * stride.step;
            let chunk = &src[i * size..(i + 1) * size];
            self.write_at(pager, tid, off, chunk)?;
        }
        self.state = CursorState::Seeked;
        Ok(())
    }

    fn write_at(&mut self, pager: &Pager, tid: Tid, mut offset: u64, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let (pgno, start) = self.locate(pager, offset)?;
            let idx = pager.get_writable(pgno, Some(PageType::RptLeaf))?;
            let used = pager.with_shadow(idx, |p| p.as_leaf().used());
            let local = (offset - start) as usize;
            let avail = used.saturating_sub(local);
            if avail == 0 {
                pager.release(tid, idx)?;
                return Err(Error::InvalidArgument("write past end of tree".into()));
            }
            let n = avail.min(bytes.len());
            pager.with_shadow_mut(idx, |p| {
                p.as_leaf_mut().payload_mut(used)[local..local + n].copy_from_slice(&bytes[..n])
            });
            pager.release(tid, idx)?;
            offset += n as u64;
            bytes = &bytes[n..];
        }
        Ok(())
    }

    pub fn read(&mut self, pager: &Pager, dest: &mut [u8], size: usize, stride: Stride) -> Result<()> {
        if Self::validate_stride(stride)? {
            return Ok(());
        }
        self.state = CursorState::DlReading;
        for i in 0..stride.nelems {
            let off = stride.start + (i as u64) * stride.step;
            let chunk = &mut dest[i * size..(i + 1) * size];
            self.read_at(pager, off, chunk)?;
        }
        self.state = CursorState::Seeked;
        Ok(())
    }

    fn read_at(&self, pager: &Pager, mut offset: u64, dest: &mut [u8]) -> Result<()> {
        let mut remaining = dest.len();
        let mut written = 0usize;
        while remaining > 0 {
            let (pgno, start) = self.locate(pager, offset)?;
            let idx = pager.get(pgno, Some(PageType::RptLeaf))?;
            let used = pager.with_page(idx, |p| p.as_leaf().used());
            let local = (offset - start) as usize;
            let avail = used.saturating_sub(local);
            if avail == 0 {
                pager.release_shared(idx);
                return Err(Error::InvalidArgument("read past end of tree".into()));
            }
            let n = avail.min(remaining);
            pager.with_page(idx, |p| {
                dest[written..written + n].copy_from_slice(&p.as_leaf().payload()[local..local + n])
            });
            pager.release_shared(idx);
            offset += n as u64;
            written += n;
            remaining -= n;
        }
        Ok(())
    }

    // ---- remove ------------------------------------------------------------

    pub fn remove(&mut self, pager: &Pager, dest: Option<&mut [u8]>, size: usize, stride: Stride) -> Result<()> {
        let tid = self.bound_tid()?;
        if Self::validate_stride(stride)? {
            return Ok(());
        }
        self.lock_tree(pager, tid, LockMode::X);
        self.state = CursorState::DlRemoving;
        if let Some(d) = dest {
            self.read(pager, d, size, stride)?;
            self.state = CursorState::DlRemoving;
        }
        for i in (0..stride.nelems).rev() {
            let off = stride.start + (i as u64) * stride.step;
            self.remove_range(pager, tid, off, size)?;
        }
        self.state = CursorState::Seeked;
        Ok(())
    }

    /// Removes `len` bytes starting at `offset`, merging an emptied leaf
    /// into an adjacent sibling (preferring `next`, falling back to `prev`)
    /// rather than leaving it in the chain, unless it is the chain's only
    /// leaf.
    fn remove_range(&mut self, pager: &Pager, tid: Tid, offset: u64, mut len: usize) -> Result<()> {
        while len > 0 {
            let (pgno, start) = self.locate(pager, offset)?;
            let idx = pager.get_writable(pgno, Some(PageType::RptLeaf))?;
            let used = pager.with_shadow(idx, |p| p.as_leaf().used());
            let local = (offset - start) as usize;
            if local >= used {
                pager.release(tid, idx)?;
                return Err(Error::InvalidArgument("remove past end of tree".into()));
            }
            let n = (used - local).min(len);
            let mut buf = pager.with_shadow(idx, |p| p.as_leaf().payload().to_vec());
            buf.drain(local..local + n);
            let remaining = buf.len();
            pager.with_shadow_mut(idx, |p| p.as_leaf_mut().set_payload(&buf))?;
            len -= n;
            self.total_size -= n as u64;

            let (prev, next) = pager.with_shadow(idx, |p| (p.as_leaf().prev(), p.as_leaf().next()));
            if remaining == 0 && (prev != NO_SIBLING || next != NO_SIBLING) {
                self.state = CursorState::InRebalancing;
                if prev != NO_SIBLING {
                    let p_idx = pager.get_writable(prev, Some(PageType::RptLeaf))?;
                    pager.with_shadow_mut(p_idx, |p| p.as_leaf_mut().set_next(next));
                    pager.release(tid, p_idx)?;
                }
                if next != NO_SIBLING {
                    let n_idx = pager.get_writable(next, Some(PageType::RptLeaf))?;
                    pager.with_shadow_mut(n_idx, |p| p.as_leaf_mut().set_prev(prev));
                    pager.release(tid, n_idx)?;
                }
                if pgno == self.head {
                    self.head = next;
                }
                pager.delete_and_release(tid, idx)?;
                self.state = CursorState::DlRemoving;
            } else {
                pager.release(tid, idx)?;
            }
        }
        Ok(())
    }

    pub fn delete(self, pager: &Pager, tid: Tid) -> Result<()> {
        self.lock_tree(pager, tid, LockMode::X);
        let mut pgno = self.head;
        loop {
            let idx = pager.get_writable(pgno, Some(PageType::RptLeaf))?;
            let next = pager.with_shadow(idx, |p| p.as_leaf().next());
            pager.delete_and_release(tid, idx)?;
            if next == NO_SIBLING {
                break;
            }
            pgno = next;
        }
        Ok(())
    }
}
