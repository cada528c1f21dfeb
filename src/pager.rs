//! Ties the buffer pool, file pager, WAL, transaction table, dirty page
//! table, and lock table together into the operations the rest of the
//! engine calls: begin/commit/rollback a transaction, get/save/release a
//! page, allocate/free a page, and run a checkpoint.
//!
//! Every public method takes `&self`: the mutable state (buffer pool, file
//! pager, WAL, ATT, DPT, tid allocator) lives behind one short-lived
//! `parking_lot::Mutex<PagerState>`, held only for the duration of one
//! in-memory operation, never across a blocking wait. `LockTable` is a
//! sibling, not a field of `PagerState` -- it has its own internal
//! mutex/condvar and a thread can block for as long as it likes inside
//! `LockTable::acquire` without ever holding the state mutex, which is what
//! lets one thread commit (briefly taking the state mutex, then releasing
//! locks) while another sits blocked waiting for exactly those locks.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use crate::buffer::BufferPool;
use crate::config::MEMORY_PAGE_LEN;
use crate::error::{abort_on_failure, Error, Result};
use crate::fs::file_pager::FilePager;
use crate::lock::{LockMode, LockTable, LockType};
use crate::page::tombstone::NONE as NO_TOMBSTONE;
use crate::page::{Page, PageType, Pgno};
use crate::txn::{Att, AttEntry, Dpt, TxnIdAllocator};
use crate::wal::record::{Tid, TxState, WalRecord};
use crate::wal::Wal;

/// The mutable core guarded by `Pager::state`. Crate-visible so `recovery`
/// and `Engine::open`'s bootstrap can reach in directly through
/// `Mutex::get_mut` while they still hold the only `&mut Pager` there will
/// ever be (before the engine is shared across threads), bypassing the
/// lock for what is otherwise single-owner setup work.
pub(crate) struct PagerState {
    pub(crate) buffer: BufferPool,
    pub(crate) file: FilePager,
    pub(crate) wal: Wal,
    pub(crate) att: Att,
    pub(crate) dpt: Dpt,
    pub(crate) tids: TxnIdAllocator,
}

impl PagerState {
    fn flush_victim_if_dirty(&mut self, idx: usize) -> Result<()> {
        if self.buffer.is_dirty(idx) {
            let lsn = self.buffer.page(idx).page_lsn();
            self.wal.flush_to(lsn)?;
            if self.wal.durable_lsn().map_or(true, |d| d < lsn) {
                #[cfg(debug_assertions)]
                abort_on_failure(
                    "evicting a dirty frame before its page_lsn is WAL-durable",
                    &Error::Corrupt(format!(
                        "page_lsn {lsn} exceeds durable_lsn {:?}",
                        self.wal.durable_lsn()
                    )),
                );
                #[cfg(not(debug_assertions))]
                return Err(Error::Corrupt(format!(
                    "WAL rule violated: durable_lsn {:?} < page_lsn {lsn}",
                    self.wal.durable_lsn()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn get(&mut self, pgno: Pgno, expected: Option<PageType>) -> Result<usize> {
        if let Some(idx) = self.buffer.lookup_pin(pgno) {
            self.buffer.verify_type(idx, expected)?;
            return Ok(idx);
        }
        let idx = self.buffer.find_victim()?;
        self.flush_victim_if_dirty(idx)?;
        self.buffer.evict(idx, &mut self.file)?;
        let page = self.file.read(pgno)?;
        self.buffer.place(idx, pgno, page);
        if let Err(e) = self.buffer.verify_type(idx, expected) {
            self.buffer.release(idx);
            return Err(e);
        }
        Ok(idx)
    }

    pub(crate) fn get_writable(&mut self, pgno: Pgno, expected: Option<PageType>) -> Result<usize> {
        let idx = self.get(pgno, expected)?;
        self.buffer.make_writable(idx)?;
        Ok(idx)
    }

    pub(crate) fn save(&mut self, tid: Tid, idx: usize) -> Result<()> {
        if !self.buffer.is_writable(idx) {
            return Ok(());
        }
        let pgno = self.buffer.pgno(idx);
        let undo = Box::new(*self.buffer.page(idx).as_bytes());
        let redo = Box::new(*self.buffer.shadow(idx).as_bytes());
        let entry = *self
            .att
            .get(tid)
            .ok_or_else(|| Error::InvalidArgument(format!("no such transaction {tid}")))?;
        let lsn = self.wal.append(&WalRecord::Update {
            tid,
            prev_lsn: entry.last_lsn,
            pgno,
            undo,
            redo,
        })?;
        self.buffer.shadow_mut(idx).set_page_lsn(lsn);
        if let Some(e) = self.att.get_mut(tid) {
            e.last_lsn = lsn;
            e.undo_next_lsn = lsn;
        }
        self.dpt.record_if_absent(pgno, lsn);
        self.buffer.commit_shadow(idx);
        Ok(())
    }

    pub(crate) fn release(&mut self, tid: Tid, idx: usize) -> Result<()> {
        self.save(tid, idx)?;
        self.buffer.release(idx);
        Ok(())
    }

    pub(crate) fn new_page(&mut self, tid: Tid, page_type: PageType) -> Result<(Pgno, usize)> {
        let root_idx = self.get(0, Some(PageType::Root))?;
        let first_tombstone = self.buffer.page(root_idx).as_root().first_tombstone();
        if first_tombstone != NO_TOMBSTONE {
            self.buffer.release(root_idx);
            let root_w = self.get_writable(0, Some(PageType::Root))?;
            let ts_idx = self.get_writable(first_tombstone, Some(PageType::Tombstone))?;
            let next = self.buffer.shadow(ts_idx).as_tombstone().next();
            self.buffer.shadow_mut(root_w).as_root_mut().set_first_tombstone(next);
            *self.buffer.shadow_mut(ts_idx) = Page::zeroed(page_type);
            self.release(tid, root_w)?;
            Ok((first_tombstone, ts_idx))
        } else {
            self.buffer.release(root_idx);
            let pgno = self.file.new_page()?;
            let idx = self.buffer.find_victim()?;
            self.flush_victim_if_dirty(idx)?;
            self.buffer.evict(idx, &mut self.file)?;
            self.buffer.place(idx, pgno, Page::zeroed(page_type));
            self.buffer.make_writable(idx)?;
            Ok((pgno, idx))
        }
    }

    pub(crate) fn delete_and_release(&mut self, tid: Tid, idx: usize) -> Result<()> {
        let pgno = self.buffer.pgno(idx);
        let root_idx = self.get_writable(0, Some(PageType::Root))?;
        let old_first = self.buffer.shadow(root_idx).as_root().first_tombstone();
        self.buffer.shadow_mut(root_idx).as_root_mut().set_first_tombstone(pgno);
        if !self.buffer.is_writable(idx) {
            self.buffer.make_writable(idx)?;
        }
        let mut tombstone = Page::zeroed(PageType::Tombstone);
        tombstone.as_tombstone_mut().set_next(old_first);
        *self.buffer.shadow_mut(idx) = tombstone;
        self.release(tid, idx)?;
        self.release(tid, root_idx)?;
        Ok(())
    }
}

pub struct Pager {
    pub(crate) state: Mutex<PagerState>,
    locks: LockTable,
    held: Mutex<HashMap<Tid, Vec<(LockType, u64, LockMode)>>>,
}

impl Pager {
    pub fn create(db_path: &Path, wal_dir: &Path, wal_base: &str) -> Result<Self> {
        let file = FilePager::create(db_path)?;
        let wal = Wal::open(wal_dir, wal_base)?;
        Ok(Pager {
            state: Mutex::new(PagerState {
                buffer: BufferPool::new(MEMORY_PAGE_LEN),
                file,
                wal,
                att: Att::new(),
                dpt: Dpt::new(),
                tids: TxnIdAllocator::new(),
            }),
            locks: LockTable::new(),
            held: Mutex::new(HashMap::new()),
        })
    }

    pub fn open(db_path: &Path, wal_dir: &Path, wal_base: &str) -> Result<Self> {
        let file = FilePager::open(db_path)?;
        let wal = Wal::open(wal_dir, wal_base)?;
        Ok(Pager {
            state: Mutex::new(PagerState {
                buffer: BufferPool::new(MEMORY_PAGE_LEN),
                file,
                wal,
                att: Att::new(),
                dpt: Dpt::new(),
                tids: TxnIdAllocator::new(),
            }),
            locks: LockTable::new(),
            held: Mutex::new(HashMap::new()),
        })
    }

    /// Restores the tid allocator past `tid`, for recovery to call on every
    /// tid analysis observes so a freshly begun transaction after recovery
    /// can never collide with a recovered one.
    pub fn observe_tid(&self, tid: Tid) {
        self.state.lock().tids.observe(tid);
    }

    // ---- locking -----------------------------------------------------------

    /// Climbs the lock hierarchy and blocks until `(ty, data, mode)` is
    /// granted. Never holds `state`'s mutex while blocking here -- this may
    /// wait on `LockTable`'s own condvar for as long as a conflicting
    /// holder keeps the lock.
    pub fn acquire_lock(&self, tid: Tid, ty: LockType, data: u64, mode: LockMode) {
        let chain = self.locks.acquire(tid, ty, data, mode);
        self.held.lock().entry(tid).or_default().extend(chain);
    }

    fn release_tx_locks(&self, tid: Tid) {
        let held = self.held.lock().remove(&tid);
        if let Some(h) = held {
            self.locks.release_all(tid, &h);
        }
    }

    // ---- transactions --------------------------------------------------------

    pub fn begin_txn(&self) -> Result<Tid> {
        let mut st = self.state.lock();
        let tid = st.tids.alloc();
        let lsn = st.wal.append(&WalRecord::Begin { tid })?;
        st.att.insert(
            tid,
            AttEntry {
                state: TxState::Running,
                last_lsn: lsn,
                undo_next_lsn: 0,
            },
        );
        Ok(tid)
    }

    pub fn commit(&self, tid: Tid) -> Result<()> {
        {
            let mut st = self.state.lock();
            let entry = *st
                .att
                .get(tid)
                .ok_or_else(|| Error::InvalidArgument(format!("no such transaction {tid}")))?;
            if entry.state != TxState::Running {
                return Err(Error::DuplicateCommit(tid));
            }
            let commit_lsn = st.wal.append(&WalRecord::Commit {
                tid,
                prev_lsn: entry.last_lsn,
            })?;
            st.wal.flush_to(commit_lsn)?;
            st.wal.append(&WalRecord::End {
                tid,
                prev_lsn: commit_lsn,
            })?;
            st.att.remove(tid);
        }
        self.release_tx_locks(tid);
        Ok(())
    }

    /// Full abort: unwinds every update back to the transaction's `Begin`
    /// and removes it from the ATT.
    pub fn abort(&self, tid: Tid) -> Result<()> {
        self.rollback_to(tid, 0)?;
        {
            let mut st = self.state.lock();
            let entry = *st
                .att
                .get(tid)
                .ok_or_else(|| Error::InvalidArgument(format!("no such transaction {tid}")))?;
            st.wal.append(&WalRecord::End {
                tid,
                prev_lsn: entry.last_lsn,
            })?;
            st.att.remove(tid);
        }
        self.release_tx_locks(tid);
        Ok(())
    }

    /// Walks the undo chain down to (but not including) `save_lsn`,
    /// rewriting each Update as a CLR. `save_lsn = 0` unwinds everything.
    pub fn rollback_to(&self, tid: Tid, save_lsn: u64) -> Result<()> {
        let mut entry = {
            let st = self.state.lock();
            *st.att
                .get(tid)
                .ok_or_else(|| Error::InvalidArgument(format!("no such transaction {tid}")))?
        };
        while save_lsn < entry.undo_next_lsn {
            self.apply_one_undo_step(tid, &mut entry)?;
        }
        Ok(())
    }

    /// Undoes the single WAL record currently pointed to by
    /// `entry.undo_next_lsn`, writing a CLR for page updates and chasing
    /// through CLR/Begin records without touching a page. Shared by
    /// `rollback_to` and the recovery undo pass, which interleaves this one
    /// step across every loser transaction instead of draining one
    /// transaction's whole chain at a time.
    pub fn apply_one_undo_step(&self, tid: Tid, entry: &mut AttEntry) -> Result<()> {
        let lsn = entry.undo_next_lsn;
        if lsn == 0 {
            return Ok(());
        }
        let mut st = self.state.lock();
        let rec = st.wal.read_entry(lsn)?;
        match rec {
            WalRecord::Update {
                prev_lsn, pgno, undo, ..
            } => {
                let idx = st.get_writable(pgno, None)?;
                st.buffer.shadow_mut(idx).data.copy_from_slice(undo.as_ref());
                let clr_lsn = st.wal.append(&WalRecord::Clr {
                    tid,
                    prev_lsn: entry.last_lsn,
                    pgno,
                    undo_next: prev_lsn,
                    redo: undo,
                })?;
                st.buffer.shadow_mut(idx).set_page_lsn(clr_lsn);
                st.dpt.record_if_absent(pgno, clr_lsn);
                st.buffer.commit_shadow(idx);
                st.buffer.release(idx);
                entry.last_lsn = clr_lsn;
                entry.undo_next_lsn = prev_lsn;
            }
            WalRecord::Clr { undo_next, .. } => {
                entry.undo_next_lsn = undo_next;
            }
            WalRecord::Begin { .. } => {
                entry.undo_next_lsn = 0;
            }
            _ => {
                return Err(Error::Corrupt(format!(
                    "unexpected WAL record in undo chain at lsn {lsn}"
                )))
            }
        }
        st.att.insert(tid, *entry);
        Ok(())
    }

    // ---- page access -----------------------------------------------------

    pub fn get(&self, pgno: Pgno, expected: Option<PageType>) -> Result<usize> {
        self.state.lock().get(pgno, expected)
    }

    pub fn get_writable(&self, pgno: Pgno, expected: Option<PageType>) -> Result<usize> {
        self.state.lock().get_writable(pgno, expected)
    }

    pub fn save(&self, tid: Tid, idx: usize) -> Result<()> {
        self.state.lock().save(tid, idx)
    }

    pub fn release(&self, tid: Tid, idx: usize) -> Result<()> {
        self.state.lock().release(tid, idx)
    }

    /// Drops a shared (S-mode) handle without going through `save`.
    pub fn release_shared(&self, idx: usize) {
        self.state.lock().buffer.release(idx);
    }

    /// Reads a stable (non-shadow) page's body through a short-lived
    /// closure, without leaking the state guard to the caller.
    pub fn with_page<R>(&self, idx: usize, f: impl FnOnce(&Page) -> R) -> R {
        f(self.state.lock().buffer.page(idx))
    }

    /// Reads a writable handle's shadow image through a short-lived closure.
    pub fn with_shadow<R>(&self, idx: usize, f: impl FnOnce(&Page) -> R) -> R {
        f(self.state.lock().buffer.shadow(idx))
    }

    /// Mutates a writable handle's shadow image through a short-lived
    /// closure.
    pub fn with_shadow_mut<R>(&self, idx: usize, f: impl FnOnce(&mut Page) -> R) -> R {
        f(self.state.lock().buffer.shadow_mut(idx))
    }

    // ---- allocation --------------------------------------------------------

    pub fn new_page(&self, tid: Tid, page_type: PageType) -> Result<(Pgno, usize)> {
        self.acquire_lock(tid, LockType::Root, 0, LockMode::X);
        self.state.lock().new_page(tid, page_type)
    }

    /// Converts the page at `idx` (currently held writable by `tid`) into a
    /// tombstone and pushes it onto the root's free list.
    pub fn delete_and_release(&self, tid: Tid, idx: usize) -> Result<()> {
        self.acquire_lock(tid, LockType::Root, 0, LockMode::X);
        self.state.lock().delete_and_release(tid, idx)
    }

    // ---- checkpoint --------------------------------------------------------

    pub fn checkpoint(&self) -> Result<()> {
        let ckpt_begin_lsn;
        {
            let mut st = self.state.lock();
            ckpt_begin_lsn = st.wal.append(&WalRecord::CkptBegin)?;

            for idx in 0..st.buffer.capacity() {
                if st.buffer.pgno_if_present(idx).is_none() {
                    continue;
                }
                if st.buffer.pin_count(idx) > 0 || st.buffer.is_writable(idx) {
                    continue;
                }
                st.flush_victim_if_dirty(idx)?;
                st.buffer.evict(idx, &mut st.file)?;
            }

            let ckpt_end_lsn = st.wal.append(&WalRecord::CkptEnd {
                att: st.att.snapshot(),
                dpt: st.dpt.snapshot(),
            })?;
            st.wal.flush_to(ckpt_end_lsn)?;
        }

        let tid = self.begin_txn()?;
        let root_idx = self.get_writable(0, Some(PageType::Root))?;
        self.with_shadow_mut(root_idx, |p| p.as_root_mut().set_master_lsn(ckpt_begin_lsn));
        self.release(tid, root_idx)?;
        self.commit(tid)?;

        let mut st = self.state.lock();
        if let Some(idx) = st.buffer.lookup_pin(0) {
            st.flush_victim_if_dirty(idx)?;
            st.buffer.evict(idx, &mut st.file)?;
        }
        st.file.sync()?;
        st.wal.flush_all()?;
        Ok(())
    }

    pub fn master_lsn(&self) -> Result<u64> {
        let idx = self.get(0, Some(PageType::Root))?;
        let lsn = self.with_page(idx, |p| p.as_root().master_lsn());
        self.release_shared(idx);
        Ok(lsn)
    }
}
