//! Top-level handle tying the pager, recovery, and R+ tree cursor together
//! into the public surface a façade (CLI, server) drives.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::fs_std::FileExt;

use crate::error::{Error, Result};
use crate::page::tombstone::NONE as NO_TOMBSTONE;
use crate::page::{Page, PageType, Pgno};
use crate::pager::Pager;
use crate::recovery;
use crate::rptree::{RptCursor, Stride};
use crate::wal::record::Tid;

/// A handle to an in-progress transaction. Cheap to copy; becomes invalid
/// once passed to `commit` or a full `rollback` (further use surfaces as a
/// pager `InvalidArgument` error rather than silently no-op-ing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Txn(Tid);

impl Txn {
    pub fn id(self) -> Tid {
        self.0
    }
}

pub struct Engine {
    pager: Pager,
    // Held for the engine's lifetime purely for its exclusive advisory lock;
    // never read or written directly once open() returns.
    _lock_file: File,
}

impl Engine {
    /// Opens the database at `db_path`, creating it (and its root page) if
    /// it doesn't exist, and running ARIES recovery if it does. Takes an
    /// exclusive advisory file lock for the process's lifetime, guarding
    /// against a second OS process opening the same file concurrently --
    /// the thread-level lock table has no way to see across processes.
    pub fn open(db_path: &Path, wal_dir: &Path, wal_base: &str) -> Result<Self> {
        let existed = db_path.exists();
        let mut pager = if existed {
            Pager::open(db_path, wal_dir, wal_base)?
        } else {
            Pager::create(db_path, wal_dir, wal_base)?
        };

        let lock_path = db_path.with_extension("lock");
        let lock_file = OpenOptions::new().create(true).read(true).write(true).open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::InvalidArgument("database file is locked by another process".into()))?;

        if existed {
            recovery::recover(&mut pager)?;
        } else {
            let st = pager.state.get_mut();
            let pgno = st.file.new_page()?;
            debug_assert_eq!(pgno, 0, "root page must be the first page allocated");
            let mut root = Page::zeroed(PageType::Root);
            root.as_root_mut().set_first_tombstone(NO_TOMBSTONE);
            st.file.write(0, &root)?;
            st.file.sync()?;
        }

        Ok(Engine {
            pager,
            _lock_file: lock_file,
        })
    }

    /// Evicts every resident frame and flushes the WAL. Panics in debug
    /// builds if a transaction is still open; callers must commit or roll
    /// back everything first.
    pub fn close(self) -> Result<()> {
        debug_assert!(
            self.pager.state.lock().att.is_empty(),
            "close() called with transactions still open"
        );
        self.pager.checkpoint()
    }

    pub fn begin_txn(&self) -> Result<Txn> {
        Ok(Txn(self.pager.begin_txn()?))
    }

    pub fn commit(&self, tx: Txn) -> Result<()> {
        self.pager.commit(tx.id())
    }

    /// `save_lsn = 0` fully aborts the transaction (it may not be used
    /// again); a nonzero `save_lsn` unwinds to a savepoint and leaves the
    /// transaction open for further work.
    pub fn rollback(&self, tx: Txn, save_lsn: u64) -> Result<()> {
        if save_lsn == 0 {
            self.pager.abort(tx.id())
        } else {
            self.pager.rollback_to(tx.id(), save_lsn)
        }
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.pager.checkpoint()
    }

    // ---- R+ tree payload operations, one variable per root pgno ----------

    pub fn rpt_new(&self, tx: Txn) -> Result<Pgno> {
        let cursor = RptCursor::new(&self.pager, tx.id())?;
        Ok(cursor.root())
    }

    pub fn rpt_insert(
        &self,
        rpt_root: Pgno,
        tx: Txn,
        src: &[u8],
        byte_off: u64,
        size: usize,
        nelems: usize,
    ) -> Result<()> {
        debug_assert_eq!(src.len(), size * nelems);
        let mut cursor = RptCursor::open(&self.pager, rpt_root)?;
        cursor.enter_transaction(tx.id());
        let result = cursor.insert(&self.pager, byte_off, src);
        cursor.leave_transaction();
        cursor.cleanup();
        result
    }

    pub fn rpt_write(&self, rpt_root: Pgno, tx: Txn, src: &[u8], size: usize, stride: Stride) -> Result<()> {
        let mut cursor = RptCursor::open(&self.pager, rpt_root)?;
        cursor.enter_transaction(tx.id());
        let result = cursor.write(&self.pager, src, size, stride);
        cursor.leave_transaction();
        cursor.cleanup();
        result
    }

    pub fn rpt_read(&self, rpt_root: Pgno, dest: &mut [u8], size: usize, stride: Stride) -> Result<usize> {
        let mut cursor = RptCursor::open(&self.pager, rpt_root)?;
        cursor.read(&self.pager, dest, size, stride)?;
        Ok(dest.len())
    }

    pub fn rpt_remove(
        &self,
        rpt_root: Pgno,
        tx: Txn,
        dest: Option<&mut [u8]>,
        size: usize,
        stride: Stride,
    ) -> Result<usize> {
        let mut cursor = RptCursor::open(&self.pager, rpt_root)?;
        let removed = size * stride.nelems;
        cursor.enter_transaction(tx.id());
        let result = cursor.remove(&self.pager, dest, size, stride);
        cursor.leave_transaction();
        cursor.cleanup();
        result?;
        Ok(removed)
    }

    pub fn rpt_size(&self, rpt_root: Pgno) -> Result<u64> {
        let cursor = RptCursor::open(&self.pager, rpt_root)?;
        Ok(cursor.size())
    }

    pub fn rpt_delete(&self, rpt_root: Pgno, tx: Txn) -> Result<()> {
        let cursor = RptCursor::open(&self.pager, rpt_root)?;
        cursor.delete(&self.pager, tx.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Engine {
        Engine::open(&dir.path().join("db"), &dir.path().join("wal"), "seg").unwrap()
    }

    #[test]
    fn create_insert_commit_reopen_reads_back() {
        let dir = TempDir::new().unwrap();
        {
            let engine = open(&dir);
            let tx = engine.begin_txn().unwrap();
            let root = engine.rpt_new(tx).unwrap();
            engine.rpt_insert(root, tx, b"hello world", 0, 11, 1).unwrap();
            engine.commit(tx).unwrap();
            engine.checkpoint().unwrap();

            let mut out = [0u8; 11];
            engine
                .rpt_read(root, &mut out, 11, Stride { start: 0, step: 11, nelems: 1 })
                .unwrap();
            assert_eq!(&out, b"hello world");
            engine.close().unwrap();
        }

        let engine = open(&dir);
        assert!(engine.begin_txn().is_ok());
    }

    #[test]
    fn second_open_is_rejected_while_first_is_live() {
        let dir = TempDir::new().unwrap();
        let _engine = open(&dir);
        let second = Engine::open(&dir.path().join("db"), &dir.path().join("wal2"), "seg");
        assert!(second.is_err());
    }

    #[test]
    fn rollback_undoes_uncommitted_insert() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let tx = engine.begin_txn().unwrap();
        let root = engine.rpt_new(tx).unwrap();
        engine.rpt_insert(root, tx, b"abc", 0, 3, 1).unwrap();
        engine.rollback(tx, 0).unwrap();

        let tx2 = engine.begin_txn().unwrap();
        let size = engine.rpt_size(root).unwrap();
        assert_eq!(size, 0);
        engine.commit(tx2).unwrap();
    }
}
