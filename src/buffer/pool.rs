//! Clock-sweep buffer pool with X/S page-frame shadowing.
//!
//! Purely mechanical: this module knows nothing about the WAL or the "a
//! dirty page may only be flushed once the WAL is durable past its
//! `page_lsn`" rule. The pager (`crate::pager`) enforces that rule by
//! flushing the WAL before calling `evict` on a dirty frame.

use std::collections::HashMap;

use crate::buffer::frame::Frame;
use crate::error::{Error, Result};
use crate::fs::file_pager::FilePager;
use crate::page::{Page, PageType, Pgno};

pub struct BufferPool {
    frames: Vec<Frame>,
    shadows: HashMap<usize, Page>,
    index: HashMap<Pgno, usize>,
    clock: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        BufferPool {
            frames: (0..capacity).map(|_| Frame::empty()).collect(),
            shadows: HashMap::new(),
            index: HashMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Finds an already-resident frame for `pgno`, pinning it. Returns
    /// `None` if the page is not currently buffered.
    pub fn lookup_pin(&mut self, pgno: Pgno) -> Option<usize> {
        let idx = *self.index.get(&pgno)?;
        self.frames[idx].pin += 1;
        self.frames[idx].access = true;
        Some(idx)
    }

    /// Clock-sweeps for a frame to reuse, clearing access bits as it goes.
    /// Does not evict -- returns the candidate index so the caller can
    /// enforce the WAL-durability rule before writing a dirty victim back.
    pub fn find_victim(&mut self) -> Result<usize> {
        if let Some(idx) = self.frames.iter().position(|f| !f.present()) {
            return Ok(idx);
        }
        let n = self.frames.len();
        for _ in 0..(2 * n) {
            let idx = self.clock;
            self.clock = (self.clock + 1) % n;
            if self.shadows.contains_key(&idx) {
                continue;
            }
            let f = &mut self.frames[idx];
            if f.pin > 0 {
                continue;
            }
            if f.access {
                f.access = false;
                continue;
            }
            return Ok(idx);
        }
        Err(Error::PagerFull)
    }

    /// Finalizes eviction of a clean or already-flushed-by-caller frame.
    pub fn evict(&mut self, idx: usize, file_pager: &mut FilePager) -> Result<()> {
        let frame = &self.frames[idx];
        if let Some(pgno) = frame.pgno {
            if frame.dirty {
                file_pager.write(pgno, &frame.page)?;
            }
            self.index.remove(&pgno);
        }
        let f = &mut self.frames[idx];
        f.pgno = None;
        f.dirty = false;
        f.access = false;
        f.pin = 0;
        Ok(())
    }

    pub fn place(&mut self, idx: usize, pgno: Pgno, page: Page) {
        let f = &mut self.frames[idx];
        f.pgno = Some(pgno);
        f.page = page;
        f.pin = 1;
        f.access = true;
        f.dirty = false;
        self.index.insert(pgno, idx);
    }

    pub fn pin(&mut self, idx: usize) {
        self.frames[idx].pin += 1;
    }

    pub fn release(&mut self, idx: usize) {
        let f = &mut self.frames[idx];
        debug_assert!(f.pin > 0, "release of a frame with zero pins");
        f.pin = f.pin.saturating_sub(1);
    }

    pub fn page(&self, idx: usize) -> &Page {
        &self.frames[idx].page
    }

    pub fn pgno(&self, idx: usize) -> Pgno {
        self.frames[idx].pgno.expect("frame must be present")
    }

    pub fn pgno_if_present(&self, idx: usize) -> Option<Pgno> {
        self.frames[idx].pgno
    }

    pub fn pin_count(&self, idx: usize) -> u32 {
        self.frames[idx].pin
    }

    pub fn is_dirty(&self, idx: usize) -> bool {
        self.frames[idx].dirty
    }

    pub fn mark_dirty(&mut self, idx: usize) {
        self.frames[idx].dirty = true;
    }

    pub fn set_page_lsn(&mut self, idx: usize, lsn: u64) {
        self.frames[idx].page.set_page_lsn(lsn);
    }

    pub fn is_writable(&self, idx: usize) -> bool {
        self.shadows.contains_key(&idx)
    }

    /// Reserves a writable shadow copy for `idx`, cloning the current
    /// S-image. Fails if a shadow already exists for this frame.
    pub fn make_writable(&mut self, idx: usize) -> Result<()> {
        if self.shadows.contains_key(&idx) {
            return Err(Error::InvalidArgument(
                "page is already checked out writable".into(),
            ));
        }
        let copy = self.frames[idx].page.clone();
        self.shadows.insert(idx, copy);
        self.frames[idx].dirty = true;
        Ok(())
    }

    pub fn shadow(&self, idx: usize) -> &Page {
        self.shadows.get(&idx).expect("no X-shadow for this frame")
    }

    pub fn shadow_mut(&mut self, idx: usize) -> &mut Page {
        self.shadows.get_mut(&idx).expect("no X-shadow for this frame")
    }

    /// Copies the X-shadow over the S-image and clears the shadow, per the
    /// `pgr_save` ordering: called only after the update's WAL record has
    /// already been appended and `page_lsn` stamped onto the shadow.
    pub fn commit_shadow(&mut self, idx: usize) {
        let shadow = self.shadows.remove(&idx).expect("commit without a shadow");
        self.frames[idx].page = shadow;
    }

    pub fn verify_type(&self, idx: usize, expected: Option<PageType>) -> Result<()> {
        self.frames[idx].page.verify_type(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;
    use tempfile::NamedTempFile;

    fn file_pager() -> FilePager {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).ok();
        FilePager::create(&path).unwrap()
    }

    #[test]
    fn place_lookup_release() {
        let mut pool = BufferPool::new(4);
        let mut fp = file_pager();
        let pgno = fp.new_page().unwrap();
        let victim = pool.find_victim().unwrap();
        pool.place(victim, pgno, Page::zeroed(PageType::DataList));
        assert_eq!(pool.lookup_pin(pgno), Some(victim));
        pool.release(victim);
        pool.release(victim);
    }

    #[test]
    fn writable_shadow_round_trip() {
        let mut pool = BufferPool::new(4);
        let mut fp = file_pager();
        let pgno = fp.new_page().unwrap();
        let idx = pool.find_victim().unwrap();
        pool.place(idx, pgno, Page::zeroed(PageType::DataList));
        pool.make_writable(idx).unwrap();
        pool.shadow_mut(idx).set_page_lsn(5);
        pool.commit_shadow(idx);
        assert_eq!(pool.page(idx).page_lsn(), 5);
        assert!(!pool.is_writable(idx));
    }

    #[test]
    fn find_victim_reuses_unpresent_frame_first() {
        let mut pool = BufferPool::new(2);
        let v = pool.find_victim().unwrap();
        assert_eq!(v, 0);
    }
}
