//! Page 0: the database's root page.
//!
//! Body layout: `master_lsn:u64 @0, first_tombstone:u64 @8`.

use super::Page;

pub struct RootView<'a>(pub(super) &'a Page);
pub struct RootViewMut<'a>(pub(super) &'a mut Page);

impl Page {
    pub fn as_root(&self) -> RootView<'_> {
        RootView(self)
    }

    pub fn as_root_mut(&mut self) -> RootViewMut<'_> {
        RootViewMut(self)
    }
}

impl RootView<'_> {
    pub fn master_lsn(&self) -> u64 {
        u64::from_le_bytes(self.0.body()[0..8].try_into().unwrap())
    }

    pub fn first_tombstone(&self) -> u64 {
        u64::from_le_bytes(self.0.body()[8..16].try_into().unwrap())
    }
}

impl RootViewMut<'_> {
    pub fn set_master_lsn(&mut self, lsn: u64) {
        self.0.body_mut()[0..8].copy_from_slice(&lsn.to_le_bytes());
    }

    pub fn set_first_tombstone(&mut self, pgno: u64) {
        self.0.body_mut()[8..16].copy_from_slice(&pgno.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;

    #[test]
    fn accessors_round_trip() {
        let mut page = Page::zeroed(PageType::Root);
        page.as_root_mut().set_master_lsn(7);
        page.as_root_mut().set_first_tombstone(3);
        assert_eq!(page.as_root().master_lsn(), 7);
        assert_eq!(page.as_root().first_tombstone(), 3);
    }
}
