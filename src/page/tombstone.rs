//! A page on the free list. Body layout: `next:u64 @0`.
//!
//! `next == NONE` (`u64::MAX`) terminates the free list: the page holding
//! it is the last tombstone, and allocating past it requires extending the
//! file via the file pager.

use super::Page;

/// Marks the end of the tombstone free list.
pub const NONE: u64 = u64::MAX;

pub struct TombstoneView<'a>(pub(super) &'a Page);
pub struct TombstoneViewMut<'a>(pub(super) &'a mut Page);

impl Page {
    pub fn as_tombstone(&self) -> TombstoneView<'_> {
        TombstoneView(self)
    }

    pub fn as_tombstone_mut(&mut self) -> TombstoneViewMut<'_> {
        TombstoneViewMut(self)
    }
}

impl TombstoneView<'_> {
    pub fn next(&self) -> u64 {
        u64::from_le_bytes(self.0.body()[0..8].try_into().unwrap())
    }
}

impl TombstoneViewMut<'_> {
    pub fn set_next(&mut self, next: u64) {
        self.0.body_mut()[0..8].copy_from_slice(&next.to_le_bytes());
    }
}
