//! R+ tree leaf page layout.
//!
//! Leaf body: `prev:u64, next:u64, range_lo:u64, range_hi:u64, used:u32`,
//! followed by up to `LeafView::capacity()` payload bytes holding the
//! `[range_lo, range_hi)` slice of the variable's byte sequence.

use super::{Page, Pgno, BODY_SIZE};
use crate::error::{Error, Result};

const LEAF_HEADER_SIZE: usize = 8 + 8 + 8 + 8 + 4;

pub struct LeafView<'a>(pub(super) &'a Page);
pub struct LeafViewMut<'a>(pub(super) &'a mut Page);

impl Page {
    pub fn as_leaf(&self) -> LeafView<'_> {
        LeafView(self)
    }
    pub fn as_leaf_mut(&mut self) -> LeafViewMut<'_> {
        LeafViewMut(self)
    }
}

impl LeafView<'_> {
    pub fn capacity() -> usize {
        BODY_SIZE - LEAF_HEADER_SIZE
    }

    pub fn prev(&self) -> Pgno {
        u64::from_le_bytes(self.0.body()[0..8].try_into().unwrap())
    }

    pub fn next(&self) -> Pgno {
        u64::from_le_bytes(self.0.body()[8..16].try_into().unwrap())
    }

    pub fn range_lo(&self) -> u64 {
        u64::from_le_bytes(self.0.body()[16..24].try_into().unwrap())
    }

    pub fn range_hi(&self) -> u64 {
        u64::from_le_bytes(self.0.body()[24..32].try_into().unwrap())
    }

    pub fn used(&self) -> usize {
        u32::from_le_bytes(self.0.body()[32..36].try_into().unwrap()) as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.0.body()[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + self.used()]
    }
}

impl LeafViewMut<'_> {
    pub fn set_prev(&mut self, pgno: Pgno) {
        self.0.body_mut()[0..8].copy_from_slice(&pgno.to_le_bytes());
    }
    pub fn set_next(&mut self, pgno: Pgno) {
        self.0.body_mut()[8..16].copy_from_slice(&pgno.to_le_bytes());
    }
    pub fn set_range(&mut self, lo: u64, hi: u64) {
        self.0.body_mut()[16..24].copy_from_slice(&lo.to_le_bytes());
        self.0.body_mut()[24..32].copy_from_slice(&hi.to_le_bytes());
    }

    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > LeafView::capacity() {
            return Err(Error::InvalidArgument(format!(
                "leaf payload of {} bytes exceeds capacity {}",
                data.len(),
                LeafView::capacity()
            )));
        }
        self.0.body_mut()[32..36].copy_from_slice(&(data.len() as u32).to_le_bytes());
        self.0.body_mut()[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn payload_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.0.body_mut()[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;

    #[test]
    fn leaf_round_trip() {
        let mut page = Page::zeroed(PageType::RptLeaf);
        page.as_leaf_mut().set_range(10, 15);
        page.as_leaf_mut().set_payload(b"hello").unwrap();
        assert_eq!(page.as_leaf().range_lo(), 10);
        assert_eq!(page.as_leaf().range_hi(), 15);
        assert_eq!(page.as_leaf().payload(), b"hello");
    }
}
