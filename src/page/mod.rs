//! Fixed-size page representation shared by every on-disk structure.
//!
//! Layout: `[PageHeader (16 bytes)] [body (PAGE_SIZE - 16 bytes)]`. The body
//! is interpreted according to `page_type` by the sibling modules in this
//! directory (`root`, `tombstone`, `data_list`, `rptree`).

pub mod data_list;
pub mod rptree;
pub mod root;
pub mod tombstone;

use crate::config::PAGE_SIZE;
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 16;
pub const BODY_SIZE: usize = PAGE_SIZE - HEADER_SIZE;

pub type Pgno = u64;
pub type Lsn = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Root = 0,
    Tombstone = 1,
    DataList = 2,
    RptLeaf = 3,
}

impl TryFrom<u8> for PageType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            0 => PageType::Root,
            1 => PageType::Tombstone,
            2 => PageType::DataList,
            3 => PageType::RptLeaf,
            other => return Err(Error::Corrupt(format!("unknown page type tag {other}"))),
        })
    }
}

/// A raw page buffer plus typed accessors for the common header.
///
/// Mirrors the slotted-page approach of treating the whole page as one
/// byte array with manual offset accessors, rather than a view struct that
/// borrows it -- callers hold a `Page` value and ask it for typed views of
/// the body via the `root`/`tombstone`/`data_list`/`rptree` helpers.
#[derive(Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn zeroed(page_type: PageType) -> Self {
        let mut page = Page {
            data: [0u8; PAGE_SIZE],
        };
        page.set_page_type(page_type);
        page
    }

    pub fn from_bytes(data: [u8; PAGE_SIZE]) -> Self {
        Page { data }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn page_lsn(&self) -> Lsn {
        u64::from_le_bytes(self.data[0..8].try_into().unwrap())
    }

    pub fn set_page_lsn(&mut self, lsn: Lsn) {
        self.data[0..8].copy_from_slice(&lsn.to_le_bytes());
    }

    pub fn page_type(&self) -> Result<PageType> {
        PageType::try_from(self.data[8])
    }

    pub fn set_page_type(&mut self, t: PageType) {
        self.data[8] = t as u8;
    }

    pub fn body(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.data[HEADER_SIZE..]
    }

    /// Verifies `page_type` matches `expected`, returning `Corrupt` if not.
    /// Callers that pass `None` accept any page type (`pgr_get` with `PG_ANY`).
    pub fn verify_type(&self, expected: Option<PageType>) -> Result<()> {
        if let Some(expected) = expected {
            let actual = self.page_type()?;
            if actual != expected {
                return Err(Error::Corrupt(format!(
                    "expected page type {expected:?}, found {actual:?}"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_lsn", &self.page_lsn())
            .field("page_type", &self.page_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut page = Page::zeroed(PageType::DataList);
        page.set_page_lsn(42);
        assert_eq!(page.page_lsn(), 42);
        assert_eq!(page.page_type().unwrap(), PageType::DataList);
    }

    #[test]
    fn verify_type_rejects_mismatch() {
        let page = Page::zeroed(PageType::Root);
        assert!(page.verify_type(Some(PageType::Root)).is_ok());
        assert!(page.verify_type(Some(PageType::Tombstone)).is_err());
        assert!(page.verify_type(None).is_ok());
    }
}
