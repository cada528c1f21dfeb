//! A page holding an opaque byte blob, used for auxiliary data that doesn't
//! fit the R+ tree shape (e.g. a serialized variable directory entry).
//!
//! Body layout: `used:u32 @0`, followed by up to `capacity()` payload bytes.

use super::{Page, BODY_SIZE};
use crate::error::{Error, Result};

const USED_FIELD: usize = 4;

pub struct DataListView<'a>(pub(super) &'a Page);
pub struct DataListViewMut<'a>(pub(super) &'a mut Page);

impl Page {
    pub fn as_data_list(&self) -> DataListView<'_> {
        DataListView(self)
    }

    pub fn as_data_list_mut(&mut self) -> DataListViewMut<'_> {
        DataListViewMut(self)
    }
}

impl DataListView<'_> {
    pub fn capacity() -> usize {
        BODY_SIZE - USED_FIELD
    }

    pub fn used(&self) -> usize {
        u32::from_le_bytes(self.0.body()[0..4].try_into().unwrap()) as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.0.body()[USED_FIELD..USED_FIELD + self.used()]
    }
}

impl DataListViewMut<'_> {
    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > DataListView::capacity() {
            return Err(Error::InvalidArgument(format!(
                "payload of {} bytes exceeds data-list page capacity of {} bytes",
                data.len(),
                DataListView::capacity()
            )));
        }
        self.0.body_mut()[0..4].copy_from_slice(&(data.len() as u32).to_le_bytes());
        self.0.body_mut()[USED_FIELD..USED_FIELD + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;

    #[test]
    fn set_and_read_payload() {
        let mut page = Page::zeroed(PageType::DataList);
        page.as_data_list_mut().set_payload(b"hello").unwrap();
        assert_eq!(page.as_data_list().payload(), b"hello");
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut page = Page::zeroed(PageType::DataList);
        let too_big = vec![0u8; DataListView::capacity() + 1];
        assert!(page.as_data_list_mut().set_payload(&too_big).is_err());
    }
}
