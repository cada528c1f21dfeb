use crate::page::{Page, Pgno};

#[derive(Default)]
pub struct Frame {
    pub pgno: Option<Pgno>,
    pub page: Page,
    pub pin: u32,
    pub dirty: bool,
    pub access: bool,
}

impl Default for Page {
    fn default() -> Self {
        Page::zeroed(crate::page::PageType::DataList)
    }
}

impl Frame {
    pub fn empty() -> Self {
        Frame {
            pgno: None,
            page: Page::zeroed(crate::page::PageType::DataList),
            pin: 0,
            dirty: false,
            access: false,
        }
    }

    pub fn present(&self) -> bool {
        self.pgno.is_some()
    }
}
