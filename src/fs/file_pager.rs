//! Maps `pgno -> file offset` on the backing database file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::PAGE_SIZE;
use crate::error::{Error, Result};
use crate::page::{Page, Pgno};

pub struct FilePager {
    file: File,
    npages: u64,
}

impl FilePager {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(FilePager { file, npages: 0 })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::Corrupt(format!(
                "database file length {len} is not a multiple of page size {PAGE_SIZE}"
            )));
        }
        Ok(FilePager {
            file,
            npages: len / PAGE_SIZE as u64,
        })
    }

    pub fn npages(&self) -> u64 {
        self.npages
    }

    fn offset(pgno: Pgno) -> u64 {
        pgno * PAGE_SIZE as u64
    }

    pub fn read(&mut self, pgno: Pgno) -> Result<Page> {
        if pgno >= self.npages {
            return Err(Error::Corrupt(format!(
                "pgno {pgno} is beyond end of file ({} pages)",
                self.npages
            )));
        }
        self.file.seek(SeekFrom::Start(Self::offset(pgno)))?;
        let mut data = [0u8; PAGE_SIZE];
        self.file.read_exact(&mut data)?;
        Ok(Page::from_bytes(data))
    }

    pub fn write(&mut self, pgno: Pgno, page: &Page) -> Result<()> {
        if pgno >= self.npages {
            return Err(Error::Corrupt(format!(
                "write to pgno {pgno} beyond end of file ({} pages)",
                self.npages
            )));
        }
        self.file.seek(SeekFrom::Start(Self::offset(pgno)))?;
        self.file.write_all(page.as_bytes())?;
        Ok(())
    }

    /// Extends the file by one page and returns its pgno.
    pub fn new_page(&mut self) -> Result<Pgno> {
        let pgno = self.npages;
        self.file.seek(SeekFrom::Start(Self::offset(pgno)))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.npages += 1;
        Ok(pgno)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;
    use tempfile::NamedTempFile;

    #[test]
    fn new_write_read_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).ok();

        let mut fp = FilePager::create(&path).unwrap();
        let pgno = fp.new_page().unwrap();
        assert_eq!(pgno, 0);
        assert_eq!(fp.npages(), 1);

        let mut page = Page::zeroed(PageType::DataList);
        page.as_data_list_mut().set_payload(b"hi").unwrap();
        fp.write(pgno, &page).unwrap();

        let read_back = fp.read(pgno).unwrap();
        assert_eq!(read_back.as_data_list().payload(), b"hi");
    }

    #[test]
    fn read_beyond_eof_fails() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).ok();
        let mut fp = FilePager::create(&path).unwrap();
        assert!(fp.read(0).is_err());
    }
}
