//! Write-ahead log: an append-only, segmented record stream.
//!
//! Framing: `[len:u32][body][crc32:u32]`, where `body` is a tag byte plus
//! the record's own encoding (see `record::WalRecord`). `len` covers only
//! `body`. Segment files roll over at `WAL_SEGMENT_SIZE` bytes and are
//! named `<base>.<seq:010>` inside the WAL directory.
//!
//! Torn-tail tolerance: a crash mid-`append` can leave a structurally
//! incomplete or checksum-invalid frame at the very end of the last
//! segment. `open` treats that as "nothing more to recover" rather than
//! `Corrupt`, but only when no *later* valid frame exists in the same
//! segment -- a checksum failure followed by good data is real corruption,
//! not a torn tail, and is reported as an error.

pub mod record;
pub mod segment;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::{PAGE_SIZE, WAL_SEGMENT_SIZE};
use crate::error::{Error, Result};
use crate::page::Lsn;
use crate::wal::record::WalRecord;

/// Largest frame this engine ever emits: an Update/CLR record carries up
/// to two full page images plus a small header; CkptEnd carries bounded
/// ATT/DPT snapshots on top of that.
pub const MAX_WAL_FRAME_LEN: usize = 2 * PAGE_SIZE + 16 * 1024;

struct Frame {
    body: Vec<u8>,
}

fn try_parse_frame(buf: &[u8], pos: usize) -> Option<(Frame, usize)> {
    if pos + 4 > buf.len() {
        return None;
    }
    let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
    if len == 0 || len > MAX_WAL_FRAME_LEN {
        return None;
    }
    let body_start = pos + 4;
    let body_end = body_start + len;
    let crc_end = body_end + 4;
    if crc_end > buf.len() {
        return None;
    }
    let body = &buf[body_start..body_end];
    let stored_crc = u32::from_le_bytes(buf[body_end..crc_end].try_into().unwrap());
    if crc32fast::hash(body) != stored_crc {
        return None;
    }
    Some((
        Frame {
            body: body.to_vec(),
        },
        crc_end,
    ))
}

/// Scans forward from `start` looking for any single valid frame, to
/// distinguish a torn tail (nothing valid follows) from mid-log corruption
/// (a later record is intact and must not be silently dropped).
fn any_valid_frame_ahead(buf: &[u8], start: usize) -> bool {
    let mut pos = start;
    while pos + 4 <= buf.len() {
        let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        if len == 0 || len > MAX_WAL_FRAME_LEN {
            pos += 1;
            continue;
        }
        let body_end = pos + 4 + len;
        let crc_end = body_end + 4;
        if crc_end > buf.len() {
            return false;
        }
        let stored_crc = u32::from_le_bytes(buf[body_end..crc_end].try_into().unwrap());
        if crc32fast::hash(&buf[pos + 4..body_end]) == stored_crc {
            return true;
        }
        pos = crc_end;
    }
    false
}

pub struct Wal {
    dir: PathBuf,
    base: String,
    segments: Vec<u64>,
    current_seq: u64,
    current_offset: u64,
    file: File,
    next_lsn: Lsn,
    synced_count: u64,
    index: HashMap<Lsn, (u64, u64)>,
}

impl Wal {
    pub fn open(dir: &Path, base: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let segments = segment::discover_segments(dir, base)?;

        if segments.is_empty() {
            let path = segment::segment_path(dir, base, 0);
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            return Ok(Wal {
                dir: dir.to_path_buf(),
                base: base.to_string(),
                segments: vec![0],
                current_seq: 0,
                current_offset: 0,
                file,
                next_lsn: 0,
                synced_count: 0,
                index: HashMap::new(),
            });
        }

        let mut index = HashMap::new();
        let mut next_lsn: Lsn = 0;
        let last_seq = *segments.last().unwrap();
        let mut tail_offset = 0u64;

        for &seq in &segments {
            let path = segment::segment_path(dir, base, seq);
            let mut buf = Vec::new();
            File::open(&path)?.read_to_end(&mut buf)?;
            let is_last = seq == last_seq;

            let mut pos = 0usize;
            loop {
                match try_parse_frame(&buf, pos) {
                    Some((frame, consumed)) => {
                        index.insert(next_lsn, (seq, pos as u64));
                        next_lsn += 1;
                        pos = consumed;
                        let _ = frame;
                    }
                    None => {
                        if pos >= buf.len() {
                            break;
                        }
                        if is_last {
                            if any_valid_frame_ahead(&buf, pos) {
                                return Err(Error::Corrupt(format!(
                                    "WAL segment {seq} has a corrupt frame at byte {pos} followed by valid data (mid-log corruption)"
                                )));
                            }
                            break;
                        } else {
                            return Err(Error::Corrupt(format!(
                                "WAL segment {seq} ends with an incomplete frame at byte {pos}; only the last segment may have a torn tail"
                            )));
                        }
                    }
                }
            }
            if is_last {
                tail_offset = pos as u64;
            }
        }

        let path = segment::segment_path(dir, base, last_seq);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.set_len(tail_offset)?;

        Ok(Wal {
            dir: dir.to_path_buf(),
            base: base.to_string(),
            segments,
            current_seq: last_seq,
            current_offset: tail_offset,
            file,
            next_lsn,
            synced_count: next_lsn,
            index,
        })
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// Highest LSN known durable, or `None` if nothing has been flushed yet.
    pub fn durable_lsn(&self) -> Option<Lsn> {
        if self.synced_count == 0 {
            None
        } else {
            Some(self.synced_count - 1)
        }
    }

    pub fn append(&mut self, rec: &WalRecord) -> Result<Lsn> {
        let body = rec.encode();
        if body.len() > MAX_WAL_FRAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "WAL record of {} bytes exceeds max frame length {MAX_WAL_FRAME_LEN}",
                body.len()
            )));
        }
        let frame_len = 4 + body.len() + 4;
        if self.current_offset + frame_len as u64 > WAL_SEGMENT_SIZE && self.current_offset > 0 {
            self.rotate()?;
        }

        let lsn = self.next_lsn;
        self.file.write_all(&(body.len() as u32).to_le_bytes())?;
        self.file.write_all(&body)?;
        self.file.write_all(&crc32fast::hash(&body).to_le_bytes())?;

        self.index.insert(lsn, (self.current_seq, self.current_offset));
        self.current_offset += frame_len as u64;
        self.next_lsn += 1;
        Ok(lsn)
    }

    fn rotate(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.synced_count = self.next_lsn;
        self.current_seq += 1;
        self.current_offset = 0;
        let path = segment::segment_path(&self.dir, &self.base, self.current_seq);
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        self.segments.push(self.current_seq);
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.synced_count = self.next_lsn;
        Ok(())
    }

    /// Ensures every record up to and including `lsn` is durable.
    pub fn flush_to(&mut self, lsn: Lsn) -> Result<()> {
        if self.durable_lsn().map(|d| d >= lsn).unwrap_or(false) {
            return Ok(());
        }
        self.flush_all()
    }

    pub fn read_entry(&self, lsn: Lsn) -> Result<WalRecord> {
        let &(seq, offset) = self
            .index
            .get(&lsn)
            .ok_or_else(|| Error::Corrupt(format!("no WAL record at LSN {lsn}")))?;
        let path = segment::segment_path(&self.dir, &self.base, seq);
        let mut file = File::open(&path)?;
        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(offset))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;
        let mut crc_buf = [0u8; 4];
        file.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);
        if crc32fast::hash(&body) != stored_crc {
            return Err(Error::Corrupt(format!("CRC mismatch reading WAL record at LSN {lsn}")));
        }
        WalRecord::decode(&body)
    }

    /// Every record present, oldest first. Used by ARIES analysis.
    pub fn iter_from(&self, start_lsn: Lsn) -> Result<Vec<(Lsn, WalRecord)>> {
        let mut out = Vec::new();
        for lsn in start_lsn..self.next_lsn {
            out.push((lsn, self.read_entry(lsn)?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::record::WalRecord;
    use tempfile::TempDir;

    #[test]
    fn append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path(), "test").unwrap();
        let l0 = wal.append(&WalRecord::Begin { tid: 1 }).unwrap();
        let l1 = wal.append(&WalRecord::Commit { tid: 1, prev_lsn: l0 }).unwrap();
        wal.flush_all().unwrap();

        assert!(matches!(wal.read_entry(l0).unwrap(), WalRecord::Begin { tid: 1 }));
        assert!(matches!(wal.read_entry(l1).unwrap(), WalRecord::Commit { tid: 1, .. }));
        assert_eq!(wal.durable_lsn(), Some(l1));
    }

    #[test]
    fn reopen_recovers_index_and_next_lsn() {
        let dir = TempDir::new().unwrap();
        {
            let mut wal = Wal::open(dir.path(), "test").unwrap();
            wal.append(&WalRecord::Begin { tid: 1 }).unwrap();
            wal.append(&WalRecord::End { tid: 1, prev_lsn: 0 }).unwrap();
            wal.flush_all().unwrap();
        }
        let wal = Wal::open(dir.path(), "test").unwrap();
        assert_eq!(wal.next_lsn(), 2);
        assert!(matches!(wal.read_entry(0).unwrap(), WalRecord::Begin { tid: 1 }));
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path;
        {
            let mut wal = Wal::open(dir.path(), "test").unwrap();
            wal.append(&WalRecord::Begin { tid: 1 }).unwrap();
            wal.flush_all().unwrap();
            path = segment::segment_path(dir.path(), "test", 0);
        }
        // Simulate a crash mid-append: a length header with no body.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&500u32.to_le_bytes()).unwrap();
            file.write_all(&[0xAB; 5]).unwrap();
        }
        let wal = Wal::open(dir.path(), "test").unwrap();
        assert_eq!(wal.next_lsn(), 1, "torn tail frame must not count as a record");
    }

    #[test]
    fn mid_log_corruption_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path;
        {
            let mut wal = Wal::open(dir.path(), "test").unwrap();
            wal.append(&WalRecord::Begin { tid: 1 }).unwrap();
            wal.append(&WalRecord::Begin { tid: 2 }).unwrap();
            wal.flush_all().unwrap();
            path = segment::segment_path(dir.path(), "test", 0);
        }
        let mut bytes = std::fs::read(&path).unwrap();
        // Flip a byte inside the first frame's body.
        bytes[6] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = Wal::open(dir.path(), "test");
        assert!(result.is_err());
    }

    #[test]
    fn segment_rotation_on_overflow() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path(), "test").unwrap();
        // Force the first append to look like it fills the segment.
        wal.current_offset = WAL_SEGMENT_SIZE;
        wal.append(&WalRecord::Begin { tid: 1 }).unwrap();
        assert_eq!(wal.current_seq, 1);
    }
}
