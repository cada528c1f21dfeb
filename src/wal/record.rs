//! Physiological WAL record types and their byte encoding.
//!
//! Frame-level wire format: `[len:u32][tag:u8][body][crc32:u32]`, where
//! `len` covers `tag + body` only. Update and CLR bodies each carry one
//! full page image (before-image for Update's undo side, after-image for
//! both redo sides); that's the bulk of the WAL's volume.

use crate::config::PAGE_SIZE;
use crate::error::{Error, Result};
use crate::page::{Pgno, Lsn};

pub type Tid = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Running,
    Committed,
    CandidateForUndo,
}

impl TxState {
    fn tag(self) -> u8 {
        match self {
            TxState::Running => 0,
            TxState::Committed => 1,
            TxState::CandidateForUndo => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => TxState::Running,
            1 => TxState::Committed,
            2 => TxState::CandidateForUndo,
            other => return Err(Error::Corrupt(format!("bad tx state tag {other}"))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AttSnapshotEntry {
    pub tid: Tid,
    pub state: TxState,
    pub last_lsn: Lsn,
    pub undo_next_lsn: Lsn,
}

#[derive(Debug, Clone)]
pub enum WalRecord {
    Begin {
        tid: Tid,
    },
    Update {
        tid: Tid,
        prev_lsn: Lsn,
        pgno: Pgno,
        undo: Box<[u8; PAGE_SIZE]>,
        redo: Box<[u8; PAGE_SIZE]>,
    },
    Clr {
        tid: Tid,
        prev_lsn: Lsn,
        pgno: Pgno,
        undo_next: Lsn,
        redo: Box<[u8; PAGE_SIZE]>,
    },
    Commit {
        tid: Tid,
        prev_lsn: Lsn,
    },
    End {
        tid: Tid,
        prev_lsn: Lsn,
    },
    CkptBegin,
    CkptEnd {
        att: Vec<AttSnapshotEntry>,
        dpt: Vec<(Pgno, Lsn)>,
    },
}

const TAG_BEGIN: u8 = 1;
const TAG_UPDATE: u8 = 2;
const TAG_CLR: u8 = 3;
const TAG_COMMIT: u8 = 4;
const TAG_END: u8 = 5;
const TAG_CKPT_BEGIN: u8 = 6;
const TAG_CKPT_END: u8 = 7;

impl WalRecord {
    pub fn tid(&self) -> Option<Tid> {
        match self {
            WalRecord::Begin { tid } => Some(*tid),
            WalRecord::Update { tid, .. } => Some(*tid),
            WalRecord::Clr { tid, .. } => Some(*tid),
            WalRecord::Commit { tid, .. } => Some(*tid),
            WalRecord::End { tid, .. } => Some(*tid),
            WalRecord::CkptBegin | WalRecord::CkptEnd { .. } => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + PAGE_SIZE * 2 + 64);
        match self {
            WalRecord::Begin { tid } => {
                buf.push(TAG_BEGIN);
                buf.extend_from_slice(&tid.to_le_bytes());
            }
            WalRecord::Update {
                tid,
                prev_lsn,
                pgno,
                undo,
                redo,
            } => {
                buf.push(TAG_UPDATE);
                buf.extend_from_slice(&tid.to_le_bytes());
                buf.extend_from_slice(&prev_lsn.to_le_bytes());
                buf.extend_from_slice(&pgno.to_le_bytes());
                buf.extend_from_slice(undo.as_ref());
                buf.extend_from_slice(redo.as_ref());
            }
            WalRecord::Clr {
                tid,
                prev_lsn,
                pgno,
                undo_next,
                redo,
            } => {
                buf.push(TAG_CLR);
                buf.extend_from_slice(&tid.to_le_bytes());
                buf.extend_from_slice(&prev_lsn.to_le_bytes());
                buf.extend_from_slice(&pgno.to_le_bytes());
                buf.extend_from_slice(&undo_next.to_le_bytes());
                buf.extend_from_slice(redo.as_ref());
            }
            WalRecord::Commit { tid, prev_lsn } => {
                buf.push(TAG_COMMIT);
                buf.extend_from_slice(&tid.to_le_bytes());
                buf.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            WalRecord::End { tid, prev_lsn } => {
                buf.push(TAG_END);
                buf.extend_from_slice(&tid.to_le_bytes());
                buf.extend_from_slice(&prev_lsn.to_le_bytes());
            }
            WalRecord::CkptBegin => {
                buf.push(TAG_CKPT_BEGIN);
            }
            WalRecord::CkptEnd { att, dpt } => {
                buf.push(TAG_CKPT_END);
                buf.extend_from_slice(&(att.len() as u32).to_le_bytes());
                for e in att {
                    buf.extend_from_slice(&e.tid.to_le_bytes());
                    buf.push(e.state.tag());
                    buf.extend_from_slice(&e.last_lsn.to_le_bytes());
                    buf.extend_from_slice(&e.undo_next_lsn.to_le_bytes());
                }
                buf.extend_from_slice(&(dpt.len() as u32).to_le_bytes());
                for (pgno, rec_lsn) in dpt {
                    buf.extend_from_slice(&pgno.to_le_bytes());
                    buf.extend_from_slice(&rec_lsn.to_le_bytes());
                }
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let bad = || Error::Corrupt("truncated WAL record body".into());
        let u64_at = |data: &[u8], off: usize| -> Result<u64> {
            data.get(off..off + 8)
                .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
                .ok_or_else(bad)
        };

        if data.is_empty() {
            return Err(bad());
        }
        Ok(match data[0] {
            TAG_BEGIN => WalRecord::Begin {
                tid: u64_at(data, 1)?,
            },
            TAG_UPDATE => {
                let tid = u64_at(data, 1)?;
                let prev_lsn = u64_at(data, 9)?;
                let pgno = u64_at(data, 17)?;
                let undo_start = 25;
                let redo_start = undo_start + PAGE_SIZE;
                let end = redo_start + PAGE_SIZE;
                let body = data.get(undo_start..end).ok_or_else(bad)?;
                let mut undo = Box::new([0u8; PAGE_SIZE]);
                undo.copy_from_slice(&body[..PAGE_SIZE]);
                let mut redo = Box::new([0u8; PAGE_SIZE]);
                redo.copy_from_slice(&body[PAGE_SIZE..]);
                WalRecord::Update {
                    tid,
                    prev_lsn,
                    pgno,
                    undo,
                    redo,
                }
            }
            TAG_CLR => {
                let tid = u64_at(data, 1)?;
                let prev_lsn = u64_at(data, 9)?;
                let pgno = u64_at(data, 17)?;
                let undo_next = u64_at(data, 25)?;
                let redo_start = 33;
                let body = data.get(redo_start..redo_start + PAGE_SIZE).ok_or_else(bad)?;
                let mut redo = Box::new([0u8; PAGE_SIZE]);
                redo.copy_from_slice(body);
                WalRecord::Clr {
                    tid,
                    prev_lsn,
                    pgno,
                    undo_next,
                    redo,
                }
            }
            TAG_COMMIT => WalRecord::Commit {
                tid: u64_at(data, 1)?,
                prev_lsn: u64_at(data, 9)?,
            },
            TAG_END => WalRecord::End {
                tid: u64_at(data, 1)?,
                prev_lsn: u64_at(data, 9)?,
            },
            TAG_CKPT_BEGIN => WalRecord::CkptBegin,
            TAG_CKPT_END => {
                let mut off = 1;
                let att_count = data
                    .get(off..off + 4)
                    .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
                    .ok_or_else(bad)? as usize;
                off += 4;
                let mut att = Vec::with_capacity(att_count);
                for _ in 0..att_count {
                    let tid = u64_at(data, off)?;
                    let state = TxState::from_tag(*data.get(off + 8).ok_or_else(bad)?)?;
                    let last_lsn = u64_at(data, off + 9)?;
                    let undo_next_lsn = u64_at(data, off + 17)?;
                    off += 25;
                    att.push(AttSnapshotEntry {
                        tid,
                        state,
                        last_lsn,
                        undo_next_lsn,
                    });
                }
                let dpt_count = data
                    .get(off..off + 4)
                    .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
                    .ok_or_else(bad)? as usize;
                off += 4;
                let mut dpt = Vec::with_capacity(dpt_count);
                for _ in 0..dpt_count {
                    let pgno = u64_at(data, off)?;
                    let rec_lsn = u64_at(data, off + 8)?;
                    off += 16;
                    dpt.push((pgno, rec_lsn));
                }
                WalRecord::CkptEnd { att, dpt }
            }
            other => return Err(Error::Corrupt(format!("unknown WAL record tag {other}"))),
        })
    }
}
