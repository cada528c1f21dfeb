//! ARIES-style crash recovery: Analysis, Redo, Undo.
//!
//! Run once when opening an existing database, rooted at the root page's
//! persisted `master_lsn` (0 if the database was never checkpointed).

use crate::error::Result;
use crate::pager::Pager;
use crate::txn::AttEntry;
use crate::wal::record::{Tid, TxState, WalRecord};

fn prev_lsn_of(rec: &WalRecord) -> u64 {
    match rec {
        WalRecord::Begin { .. } | WalRecord::CkptBegin | WalRecord::CkptEnd { .. } => 0,
        WalRecord::Update { prev_lsn, .. }
        | WalRecord::Clr { prev_lsn, .. }
        | WalRecord::Commit { prev_lsn, .. }
        | WalRecord::End { prev_lsn, .. } => *prev_lsn,
    }
}

pub fn recover(pager: &mut Pager) -> Result<()> {
    let master_lsn = pager.master_lsn()?;
    analysis(pager, master_lsn)?;
    redo(pager, master_lsn)?;
    undo(pager)?;
    Ok(())
}

fn analysis(pager: &mut Pager, master_lsn: u64) -> Result<()> {
    let st = pager.state.get_mut();
    let entries = st.wal.iter_from(master_lsn)?;
    for (lsn, rec) in &entries {
        if let Some(tid) = rec.tid() {
            st.tids.observe(tid);
            if !st.att.contains(tid) {
                st.att.insert(
                    tid,
                    AttEntry {
                        state: TxState::CandidateForUndo,
                        last_lsn: *lsn,
                        undo_next_lsn: prev_lsn_of(rec),
                    },
                );
            }
        }
        match rec {
            WalRecord::Update { tid, pgno, .. } => {
                if let Some(e) = st.att.get_mut(*tid) {
                    e.last_lsn = *lsn;
                    e.undo_next_lsn = *lsn;
                }
                st.dpt.record_if_absent(*pgno, *lsn);
            }
            WalRecord::Clr { tid, undo_next, .. } => {
                if let Some(e) = st.att.get_mut(*tid) {
                    e.last_lsn = *lsn;
                    e.undo_next_lsn = *undo_next;
                }
            }
            WalRecord::Commit { tid, .. } => {
                if let Some(e) = st.att.get_mut(*tid) {
                    e.state = TxState::Committed;
                    e.last_lsn = *lsn;
                }
            }
            WalRecord::End { tid, .. } => {
                st.att.remove(*tid);
            }
            WalRecord::CkptEnd { att, dpt } => {
                st.att.merge_snapshot(att);
                st.dpt.merge_snapshot(dpt);
                for e in att {
                    st.tids.observe(e.tid);
                }
            }
            WalRecord::Begin { .. } | WalRecord::CkptBegin => {}
        }
    }

    let finished: Vec<Tid> = st
        .att
        .iter()
        .filter(|(_, e)| e.state == TxState::Committed || (e.state == TxState::CandidateForUndo && e.undo_next_lsn == 0))
        .map(|(tid, _)| tid)
        .collect();
    for tid in finished {
        let last_lsn = st.att.get(tid).unwrap().last_lsn;
        st.wal.append(&WalRecord::End { tid, prev_lsn: last_lsn })?;
        st.att.remove(tid);
    }
    Ok(())
}

fn redo(pager: &mut Pager, _master_lsn: u64) -> Result<()> {
    let st = pager.state.get_mut();
    let Some(redo_lsn) = st.dpt.min_rec_lsn() else {
        return Ok(());
    };
    let entries = st.wal.iter_from(redo_lsn)?;
    for (lsn, rec) in entries {
        let (pgno, redo_image) = match &rec {
            WalRecord::Update { pgno, redo, .. } => (*pgno, redo.clone()),
            WalRecord::Clr { pgno, redo, .. } => (*pgno, redo.clone()),
            _ => continue,
        };
        let Some(rec_lsn) = st.dpt.get(pgno) else {
            continue;
        };
        // Preserves the original engine's fold-comparison against the fixed
        // starting `redo_lsn` rather than re-deriving a per-page threshold.
        if rec_lsn > redo_lsn {
            continue;
        }
        let idx = st.get_writable(pgno, None)?;
        let page_lsn = st.buffer.shadow(idx).page_lsn();
        if page_lsn < lsn {
            st.buffer.shadow_mut(idx).data.copy_from_slice(redo_image.as_ref());
            st.buffer.shadow_mut(idx).set_page_lsn(lsn);
            st.buffer.commit_shadow(idx);
        } else {
            st.dpt.set(pgno, page_lsn + 1);
            st.buffer.commit_shadow(idx);
        }
        st.buffer.release(idx);
    }
    Ok(())
}

fn undo(pager: &mut Pager) -> Result<()> {
    loop {
        let candidate = {
            let st = pager.state.get_mut();
            st.att
                .iter()
                .max_by_key(|(_, e)| e.undo_next_lsn)
                .map(|(tid, _)| tid)
        };
        let Some(tid) = candidate else {
            break;
        };
        let mut entry = *pager.state.get_mut().att.get(tid).unwrap();
        if entry.undo_next_lsn == 0 {
            let st = pager.state.get_mut();
            st.wal.append(&WalRecord::End {
                tid,
                prev_lsn: entry.last_lsn,
            })?;
            st.att.remove(tid);
            continue;
        }
        pager.apply_one_undo_step(tid, &mut entry)?;
    }
    Ok(())
}
