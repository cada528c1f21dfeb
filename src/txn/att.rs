//! Active transaction table.

use crate::config::ATT_HASH_CONFIG;
use crate::hash::adaptive::AdaptiveHashTable;
use crate::page::Lsn;
use crate::wal::record::{AttSnapshotEntry, Tid, TxState};

#[derive(Debug, Clone, Copy)]
pub struct AttEntry {
    pub state: TxState,
    pub last_lsn: Lsn,
    pub undo_next_lsn: Lsn,
}

pub struct Att {
    table: AdaptiveHashTable<Tid, AttEntry>,
}

impl Default for Att {
    fn default() -> Self {
        Self::new()
    }
}

impl Att {
    pub fn new() -> Self {
        Att {
            table: AdaptiveHashTable::new(&ATT_HASH_CONFIG),
        }
    }

    pub fn insert(&mut self, tid: Tid, entry: AttEntry) {
        self.table.insert(tid, entry);
    }

    pub fn get(&self, tid: Tid) -> Option<&AttEntry> {
        self.table.get(&tid)
    }

    pub fn get_mut(&mut self, tid: Tid) -> Option<&mut AttEntry> {
        self.table.get_mut(&tid)
    }

    pub fn remove(&mut self, tid: Tid) -> Option<AttEntry> {
        self.table.remove(&tid)
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.table.get(&tid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tid, &AttEntry)> {
        self.table.iter().map(|(&tid, entry)| (tid, entry))
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn snapshot(&self) -> Vec<AttSnapshotEntry> {
        self.iter()
            .map(|(tid, e)| AttSnapshotEntry {
                tid,
                state: e.state,
                last_lsn: e.last_lsn,
                undo_next_lsn: e.undo_next_lsn,
            })
            .collect()
    }

    /// Merges a checkpoint's ATT snapshot into the live table, as done
    /// during recovery analysis when folding `CkptEnd` in.
    pub fn merge_snapshot(&mut self, snapshot: &[AttSnapshotEntry]) {
        for e in snapshot {
            self.table.insert(
                e.tid,
                AttEntry {
                    state: e.state,
                    last_lsn: e.last_lsn,
                    undo_next_lsn: e.undo_next_lsn,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut att = Att::new();
        att.insert(
            1,
            AttEntry {
                state: TxState::Running,
                last_lsn: 5,
                undo_next_lsn: 5,
            },
        );
        assert!(att.contains(1));
        att.get_mut(1).unwrap().last_lsn = 9;
        assert_eq!(att.get(1).unwrap().last_lsn, 9);
        att.remove(1);
        assert!(!att.contains(1));
    }

    #[test]
    fn snapshot_round_trips_through_merge() {
        let mut att = Att::new();
        att.insert(
            3,
            AttEntry {
                state: TxState::CandidateForUndo,
                last_lsn: 12,
                undo_next_lsn: 4,
            },
        );
        let snap = att.snapshot();
        let mut other = Att::new();
        other.merge_snapshot(&snap);
        assert_eq!(other.get(3).unwrap().last_lsn, 12);
    }
}
