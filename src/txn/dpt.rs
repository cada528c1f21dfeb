//! Dirty page table: pgno -> the LSN of the record that first dirtied it.

use crate::config::DPT_HASH_CONFIG;
use crate::hash::adaptive::AdaptiveHashTable;
use crate::page::{Lsn, Pgno};

pub struct Dpt {
    table: AdaptiveHashTable<Pgno, Lsn>,
}

impl Default for Dpt {
    fn default() -> Self {
        Self::new()
    }
}

impl Dpt {
    pub fn new() -> Self {
        Dpt {
            table: AdaptiveHashTable::new(&DPT_HASH_CONFIG),
        }
    }

    /// Records `pgno` dirtied at `lsn` only if it isn't already tracked --
    /// the DPT holds the *earliest* record that could still need redoing.
    pub fn record_if_absent(&mut self, pgno: Pgno, lsn: Lsn) {
        if self.table.get(&pgno).is_none() {
            self.table.insert(pgno, lsn);
        }
    }

    pub fn get(&self, pgno: Pgno) -> Option<Lsn> {
        self.table.get(&pgno).copied()
    }

    pub fn set(&mut self, pgno: Pgno, lsn: Lsn) {
        self.table.insert(pgno, lsn);
    }

    pub fn remove(&mut self, pgno: Pgno) {
        self.table.remove(&pgno);
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pgno, Lsn)> + '_ {
        self.table.iter().map(|(&p, &l)| (p, l))
    }

    pub fn snapshot(&self) -> Vec<(Pgno, Lsn)> {
        self.iter().collect()
    }

    pub fn merge_snapshot(&mut self, snapshot: &[(Pgno, Lsn)]) {
        for &(pgno, lsn) in snapshot {
            self.record_if_absent(pgno, lsn);
        }
    }

    pub fn min_rec_lsn(&self) -> Option<Lsn> {
        self.iter().map(|(_, lsn)| lsn).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_lsn_wins() {
        let mut dpt = Dpt::new();
        dpt.record_if_absent(1, 10);
        dpt.record_if_absent(1, 3);
        assert_eq!(dpt.get(1), Some(10));
    }

    #[test]
    fn min_rec_lsn_across_pages() {
        let mut dpt = Dpt::new();
        dpt.record_if_absent(1, 10);
        dpt.record_if_absent(2, 4);
        assert_eq!(dpt.min_rec_lsn(), Some(4));
    }
}
