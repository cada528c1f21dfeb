//! Adaptive hash table with incremental rehashing.
//!
//! Backs the active transaction table, the dirty page table, and the lock
//! table's node index. Holds two generations of entries -- `current` and
//! `prev` -- plus a cursor over the keys still owed a migration. Each
//! mutating operation moves at most `rehashing_work` entries from `prev`
//! into `current`, so no single call pays for a full-table rehash.

use std::collections::HashMap;
use std::hash::Hash;

use crate::config::HashTableConfig;

pub struct AdaptiveHashTable<K, V> {
    current: HashMap<K, V>,
    prev: HashMap<K, V>,
    migrate_keys: Vec<K>,
    migrate_pos: usize,
    capacity: usize,
    min_size: usize,
    max_size: usize,
    min_load_factor: usize,
    max_load_factor: usize,
    rehashing_work: usize,
}

impl<K: Hash + Eq + Clone, V> AdaptiveHashTable<K, V> {
    pub fn new(cfg: &HashTableConfig) -> Self {
        AdaptiveHashTable {
            current: HashMap::with_capacity(cfg.min_size),
            prev: HashMap::new(),
            migrate_keys: Vec::new(),
            migrate_pos: 0,
            capacity: cfg.min_size,
            min_size: cfg.min_size,
            max_size: cfg.max_size,
            min_load_factor: cfg.min_load_factor,
            max_load_factor: cfg.max_load_factor,
            rehashing_work: cfg.rehashing_work,
        }
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.prev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.current.get(key).or_else(|| self.prev.get(key))
    }

    /// Mutable lookup. Does not migrate the entry out of `prev` -- callers
    /// needing migration to make progress should go through `insert`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if self.current.contains_key(key) {
            self.current.get_mut(key)
        } else {
            self.prev.get_mut(key)
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.current.contains_key(key) || self.prev.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.migrate_step();
        let displaced = self.prev.remove(&key);
        let previous = self.current.insert(key, value).or(displaced);
        self.maybe_start_rehash();
        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.migrate_step();
        let from_current = self.current.remove(key);
        if from_current.is_some() {
            return from_current;
        }
        self.prev.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.current.iter().chain(self.prev.iter())
    }

    /// Moves up to `rehashing_work` entries from `prev` into `current`.
    fn migrate_step(&mut self) {
        if self.migrate_keys.is_empty() {
            return;
        }
        let mut moved = 0;
        while moved < self.rehashing_work && self.migrate_pos < self.migrate_keys.len() {
            let key = self.migrate_keys[self.migrate_pos].clone();
            self.migrate_pos += 1;
            if let Some(value) = self.prev.remove(&key) {
                self.current.entry(key).or_insert(value);
            }
            moved += 1;
        }
        if self.migrate_pos >= self.migrate_keys.len() {
            self.migrate_keys.clear();
            self.migrate_pos = 0;
            self.prev.clear();
            self.prev.shrink_to_fit();
        }
    }

    /// Starts a new rehash epoch once the table has grown past its load
    /// factor, promoting `current` into `prev` and doubling capacity
    /// (clamped to `max_size`). A no-op while a rehash is already underway
    /// or the table is already at `max_size`.
    fn maybe_start_rehash(&mut self) {
        if !self.migrate_keys.is_empty() {
            return;
        }
        if self.capacity >= self.max_size {
            return;
        }
        if self.current.len() < self.capacity * self.max_load_factor {
            return;
        }
        let new_capacity = (self.capacity * 2).clamp(self.min_size, self.max_size);
        let old_current = std::mem::replace(&mut self.current, HashMap::with_capacity(new_capacity));
        self.migrate_keys = old_current.keys().cloned().collect();
        self.migrate_pos = 0;
        self.prev = old_current;
        self.capacity = new_capacity;
        let _ = self.min_load_factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DPT_HASH_CONFIG;

    #[test]
    fn insert_get_remove() {
        let mut t: AdaptiveHashTable<u64, &str> = AdaptiveHashTable::new(&DPT_HASH_CONFIG);
        t.insert(1, "one");
        t.insert(2, "two");
        assert_eq!(t.get(&1), Some(&"one"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.remove(&1), Some("one"));
        assert_eq!(t.get(&1), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn survives_growth_past_load_factor() {
        let mut t: AdaptiveHashTable<u64, u64> = AdaptiveHashTable::new(&DPT_HASH_CONFIG);
        for i in 0..500u64 {
            t.insert(i, i * 10);
        }
        assert_eq!(t.len(), 500);
        for i in 0..500u64 {
            assert_eq!(t.get(&i), Some(&(i * 10)));
        }
    }

    #[test]
    fn iter_sees_both_generations_mid_rehash() {
        let mut t: AdaptiveHashTable<u64, u64> = AdaptiveHashTable::new(&DPT_HASH_CONFIG);
        for i in 0..200u64 {
            t.insert(i, i);
        }
        let seen: std::collections::HashSet<u64> = t.iter().map(|(k, _)| *k).collect();
        assert_eq!(seen.len(), 200);
    }
}
