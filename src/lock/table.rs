//! Hierarchical multi-granularity lock table.
//!
//! Acquiring a lock on a child type first climbs the hierarchy acquiring
//! intention locks on every ancestor (`LockType::parent`/`LockMode::parent_mode`).
//! Each resource node (`GrLock`) tracks its current holders; a request that
//! conflicts with an existing holder blocks on a shared condvar until the
//! conflicting lock is released.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

use crate::lock::types::{LockMode, LockType};

pub type Tid = u64;

#[derive(Default)]
struct GrLock {
    holders: Vec<(Tid, LockMode)>,
}

impl GrLock {
    fn compatible_with(&self, tid: Tid, mode: LockMode) -> bool {
        self.holders
            .iter()
            .all(|&(holder, held)| holder == tid || mode.compatible(held))
    }

    fn grant(&mut self, tid: Tid, mode: LockMode) {
        if let Some(slot) = self.holders.iter_mut().find(|(t, _)| *t == tid) {
            if mode.subsumes(slot.1) {
                slot.1 = mode;
            }
        } else {
            self.holders.push((tid, mode));
        }
    }

    fn already_holds(&self, tid: Tid, mode: LockMode) -> bool {
        self.holders
            .iter()
            .any(|&(t, held)| t == tid && held.subsumes(mode))
    }
}

struct Inner {
    nodes: HashMap<(LockType, u64), GrLock>,
}

pub struct LockTable {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        LockTable {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Acquires `(ty, data, mode)` for `tid`, climbing the hierarchy first.
    /// Blocks until compatible. Returns the full chain of `(ty, data, mode)`
    /// pairs newly or redundantly requested, for the caller to remember and
    /// release later.
    pub fn acquire(&self, tid: Tid, ty: LockType, data: u64, mode: LockMode) -> Vec<(LockType, u64, LockMode)> {
        let mut chain = Vec::new();
        if let Some(parent) = ty.parent() {
            chain.extend(self.acquire(tid, parent, 0, mode.parent_mode()));
        }
        self.acquire_one(tid, ty, data, mode);
        chain.push((ty, data, mode));
        chain
    }

    fn acquire_one(&self, tid: Tid, ty: LockType, data: u64, mode: LockMode) {
        let key = (ty, data);
        let mut guard = self.inner.lock();
        loop {
            if let Some(node) = guard.nodes.get(&key) {
                if node.already_holds(tid, mode) {
                    return;
                }
                if node.compatible_with(tid, mode) {
                    guard.nodes.get_mut(&key).unwrap().grant(tid, mode);
                    return;
                }
            } else {
                let mut node = GrLock::default();
                node.grant(tid, mode);
                guard.nodes.insert(key, node);
                return;
            }
            self.cv.wait(&mut guard);
        }
    }

    /// Releases every lock in `held`, all-or-nothing, as done at
    /// commit/abort. Destroys nodes left with no holders.
    pub fn release_all(&self, tid: Tid, held: &[(LockType, u64, LockMode)]) {
        let mut guard = self.inner.lock();
        for &(ty, data, _) in held {
            let key = (ty, data);
            if let Some(node) = guard.nodes.get_mut(&key) {
                node.holders.retain(|(t, _)| *t != tid);
                if node.holders.is_empty() {
                    guard.nodes.remove(&key);
                }
            }
        }
        drop(guard);
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_are_compatible() {
        let table = LockTable::new();
        let h1 = table.acquire(1, LockType::Root, 0, LockMode::S);
        let h2 = table.acquire(2, LockType::Root, 0, LockMode::S);
        assert!(!h1.is_empty());
        assert!(!h2.is_empty());
        table.release_all(1, &h1);
        table.release_all(2, &h2);
    }

    #[test]
    fn exclusive_blocks_until_released() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let table = Arc::new(LockTable::new());
        let h1 = table.acquire(1, LockType::Root, 0, LockMode::X);

        let table2 = table.clone();
        let handle = thread::spawn(move || {
            table2.acquire(2, LockType::Root, 0, LockMode::X)
        });

        thread::sleep(Duration::from_millis(50));
        table.release_all(1, &h1);
        let h2 = handle.join().unwrap();
        assert!(!h2.is_empty());
        table.release_all(2, &h2);
    }

    #[test]
    fn acquiring_a_child_locks_the_parent_too() {
        let table = LockTable::new();
        let held = table.acquire(1, LockType::Fstmbst, 0, LockMode::X);
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].0, LockType::Root);
        assert_eq!(held[1].0, LockType::Fstmbst);
        table.release_all(1, &held);
    }
}
