//! Per-tree contention counters.
//!
//! Counters are relaxed atomics bumped on the insert paths. They never
//! influence tree behavior; they exist so tests and benchmarks can see how
//! often the retry paths actually ran.

use std::sync::atomic::AtomicUsize;

use crate::ordering::RELAXED;

/// Snapshot of a tree's contention counters.
///
/// Values are read individually with relaxed loads, so a snapshot taken while
/// other threads are inserting is not a consistent cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContentionStats {
    /// Nodes attached to the tree (root included). Equals the number of keys.
    pub inserts: usize,

    /// Equal-key puts that replaced a value in place.
    pub updates: usize,

    /// Child-slot CAS attempts lost to another inserter (lock-free tree).
    pub cas_failures: usize,

    /// Write-lock re-validations that found the slot already filled
    /// (lock-coupling tree).
    pub upgrade_races: usize,

    /// Root installations lost to another thread.
    pub root_races: usize,
}

/// Live counters owned by a tree.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    inserts: AtomicUsize,
    updates: AtomicUsize,
    cas_failures: AtomicUsize,
    upgrade_races: AtomicUsize,
    root_races: AtomicUsize,
}

impl Counters {
    #[inline(always)]
    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, RELAXED);
    }

    #[inline(always)]
    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, RELAXED);
    }

    #[inline(always)]
    pub(crate) fn record_cas_failure(&self) {
        self.cas_failures.fetch_add(1, RELAXED);
    }

    #[inline(always)]
    pub(crate) fn record_upgrade_race(&self) {
        self.upgrade_races.fetch_add(1, RELAXED);
    }

    #[inline(always)]
    pub(crate) fn record_root_race(&self) {
        self.root_races.fetch_add(1, RELAXED);
    }

    /// Number of nodes attached so far.
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.inserts.load(RELAXED)
    }

    pub(crate) fn snapshot(&self) -> ContentionStats {
        ContentionStats {
            inserts: self.inserts.load(RELAXED),
            updates: self.updates.load(RELAXED),
            cas_failures: self.cas_failures.load(RELAXED),
            upgrade_races: self.upgrade_races.load(RELAXED),
            root_races: self.root_races.load(RELAXED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let counters = Counters::default();
        counters.record_insert();
        counters.record_insert();
        counters.record_update();
        counters.record_cas_failure();
        counters.record_upgrade_race();
        counters.record_root_race();

        assert_eq!(
            counters.snapshot(),
            ContentionStats {
                inserts: 2,
                updates: 1,
                cas_failures: 1,
                upgrade_races: 1,
                root_races: 1,
            }
        );
        assert_eq!(counters.len(), 2);
    }
}
