//! Filepath: src/tree.rs
//!
//! The two tree variants and the contract they share.
//!
//! - [`LockFreeTree`]: CAS on per-node child slots, lock-free traversal.
//! - [`LockCouplingTree`]: per-node reader/writer locks, hand-over-hand
//!   traversal, read → write upgrade at the insertion point.
//!
//! Both implement [`ConcurrentTree`], so callers and tests can treat them
//! interchangeably (including as `dyn ConcurrentTree<V>`).

use std::sync::Arc;

mod lock_coupling;
mod lock_free;
mod traverse;



pub use lock_coupling::LockCouplingTree;
pub use lock_free::LockFreeTree;

/// Value type of the byte-sequence key-value contract.
pub type ByteValue = Vec<u8>;

// ============================================================================
//  ConcurrentTree
// ============================================================================

/// Operations every tree variant supports, callable from any number of
/// threads through `&self`.
///
/// # Example
///
/// ```rust
/// use bytetree::{ConcurrentTree, LockCouplingTree, LockFreeTree};
///
/// let trees: Vec<Box<dyn ConcurrentTree<Vec<u8>>>> = vec![
///     Box::new(LockFreeTree::<Vec<u8>>::new()),
///     Box::new(LockCouplingTree::<Vec<u8>>::new()),
/// ];
///
/// for tree in &trees {
///     tree.put(b"cat", b"value14".to_vec());
///     assert_eq!(tree.get(b"cat").as_deref(), Some(&b"value14".to_vec()));
///     assert!(tree.get(b"dog").is_none());
/// }
/// ```
pub trait ConcurrentTree<V>: Send + Sync {
    /// Insert `key`, or replace its value if an equal key is present.
    fn put(&self, key: &[u8], value: V);

    /// The value currently stored for `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Arc<V>>;

    /// Number of distinct keys.
    fn len(&self) -> usize;

    /// Whether the tree holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in ascending key order.
    fn entries(&self) -> Vec<(Box<[u8]>, Arc<V>)>;
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    reason = "Fail fast in tests"
)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn variants() -> Vec<(&'static str, Box<dyn ConcurrentTree<u64>>)> {
        let lock_free: Box<dyn ConcurrentTree<u64>> = Box::new(LockFreeTree::<u64>::new());
        let lock_coupling: Box<dyn ConcurrentTree<u64>> =
            Box::new(LockCouplingTree::<u64>::new());

        vec![("lock_free", lock_free), ("lock_coupling", lock_coupling)]
    }

    #[test]
    fn test_contract_matches_btreemap() {
        for (name, tree) in variants() {
            let mut oracle: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

            for i in 0..2_000u64 {
                // Scrambled keys of varying length, with repeats.
                let k = i.wrapping_mul(0x9e37_79b9_7f4a_7c15) % 700;
                let key: Vec<u8> = k.to_le_bytes()[..usize::try_from(k % 4 + 1).unwrap()].to_vec();
                tree.put(&key, i);
                oracle.insert(key, i);
            }

            assert_eq!(tree.len(), oracle.len(), "{name}");
            for (key, value) in &oracle {
                assert_eq!(*tree.get(key).unwrap(), *value, "{name}");
            }

            let entries = tree.entries();
            let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| &**k).collect();
            let expected: Vec<&[u8]> = oracle.keys().map(Vec::as_slice).collect();
            assert_eq!(keys, expected, "{name}");
        }
    }

    #[test]
    fn test_absent_after_unrelated_inserts() {
        for (name, tree) in variants() {
            assert!(tree.is_empty(), "{name}");
            let present: [&[u8]; 3] = [b"b", b"d", b"f"];
            let absent: [&[u8]; 6] = [b"", b"a", b"c", b"e", b"g", b"bb"];

            for key in present {
                tree.put(key, 0);
            }
            for missing in absent {
                assert!(tree.get(missing).is_none(), "{name}: {missing:?}");
            }
            assert!(!tree.is_empty(), "{name}");
        }
    }
}
