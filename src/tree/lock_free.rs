//! Lock-free binary search tree.
//!
//! Structural changes happen only through compare-and-swap on a node's child
//! slot, from null to a freshly allocated node. The root is the exception: it
//! is installed once under a short mutex (see `RootCell`), which is the only
//! blocking point of this variant.
//!
//! # Insert Protocol
//!
//! ```text
//! 1. current = root
//! 2. ord = compare(key, current.key)
//!    - Equal: swap current.value, done
//! 3. slot = current.left (Less) | current.right (Greater)
//! 4. child = slot.load(Acquire)
//!    - non-null: current = child, goto 2
//! 5. slot.CAS(null -> new, AcqRel)
//!    - success: done
//!    - failure: keep the node, back off, goto 2 with the same current
//! ```
//!
//! After a failed CAS the winner's node may hold our key, so the comparison
//! must run again from the current node. That re-check is what keeps keys
//! unique: only one thread can move a slot from null to non-null.
//!
//! # Lookup
//!
//! Lookups only load child slots and never block. Values are read through a
//! `seize` guard (see `ValueCell`).

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use seize::Collector;

use crate::key::{KeyComparator, Lexicographic};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD};
use crate::root::RootCell;
use crate::stats::{ContentionStats, Counters};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::value::ValueCell;

use super::traverse::{self, TraversableNode};
use super::{ByteValue, ConcurrentTree};

/// Consecutive CAS failures handled with `spin_loop` before yielding.
const SPIN_LIMIT: u32 = 6;

// ============================================================================
//  Node
// ============================================================================

struct Node<V> {
    key: Box<[u8]>,
    value: ValueCell<V>,
    left: AtomicPtr<Node<V>>,
    right: AtomicPtr<Node<V>>,
}

impl<V> Node<V> {
    fn boxed(key: &[u8], value: Arc<V>) -> Box<Self> {
        Box::new(Self {
            key: key.into(),
            value: ValueCell::new(value),
            left: AtomicPtr::new(StdPtr::null_mut()),
            right: AtomicPtr::new(StdPtr::null_mut()),
        })
    }

    /// Child slot to follow when the target key compares `ord` to this node.
    #[inline(always)]
    fn slot(&self, ord: Ordering) -> &AtomicPtr<Self> {
        debug_assert!(ord.is_ne());
        if ord.is_lt() { &self.left } else { &self.right }
    }

    #[inline(always)]
    fn child(&self, ord: Ordering) -> Option<&Self> {
        // SAFETY: non-null children were published by a successful CAS and
        // are only freed when the tree is dropped.
        unsafe { self.slot(ord).load(READ_ORD).as_ref() }
    }
}

impl<V> TraversableNode for Node<V> {
    type Value = V;

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &ValueCell<V> {
        &self.value
    }

    fn children(&self) -> (Option<&Self>, Option<&Self>) {
        (self.child(Ordering::Less), self.child(Ordering::Greater))
    }
}

/// Spin, then yield, as consecutive CAS failures pile up.
#[inline(always)]
fn backoff(failures: u32) {
    if failures <= SPIN_LIMIT {
        for _ in 0..(1u32 << failures) {
            std::hint::spin_loop();
        }
    } else {
        debug_log!(failures, "lock-free insert: CAS contention, yielding");
        std::thread::yield_now();
    }
}

// ============================================================================
//  LockFreeTree
// ============================================================================

/// Concurrent unbalanced BST with CAS-linked children.
///
/// # Example
///
/// ```rust
/// use bytetree::LockFreeTree;
///
/// let tree = LockFreeTree::new();
/// tree.put(b"apple", b"value3".to_vec());
/// tree.put(b"aaa", b"value1".to_vec());
///
/// assert_eq!(tree.get(b"apple").as_deref(), Some(&b"value3".to_vec()));
/// assert!(tree.get(b"missing").is_none());
/// ```
pub struct LockFreeTree<V = ByteValue, C = Lexicographic> {
    root: RootCell<Node<V>>,
    comparator: C,
    counters: Counters,

    /// Retires replaced values. Declared last so it drops after every node.
    collector: Collector,
}

impl<V> LockFreeTree<V, Lexicographic> {
    /// Create an empty tree ordered by [`Lexicographic`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Lexicographic)
    }
}

impl<V> Default for LockFreeTree<V, Lexicographic> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: KeyComparator> LockFreeTree<V, C> {
    /// Create an empty tree ordered by `comparator`.
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            root: RootCell::new(),
            comparator,
            counters: Counters::default(),
            collector: Collector::new(),
        }
    }

    /// The comparator ordering this tree.
    #[must_use]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Number of distinct keys.
    ///
    /// Exact once concurrent inserts have finished; a lower bound while they
    /// are still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no key has been inserted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.load().is_none()
    }

    /// Snapshot of this tree's contention counters.
    #[must_use]
    pub fn stats(&self) -> ContentionStats {
        self.counters.snapshot()
    }

    /// Height of the tree: nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        traverse::height(self.root.load())
    }

    /// Look up the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Arc<V>> {
        let mut current: &Node<V> = self.root.load()?;

        loop {
            match self.comparator.compare(key, &current.key) {
                Ordering::Equal => {
                    let guard = self.collector.enter();
                    return Some(current.value.load(&guard));
                }
                ord => current = current.child(ord)?,
            }
        }
    }

    /// All entries in ascending key order.
    ///
    /// Under concurrent inserts the snapshot holds at least every key whose
    /// `put` completed before this call started.
    #[must_use]
    pub fn entries(&self) -> Vec<(Box<[u8]>, Arc<V>)> {
        let guard = self.collector.enter();
        traverse::in_order(self.root.load(), &guard)
    }
}

impl<V: Send + Sync, C: KeyComparator> LockFreeTree<V, C> {
    /// Insert `key`, or replace its value if it is already present.
    pub fn put(&self, key: &[u8], value: V) {
        let value: Arc<V> = Arc::new(value);

        // Allocated at most once per call; reused across lost CAS races.
        let mut pending: Option<Box<Node<V>>> = None;

        let mut current: &Node<V> = loop {
            if let Some(root) = self.root.load() {
                break root;
            }

            let node = pending.take().unwrap_or_else(|| Node::boxed(key, Arc::clone(&value)));
            match self.root.install(node) {
                Ok(()) => {
                    debug_log!("lock-free tree: root installed");
                    self.counters.record_insert();
                    return;
                }
                Err(node) => {
                    self.counters.record_root_race();
                    pending = Some(node);
                }
            }
        };

        let mut failures: u32 = 0;

        loop {
            let ord: Ordering = self.comparator.compare(key, &current.key);

            if ord.is_eq() {
                trace_log!("lock-free tree: replacing value of existing key");
                let guard = self.collector.enter();
                current.value.replace(value, &guard);
                self.counters.record_update();
                return;
            }

            if let Some(next) = current.child(ord) {
                current = next;
                continue;
            }

            let node: *mut Node<V> = Box::into_raw(
                pending.take().unwrap_or_else(|| Node::boxed(key, Arc::clone(&value))),
            );

            match current
                .slot(ord)
                .compare_exchange(StdPtr::null_mut(), node, CAS_SUCCESS, CAS_FAILURE)
            {
                Ok(_) => {
                    self.counters.record_insert();
                    return;
                }
                Err(_winner) => {
                    // SAFETY: the CAS failed, so node was never published and
                    // we still own the allocation.
                    pending = Some(unsafe { Box::from_raw(node) });

                    self.counters.record_cas_failure();
                    failures += 1;
                    trace_log!(failures, "lock-free tree: lost child CAS, re-checking");
                    backoff(failures);
                }
            }
        }
    }
}

impl<V: Send + Sync, C: KeyComparator> ConcurrentTree<V> for LockFreeTree<V, C> {
    fn put(&self, key: &[u8], value: V) {
        Self::put(self, key, value);
    }

    fn get(&self, key: &[u8]) -> Option<Arc<V>> {
        Self::get(self, key)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn entries(&self) -> Vec<(Box<[u8]>, Arc<V>)> {
        Self::entries(self)
    }
}

impl<V, C> Drop for LockFreeTree<V, C> {
    fn drop(&mut self) {
        let mut stack: Vec<Box<Node<V>>> = self.root.take().into_iter().collect();

        while let Some(mut node) = stack.pop() {
            for slot in [&mut node.left, &mut node.right] {
                let child: *mut Node<V> = *slot.get_mut();
                if !child.is_null() {
                    // SAFETY: &mut self excludes readers; child came from
                    // Box::into_raw and is reachable only through this slot.
                    stack.push(unsafe { Box::from_raw(child) });
                }
            }
        }
    }
}

impl<V, C: StdFmt::Debug> StdFmt::Debug for LockFreeTree<V, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LockFreeTree")
            .field("len", &self.counters.len())
            .field("comparator", &self.comparator)
            .finish_non_exhaustive()
    }
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
    use crate::key::SignedLexicographic;
    use std::thread;

    fn _assert_send_sync()
    where
        LockFreeTree<u64>: Send + Sync,
    {
    }

    fn bytes(v: &[u8]) -> Vec<u8> {
        v.to_vec()
    }

    #[test]
    fn test_empty_tree() {
        let tree: LockFreeTree = LockFreeTree::new();

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.depth(), 0);
        assert!(tree.get(b"anything").is_none());
        assert!(tree.entries().is_empty());
    }

    #[test]
    fn test_put_get_scenario() {
        let tree = LockFreeTree::new();
        tree.put(b"aaa", bytes(b"value1"));
        tree.put(b"apple", bytes(b"value3"));
        tree.put(b"banana", bytes(b"value2"));
        tree.put(b"cat", bytes(b"value14"));
        tree.put(b"126755", bytes(b"value5"));

        assert_eq!(tree.get(b"apple").unwrap().as_slice(), b"value3");
        assert_eq!(tree.get(b"126755").unwrap().as_slice(), b"value5");
        assert!(tree.get(b"missing").is_none());
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_update_in_place() {
        let tree = LockFreeTree::new();
        tree.put(b"key", 1u64);
        tree.put(b"key", 2u64);

        assert_eq!(*tree.get(b"key").unwrap(), 2);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.stats().updates, 1);
    }

    #[test]
    fn test_old_value_outlives_update() {
        let tree = LockFreeTree::new();
        tree.put(b"k", String::from("first"));

        let first = tree.get(b"k").unwrap();
        tree.put(b"k", String::from("second"));

        assert_eq!(first.as_str(), "first");
        assert_eq!(tree.get(b"k").unwrap().as_str(), "second");
    }

    #[test]
    fn test_sorted_inserts_form_a_chain() {
        let tree = LockFreeTree::new();
        for i in 0..1_000u32 {
            tree.put(&i.to_be_bytes(), i);
        }

        assert_eq!(tree.depth(), 1_000);
        for i in 0..1_000u32 {
            assert_eq!(*tree.get(&i.to_be_bytes()).unwrap(), i);
        }
    }

    #[test]
    fn test_deep_chain_drops() {
        let tree = LockFreeTree::new();
        for i in 0..20_000u32 {
            tree.put(&i.to_be_bytes(), ());
        }
        drop(tree);
    }

    #[test]
    fn test_entries_are_sorted() {
        let inserted: [&[u8]; 6] = [b"m", b"c", b"x", b"a", b"", b"mm"];
        let expected: [&[u8]; 6] = [b"", b"a", b"c", b"m", b"mm", b"x"];

        let tree = LockFreeTree::new();
        for key in inserted {
            tree.put(key, key.len());
        }

        let entries = tree.entries();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| &**k).collect();
        assert_eq!(keys, expected);
        assert_eq!(*entries[4].1, 2);
    }

    #[test]
    fn test_custom_comparator_changes_layout() {
        let tree = LockFreeTree::with_comparator(SignedLexicographic);
        tree.put(&[0x02], 'a');
        tree.put(&[0xFE], 'b');

        // 0xFE is -2 under the signed order.
        let keys: Vec<Box<[u8]>> = tree.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(&*keys[0], &[0xFE]);
        assert_eq!(*tree.get(&[0xFE]).unwrap(), 'b');
    }

    #[test]
    fn test_concurrent_same_slot_race() {
        const THREADS: usize = 8;

        let tree: Arc<LockFreeTree<usize>> = Arc::new(LockFreeTree::new());
        tree.put(b"m", usize::MAX);

        // Every thread targets the empty left slot of the root.
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || tree.put(&[b'a', u8::try_from(t).unwrap()], t))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tree.len(), THREADS + 1);
        for t in 0..THREADS {
            assert_eq!(*tree.get(&[b'a', u8::try_from(t).unwrap()]).unwrap(), t);
        }
    }

    #[test]
    fn test_concurrent_same_key_leaves_one_node() {
        const THREADS: usize = 8;

        let tree: Arc<LockFreeTree<usize>> = Arc::new(LockFreeTree::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || {
                    for _ in 0..100 {
                        tree.put(b"shared", t);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.entries().len(), 1);
        assert!(*tree.get(b"shared").unwrap() < THREADS);
        assert_eq!(tree.stats().updates + tree.stats().inserts, THREADS * 100);
    }
}
