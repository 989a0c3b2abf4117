//! Lock-coupling binary search tree.
//!
//! Every node owns a `parking_lot::RwLock` guarding its child links.
//! Traversal is hand-over-hand: the next node's read lock is taken before the
//! current node's read lock is released, so a traverser always holds exactly
//! one read lock while it inspects a node.
//!
//! # Insert Protocol
//!
//! ```text
//! 1. read-lock root
//! 2. ord = compare(key, current.key)
//!    - Equal: unlock, swap current.value, done
//! 3. child = links.left (Less) | links.right (Greater)
//!    - present: read-lock child, unlock current, current = child, goto 2
//! 4. upgrade: unlock read, lock write               // NOT atomic
//! 5. re-run compare, re-check the child under the write lock
//!    - still absent: attach new node, unlock, done
//!    - filled in the gap: unlock write, read-lock current, goto 2
//! ```
//!
//! Step 5 is mandatory: between releasing the read lock and acquiring the
//! write lock another inserter may have attached a node to the same slot.
//!
//! Releases use `unlock_fair`, handing the lock to the longest waiter instead
//! of letting the releasing thread barge back in.

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use seize::Collector;

use crate::key::{KeyComparator, Lexicographic};
use crate::root::RootCell;
use crate::stats::{ContentionStats, Counters};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::value::ValueCell;

use super::traverse::{self, TraversableNode};
use super::{ByteValue, ConcurrentTree};

// ============================================================================
//  Node
// ============================================================================

/// Child links of a node. Only read or written under the node's lock.
struct Links<V> {
    left: Option<NonNull<Node<V>>>,
    right: Option<NonNull<Node<V>>>,
}

// SAFETY: the pointers refer to nodes owned by the tree. They are only
// dereferenced as shared references, and `Node<V>` is Send + Sync whenever
// V is.
unsafe impl<V: Send + Sync> Send for Links<V> {}
unsafe impl<V: Send + Sync> Sync for Links<V> {}

impl<V> Links<V> {
    const fn empty() -> Self {
        Self {
            left: None,
            right: None,
        }
    }

    #[inline(always)]
    fn slot(&self, ord: Ordering) -> Option<NonNull<Node<V>>> {
        debug_assert!(ord.is_ne());
        if ord.is_lt() { self.left } else { self.right }
    }

    #[inline(always)]
    fn slot_mut(&mut self, ord: Ordering) -> &mut Option<NonNull<Node<V>>> {
        debug_assert!(ord.is_ne());
        if ord.is_lt() { &mut self.left } else { &mut self.right }
    }
}

struct Node<V> {
    key: Box<[u8]>,
    value: ValueCell<V>,
    links: RwLock<Links<V>>,
}

impl<V> Node<V> {
    fn boxed(key: &[u8], value: Arc<V>) -> Box<Self> {
        Box::new(Self {
            key: key.into(),
            value: ValueCell::new(value),
            links: RwLock::new(Links::empty()),
        })
    }
}

/// Borrow a linked node for as long as the tree is borrowed.
///
/// # Safety
///
/// `ptr` must have been read from a `Links` of a live tree. Linked nodes are
/// only freed by the tree's `Drop`.
#[inline(always)]
unsafe fn deref_node<'t, V>(ptr: NonNull<Node<V>>) -> &'t Node<V> {
    // SAFETY: guaranteed by the caller.
    unsafe { ptr.as_ref() }
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
        let links = self.links.read();

        // SAFETY: read from this tree's links under the read lock.
        unsafe {
            (
                links.left.map(|ptr| deref_node(ptr)),
                links.right.map(|ptr| deref_node(ptr)),
            )
        }
    }
}

// ============================================================================
//  LockCouplingTree
// ============================================================================

/// Concurrent unbalanced BST with per-node reader/writer locks.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use bytetree::LockCouplingTree;
///
/// let tree: Arc<LockCouplingTree> = Arc::new(LockCouplingTree::new());
///
/// let handles: Vec<_> = (0u8..4)
///     .map(|t| {
///         let tree = Arc::clone(&tree);
///         thread::spawn(move || tree.put(&[t], vec![t; 3]))
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(tree.len(), 4);
/// assert_eq!(tree.get(&[2]).as_deref(), Some(&vec![2, 2, 2]));
/// ```
pub struct LockCouplingTree<V = ByteValue, C = Lexicographic> {
    root: RootCell<Node<V>>,
    comparator: C,
    counters: Counters,

    /// Retires replaced values. Declared last so it drops after every node.
    collector: Collector,
}

impl<V> LockCouplingTree<V, Lexicographic> {
    /// Create an empty tree ordered by [`Lexicographic`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Lexicographic)
    }
}

impl<V> Default for LockCouplingTree<V, Lexicographic> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: KeyComparator> LockCouplingTree<V, C> {
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
    ///
    /// Descends with read locks only. No lock is held once this returns.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Arc<V>> {
        let mut current: &Node<V> = self.root.load()?;
        let mut links: RwLockReadGuard<'_, Links<V>> = current.links.read();

        loop {
            let ord: Ordering = self.comparator.compare(key, &current.key);

            if ord.is_eq() {
                let guard = self.collector.enter();
                let value: Arc<V> = current.value.load(&guard);
                RwLockReadGuard::unlock_fair(links);
                return Some(value);
            }

            // Absent child: the early return drops (unlocks) `links`.
            // SAFETY: read from this tree's links under the read lock.
            let next: &Node<V> = unsafe { deref_node(links.slot(ord)?) };
            let next_links = next.links.read();
            RwLockReadGuard::unlock_fair(links);

            current = next;
            links = next_links;
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

impl<V: Send + Sync, C: KeyComparator> LockCouplingTree<V, C> {
    /// Insert `key`, or replace its value if it is already present.
    pub fn put(&self, key: &[u8], value: V) {
        let value: Arc<V> = Arc::new(value);

        // Allocated at most once per call; kept across upgrade races.
        let mut pending: Option<Box<Node<V>>> = None;

        let mut current: &Node<V> = loop {
            if let Some(root) = self.root.load() {
                break root;
            }

            let node = pending.take().unwrap_or_else(|| Node::boxed(key, Arc::clone(&value)));
            match self.root.install(node) {
                Ok(()) => {
                    debug_log!("lock-coupling tree: root installed");
                    self.counters.record_insert();
                    return;
                }
                Err(node) => {
                    self.counters.record_root_race();
                    pending = Some(node);
                }
            }
        };

        let mut links: RwLockReadGuard<'_, Links<V>> = current.links.read();

        loop {
            let ord: Ordering = self.comparator.compare(key, &current.key);

            if ord.is_eq() {
                RwLockReadGuard::unlock_fair(links);

                trace_log!("lock-coupling tree: replacing value of existing key");
                let guard = self.collector.enter();
                current.value.replace(value, &guard);
                self.counters.record_update();
                return;
            }

            if let Some(next) = links.slot(ord) {
                // SAFETY: read from this tree's links under the read lock.
                let next: &Node<V> = unsafe { deref_node(next) };
                let next_links = next.links.read();
                RwLockReadGuard::unlock_fair(links);

                current = next;
                links = next_links;
                continue;
            }

            // Upgrade by release-then-acquire. Anything may happen in between.
            RwLockReadGuard::unlock_fair(links);
            let mut write: RwLockWriteGuard<'_, Links<V>> = current.links.write();

            let ord: Ordering = self.comparator.compare(key, &current.key);
            let slot: &mut Option<NonNull<Node<V>>> = write.slot_mut(ord);

            if slot.is_none() {
                let node = pending.take().unwrap_or_else(|| Node::boxed(key, Arc::clone(&value)));
                *slot = Some(NonNull::from(Box::leak(node)));
                RwLockWriteGuard::unlock_fair(write);

                self.counters.record_insert();
                return;
            }

            trace_log!("lock-coupling tree: slot filled during upgrade, resuming");
            self.counters.record_upgrade_race();
            RwLockWriteGuard::unlock_fair(write);
            links = current.links.read();
        }
    }
}

impl<V: Send + Sync, C: KeyComparator> ConcurrentTree<V> for LockCouplingTree<V, C> {
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

impl<V, C> Drop for LockCouplingTree<V, C> {
    fn drop(&mut self) {
        let mut stack: Vec<Box<Node<V>>> = self.root.take().into_iter().collect();

        while let Some(mut node) = stack.pop() {
            let links: &mut Links<V> = node.links.get_mut();
            for child in [links.left.take(), links.right.take()].into_iter().flatten() {
                // SAFETY: &mut self excludes readers; child came from
                // Box::leak and is reachable only through this link.
                stack.push(unsafe { Box::from_raw(child.as_ptr()) });
            }
        }
    }
}

impl<V, C: StdFmt::Debug> StdFmt::Debug for LockCouplingTree<V, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LockCouplingTree")
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
    use std::sync::Barrier;
    use std::thread;

    fn _assert_send_sync()
    where
        LockCouplingTree<u64>: Send + Sync,
    {
    }

    /// True when nobody holds any lock in the tree.
    fn all_unlocked<V, C>(tree: &LockCouplingTree<V, C>) -> bool {
        let mut stack: Vec<&Node<V>> = tree.root.load().into_iter().collect();
        while let Some(node) = stack.pop() {
            if node.links.is_locked() {
                return false;
            }
            let (left, right) = node.children();
            stack.extend(left);
            stack.extend(right);
        }
        true
    }

    #[test]
    fn test_empty_tree() {
        let tree: LockCouplingTree = LockCouplingTree::new();

        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.get(b"anything").is_none());
    }

    #[test]
    fn test_put_get_scenario() {
        let tree = LockCouplingTree::new();
        tree.put(b"aaa", b"value1".to_vec());
        tree.put(b"apple", b"value3".to_vec());
        tree.put(b"banana", b"value2".to_vec());
        tree.put(b"cat", b"value14".to_vec());
        tree.put(b"126755", b"value5".to_vec());

        assert_eq!(tree.get(b"apple").unwrap().as_slice(), b"value3");
        assert_eq!(tree.get(b"126755").unwrap().as_slice(), b"value5");
        assert!(tree.get(b"missing").is_none());
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_update_in_place() {
        let tree = LockCouplingTree::new();
        tree.put(b"key", 1u64);
        tree.put(b"key", 2u64);

        assert_eq!(*tree.get(b"key").unwrap(), 2);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.stats().updates, 1);
    }

    #[test]
    fn test_no_lock_held_after_operations() {
        let tree = LockCouplingTree::new();
        let keys: [&[u8]; 4] = [b"d", b"b", b"f", b"a"];
        for key in keys {
            tree.put(key, ());
        }
        tree.put(b"b", ());

        assert!(tree.get(b"a").is_some());
        // Miss at an absent left child and an absent right child.
        assert!(tree.get(b"0").is_none());
        assert!(tree.get(b"z").is_none());

        assert!(all_unlocked(&tree));
    }

    #[test]
    fn test_sorted_inserts_form_a_chain() {
        let tree = LockCouplingTree::new();
        for i in (0..500u32).rev() {
            tree.put(&i.to_be_bytes(), i);
        }

        assert_eq!(tree.depth(), 500);
        let entries = tree.entries();
        assert_eq!(entries.len(), 500);
        assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_upgrade_race_keeps_both_inserts() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 50;

        for round in 0..ROUNDS {
            let tree: Arc<LockCouplingTree<usize>> = Arc::new(LockCouplingTree::new());
            tree.put(b"m", usize::MAX);
            let barrier = Arc::new(Barrier::new(THREADS));

            // All threads race for the root's empty right slot.
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let tree = Arc::clone(&tree);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        tree.put(&[b'x', u8::try_from(t).unwrap()], t);
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(tree.len(), THREADS + 1, "round {round}");
            for t in 0..THREADS {
                assert_eq!(*tree.get(&[b'x', u8::try_from(t).unwrap()]).unwrap(), t);
            }
            assert!(all_unlocked(&tree));
        }
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        const WRITERS: usize = 4;
        const READERS: usize = 4;
        const KEYS: u32 = 500;

        let tree: Arc<LockCouplingTree<u32>> = Arc::new(LockCouplingTree::new());

        let mut handles = Vec::new();
        for w in 0..WRITERS {
            let tree = Arc::clone(&tree);
            handles.push(thread::spawn(move || {
                for i in 0..KEYS {
                    let key = (i * 7919 % KEYS).to_be_bytes();
                    if usize::try_from(i).unwrap() % WRITERS == w {
                        tree.put(&key, i);
                    }
                }
            }));
        }
        for _ in 0..READERS {
            let tree = Arc::clone(&tree);
            handles.push(thread::spawn(move || {
                for i in 0..KEYS {
                    // Either not yet inserted or carrying its final value.
                    if let Some(v) = tree.get(&(i * 7919 % KEYS).to_be_bytes()) {
                        assert_eq!(*v, i);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tree.len(), usize::try_from(KEYS).unwrap());
        assert!(all_unlocked(&tree));
    }
}
