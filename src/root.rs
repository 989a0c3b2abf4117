//! One-time root installation shared by both tree variants.
//!
//! The root starts absent. The first inserter enters a short mutex section,
//! re-checks absence, and publishes its node. Once set, the root never
//! changes, so every later read is a plain atomic load.

#![allow(clippy::redundant_pub_crate)]

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr::{self as StdPtr, NonNull};
use std::sync::atomic::AtomicPtr;

use parking_lot::Mutex;

use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

/// Root slot of a tree: absent, then set exactly once.
pub(crate) struct RootCell<N> {
    /// Null until the first install; never reset afterwards.
    root: AtomicPtr<N>,

    /// Serializes the absent → present transition.
    init: Mutex<()>,

    /// The cell owns the root node (and through it, the tree).
    _marker: PhantomData<Box<N>>,
}

impl<N> RootCell<N> {
    pub(crate) const fn new() -> Self {
        Self {
            root: AtomicPtr::new(StdPtr::null_mut()),
            init: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// The root node, if one has been installed.
    #[inline(always)]
    pub(crate) fn load(&self) -> Option<&N> {
        let root: *mut N = self.root.load(READ_ORD);

        // SAFETY: a non-null root came from Box::into_raw in `install` and is
        // only freed through `take`, which needs &mut self.
        unsafe { root.as_ref() }
    }

    /// Install `node` as the root if there is none yet.
    ///
    /// Returns the node back when another thread installed a root first, so
    /// the caller can reuse the allocation for a regular insert.
    pub(crate) fn install(&self, node: Box<N>) -> Result<(), Box<N>> {
        let _init = self.init.lock();

        // Double-check under the lock.
        if !self.root.load(RELAXED).is_null() {
            return Err(node);
        }

        self.root.store(Box::into_raw(node), WRITE_ORD);
        Ok(())
    }

    /// Take ownership of the root for teardown.
    pub(crate) fn take(&mut self) -> Option<Box<N>> {
        let root: *mut N = std::mem::replace(self.root.get_mut(), StdPtr::null_mut());

        // SAFETY: &mut self excludes readers; root came from Box::into_raw.
        NonNull::new(root).map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<N> Drop for RootCell<N> {
    fn drop(&mut self) {
        // Trees tear down below the root themselves before this runs.
        drop(self.take());
    }
}

impl<N> StdFmt::Debug for RootCell<N> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("RootCell")
            .field("root", &self.root.load(RELAXED))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_starts_absent() {
        let cell: RootCell<u32> = RootCell::new();
        assert!(cell.load().is_none());
    }

    #[test]
    fn test_install_once() {
        let mut cell: RootCell<u32> = RootCell::new();

        assert!(cell.install(Box::new(1)).is_ok());
        let rejected = cell.install(Box::new(2)).unwrap_err();

        assert_eq!(*rejected, 2);
        assert_eq!(cell.load().copied(), Some(1));
        assert_eq!(cell.take().map(|b| *b), Some(1));
        assert!(cell.load().is_none());
    }

    #[test]
    fn test_concurrent_install_has_one_winner() {
        const THREADS: usize = 8;

        let cell: Arc<RootCell<usize>> = Arc::new(RootCell::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let cell = Arc::clone(&cell);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if cell.install(Box::new(t)).is_ok() {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert!(cell.load().is_some());
    }
}
