//! Atomic value handoff for tree nodes.
//!
//! Every node keeps its value in a [`ValueCell<V>`]: an atomic pointer to an
//! `Arc<V>` allocation. Overwriting a key swaps the pointer; the previous
//! allocation is retired through `seize` and dropped only once no reader that
//! might have loaded it is still inside a guard.
//!
//! # Protocol
//!
//! ```text
//! read:    guard = collector.enter()
//!          ptr   = guard.protect(cell)         // Acquire
//!          Arc::increment_strong_count(ptr)    // caller owns a clone
//!
//! replace: old = cell.swap(new, AcqRel)
//!          guard.defer_retire(old)             // freed after readers leave
//! ```
//!
//! A reader racing with an overwrite sees the old value or the new value,
//! never a mixture. Concurrent overwriters are not ordered against each other.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use seize::{Collector, Guard, LocalGuard};

use crate::ordering::{CAS_SUCCESS, READ_ORD};

/// Reclaim an `Arc<V>` allocation (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Arc::into_raw` and own one strong count.
/// - Must only be called after seize determines no reader can observe it.
unsafe fn reclaim_arc<V>(ptr: *mut V, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr came from Arc::into_raw.
    unsafe { drop(Arc::from_raw(ptr.cast_const())) };
}

/// Atomically replaceable `Arc<V>` slot.
pub struct ValueCell<V> {
    /// Always non-null: points at the payload of a live `Arc<V>`.
    ptr: AtomicPtr<V>,

    /// The cell owns one strong count of an `Arc<V>`.
    _marker: PhantomData<Arc<V>>,
}

impl<V> ValueCell<V> {
    /// Create a cell holding `value`.
    #[must_use]
    pub fn new(value: Arc<V>) -> Self {
        Self {
            ptr: AtomicPtr::new(Arc::into_raw(value).cast_mut()),
            _marker: PhantomData,
        }
    }

    /// Load the current value.
    ///
    /// `guard` must come from the collector that [`ValueCell::replace`] retires
    /// into for this cell.
    #[must_use]
    pub fn load(&self, guard: &LocalGuard<'_>) -> Arc<V> {
        let ptr: *mut V = guard.protect(&self.ptr, READ_ORD);

        // SAFETY: ptr came from Arc::into_raw. The guard keeps a replaced
        // allocation alive until we have taken our own strong count.
        unsafe {
            Arc::increment_strong_count(ptr.cast_const());
            Arc::from_raw(ptr.cast_const())
        }
    }

    /// Replace the current value, retiring the previous one.
    pub fn replace(&self, value: Arc<V>, guard: &LocalGuard<'_>)
    where
        V: Send + Sync,
    {
        let new_ptr: *mut V = Arc::into_raw(value).cast_mut();
        let old_ptr: *mut V = self.ptr.swap(new_ptr, CAS_SUCCESS);

        // SAFETY: old_ptr came from Arc::into_raw and the swap removed it from
        // the cell, so this is the only retirement of that strong count.
        unsafe { guard.defer_retire(old_ptr, reclaim_arc::<V>) };
    }
}

impl<V> Drop for ValueCell<V> {
    fn drop(&mut self) {
        let ptr: *mut V = *self.ptr.get_mut();

        // SAFETY: &mut self means no reader holds this cell; the pointer owns
        // one strong count.
        unsafe { drop(Arc::from_raw(ptr.cast_const())) };
    }
}

impl<V: StdFmt::Debug> StdFmt::Debug for ValueCell<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("ValueCell")
            .field("ptr", &self.ptr.load(READ_ORD))
            .finish_non_exhaustive()
    }
}
