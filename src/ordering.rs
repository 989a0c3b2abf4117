//! Standard memory orderings for concurrent node access.
//!
//! These constants keep ordering usage consistent across both tree variants
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for loading a child slot, the root, or a value pointer.
/// Pairs with the publishing CAS / store.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing the root under the root mutex.
/// Pairs with reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for CAS success on a child slot, and for value swaps.
/// Release publishes the new node; Acquire sees what it replaced.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to see the node that won.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for relaxed loads (within a locked region, or statistics).
pub const RELAXED: Ordering = Ordering::Relaxed;
