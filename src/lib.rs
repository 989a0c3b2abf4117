//! # `bytetree`
//!
//! Concurrent key-value stores backed by an in-memory, unbalanced binary
//! search tree over byte-sequence keys.
//!
//! Two concurrency-control variants satisfy the same contract:
//!
//! | Variant | Structural change | Traversal | Blocks on |
//! |---------|-------------------|-----------|-----------|
//! | [`LockFreeTree`] | CAS child slot null → node | atomic loads | first root install only |
//! | [`LockCouplingTree`] | write lock + re-validation | hand-over-hand read locks | every node lock |
//!
//! Both order keys with a [`KeyComparator`] (default [`Lexicographic`]:
//! unsigned bytes, shorter-is-less), never rebalance, and never delete. Depth
//! is purely a function of insertion order.
//!
//! ## Thread Safety
//!
//! Both trees are `Send + Sync` when `V: Send + Sync`. All operations take
//! `&self`; share a tree with `Arc`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use bytetree::LockFreeTree;
//!
//! let tree: Arc<LockFreeTree> = Arc::new(LockFreeTree::new());
//!
//! let writer = {
//!     let tree = Arc::clone(&tree);
//!     thread::spawn(move || tree.put(b"banana", b"value2".to_vec()))
//! };
//! writer.join().unwrap();
//!
//! assert_eq!(tree.get(b"banana").as_deref(), Some(&b"value2".to_vec()));
//! ```
//!
//! ## Values
//!
//! Values are stored as `Arc<V>` and `get` returns a clone of the `Arc`.
//! Overwriting a key swaps the value atomically: a concurrent `get` sees the
//! old or the new value, never a mixture. Replaced values are reclaimed with
//! `seize` once no reader can still observe them.
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events on root installation and contention
//!   paths. Off by default; compiles to nothing when disabled.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

pub mod key;
pub mod stats;
pub mod tree;

mod ordering;
mod root;
mod tracing_helpers;
mod value;

// Re-export main types for convenience
pub use key::{KeyComparator, Lexicographic, SignedLexicographic, compare_keys};
pub use stats::ContentionStats;
pub use tree::{ByteValue, ConcurrentTree, LockCouplingTree, LockFreeTree};
