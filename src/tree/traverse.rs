//! In-order traversal and height measurement shared by both tree variants.
//!
//! Both walks are iterative with an explicit stack. Trees are never
//! rebalanced, so sorted insertion produces a chain as deep as the tree is
//! large; recursion would overflow on such inputs.

#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;

use seize::LocalGuard;

use crate::value::ValueCell;

/// A node the shared walks can visit.
///
/// `children` returns a snapshot of the child slots. Nodes are never freed
/// while the tree is borrowed, so the references stay valid after any lock
/// used to read them is released.
pub(crate) trait TraversableNode: Sized {
    type Value;

    fn key(&self) -> &[u8];

    fn value(&self) -> &ValueCell<Self::Value>;

    fn children(&self) -> (Option<&Self>, Option<&Self>);
}

/// Collect `(key, value)` pairs in ascending key order.
pub(crate) fn in_order<N>(
    root: Option<&N>,
    guard: &LocalGuard<'_>,
) -> Vec<(Box<[u8]>, Arc<N::Value>)>
where
    N: TraversableNode,
{
    let mut out: Vec<(Box<[u8]>, Arc<N::Value>)> = Vec::new();
    let mut stack: Vec<&N> = Vec::new();
    let mut cursor: Option<&N> = root;

    loop {
        while let Some(node) = cursor {
            stack.push(node);
            cursor = node.children().0;
        }

        let Some(node) = stack.pop() else {
            break;
        };

        out.push((node.key().into(), node.value().load(guard)));
        cursor = node.children().1;
    }

    out
}

/// Number of nodes on the longest root-to-leaf path (0 for an empty tree).
pub(crate) fn height<N>(root: Option<&N>) -> usize
where
    N: TraversableNode,
{
    let mut max: usize = 0;
    let mut stack: Vec<(&N, usize)> = root.map(|node| (node, 1)).into_iter().collect();

    while let Some((node, depth)) = stack.pop() {
        max = max.max(depth);

        let (left, right) = node.children();
        stack.extend(left.map(|child| (child, depth + 1)));
        stack.extend(right.map(|child| (child, depth + 1)));
    }

    max
}
