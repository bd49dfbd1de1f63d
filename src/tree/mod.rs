//! # Balanced Part Tree
//!
//! A generic, AVL-balanced search tree whose leaves carry user data and whose
//! internal nodes carry a pivot key plus a derived aggregate. The buffer
//! layer instantiates it with parts keyed by logical start offset; the tree
//! itself knows nothing about buffers.
//!
//! ## Shape
//!
//! The tree is a *full* binary tree of leaves: every internal node has
//! exactly two children, each either another node or a leaf. Inserting next
//! to a leaf replaces that leaf with a fresh node holding the old and new
//! leaves; removing a leaf collapses its parent into the sibling. AVL
//! rotations keep the height logarithmic in the leaf count.
//!
//! ```text
//!              [pivot 32]
//!              /        \
//!        [pivot 16]    leaf(32)
//!        /        \
//!    leaf(0)    leaf(16)
//! ```
//!
//! A node's pivot is the smallest key in its right subtree: descent goes
//! left when the probe key compares `Less` than the pivot, right otherwise,
//! so [`Tree::locate`] lands on the greatest leaf at or before the key.
//! The configured comparator must define a strict total order; there is no
//! separate tie-break.
//!
//! ## Arena storage
//!
//! Nodes and leaves live in index arenas and refer to each other by `u32`
//! ids with free-list reuse, linking by number instead of pointer. A child
//! slot is the sum type [`Child`], so "is this slot a leaf" is carried by
//! the type instead of flag bits.
//!
//! ## Aggregate propagation
//!
//! Each internal node caches an aggregate combined from its two children via
//! [`TreeConfig::combine`]. Two propagation modes exist:
//!
//! - **Bubbling** ([`Tree::bubble_update`]): after a leaf's content changes
//!   in place, recombine its ancestors root-ward, stopping at the first node
//!   whose aggregate comes out unchanged.
//! - **Capturing** ([`Tree::recompute_aggregates`]): one post-order pass
//!   recombining every node from the leaves up, for bulk invalidation after
//!   many localized changes.
//!
//! Structural edits (insert, remove, rotation) refresh aggregates and
//! heights along the touched path unconditionally.
//!
//! ## Key stability
//!
//! Pivots are copies of leaf keys taken at insertion time. A leaf's key may
//! only change while the leaf is the minimum of the whole tree (no pivot can
//! reference the global minimum), which is exactly the buffer layer's
//! "enlarge the first part downward" case.

mod iter;
mod tree;

pub use self::tree::Tree;
pub use iter::Leaves;

use std::cmp::Ordering;

/// Arena id of an internal node.
pub type NodeId = u32;
/// Arena id of a leaf.
pub type LeafId = u32;

/// One child slot of an internal node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Child {
    Node(NodeId),
    Leaf(LeafId),
}

/// Where to attach a new leaf relative to an existing one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InsertOrder {
    Before,
    After,
}

/// A child as seen by [`TreeConfig::combine`].
pub enum ChildView<'a, C: TreeConfig + ?Sized> {
    Leaf(&'a C::Leaf),
    Node(&'a C::Node),
}

/// Configuration descriptor: key order, leaf keys, and node aggregation.
pub trait TreeConfig {
    /// Leaf ordering key. `Default` supplies the placeholder for freed slots.
    type Key: Copy + Default + std::fmt::Debug;
    /// Per-leaf user data.
    type Leaf: Default;
    /// Per-node aggregate. Equality is the bubbling stop signal.
    type Node: Clone + Default + PartialEq;

    /// Strict total order over keys.
    fn compare(&self, key: &Self::Key, pivot: &Self::Key) -> Ordering;

    /// The ordering key of a leaf's data.
    fn leaf_key(&self, leaf: &Self::Leaf) -> Self::Key;

    /// Combines two child views into the parent's aggregate.
    fn combine(&self, left: ChildView<'_, Self>, right: ChildView<'_, Self>) -> Self::Node;
}
