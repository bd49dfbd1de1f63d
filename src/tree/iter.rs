//! In-order leaf iteration.

use super::{LeafId, Tree, TreeConfig};

/// In-order iterator over a tree's leaves.
///
/// Steps via parent links, so each advance is O(log n) worst case and O(1)
/// amortized over a full traversal; no allocation, no tree mutation.
pub struct Leaves<'a, C: TreeConfig> {
    tree: &'a Tree<C>,
    next: Option<LeafId>,
}

impl<'a, C: TreeConfig> Leaves<'a, C> {
    pub(crate) fn new(tree: &'a Tree<C>) -> Self {
        Self {
            tree,
            next: tree.first(),
        }
    }
}

impl<'a, C: TreeConfig> Iterator for Leaves<'a, C> {
    type Item = (LeafId, &'a C::Leaf);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.next_leaf(id);
        Some((id, self.tree.leaf(id)))
    }
}

impl<C: TreeConfig> Tree<C> {
    /// In-order traversal of all leaves, left to right.
    pub fn iter(&self) -> Leaves<'_, C> {
        Leaves::new(self)
    }
}
