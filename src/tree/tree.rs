//! Arena-backed AVL tree of leaves.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::{Child, ChildView, InsertOrder, LeafId, NodeId, TreeConfig};
use crate::config::TREE_PATH_DEPTH;

pub(crate) struct NodeSlot<C: TreeConfig> {
    pub(crate) parent: Option<NodeId>,
    pub(crate) pivot: C::Key,
    pub(crate) height: u32,
    pub(crate) children: [Child; 2],
    pub(crate) data: C::Node,
    live: bool,
}

pub(crate) struct LeafSlot<C: TreeConfig> {
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: C::Leaf,
    live: bool,
}

/// Balanced search tree over leaves, parameterized by a [`TreeConfig`].
pub struct Tree<C: TreeConfig> {
    cfg: C,
    nodes: Vec<NodeSlot<C>>,
    leaves: Vec<LeafSlot<C>>,
    free_nodes: Vec<NodeId>,
    free_leaves: Vec<LeafId>,
    root: Option<Child>,
    len: usize,
}

impl<C: TreeConfig> Tree<C> {
    pub fn new(cfg: C) -> Self {
        Self {
            cfg,
            nodes: Vec::new(),
            leaves: Vec::new(),
            free_nodes: Vec::new(),
            free_leaves: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn config(&self) -> &C {
        &self.cfg
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every node and leaf.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.leaves.clear();
        self.free_nodes.clear();
        self.free_leaves.clear();
        self.root = None;
        self.len = 0;
    }

    pub fn leaf(&self, id: LeafId) -> &C::Leaf {
        let slot = &self.leaves[id as usize];
        debug_assert!(slot.live, "access to freed leaf {id}");
        &slot.data
    }

    /// Leaf access tolerating stale ids: `None` for freed or out-of-range
    /// slots. Position hints are revalidated through this.
    pub fn leaf_checked(&self, id: LeafId) -> Option<&C::Leaf> {
        let slot = self.leaves.get(id as usize)?;
        slot.live.then_some(&slot.data)
    }

    /// Mutable access to a leaf's data. If the change affects the node
    /// aggregates, follow up with [`Tree::bubble_update`]; the key may only
    /// change while the leaf is the tree's minimum.
    pub fn leaf_mut(&mut self, id: LeafId) -> &mut C::Leaf {
        let slot = &mut self.leaves[id as usize];
        debug_assert!(slot.live, "access to freed leaf {id}");
        &mut slot.data
    }

    pub fn key_of(&self, id: LeafId) -> C::Key {
        self.cfg.leaf_key(self.leaf(id))
    }

    /// Leftmost leaf, `None` when empty.
    pub fn first(&self) -> Option<LeafId> {
        self.root.map(|c| self.extremum(c, 0))
    }

    /// Rightmost leaf, `None` when empty.
    pub fn last(&self) -> Option<LeafId> {
        self.root.map(|c| self.extremum(c, 1))
    }

    fn extremum(&self, mut cur: Child, side: usize) -> LeafId {
        loop {
            match cur {
                Child::Leaf(l) => return l,
                Child::Node(n) => cur = self.node(n).children[side],
            }
        }
    }

    /// Descends to the greatest leaf whose key is at or before `key`
    /// (the leftmost leaf when `key` precedes every leaf). `None` only on an
    /// empty tree; containment is the caller's check.
    pub fn locate(&self, key: C::Key) -> Option<LeafId> {
        let mut cur = self.root?;
        loop {
            match cur {
                Child::Leaf(l) => return Some(l),
                Child::Node(n) => {
                    let slot = self.node(n);
                    let side = match self.cfg.compare(&key, &slot.pivot) {
                        Ordering::Less => 0,
                        _ => 1,
                    };
                    cur = slot.children[side];
                }
            }
        }
    }

    /// Seeds an empty tree with its first leaf.
    pub fn insert_initial(&mut self, data: C::Leaf) -> LeafId {
        debug_assert!(self.root.is_none(), "insert_initial on non-empty tree");
        let id = self.alloc_leaf(None, data);
        self.root = Some(Child::Leaf(id));
        self.len = 1;
        id
    }

    /// Inserts a new leaf adjacent to `at`, then rebalances and refreshes
    /// aggregates along the path to the root.
    pub fn insert_at(&mut self, at: LeafId, data: C::Leaf, order: InsertOrder) -> LeafId {
        let new_key = self.cfg.leaf_key(&data);
        let new_leaf = self.alloc_leaf(None, data);
        let old_parent = self.leaves[at as usize].parent;

        let (children, pivot) = match order {
            InsertOrder::Before => ([Child::Leaf(new_leaf), Child::Leaf(at)], self.key_of(at)),
            InsertOrder::After => ([Child::Leaf(at), Child::Leaf(new_leaf)], new_key),
        };

        let node = self.alloc_node(NodeSlot {
            parent: old_parent,
            pivot,
            height: 1,
            children,
            data: C::Node::default(),
            live: true,
        });
        self.leaves[at as usize].parent = Some(node);
        self.leaves[new_leaf as usize].parent = Some(node);

        match old_parent {
            None => self.root = Some(Child::Node(node)),
            Some(p) => self.replace_child_slot(p, Child::Leaf(at), Child::Node(node)),
        }

        self.refresh_node(node);
        self.rebalance_upward(old_parent);
        self.len += 1;
        new_leaf
    }

    /// Removes a leaf, collapsing its parent into the sibling, and returns
    /// the leaf's data.
    pub fn remove_leaf(&mut self, at: LeafId) -> C::Leaf {
        let parent = self.leaves[at as usize].parent;
        let data = self.free_leaf(at);
        self.len -= 1;

        match parent {
            None => self.root = None,
            Some(p) => {
                let slot = self.node(p);
                let sibling = if slot.children[0] == Child::Leaf(at) {
                    slot.children[1]
                } else {
                    slot.children[0]
                };
                let grandparent = slot.parent;

                self.set_parent(sibling, grandparent);
                match grandparent {
                    None => self.root = Some(sibling),
                    Some(g) => self.replace_child_slot(g, Child::Node(p), sibling),
                }
                self.free_node(p);
                self.rebalance_upward(grandparent);
            }
        }
        data
    }

    /// In-order successor of `at`.
    pub fn next_leaf(&self, at: LeafId) -> Option<LeafId> {
        self.step(at, 0)
    }

    /// In-order predecessor of `at`.
    pub fn prev_leaf(&self, at: LeafId) -> Option<LeafId> {
        self.step(at, 1)
    }

    fn step(&self, at: LeafId, from_side: usize) -> Option<LeafId> {
        let mut child = Child::Leaf(at);
        let mut parent = self.leaves[at as usize].parent;
        while let Some(p) = parent {
            let slot = self.node(p);
            if slot.children[from_side] == child {
                return Some(self.extremum(slot.children[1 - from_side], from_side));
            }
            child = Child::Node(p);
            parent = slot.parent;
        }
        None
    }

    /// Bubbling propagation: recombine aggregates from `from`'s parent
    /// toward the root, stopping at the first unchanged node.
    pub fn bubble_update(&mut self, from: LeafId) {
        let mut cur = self.leaves[from as usize].parent;
        while let Some(id) = cur {
            let fresh = self.compute_aggregate(id);
            let slot = &mut self.nodes[id as usize];
            if slot.data == fresh {
                break;
            }
            slot.data = fresh;
            cur = slot.parent;
        }
    }

    /// Capturing propagation: one post-order pass recombining every node's
    /// aggregate from the leaves up.
    pub fn recompute_aggregates(&mut self) {
        let Some(Child::Node(root)) = self.root else {
            return;
        };
        let mut stack: SmallVec<[(NodeId, bool); TREE_PATH_DEPTH]> =
            SmallVec::from_elem((root, false), 1);
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let fresh = self.compute_aggregate(id);
                self.nodes[id as usize].data = fresh;
            } else {
                stack.push((id, true));
                for child in self.node(id).children {
                    if let Child::Node(n) = child {
                        stack.push((n, false));
                    }
                }
            }
        }
    }

    /// Aggregate cached at the root node; `None` when the tree holds at most
    /// one leaf (no internal node exists).
    pub fn root_aggregate(&self) -> Option<&C::Node> {
        match self.root {
            Some(Child::Node(n)) => Some(&self.node(n).data),
            _ => None,
        }
    }

    // ---- arena plumbing -------------------------------------------------

    pub(crate) fn node(&self, id: NodeId) -> &NodeSlot<C> {
        let slot = &self.nodes[id as usize];
        debug_assert!(slot.live, "access to freed node {id}");
        slot
    }

    fn alloc_leaf(&mut self, parent: Option<NodeId>, data: C::Leaf) -> LeafId {
        let slot = LeafSlot {
            parent,
            data,
            live: true,
        };
        match self.free_leaves.pop() {
            Some(id) => {
                self.leaves[id as usize] = slot;
                id
            }
            None => {
                self.leaves.push(slot);
                (self.leaves.len() - 1) as LeafId
            }
        }
    }

    fn free_leaf(&mut self, id: LeafId) -> C::Leaf {
        let slot = &mut self.leaves[id as usize];
        debug_assert!(slot.live, "double free of leaf {id}");
        slot.live = false;
        slot.parent = None;
        self.free_leaves.push(id);
        std::mem::take(&mut slot.data)
    }

    fn alloc_node(&mut self, slot: NodeSlot<C>) -> NodeId {
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id as usize] = slot;
                id
            }
            None => {
                self.nodes.push(slot);
                (self.nodes.len() - 1) as NodeId
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        let slot = &mut self.nodes[id as usize];
        debug_assert!(slot.live, "double free of node {id}");
        slot.live = false;
        slot.parent = None;
        slot.data = C::Node::default();
        self.free_nodes.push(id);
    }

    fn set_parent(&mut self, child: Child, parent: Option<NodeId>) {
        match child {
            Child::Leaf(l) => self.leaves[l as usize].parent = parent,
            Child::Node(n) => self.nodes[n as usize].parent = parent,
        }
    }

    fn replace_child_slot(&mut self, parent: NodeId, old: Child, new: Child) {
        let slot = &mut self.nodes[parent as usize];
        if slot.children[0] == old {
            slot.children[0] = new;
        } else {
            debug_assert_eq!(slot.children[1], old, "child {old:?} not under node {parent}");
            slot.children[1] = new;
        }
    }

    // ---- balance & aggregates ------------------------------------------

    fn child_height(&self, child: Child) -> u32 {
        match child {
            Child::Leaf(_) => 0,
            Child::Node(n) => self.node(n).height,
        }
    }

    fn balance_of(&self, id: NodeId) -> i64 {
        let [l, r] = self.node(id).children;
        i64::from(self.child_height(r)) - i64::from(self.child_height(l))
    }

    fn view(&self, child: Child) -> ChildView<'_, C> {
        match child {
            Child::Leaf(l) => ChildView::Leaf(self.leaf(l)),
            Child::Node(n) => ChildView::Node(&self.node(n).data),
        }
    }

    fn compute_aggregate(&self, id: NodeId) -> C::Node {
        let [l, r] = self.node(id).children;
        self.cfg.combine(self.view(l), self.view(r))
    }

    /// Recomputes height and aggregate from the current children.
    fn refresh_node(&mut self, id: NodeId) {
        let fresh = self.compute_aggregate(id);
        let [l, r] = self.node(id).children;
        let height = 1 + self.child_height(l).max(self.child_height(r));
        let slot = &mut self.nodes[id as usize];
        slot.height = height;
        slot.data = fresh;
    }

    /// Walks from `start` to the root, rotating out-of-balance nodes and
    /// refreshing heights and aggregates along the way.
    fn rebalance_upward(&mut self, start: Option<NodeId>) {
        let mut cur = start;
        while let Some(id) = cur {
            let id = self.restore_balance(id);
            self.refresh_node(id);
            cur = self.nodes[id as usize].parent;
        }
    }

    /// Restores the AVL invariant at `id`, returning the node now occupying
    /// `id`'s position.
    fn restore_balance(&mut self, id: NodeId) -> NodeId {
        let balance = self.balance_of(id);
        if balance > 1 {
            // A node with balance +2 has height >= 2, so its right child is
            // an internal node; same for the mirror case below.
            if let Child::Node(right) = self.node(id).children[1] {
                if self.balance_of(right) < 0 {
                    self.rotate(right, 1);
                }
            }
            self.rotate(id, 0)
        } else if balance < -1 {
            if let Child::Node(left) = self.node(id).children[0] {
                if self.balance_of(left) > 0 {
                    self.rotate(left, 0);
                }
            }
            self.rotate(id, 1)
        } else {
            id
        }
    }

    /// Single rotation of `x` toward `dir` (0 = left, 1 = right). Returns
    /// the subtree's new root. Pivots stay attached to their nodes: each
    /// still separates the same two leaf sets after the rotation.
    fn rotate(&mut self, x: NodeId, dir: usize) -> NodeId {
        let up_side = 1 - dir;
        let y = match self.node(x).children[up_side] {
            Child::Node(n) => n,
            Child::Leaf(_) => {
                debug_assert!(false, "rotation of node {x} with leaf on lifting side");
                return x;
            }
        };
        let moved = self.node(y).children[dir];
        let above = self.node(x).parent;

        self.nodes[x as usize].children[up_side] = moved;
        self.set_parent(moved, Some(x));

        self.nodes[y as usize].children[dir] = Child::Node(x);
        self.nodes[x as usize].parent = Some(y);

        self.nodes[y as usize].parent = above;
        match above {
            None => self.root = Some(Child::Node(y)),
            Some(g) => self.replace_child_slot(g, Child::Node(x), Child::Node(y)),
        }

        self.refresh_node(x);
        self.refresh_node(y);
        y
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::Leaves;
    use super::*;

    /// Leaves are plain keys; node aggregate counts leaves and sums keys so
    /// bubbling and capturing are observable.
    pub(crate) struct CountCfg;

    #[derive(Clone, Default, PartialEq, Debug)]
    pub(crate) struct Agg {
        pub(crate) count: usize,
        pub(crate) sum: i64,
    }

    impl TreeConfig for CountCfg {
        type Key = i64;
        type Leaf = i64;
        type Node = Agg;

        fn compare(&self, key: &i64, pivot: &i64) -> Ordering {
            key.cmp(pivot)
        }

        fn leaf_key(&self, leaf: &i64) -> i64 {
            *leaf
        }

        fn combine(&self, left: ChildView<'_, Self>, right: ChildView<'_, Self>) -> Agg {
            let mut agg = Agg::default();
            for child in [left, right] {
                match child {
                    ChildView::Leaf(k) => {
                        agg.count += 1;
                        agg.sum += *k;
                    }
                    ChildView::Node(n) => {
                        agg.count += n.count;
                        agg.sum += n.sum;
                    }
                }
            }
            agg
        }
    }

    pub(crate) fn keys(tree: &Tree<CountCfg>) -> Vec<i64> {
        Leaves::new(tree).map(|(_, k)| *k).collect()
    }

    /// Builds a tree by locating each key's neighbor and inserting in order.
    pub(crate) fn build(input: &[i64]) -> Tree<CountCfg> {
        let mut tree = Tree::new(CountCfg);
        for &k in input {
            match tree.locate(k) {
                None => {
                    tree.insert_initial(k);
                }
                Some(at) => {
                    let order = if k < tree.key_of(at) {
                        InsertOrder::Before
                    } else {
                        InsertOrder::After
                    };
                    tree.insert_at(at, k, order);
                }
            }
        }
        tree
    }

    fn check_structure(tree: &Tree<CountCfg>) {
        fn walk(tree: &Tree<CountCfg>, child: Child, parent: Option<NodeId>) -> (u32, Agg) {
            match child {
                Child::Leaf(l) => {
                    assert_eq!(tree.leaves[l as usize].parent, parent, "leaf parent link");
                    (0, Agg { count: 1, sum: *tree.leaf(l) })
                }
                Child::Node(n) => {
                    let slot = tree.node(n);
                    assert_eq!(slot.parent, parent, "node parent link");
                    let (lh, la) = walk(tree, slot.children[0], Some(n));
                    let (rh, ra) = walk(tree, slot.children[1], Some(n));
                    assert!(
                        (i64::from(rh) - i64::from(lh)).abs() <= 1,
                        "AVL violation at node {n}"
                    );
                    let height = 1 + lh.max(rh);
                    assert_eq!(slot.height, height, "stale height at node {n}");
                    let pivot_leaf = tree.extremum(slot.children[1], 0);
                    assert_eq!(slot.pivot, *tree.leaf(pivot_leaf), "stale pivot at node {n}");
                    let agg = Agg {
                        count: la.count + ra.count,
                        sum: la.sum + ra.sum,
                    };
                    assert_eq!(slot.data, agg, "stale aggregate at node {n}");
                    (height, agg)
                }
            }
        }

        if let Some(root) = tree.root {
            let (_, agg) = walk(tree, root, None);
            assert_eq!(agg.count, tree.len());
        } else {
            assert_eq!(tree.len(), 0);
        }
    }

    #[test]
    fn ascending_inserts_stay_balanced_and_ordered() {
        let input: Vec<i64> = (0..200).collect();
        let tree = build(&input);
        check_structure(&tree);
        assert_eq!(keys(&tree), input);
    }

    #[test]
    fn descending_and_shuffled_inserts_stay_ordered() {
        let tree = build(&(0..100).rev().collect::<Vec<_>>());
        check_structure(&tree);
        assert_eq!(keys(&tree), (0..100).collect::<Vec<_>>());

        // Deterministic pseudo-shuffle.
        let mut input: Vec<i64> = (0..128).map(|i| (i * 37) % 128).collect();
        input.dedup();
        let tree = build(&input);
        check_structure(&tree);
        let mut sorted = input.clone();
        sorted.sort_unstable();
        assert_eq!(keys(&tree), sorted);
    }

    #[test]
    fn locate_finds_greatest_at_or_before() {
        let tree = build(&[0, 16, 32, 48]);
        let at = tree.locate(20).unwrap();
        assert_eq!(*tree.leaf(at), 16);
        let at = tree.locate(16).unwrap();
        assert_eq!(*tree.leaf(at), 16);
        let at = tree.locate(-5).unwrap();
        assert_eq!(*tree.leaf(at), 0, "probe before first lands on first");
        let at = tree.locate(1000).unwrap();
        assert_eq!(*tree.leaf(at), 48);
    }

    #[test]
    fn first_last_next_prev() {
        let tree = build(&[5, 1, 9, 3, 7]);
        let first = tree.first().unwrap();
        assert_eq!(*tree.leaf(first), 1);
        let last = tree.last().unwrap();
        assert_eq!(*tree.leaf(last), 9);

        let mut walked = vec![*tree.leaf(first)];
        let mut cur = first;
        while let Some(next) = tree.next_leaf(cur) {
            walked.push(*tree.leaf(next));
            cur = next;
        }
        assert_eq!(walked, vec![1, 3, 5, 7, 9]);

        let mut back = vec![*tree.leaf(cur)];
        while let Some(prev) = tree.prev_leaf(cur) {
            back.push(*tree.leaf(prev));
            cur = prev;
        }
        assert_eq!(back, vec![9, 7, 5, 3, 1]);
    }

    #[test]
    fn remove_collapses_parent_and_rebalances() {
        let mut tree = build(&(0..64).collect::<Vec<_>>());
        for k in (0..64).step_by(2) {
            let at = tree.locate(k).unwrap();
            assert_eq!(tree.remove_leaf(at), k);
            check_structure(&tree);
        }
        assert_eq!(keys(&tree), (1..64).step_by(2).collect::<Vec<_>>());

        while let Some(first) = tree.first() {
            tree.remove_leaf(first);
        }
        assert!(tree.is_empty());
        assert!(tree.locate(0).is_none());
    }

    #[test]
    fn arena_reuses_freed_slots() {
        let mut tree = build(&[1, 2, 3, 4]);
        let nodes_before = tree.nodes.len();
        let leaves_before = tree.leaves.len();

        let at = tree.locate(3).unwrap();
        tree.remove_leaf(at);
        let at = tree.locate(2).unwrap();
        tree.insert_at(at, 3, InsertOrder::After);

        assert_eq!(tree.nodes.len(), nodes_before);
        assert_eq!(tree.leaves.len(), leaves_before);
        check_structure(&tree);
    }

    #[test]
    fn bubble_update_stops_when_aggregate_is_unchanged() {
        let mut tree = build(&(0..32).collect::<Vec<_>>());
        let at = tree.locate(7).unwrap();

        // Leaf content unchanged: bubbling must leave every aggregate valid.
        tree.bubble_update(at);
        check_structure(&tree);

        // The minimum leaf is the one leaf whose key may change in place.
        let first = tree.first().unwrap();
        *tree.leaf_mut(first) = -10;
        tree.bubble_update(first);
        check_structure(&tree);
        let root = tree.root_aggregate().unwrap();
        assert_eq!(root.sum, (1..32).sum::<i64>() - 10);
    }

    #[test]
    fn capturing_recomputes_everything() {
        let mut tree = build(&(0..32).collect::<Vec<_>>());

        // Wreck every cached aggregate, then recompute in one pass.
        for id in 0..tree.nodes.len() {
            if tree.nodes[id].live {
                tree.nodes[id].data = Agg { count: 999, sum: -1 };
            }
        }
        tree.recompute_aggregates();
        check_structure(&tree);
        let root = tree.root_aggregate().unwrap();
        assert_eq!(root.count, 32);
        assert_eq!(root.sum, (0..32).sum::<i64>());
    }

    #[test]
    fn clear_empties_the_tree() {
        let mut tree = build(&[1, 2, 3]);
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.first().is_none());
        tree.insert_initial(9);
        assert_eq!(keys(&tree), vec![9]);
    }
}
