// Dynamic bounding-volume tree used as the broad phase.
//
// Two trees share one node pool: the dynamic tree holds shapes that move,
// the static tree holds level geometry and sleeping bodies. Leaves keep a
// doubly linked list of "pair" records to the leaves they overlapped when
// they were last reinserted, so a leaf that has not moved reports its
// pairs without walking the tree.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::collision::AABB;
use crate::math::Vec2;

/// Fraction of a leaf's extent added on every side of a dynamic leaf.
const FATTEN_COEF: f64 = 0.1;
/// Seconds of travel folded into a dynamic leaf along its velocity.
const VELOCITY_COEF: f64 = 0.1;

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Leaf {
        obj: T,
        /// Stamp of the pass in which the leaf was last reinserted.
        stamp: u64,
        pairs: Option<usize>,
    },
    Internal {
        a: usize,
        b: usize,
    },
}

#[derive(Debug, Clone)]
struct Node<T> {
    bb: AABB,
    parent: Option<usize>,
    kind: NodeKind<T>,
}

/// One leaf's link in a pair record.
#[derive(Debug, Clone, Copy)]
struct Thread {
    prev: Option<usize>,
    leaf: usize,
    next: Option<usize>,
}

/// Overlap record shared by two leaves. `b` is the leaf that reports the
/// pair while neither leaf moves; static leaves always sit in `a`.
#[derive(Debug, Clone, Copy)]
struct Pair {
    a: Thread,
    b: Thread,
}

#[derive(Debug, Clone)]
pub struct BBTree<T> {
    nodes: Vec<Node<T>>,
    free_nodes: Vec<usize>,
    pairs: Vec<Pair>,
    free_pairs: Vec<usize>,

    root: Option<usize>,
    static_root: Option<usize>,
    leaves: FxHashMap<T, usize>,
    static_leaves: FxHashMap<T, usize>,

    stamp: u64,
    scratch: Vec<usize>,
}

impl<T: Copy + Eq + Hash> Default for BBTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Grows `bb` by a tenth of its size and by the distance covered in a
/// tenth of a second at `velocity`.
fn fattened(bb: AABB, velocity: Vec2) -> AABB {
    let x = (bb.max.x - bb.min.x) * FATTEN_COEF;
    let y = (bb.max.y - bb.min.y) * FATTEN_COEF;
    let v = velocity * VELOCITY_COEF;
    AABB {
        min: Vec2::new(bb.min.x + (-x).min(v.x), bb.min.y + (-y).min(v.y)),
        max: Vec2::new(bb.max.x + x.max(v.x), bb.max.y + y.max(v.y)),
    }
}

impl<T: Copy + Eq + Hash> BBTree<T> {
    pub fn new() -> Self {
        BBTree {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            pairs: Vec::new(),
            free_pairs: Vec::new(),
            root: None,
            static_root: None,
            leaves: FxHashMap::default(),
            static_leaves: FxHashMap::default(),
            stamp: 0,
            scratch: Vec::new(),
        }
    }

    /// Number of objects in both trees.
    pub fn len(&self) -> usize {
        self.leaves.len() + self.static_leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, obj: T) -> bool {
        self.leaves.contains_key(&obj) || self.static_leaves.contains_key(&obj)
    }

    pub fn is_static(&self, obj: T) -> bool {
        self.static_leaves.contains_key(&obj)
    }

    /// Stored (possibly fattened) box of an object's leaf.
    pub fn leaf_bb(&self, obj: T) -> Option<AABB> {
        self.leaves
            .get(&obj)
            .or_else(|| self.static_leaves.get(&obj))
            .map(|&leaf| self.nodes[leaf].bb)
    }

    // --- node and pair pools ---

    fn alloc_node(&mut self, node: Node<T>) -> usize {
        match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn recycle_node(&mut self, node: usize) {
        self.free_nodes.push(node);
    }

    fn alloc_pair(&mut self, pair: Pair) -> usize {
        match self.free_pairs.pop() {
            Some(index) => {
                self.pairs[index] = pair;
                index
            }
            None => {
                self.pairs.push(pair);
                self.pairs.len() - 1
            }
        }
    }

    fn new_leaf(&mut self, obj: T, bb: AABB) -> usize {
        self.alloc_node(Node {
            bb,
            parent: None,
            kind: NodeKind::Leaf {
                obj,
                stamp: 0,
                pairs: None,
            },
        })
    }

    fn new_internal(&mut self, a: usize, b: usize) -> usize {
        let bb = self.nodes[a].bb.merged(&self.nodes[b].bb);
        let node = self.alloc_node(Node {
            bb,
            parent: None,
            kind: NodeKind::Internal { a, b },
        });
        self.nodes[a].parent = Some(node);
        self.nodes[b].parent = Some(node);
        node
    }

    fn children(&self, node: usize) -> Option<(usize, usize)> {
        match self.nodes[node].kind {
            NodeKind::Internal { a, b } => Some((a, b)),
            NodeKind::Leaf { .. } => None,
        }
    }

    fn set_child(&mut self, node: usize, first: bool, child: usize) {
        if let NodeKind::Internal { a, b } = &mut self.nodes[node].kind {
            if first {
                *a = child;
            } else {
                *b = child;
            }
        }
        self.nodes[child].parent = Some(node);
    }

    fn other_child(&self, node: usize, child: usize) -> usize {
        match self.children(node) {
            Some((a, b)) if a == child => b,
            Some((a, _)) => a,
            None => child,
        }
    }

    fn leaf_obj(&self, leaf: usize) -> Option<T> {
        match self.nodes[leaf].kind {
            NodeKind::Leaf { obj, .. } => Some(obj),
            NodeKind::Internal { .. } => None,
        }
    }

    fn leaf_stamp(&self, leaf: usize) -> u64 {
        match self.nodes[leaf].kind {
            NodeKind::Leaf { stamp, .. } => stamp,
            NodeKind::Internal { .. } => 0,
        }
    }

    fn set_leaf_stamp(&mut self, leaf: usize, value: u64) {
        if let NodeKind::Leaf { stamp, .. } = &mut self.nodes[leaf].kind {
            *stamp = value;
        }
    }

    fn leaf_pairs(&self, leaf: usize) -> Option<usize> {
        match self.nodes[leaf].kind {
            NodeKind::Leaf { pairs, .. } => pairs,
            NodeKind::Internal { .. } => None,
        }
    }

    fn set_leaf_pairs(&mut self, leaf: usize, value: Option<usize>) {
        if let NodeKind::Leaf { pairs, .. } = &mut self.nodes[leaf].kind {
            *pairs = value;
        }
    }

    // --- tree structure ---

    fn subtree_insert(&mut self, subtree: Option<usize>, leaf: usize) -> usize {
        let Some(subtree) = subtree else {
            return leaf;
        };
        let Some((a, b)) = self.children(subtree) else {
            return self.new_internal(leaf, subtree);
        };

        let leaf_bb = self.nodes[leaf].bb;
        let a_bb = self.nodes[a].bb;
        let b_bb = self.nodes[b].bb;
        let mut cost_a = b_bb.area() + a_bb.merged_area(&leaf_bb);
        let mut cost_b = a_bb.area() + b_bb.merged_area(&leaf_bb);
        if cost_a == cost_b {
            cost_a = a_bb.proximity(&leaf_bb);
            cost_b = b_bb.proximity(&leaf_bb);
        }

        if cost_b < cost_a {
            let child = self.subtree_insert(Some(b), leaf);
            self.set_child(subtree, false, child);
        } else {
            let child = self.subtree_insert(Some(a), leaf);
            self.set_child(subtree, true, child);
        }
        self.nodes[subtree].bb = self.nodes[subtree].bb.merged(&leaf_bb);
        subtree
    }

    /// Replaces `child` of `parent` with `value`, recycles `child` and
    /// refits every ancestor.
    fn replace_child(&mut self, parent: usize, child: usize, value: usize) {
        let first = matches!(self.children(parent), Some((a, _)) if a == child);
        self.recycle_node(child);
        self.set_child(parent, first, value);

        let mut node = Some(parent);
        while let Some(current) = node {
            if let Some((a, b)) = self.children(current) {
                self.nodes[current].bb = self.nodes[a].bb.merged(&self.nodes[b].bb);
            }
            node = self.nodes[current].parent;
        }
    }

    fn subtree_remove(&mut self, subtree: usize, leaf: usize) -> Option<usize> {
        if leaf == subtree {
            return None;
        }
        let parent = self.nodes[leaf].parent?;
        if parent == subtree {
            let other = self.other_child(subtree, leaf);
            self.nodes[other].parent = self.nodes[subtree].parent;
            self.recycle_node(subtree);
            Some(other)
        } else {
            let other = self.other_child(parent, leaf);
            if let Some(grandparent) = self.nodes[parent].parent {
                self.replace_child(grandparent, parent, other);
            }
            Some(subtree)
        }
    }

    fn root_of(&self, is_static: bool) -> Option<usize> {
        if is_static {
            self.static_root
        } else {
            self.root
        }
    }

    fn set_root(&mut self, is_static: bool, root: Option<usize>) {
        if is_static {
            self.static_root = root;
        } else {
            self.root = root;
        }
    }

    fn tree_insert(&mut self, leaf: usize, is_static: bool) {
        let root = self.root_of(is_static);
        let root = self.subtree_insert(root, leaf);
        self.set_root(is_static, Some(root));
    }

    fn tree_remove(&mut self, leaf: usize, is_static: bool) {
        if let Some(root) = self.root_of(is_static) {
            let root = self.subtree_remove(root, leaf);
            self.set_root(is_static, root);
        }
        self.nodes[leaf].parent = None;
    }

    // --- pair lists ---

    fn thread_mut(&mut self, pair: usize, leaf: usize) -> &mut Thread {
        let record = &mut self.pairs[pair];
        if record.a.leaf == leaf {
            &mut record.a
        } else {
            &mut record.b
        }
    }

    fn thread_unlink(&mut self, thread: Thread) {
        if let Some(next) = thread.next {
            self.thread_mut(next, thread.leaf).prev = thread.prev;
        }
        match thread.prev {
            Some(prev) => self.thread_mut(prev, thread.leaf).next = thread.next,
            None => self.set_leaf_pairs(thread.leaf, thread.next),
        }
    }

    fn pairs_clear(&mut self, leaf: usize) {
        let mut pair = self.leaf_pairs(leaf);
        self.set_leaf_pairs(leaf, None);
        while let Some(current) = pair {
            let record = self.pairs[current];
            if record.a.leaf == leaf {
                pair = record.a.next;
                self.thread_unlink(record.b);
            } else {
                pair = record.b.next;
                self.thread_unlink(record.a);
            }
            self.free_pairs.push(current);
        }
    }

    fn pair_insert(&mut self, a: usize, b: usize) {
        let next_a = self.leaf_pairs(a);
        let next_b = self.leaf_pairs(b);
        let pair = self.alloc_pair(Pair {
            a: Thread {
                prev: None,
                leaf: a,
                next: next_a,
            },
            b: Thread {
                prev: None,
                leaf: b,
                next: next_b,
            },
        });
        self.set_leaf_pairs(a, Some(pair));
        self.set_leaf_pairs(b, Some(pair));

        if let Some(next) = next_a {
            self.thread_mut(next, a).prev = Some(pair);
        }
        if let Some(next) = next_b {
            self.thread_mut(next, b).prev = Some(pair);
        }
    }

    // --- marking ---

    /// Records pairs between `leaf` and every leaf of `subtree` it
    /// overlaps. Leaves to the right (`left == true`) only get a pair
    /// record; they report it themselves while marking. Leaves to the
    /// left are reported now.
    fn mark_leaf_query<F: FnMut(T, T)>(
        &mut self,
        subtree: usize,
        leaf: usize,
        left: bool,
        func: &mut F,
    ) {
        if !self.nodes[leaf].bb.intersects(&self.nodes[subtree].bb) {
            return;
        }
        match self.children(subtree) {
            None => {
                if left {
                    self.pair_insert(leaf, subtree);
                } else {
                    if self.leaf_stamp(subtree) < self.leaf_stamp(leaf) {
                        self.pair_insert(subtree, leaf);
                    }
                    if let (Some(a), Some(b)) = (self.leaf_obj(leaf), self.leaf_obj(subtree)) {
                        func(a, b);
                    }
                }
            }
            Some((a, b)) => {
                self.mark_leaf_query(a, leaf, left, func);
                self.mark_leaf_query(b, leaf, left, func);
            }
        }
    }

    fn mark_leaf<F: FnMut(T, T)>(&mut self, leaf: usize, func: &mut F) {
        if self.leaf_stamp(leaf) == self.stamp {
            if let Some(static_root) = self.static_root {
                self.mark_leaf_query(static_root, leaf, false, func);
            }

            let mut node = leaf;
            while let Some(parent) = self.nodes[node].parent {
                if let Some((a, b)) = self.children(parent) {
                    if node == a {
                        self.mark_leaf_query(b, leaf, true, func);
                    } else {
                        self.mark_leaf_query(a, leaf, false, func);
                    }
                }
                node = parent;
            }
        } else {
            let Some(obj) = self.leaf_obj(leaf) else {
                return;
            };
            let mut pair = self.leaf_pairs(leaf);
            while let Some(current) = pair {
                let record = self.pairs[current];
                if record.b.leaf == leaf {
                    if let Some(other) = self.leaf_obj(record.a.leaf) {
                        func(other, obj);
                    }
                    pair = record.b.next;
                } else {
                    pair = record.a.next;
                }
            }
        }
    }

    fn mark_subtree<F: FnMut(T, T)>(&mut self, subtree: usize, func: &mut F) {
        match self.children(subtree) {
            None => self.mark_leaf(subtree, func),
            Some((a, b)) => {
                self.mark_subtree(a, func);
                self.mark_subtree(b, func);
            }
        }
    }

    /// Builds the pair list of a freshly (re)inserted leaf without
    /// reporting anything.
    fn leaf_add_pairs(&mut self, leaf: usize, is_static: bool) {
        if is_static {
            if let Some(root) = self.root {
                self.mark_leaf_query(root, leaf, true, &mut |_, _| {});
            }
        } else {
            self.mark_leaf(leaf, &mut |_, _| {});
        }
    }

    /// Reinserts the leaf if `bb` escaped its stored box. Returns whether
    /// the leaf moved.
    fn leaf_update(&mut self, leaf: usize, bb: AABB, velocity: Vec2, is_static: bool) -> bool {
        if self.nodes[leaf].bb.contains(&bb) {
            return false;
        }
        self.tree_remove(leaf, is_static);
        self.nodes[leaf].bb = if is_static {
            bb
        } else {
            fattened(bb, velocity)
        };
        self.tree_insert(leaf, is_static);
        self.pairs_clear(leaf);
        self.set_leaf_stamp(leaf, self.stamp);
        true
    }

    // --- public operations ---

    /// Adds a moving object with its exact box and current velocity.
    pub fn insert(&mut self, obj: T, bb: AABB, velocity: Vec2) {
        self.insert_leaf(obj, fattened(bb, velocity), false);
    }

    /// Adds an object to the static tree. Static leaves are never fattened.
    pub fn insert_static(&mut self, obj: T, bb: AABB) {
        self.insert_leaf(obj, bb, true);
    }

    fn insert_leaf(&mut self, obj: T, bb: AABB, is_static: bool) {
        if self.contains(obj) {
            self.remove(obj);
        }
        let leaf = self.new_leaf(obj, bb);
        if is_static {
            self.static_leaves.insert(obj, leaf);
        } else {
            self.leaves.insert(obj, leaf);
        }
        self.tree_insert(leaf, is_static);
        self.set_leaf_stamp(leaf, self.stamp);
        self.leaf_add_pairs(leaf, is_static);
        self.stamp += 1;
    }

    /// Removes an object from whichever tree holds it.
    pub fn remove(&mut self, obj: T) -> bool {
        let (leaf, is_static) = match self.leaves.remove(&obj) {
            Some(leaf) => (leaf, false),
            None => match self.static_leaves.remove(&obj) {
                Some(leaf) => (leaf, true),
                None => return false,
            },
        };
        self.tree_remove(leaf, is_static);
        self.pairs_clear(leaf);
        self.recycle_node(leaf);
        true
    }

    /// Updates every dynamic leaf from `bounds` and reports each pair of
    /// overlapping leaves once: dynamic against dynamic and dynamic
    /// against static.
    pub fn reindex_query<B, F>(&mut self, bounds: B, mut func: F)
    where
        B: Fn(T) -> (AABB, Vec2),
        F: FnMut(T, T),
    {
        if self.root.is_none() {
            return;
        }

        let mut leaves = std::mem::take(&mut self.scratch);
        leaves.clear();
        leaves.extend(self.leaves.values().copied());
        for &leaf in &leaves {
            if let Some(obj) = self.leaf_obj(leaf) {
                let (bb, velocity) = bounds(obj);
                self.leaf_update(leaf, bb, velocity, false);
            }
        }
        self.scratch = leaves;

        if let Some(root) = self.root {
            self.mark_subtree(root, &mut func);
        }
        self.stamp += 1;
    }

    /// Refreshes a single object's leaf, in either tree.
    pub fn reindex_object(&mut self, obj: T, bb: AABB, velocity: Vec2) {
        let (leaf, is_static) = match self.leaves.get(&obj) {
            Some(&leaf) => (leaf, false),
            None => match self.static_leaves.get(&obj) {
                Some(&leaf) => (leaf, true),
                None => return,
            },
        };
        if self.leaf_update(leaf, bb, velocity, is_static) {
            self.leaf_add_pairs(leaf, is_static);
        }
        self.stamp += 1;
    }

    /// Refreshes every static leaf whose object moved.
    pub fn reindex_static<B: Fn(T) -> AABB>(&mut self, bounds: B) {
        let mut leaves = std::mem::take(&mut self.scratch);
        leaves.clear();
        leaves.extend(self.static_leaves.values().copied());
        for &leaf in &leaves {
            if let Some(obj) = self.leaf_obj(leaf) {
                if self.leaf_update(leaf, bounds(obj), Vec2::ZERO, true) {
                    self.leaf_add_pairs(leaf, true);
                }
            }
        }
        self.scratch = leaves;
        self.stamp += 1;
    }

    /// Calls `func` for every object whose leaf box touches `bb`.
    pub fn query<F: FnMut(T)>(&self, bb: AABB, mut func: F) {
        for root in [self.static_root, self.root].into_iter().flatten() {
            self.subtree_query(root, bb, &mut func);
        }
    }

    fn subtree_query<F: FnMut(T)>(&self, subtree: usize, bb: AABB, func: &mut F) {
        if !self.nodes[subtree].bb.intersects(&bb) {
            return;
        }
        match self.nodes[subtree].kind {
            NodeKind::Leaf { obj, .. } => func(obj),
            NodeKind::Internal { a, b } => {
                self.subtree_query(a, bb, func);
                self.subtree_query(b, bb, func);
            }
        }
    }

    /// Visits leaves along `a -> b` nearest first. `func` returns the hit
    /// fraction for an object (or infinity) and subtrees entered beyond
    /// the best fraction so far are skipped. Returns the best fraction.
    pub fn segment_query<F: FnMut(T) -> f64>(
        &self,
        a: Vec2,
        b: Vec2,
        t_exit: f64,
        mut func: F,
    ) -> f64 {
        let mut t_exit = t_exit;
        for root in [self.static_root, self.root].into_iter().flatten() {
            t_exit = t_exit.min(self.subtree_segment_query(root, a, b, t_exit, &mut func));
        }
        t_exit
    }

    fn subtree_segment_query<F: FnMut(T) -> f64>(
        &self,
        subtree: usize,
        a: Vec2,
        b: Vec2,
        mut t_exit: f64,
        func: &mut F,
    ) -> f64 {
        let (first, second) = match self.nodes[subtree].kind {
            NodeKind::Leaf { obj, .. } => return func(obj),
            NodeKind::Internal { a: first, b: second } => (first, second),
        };

        let t_first = self.nodes[first].bb.segment_query(a, b);
        let t_second = self.nodes[second].bb.segment_query(a, b);
        let order = if t_first < t_second {
            [(first, t_first), (second, t_second)]
        } else {
            [(second, t_second), (first, t_first)]
        };
        for (child, t_enter) in order {
            if t_enter < t_exit {
                t_exit = t_exit.min(self.subtree_segment_query(child, a, b, t_exit, func));
            }
        }
        t_exit
    }

    /// Visits every object in both trees.
    pub fn each<F: FnMut(T)>(&self, mut func: F) {
        for &leaf in self.leaves.values().chain(self.static_leaves.values()) {
            if let Some(obj) = self.leaf_obj(leaf) {
                func(obj);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    impl<T: Copy + Eq + Hash> BBTree<T> {
        /// Checks parent links and that every internal box bounds its children.
        fn assert_valid(&self) {
            for root in [self.root, self.static_root].into_iter().flatten() {
                assert_eq!(self.nodes[root].parent, None);
                self.assert_subtree(root);
            }
        }

        fn assert_subtree(&self, node: usize) {
            if let Some((a, b)) = self.children(node) {
                assert_eq!(self.nodes[a].parent, Some(node));
                assert_eq!(self.nodes[b].parent, Some(node));
                assert_eq!(self.nodes[node].bb, self.nodes[a].bb.merged(&self.nodes[b].bb));
                self.assert_subtree(a);
                self.assert_subtree(b);
            }
        }
    }

    fn bb_at(x: f64, y: f64, size: f64) -> AABB {
        AABB::new(Vec2::new(x, y), Vec2::new(x + size, y + size))
    }

    fn normalized(pairs: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
        let mut pairs: Vec<_> = pairs
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn test_insert_remove_keeps_tree_valid() {
        let mut tree = BBTree::new();
        for i in 0..20u32 {
            tree.insert(i, bb_at(i as f64 * 1.5, (i % 4) as f64, 1.0), Vec2::ZERO);
            tree.assert_valid();
        }
        assert_eq!(tree.len(), 20);
        for i in (0..20u32).step_by(3) {
            assert!(tree.remove(i));
            tree.assert_valid();
        }
        assert!(!tree.remove(0));
        assert_eq!(tree.len(), 13);
        assert!(!tree.contains(3));
        assert!(tree.contains(4));
    }

    #[test]
    fn test_dynamic_leaves_are_fattened() {
        let mut tree = BBTree::new();
        tree.insert(1u32, bb_at(0.0, 0.0, 10.0), Vec2::new(50.0, 0.0));
        let leaf = tree.leaf_bb(1).unwrap();
        assert_eq!(leaf.min, Vec2::new(-1.0, -1.0));
        assert_eq!(leaf.max, Vec2::new(15.0, 11.0));

        tree.insert_static(2u32, bb_at(0.0, 0.0, 10.0));
        assert_eq!(tree.leaf_bb(2).unwrap(), bb_at(0.0, 0.0, 10.0));
        assert!(tree.is_static(2));
    }

    #[test]
    fn test_reindex_query_reports_each_pair_once() {
        let mut tree = BBTree::new();
        tree.insert(1u32, bb_at(0.0, 0.0, 2.0), Vec2::ZERO);
        tree.insert(2u32, bb_at(1.0, 1.0, 2.0), Vec2::ZERO);
        tree.insert(3u32, bb_at(10.0, 10.0, 1.0), Vec2::ZERO);
        tree.insert_static(100u32, bb_at(-5.0, -1.0, 5.5));

        let boxes = |id: u32| match id {
            1 => (bb_at(0.0, 0.0, 2.0), Vec2::ZERO),
            2 => (bb_at(1.0, 1.0, 2.0), Vec2::ZERO),
            _ => (bb_at(10.0, 10.0, 1.0), Vec2::ZERO),
        };
        for _ in 0..3 {
            let mut found = Vec::new();
            tree.reindex_query(boxes, |a, b| found.push((a, b)));
            assert_eq!(normalized(found), vec![(1, 2), (1, 100)]);
        }
    }

    #[test]
    fn test_reindex_object_and_static() {
        let mut tree = BBTree::new();
        tree.insert(1u32, bb_at(0.0, 0.0, 1.0), Vec2::ZERO);
        tree.insert_static(50u32, bb_at(20.0, 0.0, 1.0));

        let dynamic = |_: u32| (bb_at(0.0, 0.0, 1.0), Vec2::ZERO);
        let mut found = Vec::new();
        tree.reindex_query(dynamic, |a, b| found.push((a, b)));
        assert!(found.is_empty());

        // Move the static box onto the dynamic one.
        tree.reindex_static(|_| bb_at(0.5, 0.5, 1.0));
        tree.reindex_query(dynamic, |a, b| found.push((a, b)));
        assert_eq!(normalized(found.clone()), vec![(1, 50)]);

        found.clear();
        tree.reindex_object(50, bb_at(30.0, 0.0, 1.0), Vec2::ZERO);
        tree.reindex_query(dynamic, |a, b| found.push((a, b)));
        assert!(found.is_empty());
        tree.assert_valid();
    }

    #[test]
    fn test_box_query_covers_both_trees() {
        let mut tree = BBTree::new();
        tree.insert(1u32, bb_at(0.0, 0.0, 1.0), Vec2::ZERO);
        tree.insert(2u32, bb_at(5.0, 5.0, 1.0), Vec2::ZERO);
        tree.insert_static(3u32, bb_at(0.5, 0.0, 1.0));

        let mut hits = Vec::new();
        tree.query(bb_at(0.0, 0.0, 2.0), |obj| hits.push(obj));
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 3]);

        let mut all = Vec::new();
        tree.each(|obj| all.push(obj));
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn test_segment_query_visits_nearest_first() {
        let mut tree = BBTree::new();
        for i in 0..8u32 {
            tree.insert_static(i, bb_at(i as f64 * 4.0, 0.0, 1.0));
        }
        let mut visited = Vec::new();
        let a = Vec2::new(-1.0, 0.5);
        let b = Vec2::new(40.0, 0.5);
        let best = tree.segment_query(a, b, 1.0, |obj| {
            visited.push(obj);
            // Every box is a hit at its entry fraction.
            bb_at(obj as f64 * 4.0, 0.0, 1.0).segment_query(a, b)
        });
        assert_eq!(visited.first(), Some(&0));
        assert!((best - 1.0 / 41.0).abs() < 1e-12);
        // Boxes behind the first hit are pruned.
        assert!(visited.len() < 8);
    }

    type Boxes = Vec<(f64, f64, f64, f64)>;

    fn box_strategy(max: usize) -> impl Strategy<Value = Boxes> {
        prop::collection::vec(
            (-40.0..40.0f64, -40.0..40.0f64, 0.5..8.0f64, 0.5..8.0f64),
            0..max,
        )
    }

    proptest! {
        #[test]
        fn test_reindex_query_matches_brute_force(
            dynamic in box_strategy(40),
            statics in box_strategy(10),
            moves in prop::collection::vec((-4.0..4.0f64, -4.0..4.0f64), 1..5),
        ) {
            let mut tree = BBTree::new();
            let mut current: Vec<AABB> = dynamic
                .iter()
                .map(|&(x, y, w, h)| AABB::new(Vec2::new(x, y), Vec2::new(x + w, y + h)))
                .collect();
            for (i, bb) in current.iter().enumerate() {
                tree.insert(i as u32, *bb, Vec2::ZERO);
            }
            for (k, &(x, y, w, h)) in statics.iter().enumerate() {
                tree.insert_static(1000 + k as u32, AABB::new(Vec2::new(x, y), Vec2::new(x + w, y + h)));
            }

            for (pass, &(dx, dy)) in moves.iter().enumerate() {
                // Only some boxes move each pass.
                let mut velocities = vec![Vec2::ZERO; current.len()];
                for (i, bb) in current.iter_mut().enumerate() {
                    if (i + pass) % 3 != 0 {
                        let delta = Vec2::new(dx, dy);
                        bb.min += delta;
                        bb.max += delta;
                        velocities[i] = delta;
                    }
                }

                let mut reported = Vec::new();
                tree.reindex_query(
                    |id: u32| (current[id as usize], velocities[id as usize]),
                    |a, b| reported.push((a, b)),
                );
                let reported = normalized(reported);
                let unique: HashSet<_> = reported.iter().copied().collect();
                prop_assert_eq!(unique.len(), reported.len());

                let mut expected = Vec::new();
                let ids: Vec<u32> = (0..current.len() as u32)
                    .chain((0..statics.len() as u32).map(|k| 1000 + k))
                    .collect();
                for (n, &i) in ids.iter().enumerate() {
                    for &j in &ids[n + 1..] {
                        if i >= 1000 && j >= 1000 {
                            continue;
                        }
                        let (Some(a), Some(b)) = (tree.leaf_bb(i), tree.leaf_bb(j)) else {
                            continue;
                        };
                        if a.intersects(&b) {
                            expected.push((i, j));
                        }
                    }
                }
                prop_assert_eq!(reported, normalized(expected));

                // Stored boxes always cover the exact ones.
                for (i, bb) in current.iter().enumerate() {
                    let leaf = tree.leaf_bb(i as u32).unwrap();
                    prop_assert!(leaf.contains(bb));
                }
                tree.assert_valid();
            }
        }
    }
}
