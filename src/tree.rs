//! Generic access-path tree with closure semantics.
//!
//! Each node stores only the *increment* relative to its parent; reading a
//! path folds the ancestor chain through a caller-supplied `propagate`
//! function, so a node's "real" value is always the join of its own
//! increment with everything above it.

use crate::access_path::{Element, Path};
use crate::lattice::Lattice;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Node<V: Lattice> {
    value: V,
    children: FxHashMap<Element, Node<V>>,
}

impl<V: Lattice> Default for Node<V> {
    fn default() -> Self {
        Node {
            value: V::bottom(),
            children: FxHashMap::default(),
        }
    }
}

impl<V: Lattice> Node<V> {
    fn leaf(value: V) -> Self {
        Node {
            value,
            children: FxHashMap::default(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.value.is_bottom() && self.children.values().all(Node::is_bottom)
    }

    fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.values().map(Node::leaf_count).sum()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Strong,
    Weak,
}

/// A finite-branching tree of `AccessPath -> V`, rooted so that the
/// overall value at any path is the join of every ancestor's increment.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<V: Lattice> {
    root: Node<V>,
}

impl<V: Lattice> Default for Tree<V> {
    fn default() -> Self {
        Tree { root: Node::default() }
    }
}

impl<V: Lattice> Tree<V> {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn leaf(value: V) -> Self {
        Tree { root: Node::leaf(value) }
    }

    pub fn is_bottom(&self) -> bool {
        self.root.is_bottom()
    }

    pub fn root_value(&self) -> &V {
        &self.root.value
    }

    fn node_at_mut(&mut self, path: &Path) -> &mut Node<V> {
        let mut node = &mut self.root;
        for element in path.elements() {
            node = node.children.entry(element.clone()).or_default();
        }
        node
    }

    /// `kind == Strong` replaces the exact subtree at `path`; `Weak` joins
    /// `value` into the node's own increment. A strong write is downgraded
    /// to weak when `is_singleton` is false (the write target is not a
    /// single memory location).
    pub fn write(&mut self, path: &Path, value: V, kind: WriteKind, is_singleton: bool) {
        let node = self.node_at_mut(path);
        let effective_kind = if is_singleton { kind } else { WriteKind::Weak };
        match effective_kind {
            WriteKind::Strong => {
                node.value = value;
                node.children.clear();
            }
            WriteKind::Weak => {
                node.value = node.value.join_with(&value);
            }
        }
    }

    /// Traverse as far as `path` matches, invoking `propagate(ancestor, element)`
    /// at each descent to fold the parent's accumulated value into what is
    /// inherited below. Returns a tree rooted at the accumulated value,
    /// preserving the matched node's own descendants.
    pub fn read(&self, path: &Path, propagate: impl Fn(&V, &Element) -> V) -> Tree<V> {
        let mut accumulated = self.root.value.clone();
        let mut node = &self.root;
        for element in path.elements() {
            let inherited = propagate(&accumulated, element);
            match node.children.get(element) {
                Some(child) => {
                    accumulated = inherited.join_with(&child.value);
                    node = child;
                }
                None => {
                    return Tree {
                        root: Node::leaf(inherited),
                    };
                }
            }
        }
        let mut root = node.clone();
        root.value = accumulated;
        Tree { root }
    }

    /// Like [`Tree::read`] but without folding ancestor values: the subtree
    /// exactly at `path`, or bottom if the path is not present.
    pub fn raw_read(&self, path: &Path) -> Tree<V> {
        let mut node = &self.root;
        for element in path.elements() {
            match node.children.get(element) {
                Some(child) => node = child,
                None => return Tree::bottom(),
            }
        }
        Tree { root: node.clone() }
    }

    pub fn write_tree(&mut self, path: &Path, subtree: Tree<V>, kind: WriteKind, is_singleton: bool) {
        let node = self.node_at_mut(path);
        let effective_kind = if is_singleton { kind } else { WriteKind::Weak };
        match effective_kind {
            WriteKind::Strong => *node = subtree.root,
            WriteKind::Weak => join_node_into(node, &subtree.root),
        }
    }

    pub fn leq(&self, other: &Tree<V>) -> bool
    where
        V: Clone,
    {
        node_leq(&self.root, &other.root, &V::bottom(), &V::bottom())
    }

    pub fn join_with(&self, other: &Tree<V>) -> Tree<V> {
        let mut result = self.clone();
        join_node_into(&mut result.root, &other.root);
        result
    }

    pub fn widen_with(&self, other: &Tree<V>) -> Tree<V> {
        self.join_with(other)
    }

    /// Collapse every subtree deeper than `d` into its ancestor's value,
    /// applying `on_collapse` to whatever gets folded in (e.g. to add a
    /// broadening feature).
    pub fn collapse_deeper_than(&self, d: usize, on_collapse: &impl Fn(&V) -> V) -> Tree<V> {
        Tree {
            root: collapse_deeper_than_node(&self.root, d, on_collapse),
        }
    }

    /// If the tree has more than `max` leaves, collapse from the deepest
    /// level inward until it fits.
    pub fn limit_leaves(&self, max: usize, on_collapse: &impl Fn(&V) -> V) -> Tree<V> {
        if self.root.leaf_count() <= max {
            return self.clone();
        }
        let mut depth = node_depth(&self.root);
        let mut result = self.clone();
        while depth > 0 && result.root.leaf_count() > max {
            depth -= 1;
            result = self.collapse_deeper_than(depth, on_collapse);
        }
        result
    }

    /// Visitor runs `is_valid(accumulator, element)` while descending;
    /// `None` marks an invalid path whose subtree is joined into the
    /// parent. `is_valid` returns the next accumulator for a valid descent.
    pub fn collapse_invalid_paths<A: Clone>(
        &self,
        initial: A,
        is_valid: &impl Fn(&A, &Element) -> Option<A>,
        on_collapse: &impl Fn(&V) -> V,
    ) -> Tree<V> {
        Tree {
            root: collapse_invalid_paths_node(&self.root, &initial, is_valid, on_collapse),
        }
    }

    /// Prune branches in `self` that do not appear in `mold`.
    pub fn shape_with(&self, mold: &Tree<V>, on_collapse: &impl Fn(&V) -> V) -> Tree<V> {
        Tree {
            root: shape_with_node(&self.root, &mold.root, on_collapse),
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&Path, &V)) {
        visit_node(&self.root, &mut Path::empty(), f);
    }

    /// Apply `f` to every node's own increment, preserving tree shape.
    pub fn map(&self, f: &impl Fn(&V) -> V) -> Tree<V> {
        Tree {
            root: map_node(&self.root, f),
        }
    }
}

fn map_node<V: Lattice>(node: &Node<V>, f: &impl Fn(&V) -> V) -> Node<V> {
    Node {
        value: f(&node.value),
        children: node
            .children
            .iter()
            .map(|(element, child)| (element.clone(), map_node(child, f)))
            .collect(),
    }
}

fn node_leq<V: Lattice>(a: &Node<V>, b: &Node<V>, a_ancestor: &V, b_ancestor: &V) -> bool {
    let a_total = a_ancestor.join_with(&a.value);
    let b_total = b_ancestor.join_with(&b.value);
    if !a_total.leq(&b_total) {
        return false;
    }
    for (element, a_child) in &a.children {
        let empty = Node::default();
        let b_child = b.children.get(element).unwrap_or(&empty);
        if !node_leq(a_child, b_child, &a_total, &b_total) {
            return false;
        }
    }
    true
}

fn join_node_into<V: Lattice>(node: &mut Node<V>, other: &Node<V>) {
    node.value = node.value.join_with(&other.value);
    for (element, other_child) in &other.children {
        let child = node.children.entry(element.clone()).or_default();
        join_node_into(child, other_child);
    }
}

fn collapse_deeper_than_node<V: Lattice>(node: &Node<V>, d: usize, on_collapse: &impl Fn(&V) -> V) -> Node<V> {
    if d == 0 {
        let mut folded = node.value.clone();
        fold_all(node, &mut folded);
        return Node::leaf(on_collapse(&folded));
    }
    let mut result = Node::leaf(node.value.clone());
    for (element, child) in &node.children {
        result
            .children
            .insert(element.clone(), collapse_deeper_than_node(child, d - 1, on_collapse));
    }
    result
}

fn fold_all<V: Lattice>(node: &Node<V>, acc: &mut V) {
    for child in node.children.values() {
        *acc = acc.join_with(&child.value);
        fold_all(child, acc);
    }
}

fn node_depth<V: Lattice>(node: &Node<V>) -> usize {
    node.children.values().map(|c| 1 + node_depth(c)).max().unwrap_or(0)
}

fn collapse_invalid_paths_node<V: Lattice, A: Clone>(
    node: &Node<V>,
    acc: &A,
    is_valid: &impl Fn(&A, &Element) -> Option<A>,
    on_collapse: &impl Fn(&V) -> V,
) -> Node<V> {
    let mut result = Node::leaf(node.value.clone());
    for (element, child) in &node.children {
        match is_valid(acc, element) {
            Some(next_acc) => {
                result
                    .children
                    .insert(element.clone(), collapse_invalid_paths_node(child, &next_acc, is_valid, on_collapse));
            }
            None => {
                let mut folded = child.value.clone();
                fold_all(child, &mut folded);
                result.value = result.value.join_with(&on_collapse(&folded));
            }
        }
    }
    result
}

fn shape_with_node<V: Lattice>(node: &Node<V>, mold: &Node<V>, on_collapse: &impl Fn(&V) -> V) -> Node<V> {
    let mut result = Node::leaf(node.value.clone());
    for (element, child) in &node.children {
        match mold.children.get(element) {
            Some(mold_child) => {
                result
                    .children
                    .insert(element.clone(), shape_with_node(child, mold_child, on_collapse));
            }
            None => {
                let mut folded = child.value.clone();
                fold_all(child, &mut folded);
                result.value = result.value.join_with(&on_collapse(&folded));
            }
        }
    }
    result
}

fn visit_node<V: Lattice>(node: &Node<V>, path: &mut Path, f: &mut impl FnMut(&Path, &V)) {
    f(path, &node.value);
    for (element, child) in &node.children {
        path.append(element.clone());
        visit_node(child, path, f);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_path::ElementFactory;
    use crate::kind::KindFactory;
    use crate::taint::Taint;

    fn path(factory: &ElementFactory, names: &[&str]) -> Path {
        Path::from_elements(names.iter().map(|n| factory.field(*n)).collect())
    }

    #[test]
    fn write_strong_replaces_subtree() {
        let elements = ElementFactory::new();
        let kinds = KindFactory::new();
        let mut tree: Tree<Taint> = Tree::bottom();
        let leaf_a = Taint::leaf(crate::frame::Frame::leaf(kinds.named("A"), Default::default()));
        let leaf_b = Taint::leaf(crate::frame::Frame::leaf(kinds.named("B"), Default::default()));
        tree.write(&path(&elements, &["x"]), leaf_a, WriteKind::Strong, true);
        tree.write(&path(&elements, &["x"]), leaf_b.clone(), WriteKind::Strong, true);
        let read = tree.raw_read(&path(&elements, &["x"]));
        assert_eq!(read.root_value(), &leaf_b);
    }

    #[test]
    fn read_folds_ancestor_via_propagate() {
        let elements = ElementFactory::new();
        let kinds = KindFactory::new();
        let mut tree: Tree<Taint> = Tree::bottom();
        let root_taint = Taint::leaf(crate::frame::Frame::leaf(kinds.named("Root"), Default::default()));
        tree.write(&Path::empty(), root_taint.clone(), WriteKind::Strong, true);

        let read = tree.read(&path(&elements, &["x"]), |ancestor, _element| ancestor.clone());
        assert!(root_taint.leq(read.root_value()));
    }

    #[test]
    fn collapse_deeper_than_zero_folds_everything_into_root() {
        let elements = ElementFactory::new();
        let kinds = KindFactory::new();
        let mut tree: Tree<Taint> = Tree::bottom();
        let child_taint = Taint::leaf(crate::frame::Frame::leaf(kinds.named("Child"), Default::default()));
        tree.write(&path(&elements, &["x"]), child_taint.clone(), WriteKind::Strong, true);

        let collapsed = tree.collapse_deeper_than(0, &|v| v.clone());
        assert!(child_taint.leq(collapsed.root_value()));
    }

    #[test]
    fn join_with_unions_branches() {
        let elements = ElementFactory::new();
        let kinds = KindFactory::new();
        let mut a: Tree<Taint> = Tree::bottom();
        a.write(
            &path(&elements, &["x"]),
            Taint::leaf(crate::frame::Frame::leaf(kinds.named("A"), Default::default())),
            WriteKind::Strong,
            true,
        );
        let mut b: Tree<Taint> = Tree::bottom();
        b.write(
            &path(&elements, &["y"]),
            Taint::leaf(crate::frame::Frame::leaf(kinds.named("B"), Default::default())),
            WriteKind::Strong,
            true,
        );
        let joined = a.join_with(&b);
        assert!(!joined.raw_read(&path(&elements, &["x"])).is_bottom());
        assert!(!joined.raw_read(&path(&elements, &["y"])).is_bottom());
    }
}
