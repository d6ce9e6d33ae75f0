//! `TaintTree` and `TaintAccessPathTree`.
//!
//! A `TaintTree` is a [`crate::tree::Tree`] over `Taint`; a
//! `TaintAccessPathTree` is the `Root -> TaintTree` map used for a Model's
//! generations, sinks, and propagations.

use crate::access_path::{AccessPath, Element, Root};
use crate::frame::ExtraTrace;
use crate::taint::Taint;
use crate::tree::{Tree, WriteKind};
use rustc_hash::FxHashMap;

pub type TaintTree = Tree<Taint>;

/// Join inferred features into every frame a collapse folds together; used
/// as the `on_collapse` callback for `collapse_deeper_than`/`limit_leaves`.
pub fn add_broadening_features(features: &crate::features::FeatureSet) -> impl Fn(&Taint) -> Taint + '_ {
    move |taint: &Taint| {
        taint.transform(|frame| {
            let mut frame = frame.clone();
            frame.add_inferred_features(&crate::features::FeatureMayAlwaysSet::make_always(features.clone()));
            Some(frame)
        })
    }
}

/// Used by the backward analysis: appends the traversed element to
/// every propagation frame's `output_paths` as the read descends.
pub fn propagate_output_path(taint: &Taint, element: &Element) -> Taint {
    taint.transform(|frame| {
        let mut frame = frame.clone();
        frame.append_to_propagation_output_paths(element.clone());
        Some(frame)
    })
}

/// `Root -> TaintTree` map: the domain used for a Model's `generations`,
/// `parameter_sources`, `sinks`, and `propagations`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintAccessPathTree {
    by_root: FxHashMap<Root, TaintTree>,
}

impl TaintAccessPathTree {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.by_root.values().all(TaintTree::is_bottom)
    }

    pub fn write(&mut self, access_path: &AccessPath, taint: Taint, kind: WriteKind, is_singleton: bool) {
        self.by_root
            .entry(access_path.root())
            .or_default()
            .write(access_path.path(), taint, kind, is_singleton);
    }

    /// Like [`Self::write`] but grafts a whole subtree rather than a single
    /// node's value, so descendants below `access_path` are kept rather than
    /// discarded.
    pub fn write_tree(&mut self, access_path: &AccessPath, subtree: TaintTree, kind: WriteKind, is_singleton: bool) {
        self.by_root
            .entry(access_path.root())
            .or_default()
            .write_tree(access_path.path(), subtree, kind, is_singleton);
    }

    pub fn read(&self, access_path: &AccessPath, propagate: impl Fn(&Taint, &Element) -> Taint) -> Taint {
        self.by_root
            .get(&access_path.root())
            .map(|tree| tree.read(access_path.path(), propagate).root_value().clone())
            .unwrap_or_else(Taint::bottom)
    }

    pub fn raw_read(&self, access_path: &AccessPath) -> Taint {
        self.by_root
            .get(&access_path.root())
            .map(|tree| tree.raw_read(access_path.path()).root_value().clone())
            .unwrap_or_else(Taint::bottom)
    }

    pub fn tree_at(&self, root: Root) -> Option<&TaintTree> {
        self.by_root.get(&root)
    }

    pub fn leq(&self, other: &TaintAccessPathTree) -> bool {
        self.by_root.iter().all(|(root, tree)| {
            other
                .by_root
                .get(root)
                .is_some_and(|other_tree| tree.leq(other_tree))
        })
    }

    pub fn join_with(&self, other: &TaintAccessPathTree) -> TaintAccessPathTree {
        let mut by_root = self.by_root.clone();
        for (root, tree) in &other.by_root {
            by_root
                .entry(*root)
                .and_modify(|existing| *existing = existing.join_with(tree))
                .or_insert_with(|| tree.clone());
        }
        TaintAccessPathTree { by_root }
    }

    pub fn widen_with(&self, other: &TaintAccessPathTree) -> TaintAccessPathTree {
        self.join_with(other)
    }

    pub fn collapse_invalid_paths<A: Clone>(
        &self,
        initial: A,
        is_valid: &impl Fn(&A, &Element) -> Option<A>,
        on_collapse: &impl Fn(&Taint) -> Taint,
    ) -> TaintAccessPathTree {
        let by_root = self
            .by_root
            .iter()
            .map(|(root, tree)| (*root, tree.collapse_invalid_paths(initial.clone(), is_valid, on_collapse)))
            .collect();
        TaintAccessPathTree { by_root }
    }

    /// Rebuild every root's tree with `f` applied to each stored `Taint`
    /// (postprocessing's per-group staleness filter).
    pub fn map_taint(&self, f: &impl Fn(&Taint) -> Taint) -> TaintAccessPathTree {
        let by_root = self.by_root.iter().map(|(root, tree)| (*root, tree.map(f))).collect();
        TaintAccessPathTree { by_root }
    }

    /// Record an extra trace on every frame currently stored (used when a
    /// propagation is inferred while reading through another propagation).
    pub fn add_extra_trace_everywhere(&mut self, extra_trace: ExtraTrace) {
        for tree in self.by_root.values_mut() {
            *tree = tree.map(&|taint: &Taint| {
                taint.transform(|frame| {
                    let mut frame = frame.clone();
                    frame.add_extra_trace(extra_trace.clone());
                    Some(frame)
                })
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_path::ElementFactory;
    use crate::frame::{Frame, OriginSet};
    use crate::kind::KindFactory;

    #[test]
    fn write_and_raw_read_round_trip() {
        let elements = ElementFactory::new();
        let kinds = KindFactory::new();
        let mut tree = TaintAccessPathTree::bottom();
        let path = crate::access_path::Path::from_elements(vec![elements.field("x")]);
        let access_path = AccessPath::new(Root::Argument(0), path);
        let taint = Taint::leaf(Frame::leaf(kinds.named("UserInput"), OriginSet::default()));
        tree.write(&access_path, taint.clone(), WriteKind::Strong, true);
        assert!(taint.leq(&tree.raw_read(&access_path)));
    }

    #[test]
    fn join_merges_roots() {
        let kinds = KindFactory::new();
        let mut a = TaintAccessPathTree::bottom();
        a.write(
            &AccessPath::root_only(Root::Argument(0)),
            Taint::leaf(Frame::leaf(kinds.named("A"), OriginSet::default())),
            WriteKind::Strong,
            true,
        );
        let mut b = TaintAccessPathTree::bottom();
        b.write(
            &AccessPath::root_only(Root::Return),
            Taint::leaf(Frame::leaf(kinds.named("B"), OriginSet::default())),
            WriteKind::Strong,
            true,
        );
        let joined = a.join_with(&b);
        assert!(!joined.raw_read(&AccessPath::root_only(Root::Argument(0))).is_bottom());
        assert!(!joined.raw_read(&AccessPath::root_only(Root::Return)).is_bottom());
    }
}
