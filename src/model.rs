//! `Model` and `FieldModel`: the per-method/per-field summaries that the
//! fixpoint driver grows.

use crate::access_path::{AccessPath, Root};
use crate::features::FeatureSet;
use crate::frame::Frame;
use crate::intern::Interned;
use crate::ir::{CallClassIntervalContext, Method};
use crate::taint::Taint;
use crate::taint_tree::TaintTree;
use rustc_hash::FxHashSet;

/// Per-port boolean flags on a Model, joined by logical OR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    pub skip_analysis: bool,
    pub taint_in_taint_out: bool,
    pub taint_in_taint_this: bool,
    pub no_join_virtual_overrides: bool,
    pub add_via_obscure_feature: bool,
    pub no_collapse_on_approximate: bool,
}

impl Modes {
    /// The conservative summary installed when a per-method analysis is
    /// aborted by a timeout.
    pub fn degrade_to_taint_through() -> Self {
        Modes {
            skip_analysis: true,
            taint_in_taint_out: true,
            taint_in_taint_this: true,
            no_join_virtual_overrides: true,
            add_via_obscure_feature: true,
            no_collapse_on_approximate: false,
        }
    }

    pub fn join_with(&self, other: &Modes) -> Modes {
        Modes {
            skip_analysis: self.skip_analysis || other.skip_analysis,
            taint_in_taint_out: self.taint_in_taint_out || other.taint_in_taint_out,
            taint_in_taint_this: self.taint_in_taint_this || other.taint_in_taint_this,
            no_join_virtual_overrides: self.no_join_virtual_overrides || other.no_join_virtual_overrides,
            add_via_obscure_feature: self.add_via_obscure_feature || other.add_via_obscure_feature,
            no_collapse_on_approximate: self.no_collapse_on_approximate || other.no_collapse_on_approximate,
        }
    }

    pub fn leq(&self, other: &Modes) -> bool {
        (!self.skip_analysis || other.skip_analysis)
            && (!self.taint_in_taint_out || other.taint_in_taint_out)
            && (!self.taint_in_taint_this || other.taint_in_taint_this)
            && (!self.no_join_virtual_overrides || other.no_join_virtual_overrides)
            && (!self.add_via_obscure_feature || other.add_via_obscure_feature)
            && (!self.no_collapse_on_approximate || other.no_collapse_on_approximate)
    }
}

/// A declared (`input_port -> output_port`, optional transform) summary
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    pub input: AccessPath,
    pub output: AccessPath,
    pub transforms: Option<crate::intern::Interned<crate::transform::TransformList>>,
}

/// Bounds applied by `Model::approximate` after each per-method fixpoint
/// step.
#[derive(Debug, Clone, Copy)]
pub struct Heuristics {
    pub max_input_path_depth: usize,
    pub max_input_path_leaves: usize,
    pub max_output_path_depth: usize,
    pub max_output_path_leaves: usize,
    pub propagation_max_collapse_depth: u32,
    pub generation_max_port_size: usize,
    pub sink_max_port_size: usize,
    pub max_number_iterations: usize,
}

impl Default for Heuristics {
    fn default() -> Self {
        Heuristics {
            max_input_path_depth: 4,
            max_input_path_leaves: 20,
            max_output_path_depth: 4,
            max_output_path_leaves: 20,
            propagation_max_collapse_depth: 4,
            generation_max_port_size: 20,
            sink_max_port_size: 20,
            max_number_iterations: 100,
        }
    }
}

/// A reported source-to-sink trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub rule_code: u32,
    pub source_kind: String,
    pub sink_kind: String,
    pub callee_port: AccessPath,
}

/// Per-method summary: the product of generations, sources, sinks,
/// propagations, call effects, sanitizers and the flags above.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub generations: TaintAccessPathTreeByRoot,
    pub parameter_sources: TaintAccessPathTreeByRoot,
    pub sinks: TaintAccessPathTreeByRoot,
    pub propagations: Vec<Propagation>,
    pub call_effect_sources: TaintTree,
    pub call_effect_sinks: TaintTree,
    pub global_sanitizers: FeatureSet,
    pub port_sanitizers: Vec<(Root, FeatureSet)>,
    pub add_features_to_arguments: Vec<(Root, FeatureSet)>,
    pub issues: Vec<Issue>,
    pub modes: Modes,
    pub frozen: bool,
    pub class_interval_context: CallClassIntervalContext,
}

/// Thin wrapper so `Model` can reuse `TaintAccessPathTree`'s lattice ops by
/// name while keeping the field type self-documenting in `Model`.
pub type TaintAccessPathTreeByRoot = crate::taint_tree::TaintAccessPathTree;

impl Model {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.generations.is_bottom()
            && self.parameter_sources.is_bottom()
            && self.sinks.is_bottom()
            && self.propagations.is_empty()
            && self.call_effect_sources.is_bottom()
            && self.call_effect_sinks.is_bottom()
            && self.issues.is_empty()
    }

    pub fn join_with(&self, other: &Model) -> Model {
        let mut propagations = self.propagations.clone();
        for propagation in &other.propagations {
            if !propagations.contains(propagation) {
                propagations.push(propagation.clone());
            }
        }
        let mut issues = self.issues.clone();
        for issue in &other.issues {
            if !issues.contains(issue) {
                issues.push(issue.clone());
            }
        }
        Model {
            generations: self.generations.join_with(&other.generations),
            parameter_sources: self.parameter_sources.join_with(&other.parameter_sources),
            sinks: self.sinks.join_with(&other.sinks),
            propagations,
            call_effect_sources: self.call_effect_sources.join_with(&other.call_effect_sources),
            call_effect_sinks: self.call_effect_sinks.join_with(&other.call_effect_sinks),
            global_sanitizers: self.global_sanitizers.union(&other.global_sanitizers),
            port_sanitizers: merge_port_features(&self.port_sanitizers, &other.port_sanitizers),
            add_features_to_arguments: merge_port_features(
                &self.add_features_to_arguments,
                &other.add_features_to_arguments,
            ),
            issues,
            modes: self.modes.join_with(&other.modes),
            frozen: self.frozen || other.frozen,
            class_interval_context: self.class_interval_context.join(&other.class_interval_context),
        }
    }

    pub fn leq(&self, other: &Model) -> bool {
        self.generations.leq(&other.generations)
            && self.parameter_sources.leq(&other.parameter_sources)
            && self.sinks.leq(&other.sinks)
            && self.propagations.iter().all(|p| other.propagations.contains(p))
            && self.call_effect_sources.leq(&other.call_effect_sources)
            && self.call_effect_sinks.leq(&other.call_effect_sinks)
            && self.issues.iter().all(|i| other.issues.contains(i))
            && self.modes.leq(&other.modes)
    }

    /// Collapse/limit every growing dimension per `heuristics` and fold
    /// `broadening_features` into anything that gets collapsed.
    pub fn approximate(&self, broadening_features: &FeatureSet, heuristics: &Heuristics) -> Model {
        if self.modes.no_collapse_on_approximate {
            return self.clone();
        }
        let on_collapse = crate::taint_tree::add_broadening_features(broadening_features);
        let collapse_root = |tree: &TaintAccessPathTreeByRoot, depth: usize, leaves: usize| -> TaintAccessPathTreeByRoot {
            let mut out = TaintAccessPathTreeByRoot::bottom();
            for root in [
                Root::Return,
                Root::Leaf,
                Root::Anchor,
                Root::Producer,
                Root::CanonicalThis,
            ] {
                if let Some(t) = tree.tree_at(root) {
                    let collapsed = t.collapse_deeper_than(depth, &on_collapse);
                    let limited = collapsed.limit_leaves(leaves, &on_collapse);
                    out.write_tree(&AccessPath::root_only(root), limited, crate::tree::WriteKind::Strong, true);
                }
            }
            for i in 0..64 {
                let root = Root::Argument(i);
                if let Some(t) = tree.tree_at(root) {
                    let collapsed = t.collapse_deeper_than(depth, &on_collapse);
                    let limited = collapsed.limit_leaves(leaves, &on_collapse);
                    out.write_tree(&AccessPath::root_only(root), limited, crate::tree::WriteKind::Strong, true);
                }
            }
            out
        };
        Model {
            generations: collapse_root(&self.generations, heuristics.max_output_path_depth, heuristics.generation_max_port_size),
            parameter_sources: collapse_root(&self.parameter_sources, heuristics.max_output_path_depth, heuristics.generation_max_port_size),
            sinks: collapse_root(&self.sinks, heuristics.max_input_path_depth, heuristics.sink_max_port_size),
            propagations: self.propagations.clone(),
            call_effect_sources: self.call_effect_sources.clone(),
            call_effect_sinks: self.call_effect_sinks.clone(),
            global_sanitizers: self.global_sanitizers.clone(),
            port_sanitizers: self.port_sanitizers.clone(),
            add_features_to_arguments: self.add_features_to_arguments.clone(),
            issues: self.issues.clone(),
            modes: self.modes,
            frozen: self.frozen,
            class_interval_context: self.class_interval_context,
        }
    }

    /// Prune access paths that are not reachable through `method`'s
    /// parameter types. `has_field` answers whether
    /// `type_name.element` is a valid member, as provided by the frontend.
    pub fn collapse_invalid_paths(
        &self,
        method: &Method,
        has_field: &impl Fn(&str, &crate::access_path::Element) -> Option<String>,
        on_collapse: &impl Fn(&Taint) -> Taint,
    ) -> Model {
        let initial_type = |root: Root| -> Option<String> {
            root.parameter_position()
                .and_then(|position| method.parameter_types.get(position as usize).cloned())
        };
        let is_valid = |ty: &String, element: &crate::access_path::Element| has_field(ty, element);
        let collapse_tree = |tree: &TaintAccessPathTreeByRoot| -> TaintAccessPathTreeByRoot {
            let mut out = tree.clone();
            for i in 0..method.number_of_parameters() {
                let root = Root::Argument(i);
                if let Some(ty) = initial_type(root) {
                    if let Some(t) = tree.tree_at(root) {
                        let pruned = t.collapse_invalid_paths(ty, &is_valid, on_collapse);
                        out.write_tree(&AccessPath::root_only(root), pruned, crate::tree::WriteKind::Strong, true);
                    }
                }
            }
            out
        };
        Model {
            generations: collapse_tree(&self.generations),
            parameter_sources: collapse_tree(&self.parameter_sources),
            sinks: collapse_tree(&self.sinks),
            ..self.clone()
        }
    }

    pub fn referenced_kind_names(&self) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        let mut collect = |tree: &TaintAccessPathTreeByRoot| {
            for root in [
                Root::Return,
                Root::Leaf,
                Root::Anchor,
                Root::Producer,
                Root::CanonicalThis,
            ] {
                if let Some(t) = tree.tree_at(root) {
                    t.visit(&mut |_path, taint: &Taint| {
                        taint.visit(|frame: &Frame| {
                            if let crate::kind::Kind::Named(n) = &**frame.kind() {
                                names.insert(n.clone());
                            }
                        });
                    });
                }
            }
        };
        collect(&self.generations);
        collect(&self.parameter_sources);
        collect(&self.sinks);
        names
    }
}

fn merge_port_features(a: &[(Root, FeatureSet)], b: &[(Root, FeatureSet)]) -> Vec<(Root, FeatureSet)> {
    let mut merged: Vec<(Root, FeatureSet)> = a.to_vec();
    for (root, features) in b {
        if let Some(existing) = merged.iter_mut().find(|(r, _)| r == root) {
            existing.1 = existing.1.union(features);
        } else {
            merged.push((*root, features.clone()));
        }
    }
    merged
}

/// Restricted summary for a field: sources/sinks only, grounded on
/// `FieldModel.cpp`.
#[derive(Debug, Clone, Default)]
pub struct FieldModel {
    pub sources: TaintTree,
    pub sinks: TaintTree,
}

impl FieldModel {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn join_with(&self, other: &FieldModel) -> FieldModel {
        FieldModel {
            sources: self.sources.join_with(&other.sources),
            sinks: self.sinks.join_with(&other.sinks),
        }
    }

    pub fn leq(&self, other: &FieldModel) -> bool {
        self.sources.leq(&other.sources) && self.sinks.leq(&other.sinks)
    }
}
