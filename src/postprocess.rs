//! Trace validation after the interprocedural fixpoint settles: drop frames
//! whose `(callee, port, kind)` triple no longer exists in the callee's own
//! `Model`.
//!
//! A frame's callee/port/kind triple can go stale two ways: a later
//! pruning pass removes taint from the callee's declared sources/sinks, or
//! [`crate::rules::UsedKinds`] drops a kind the rules no longer reference.
//! Removing a dangling frame from one method's `Model` can make its own
//! callers' frames dangling in turn, so [`remove_collapsed_traces`] reruns
//! the same dependents-as-worklist loop [`crate::driver::analyze_program`]
//! uses, just over a pure pruning step instead of the fixpoint transfer
//! functions.

use crate::driver::Dependencies;
use crate::frame::CallInfo;
use crate::intern::Interned;
use crate::ir::Method;
use crate::kind::Kind;
use crate::model::Model;
use crate::registry::Registry;
use crate::taint::Taint;
use crate::taint_tree::TaintTree;
use rustc_hash::FxHashSet;

/// Whether `model` still has any frame of `kind` at `port`, checked across
/// every taint-bearing field: a frame's callee reference may have been
/// produced while reading the callee's generations, parameter sources, or
/// sinks, and any of the three still being present keeps the reference live.
fn callee_still_produces(model: &Model, port: &crate::access_path::AccessPath, kind: &Interned<Kind>) -> bool {
    model.generations.raw_read(port).contains_kind(kind)
        || model.parameter_sources.raw_read(port).contains_kind(kind)
        || model.sinks.raw_read(port).contains_kind(kind)
}

/// Rebuild `taint`, dropping any `Some(callee)` group's `(port, kind)`
/// subgroup whose callee no longer produces that triple. Groups with no
/// callee (`CallInfo::Declaration`/`Origin` frames local to this method)
/// never reference another method's `Model` and are always kept.
fn drop_stale_groups(taint: &Taint, registry: &Registry) -> Taint {
    let mut result = Taint::bottom();
    for group in taint.groups() {
        let call_info = group.call_info().unwrap_or(CallInfo::CallSite);
        let callee_model = group.callee().map(|callee| registry.get(callee));
        for (position, ports) in group.positions() {
            let Some(port) = ports.callee_port() else { continue };
            for kind_frames in ports.kinds() {
                let Some(kind) = kind_frames.kind() else { continue };
                let live = match &callee_model {
                    None => true,
                    Some(model) => callee_still_produces(model, port, kind),
                };
                if !live {
                    continue;
                }
                for frame in kind_frames.frames() {
                    result.add_frame(group.callee().cloned(), call_info, position.clone(), port.clone(), frame.clone());
                }
            }
        }
    }
    result
}

fn prune_taint_tree(tree: &TaintTree, registry: &Registry) -> TaintTree {
    tree.map(&|taint: &Taint| drop_stale_groups(taint, registry))
}

/// One pass of pruning: every taint-bearing field of `model` with
/// dangling callee references removed, everything else (propagations,
/// sanitizers, modes, issues) untouched.
fn prune_model(model: &Model, registry: &Registry) -> Model {
    Model {
        generations: model.generations.map_taint(&|taint| drop_stale_groups(taint, registry)),
        parameter_sources: model.parameter_sources.map_taint(&|taint| drop_stale_groups(taint, registry)),
        sinks: model.sinks.map_taint(&|taint| drop_stale_groups(taint, registry)),
        call_effect_sources: prune_taint_tree(&model.call_effect_sources, registry),
        call_effect_sinks: prune_taint_tree(&model.call_effect_sinks, registry),
        ..model.clone()
    }
}

/// Prune every `Model` in `registry` to a fixpoint: each pass drops
/// dangling callee references, and any method whose `Model` actually
/// shrank re-enqueues its dependents (computed once by the driver and
/// passed in here, since the relation does not depend on taint content).
pub fn remove_collapsed_traces(registry: &Registry, dependencies: &Dependencies) {
    let mut frontier: FxHashSet<Interned<Method>> = registry.methods().into_iter().collect();
    let mut pass = 0;
    while !frontier.is_empty() {
        pass += 1;
        let batch: Vec<Interned<Method>> = frontier.drain().collect();
        let mut next_frontier = FxHashSet::default();
        for method in batch {
            let model = registry.get(&method);
            let pruned = prune_model(&model, registry);
            if model.leq(&pruned) {
                continue;
            }
            registry.set(method.clone(), pruned);
            for dependent in dependencies.dependents_of(&method) {
                next_frontier.insert(dependent.clone());
            }
        }
        tracing::debug!(pass, shrunk = next_frontier.len(), "trace pruning pass");
        frontier = next_frontier;
    }
    tracing::info!(passes = pass, "trace pruning converged");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_path::{AccessPath, Root};
    use crate::frame::{Frame, OriginSet};
    use crate::ir::{BasicBlock, BlockId, ControlFlowGraph, Program};
    use crate::kind::KindFactory;
    use crate::taint::CallSite;
    use crate::transfer::AnalysisContext;
    use crate::tree::WriteKind;

    fn straight_line_cfg() -> ControlFlowGraph {
        let entry = BlockId(0);
        let mut blocks = rustc_hash::FxHashMap::default();
        blocks.insert(entry, BasicBlock { id: entry, instructions: vec![], successors: vec![], predecessors: vec![] });
        ControlFlowGraph { entry, blocks, back_edges: vec![] }
    }

    fn method(signature: &str) -> Interned<Method> {
        let interner: crate::intern::Interner<Method> = crate::intern::Interner::new();
        interner.intern(Method {
            signature: signature.to_string(),
            class_name: "A".to_string(),
            parameter_types: vec!["Ljava/lang/String;".to_string()],
            return_type: "V".to_string(),
            is_static: true,
        })
    }

    #[test]
    fn dangling_callee_reference_is_removed() {
        let kinds = KindFactory::new();
        let registry = Registry::new();
        let caller = method("LA;.caller");
        let callee = method("LA;.callee");

        // Caller's sink references a frame it learned about by calling
        // `callee`, at `callee`'s `Argument(0)` sink port.
        let site = CallSite {
            callee: callee.clone(),
            callee_port: AccessPath::root_only(Root::Argument(0)),
            call_position: None,
            source_register_types: &rustc_hash::FxHashMap::default(),
            source_constant_arguments: &rustc_hash::FxHashMap::default(),
            class_interval_context: crate::ir::CallClassIntervalContext::top(),
            caller_class_interval: crate::ir::ClassInterval::top(),
            class_interval_mode_enabled: false,
            maximum_source_sink_distance: 10,
            features: &crate::features::FeatureFactory::new(),
            via_type_of_names: &[],
            canonical_name_converter: &crate::crtex::DefaultCanonicalNameConverter,
        };
        let leaf = Taint::leaf(Frame::leaf(kinds.named("Log"), OriginSet::default()));
        let propagated = leaf.propagate(&site);

        let mut caller_model = Model::bottom();
        caller_model.sinks.write(&AccessPath::root_only(Root::Argument(0)), propagated, WriteKind::Strong, true);
        registry.set(caller.clone(), caller_model);

        // Callee currently has no sink at Argument(0): the reference is stale.
        registry.set(callee.clone(), Model::bottom());

        let mut program = Program::new();
        program.methods = vec![caller.clone(), callee.clone()];
        program.cfgs.insert(caller.clone(), straight_line_cfg());
        program.cfgs.insert(callee.clone(), straight_line_cfg());

        let locations = crate::memory_location::MemoryLocationFactory::new();
        let elements = crate::access_path::ElementFactory::new();
        let rules = crate::rules::Rules::new();
        let used_kinds = crate::rules::UsedKinds::new();
        let transforms_factory = crate::transform::TransformsFactory::new();
        let features = crate::features::FeatureFactory::new();
        let converter = crate::crtex::DefaultCanonicalNameConverter;
        let ctx = AnalysisContext {
            registry: &registry,
            rules: &rules,
            used_kinds: &used_kinds,
            transforms_factory: &transforms_factory,
            kind_factory: &kinds,
            features: &features,
            locations: &locations,
            elements: &elements,
            via_type_of_names: &[],
            canonical_name_converter: &converter,
            maximum_source_sink_distance: 10,
            class_interval_mode_enabled: false,
        };
        let dependencies = Dependencies::build(&program, &ctx);

        remove_collapsed_traces(&registry, &dependencies);

        let pruned = registry.get(&caller);
        assert!(pruned.sinks.raw_read(&AccessPath::root_only(Root::Argument(0))).is_bottom());
    }
}
