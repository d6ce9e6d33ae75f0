//! Per-instruction transfer functions.
//!
//! Three analyzers run per basic block: [`forward_alias`] resolves which
//! memory locations a register may point to, [`forward_taint`] propagates
//! source taint downstream using the resolved aliases, and
//! [`backward_taint`] infers what each parameter/return must sink into.
//! [`crate::fixpoint`] drives all three to a per-method fixpoint.

pub mod backward_taint;
pub mod forward_alias;
pub mod forward_taint;

use crate::access_path::ElementFactory;
use crate::crtex::CanonicalNameConverter;
use crate::features::FeatureFactory;
use crate::intern::Interned;
use crate::ir::{InvokeKind, Method, Program};
use crate::memory_location::MemoryLocationFactory;
use crate::registry::Registry;
use crate::rules::{Rules, UsedKinds};
use crate::transform::TransformsFactory;

/// Read-only context threaded through every transfer function call, bundling
/// the interning factories and policy knobs a call site needs, rather than
/// reaching for global singletons.
pub struct AnalysisContext<'a> {
    pub registry: &'a Registry,
    pub rules: &'a Rules,
    pub used_kinds: &'a UsedKinds,
    pub transforms_factory: &'a TransformsFactory,
    pub kind_factory: &'a crate::kind::KindFactory,
    pub features: &'a FeatureFactory,
    pub locations: &'a MemoryLocationFactory,
    pub elements: &'a ElementFactory,
    pub via_type_of_names: &'a [String],
    pub canonical_name_converter: &'a dyn CanonicalNameConverter,
    pub maximum_source_sink_distance: u32,
    pub class_interval_mode_enabled: bool,
}

/// Resolve the callees of an `invoke`, honoring a statically-known call
/// graph entry first and otherwise joining over overrides unless the
/// static callee's current Model is `NoJoinVirtualOverrides`. Shared by the
/// forward and backward taint passes.
pub fn resolve_callees(
    program: &Program,
    ctx: &AnalysisContext,
    caller: &Interned<Method>,
    invoke_index: usize,
    static_callee: &Interned<Method>,
    kind: InvokeKind,
) -> Vec<Interned<Method>> {
    if program.call_graph.contains_key(&(caller.clone(), invoke_index)) {
        return program.resolved_callees(caller, invoke_index, static_callee, kind);
    }
    let static_model = ctx.registry.get(static_callee);
    if static_model.modes.no_join_virtual_overrides {
        return vec![static_callee.clone()];
    }
    program.resolved_callees(caller, invoke_index, static_callee, kind)
}
