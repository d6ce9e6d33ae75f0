//! Backward taint analysis: infer what each parameter, field, and argument
//! must eventually satisfy downstream, and seed the local propagation
//! frames a method's own `Propagations` are later read off of.
//!
//! Grounded on `BackwardTaintEnvironment.cpp`: the state is a plain
//! `MemoryLocation.root -> TaintTree` map (the same shape [`TaintEnvironment`]
//! already gives the forward pass), but every read goes through
//! [`crate::taint_tree::propagate_output_path`] rather than the identity
//! propagator, so a read that descends through a field or array-index path
//! records the traversed element in the frame's `output_paths`. The forward
//! pass never does this; backward is the only place `output_paths` grows.

use super::AnalysisContext;
use crate::access_path::Root;
use crate::environment::ForwardAliasEnvironment;
use crate::frame::{CollapseDepth, Frame, OriginSet};
use crate::intern::Interned;
use crate::ir::{Instruction, InvokeKind, Method, Program};
use crate::model::Heuristics;
use crate::taint::Taint;
use crate::taint_tree::propagate_output_path;
use crate::tree::WriteKind;

/// Structurally identical to the forward pass's [`crate::environment::TaintEnvironment`];
/// the only difference is in how callers read it (always through
/// `propagate_output_path`, never the identity propagator).
pub type BackwardTaintEnvironment = crate::environment::TaintEnvironment;

/// A JVM type descriptor names an object (including arrays), as opposed to
/// a primitive, iff it starts with `L` or `[` (frontend type representation
/// conventions, out of scope to derive beyond this syntactic check).
fn is_object_type(descriptor: &str) -> bool {
    descriptor.starts_with('L') || descriptor.starts_with('[')
}

fn seed_local_propagation(env: &mut BackwardTaintEnvironment, position: u32, heuristics: &Heuristics, ctx: &AnalysisContext) {
    let kind = ctx.kind_factory.propagation(Root::Argument(position));
    let mut frame = Frame::leaf(kind, OriginSet::default());
    frame.update_maximum_collapse_depth(CollapseDepth(heuristics.propagation_max_collapse_depth));
    let location = ctx.locations.parameter(position);
    env.write(&location, Taint::leaf(frame), WriteKind::Strong, true);
}

/// Seed the receiver, and every object-typed argument when
/// `propagate_across_arguments` is enabled, with a local `Propagation`
/// frame whose `output_paths` starts at `{ε: max_collapse_depth}`, grounded
/// on `BackwardTaintEnvironment::initial`. A frozen previous Model's
/// Propagations are never re-inferred.
pub fn initial_state(
    method: &Method,
    propagate_across_arguments: bool,
    previous_propagations_frozen: bool,
    heuristics: &Heuristics,
    ctx: &AnalysisContext,
) -> BackwardTaintEnvironment {
    let mut env = BackwardTaintEnvironment::bottom();
    if previous_propagations_frozen {
        return env;
    }

    if !method.is_static {
        seed_local_propagation(&mut env, 0, heuristics, ctx);
    }
    if propagate_across_arguments {
        let first_explicit_position = if method.is_static { 0 } else { 1 };
        for (offset, parameter_type) in method.parameter_types.iter().enumerate() {
            if is_object_type(parameter_type) {
                seed_local_propagation(&mut env, first_explicit_position + offset as u32, heuristics, ctx);
            }
        }
    }
    env
}

/// Apply one instruction's backward effect: what must register/location
/// producers supply so that their consumers' current requirements (already
/// recorded in `env`, since we walk instructions in reverse) are met.
/// Mirrors [`super::forward_taint::apply_instruction`]'s instruction coverage
/// with producer and consumer swapped.
#[allow(clippy::too_many_arguments)]
pub fn apply_instruction(
    env: &BackwardTaintEnvironment,
    alias_env: &ForwardAliasEnvironment,
    instruction: &Instruction,
    invoke_index: usize,
    caller: &Interned<Method>,
    program: &Program,
    ctx: &AnalysisContext,
) -> BackwardTaintEnvironment {
    let mut env = env.clone();

    match instruction {
        Instruction::Move { dest, src } => {
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let src_locations = alias_env.memory_locations.locations(*src);
            let required = env.deep_read(&dest_locations, propagate_output_path);
            env.deep_write(&src_locations, required, WriteKind::Weak);
        }
        Instruction::IGet { dest, object, field } => {
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let object_locations = alias_env.memory_locations.locations(*object);
            let required = env.deep_read(&dest_locations, propagate_output_path);
            let field_locations: rustc_hash::FxHashSet<_> = object_locations
                .iter()
                .map(|loc| ctx.locations.field(loc.clone(), field.clone()))
                .collect();
            env.deep_write(&field_locations, required, WriteKind::Weak);
        }
        Instruction::AGet { dest, .. } => {
            // `dest` already aliases the array-element location directly
            // (`forward_alias::apply_instruction`'s `AGet` arm); nothing
            // beyond a refresh is needed, matching the forward pass's own
            // simplification for this instruction.
            let locations = alias_env.memory_locations.locations(*dest);
            let required = env.deep_read(&locations, propagate_output_path);
            env.deep_write(&locations, required, WriteKind::Weak);
        }
        Instruction::IPut { value, object, field } => {
            let value_locations = alias_env.memory_locations.locations(*value);
            let object_locations = alias_env.memory_locations.locations(*object);
            let field_locations: rustc_hash::FxHashSet<_> = object_locations
                .iter()
                .map(|loc| ctx.locations.field(loc.clone(), field.clone()))
                .collect();
            let required = env.deep_read(&field_locations, propagate_output_path);
            env.deep_write(&value_locations, required, WriteKind::Weak);
        }
        Instruction::APut { value, array } => {
            let value_locations = alias_env.memory_locations.locations(*value);
            let array_locations = alias_env.memory_locations.locations(*array);
            let required = env.deep_read(&array_locations, propagate_output_path);
            env.deep_write(&value_locations, required, WriteKind::Weak);
        }
        Instruction::Invoke { kind, callee, args } => {
            let callees = super::resolve_callees(program, ctx, caller, invoke_index, callee, *kind);
            for resolved_callee in &callees {
                let callee_model = ctx.registry.get(resolved_callee);

                // The callee's own sinks grow whichever argument register
                // feeds that port.
                for (i, &arg_register) in args.iter().enumerate() {
                    if let Some(sink_tree) = callee_model.sinks.tree_at(Root::Argument(i as u32)) {
                        let sink_taint = sink_tree.root_value().clone();
                        if !sink_taint.is_bottom() {
                            let arg_locations = alias_env.memory_locations.locations(arg_register);
                            env.deep_write(&arg_locations, sink_taint, WriteKind::Weak);
                        }
                    }
                }

                // Propagations run in reverse: whatever is required at the
                // output port becomes required at the matching input port,
                // through the transform reversed.
                for propagation in &callee_model.propagations {
                    let Some(input_position) = propagation.input.root().parameter_position() else {
                        continue;
                    };
                    let Some(&in_register) = args.get(input_position as usize) else {
                        continue;
                    };
                    let required_at_output = match propagation.output.root() {
                        Root::Return => alias_env
                            .last_invoke_result
                            .as_ref()
                            .map(|location| env.read(location, propagate_output_path))
                            .unwrap_or_else(Taint::bottom),
                        other_root => other_root
                            .parameter_position()
                            .and_then(|position| args.get(position as usize))
                            .map(|&register| {
                                env.deep_read(&alias_env.memory_locations.locations(register), propagate_output_path)
                            })
                            .unwrap_or_else(Taint::bottom),
                    };
                    if required_at_output.is_bottom() {
                        continue;
                    }
                    let transformed = match &propagation.transforms {
                        Some(transforms) => {
                            let reversed = ctx.transforms_factory.reverse(transforms);
                            required_at_output.transform(|frame| {
                                let mut frame = frame.clone();
                                let new_kind =
                                    ctx.kind_factory.transform(frame.kind().clone(), reversed.clone(), ctx.transforms_factory.empty());
                                if !ctx.used_kinds.contains(&new_kind) {
                                    return None;
                                }
                                frame = frame.with_kind(new_kind);
                                Some(frame)
                            })
                        }
                        None => required_at_output,
                    };
                    let in_locations = alias_env.memory_locations.locations(in_register);
                    env.deep_write(&in_locations, transformed, WriteKind::Weak);
                }
            }
        }
        Instruction::SGet { .. }
        | Instruction::SPut { .. }
        | Instruction::MoveResult { .. }
        | Instruction::Return { .. }
        | Instruction::Throw { .. }
        | Instruction::LoadParam { .. }
        | Instruction::NewInstance { .. }
        | Instruction::NewArray { .. } => {}
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crtex::DefaultCanonicalNameConverter;
    use crate::features::FeatureFactory;
    use crate::frame::OriginSet;
    use crate::ir::Register;
    use crate::kind::{Kind, KindFactory};
    use crate::memory_location::MemoryLocationFactory;
    use crate::registry::Registry;
    use crate::rules::{Rules, UsedKinds};
    use crate::transform::TransformsFactory;

    #[allow(clippy::too_many_arguments)]
    fn test_context<'a>(
        registry: &'a Registry,
        rules: &'a Rules,
        used_kinds: &'a UsedKinds,
        transforms_factory: &'a TransformsFactory,
        kinds: &'a KindFactory,
        features: &'a FeatureFactory,
        locations: &'a MemoryLocationFactory,
        elements: &'a crate::access_path::ElementFactory,
        converter: &'a DefaultCanonicalNameConverter,
    ) -> AnalysisContext<'a> {
        AnalysisContext {
            registry,
            rules,
            used_kinds,
            transforms_factory,
            kind_factory: kinds,
            features,
            locations,
            elements,
            via_type_of_names: &[],
            canonical_name_converter: converter,
            maximum_source_sink_distance: 10,
            class_interval_mode_enabled: false,
        }
    }

    #[test]
    fn initial_state_seeds_receiver_with_propagation_kind() {
        let kinds = KindFactory::new();
        let locations = MemoryLocationFactory::new();
        let elements = crate::access_path::ElementFactory::new();
        let registry = Registry::new();
        let rules = Rules::new();
        let used_kinds = UsedKinds::new();
        let transforms_factory = TransformsFactory::new();
        let features = FeatureFactory::new();
        let converter = DefaultCanonicalNameConverter;
        let ctx = test_context(&registry, &rules, &used_kinds, &transforms_factory, &kinds, &features, &locations, &elements, &converter);

        let method = Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec!["I".to_string()],
            return_type: "V".to_string(),
            is_static: false,
        };
        let env = initial_state(&method, false, false, &Heuristics::default(), &ctx);
        let taint = env.raw_read(&locations.parameter(0));
        assert!(!taint.is_bottom());
        taint.visit(|frame| {
            assert!(matches!(&**frame.kind(), Kind::Propagation(Root::Argument(0))));
        });
    }

    #[test]
    fn frozen_propagations_skip_seeding() {
        let kinds = KindFactory::new();
        let locations = MemoryLocationFactory::new();
        let elements = crate::access_path::ElementFactory::new();
        let registry = Registry::new();
        let rules = Rules::new();
        let used_kinds = UsedKinds::new();
        let transforms_factory = TransformsFactory::new();
        let features = FeatureFactory::new();
        let converter = DefaultCanonicalNameConverter;
        let ctx = test_context(&registry, &rules, &used_kinds, &transforms_factory, &kinds, &features, &locations, &elements, &converter);

        let method = Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: false,
        };
        let env = initial_state(&method, false, true, &Heuristics::default(), &ctx);
        assert!(env.is_bottom());
    }

    #[test]
    fn move_requires_src_to_supply_whatever_dest_needs() {
        let kinds = KindFactory::new();
        let locations = MemoryLocationFactory::new();
        let elements = crate::access_path::ElementFactory::new();
        let registry = Registry::new();
        let rules = Rules::new();
        let used_kinds = UsedKinds::new();
        let transforms_factory = TransformsFactory::new();
        let features = FeatureFactory::new();
        let converter = DefaultCanonicalNameConverter;
        let ctx = test_context(&registry, &rules, &used_kinds, &transforms_factory, &kinds, &features, &locations, &elements, &converter);

        let mut alias_env = ForwardAliasEnvironment::bottom();
        alias_env.memory_locations.bind_exact(Register(0), locations.parameter(0));
        alias_env.memory_locations.bind_exact(Register(1), locations.parameter(1));

        let mut env = BackwardTaintEnvironment::bottom();
        let required = Taint::leaf(Frame::leaf(kinds.named("Log"), OriginSet::default()));
        env.write(&locations.parameter(1), required.clone(), WriteKind::Strong, true);

        let methods: crate::intern::Interner<Method> = crate::intern::Interner::new();
        let caller = methods.intern(Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: true,
        });
        let program = Program::new();

        let new_env = apply_instruction(
            &env,
            &alias_env,
            &Instruction::Move { dest: Register(1), src: Register(0) },
            0,
            &caller,
            &program,
            &ctx,
        );
        assert!(required.leq(&new_env.raw_read(&locations.parameter(0))));
    }
}
