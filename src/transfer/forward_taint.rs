//! Forward taint analysis: propagate source taint from parameters and
//! callee returns downstream through the method body.

use super::AnalysisContext;
use crate::access_path::{AccessPath, Element, Root};
use crate::environment::{ForwardAliasEnvironment, TaintEnvironment};
use crate::intern::Interned;
use crate::ir::{Instruction, InvokeKind, Method, Position, Program};
use crate::kind::Kind;
use crate::model::Issue;
use crate::rules::RuleCode;
use crate::taint::{CallSite, Taint};
use crate::tree::WriteKind;
use rustc_hash::FxHashMap;

/// Ancestor taint is inherited unchanged on a plain forward read; only the
/// backward analysis's `propagate_output_path` decorates the descent.
fn identity_propagate(taint: &Taint, _element: &Element) -> Taint {
    taint.clone()
}

#[allow(clippy::too_many_arguments)]
pub fn apply_instruction(
    taint_env: &TaintEnvironment,
    alias_env: &ForwardAliasEnvironment,
    instruction: &Instruction,
    invoke_index: usize,
    position: Option<Interned<Position>>,
    caller: &Interned<Method>,
    program: &Program,
    ctx: &AnalysisContext,
) -> (TaintEnvironment, Vec<Issue>, Taint) {
    let mut env = taint_env.clone();
    let mut issues = Vec::new();
    let mut returned = Taint::bottom();

    match instruction {
        Instruction::Move { dest, src } => {
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let src_locations = alias_env.memory_locations.locations(*src);
            let taint = env.deep_read(&src_locations, identity_propagate);
            env.deep_write(&dest_locations, taint, WriteKind::Strong);
        }
        Instruction::IGet { dest, .. } => {
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let taint = env.deep_read(&dest_locations, identity_propagate);
            env.deep_write(&dest_locations, taint, WriteKind::Weak);
        }
        Instruction::AGet { dest, .. } => {
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let taint = env.deep_read(&dest_locations, identity_propagate);
            env.deep_write(&dest_locations, taint, WriteKind::Weak);
        }
        Instruction::IPut { value, object, field } => {
            let value_locations = alias_env.memory_locations.locations(*value);
            let object_locations = alias_env.memory_locations.locations(*object);
            let taint = env.deep_read(&value_locations, identity_propagate);
            let field_locations: rustc_hash::FxHashSet<_> = object_locations
                .iter()
                .map(|loc| ctx.locations.field(loc.clone(), field.clone()))
                .collect();
            env.deep_write(&field_locations, taint, WriteKind::Weak);
        }
        Instruction::APut { value, array } => {
            let value_locations = alias_env.memory_locations.locations(*value);
            let array_locations = alias_env.memory_locations.locations(*array);
            let taint = env.deep_read(&value_locations, identity_propagate);
            env.deep_write(&array_locations, taint, WriteKind::Weak);
        }
        Instruction::SGet { dest, field } => {
            // Static field taint flows through the field's own FieldModel,
            // not the alias graph.
            let field_model = ctx.registry.get_field(field);
            let dest_locations = alias_env.memory_locations.locations(*dest);
            let source_taint = field_model.sources.root_value().clone();
            env.deep_write(&dest_locations, source_taint, WriteKind::Weak);
        }
        Instruction::SPut { value, field } => {
            let field_model = ctx.registry.get_field(field);
            let value_locations = alias_env.memory_locations.locations(*value);
            let value_taint = env.deep_read(&value_locations, identity_propagate);
            let sink_taint = field_model.sinks.root_value().clone();
            if !value_taint.is_bottom() && !sink_taint.is_bottom() {
                record_field_issues(&value_taint, &sink_taint, ctx, &mut issues);
            }
        }
        Instruction::Invoke { kind, callee, args } => {
            let callees = super::resolve_callees(program, ctx, caller, invoke_index, callee, *kind);
            let mut result_taint = Taint::bottom();
            for resolved_callee in &callees {
                let callee_model = ctx.registry.get(resolved_callee);
                let class_interval_context = program
                    .class_intervals
                    .get(&resolved_callee.class_name)
                    .map(|interval| crate::ir::CallClassIntervalContext {
                        interval: *interval,
                        preserves_type_context: true,
                    })
                    .unwrap_or_else(crate::ir::CallClassIntervalContext::top);
                let caller_class_interval = program
                    .class_intervals
                    .get(&caller.class_name)
                    .copied()
                    .unwrap_or_else(crate::ir::ClassInterval::top);

                // Frontend-provided static receiver typing is out of scope;
                // this approximates every argument's register type with the
                // resolved callee's declaring class, which is the only
                // per-call-site type available here.
                let mut source_register_types = FxHashMap::default();
                let source_constant_arguments = FxHashMap::default();
                for i in 0..args.len() {
                    source_register_types.insert(Root::Argument(i as u32), resolved_callee.class_name.clone());
                }

                // Generations: the callee's Model.generations, propagated to
                // the caller's call site, becomes the result taint.
                for root in generation_roots() {
                    if let Some(tree) = callee_model.generations.tree_at(root) {
                        let callee_taint = tree.root_value().clone();
                        if callee_taint.is_bottom() {
                            continue;
                        }
                        let site = CallSite {
                            callee: resolved_callee.clone(),
                            callee_port: AccessPath::root_only(root),
                            call_position: position.clone(),
                            source_register_types: &source_register_types,
                            source_constant_arguments: &source_constant_arguments,
                            class_interval_context,
                            caller_class_interval,
                            class_interval_mode_enabled: ctx.class_interval_mode_enabled,
                            maximum_source_sink_distance: ctx.maximum_source_sink_distance,
                            features: ctx.features,
                            via_type_of_names: ctx.via_type_of_names,
                            canonical_name_converter: ctx.canonical_name_converter,
                        };
                        result_taint = result_taint.join_with(&callee_taint.propagate(&site));
                    }
                }

                // Propagations: read the caller's taint at the input port,
                // write it (through any transform) at the output port.
                for propagation in &callee_model.propagations {
                    if let Some(input_position) = propagation.input.root().parameter_position() {
                        if let Some(&arg_register) = args.get(input_position as usize) {
                            let arg_locations = alias_env.memory_locations.locations(arg_register);
                            let input_taint = env.deep_read(&arg_locations, identity_propagate);
                            if input_taint.is_bottom() {
                                continue;
                            }
                            let transformed = match &propagation.transforms {
                                Some(transforms) => input_taint.transform(|frame| {
                                    let mut frame = frame.clone();
                                    let new_kind = ctx.kind_factory.transform(
                                        frame.kind().clone(),
                                        transforms.clone(),
                                        ctx.transforms_factory.empty(),
                                    );
                                    if !ctx.used_kinds.contains(&new_kind) {
                                        return None;
                                    }
                                    frame = frame.with_kind(new_kind);
                                    Some(frame)
                                }),
                                None => input_taint,
                            };
                            match propagation.output.root().parameter_position() {
                                Some(output_position) => {
                                    if let Some(&out_register) = args.get(output_position as usize) {
                                        let out_locations = alias_env.memory_locations.locations(out_register);
                                        env.deep_write(&out_locations, transformed, WriteKind::Weak);
                                    }
                                }
                                None if propagation.output.root() == Root::Return => {
                                    result_taint = result_taint.join_with(&transformed);
                                }
                                None => {}
                            }
                        }
                    }
                }

                // Issue detection: argument taint vs. the callee's sinks at
                // the matching port. `partial_fulfillments` tracks, per
                // multi-source rule, which labels this call has already
                // satisfied across earlier arguments, so a rule fires once
                // every label's source has reached its matching partial sink.
                let mut partial_fulfillments: FxHashMap<RuleCode, FxHashMap<String, (Interned<Kind>, String)>> = FxHashMap::default();
                for (i, &arg_register) in args.iter().enumerate() {
                    let arg_locations = alias_env.memory_locations.locations(arg_register);
                    let source_taint = env.deep_read(&arg_locations, identity_propagate);
                    if source_taint.is_bottom() {
                        continue;
                    }
                    if let Some(sink_tree) = callee_model.sinks.tree_at(Root::Argument(i as u32)) {
                        let sink_taint = sink_tree.root_value().clone();
                        if !sink_taint.is_bottom() {
                            let callee_port = AccessPath::root_only(Root::Argument(i as u32));
                            record_issues(&source_taint, &sink_taint, callee_port.clone(), ctx, &mut issues);
                            record_partial_issues(&source_taint, &sink_taint, callee_port, ctx, &mut partial_fulfillments, &mut issues);
                        }
                    }
                }
            }
            returned = result_taint;
        }
        Instruction::Return { .. } | Instruction::Throw { .. } | Instruction::LoadParam { .. } | Instruction::NewInstance { .. } | Instruction::NewArray { .. } | Instruction::MoveResult { .. } => {}
    }

    (env, issues, returned)
}

fn generation_roots() -> [Root; 1] {
    [Root::Return]
}

fn record_issues(
    source_taint: &Taint,
    sink_taint: &Taint,
    callee_port: AccessPath,
    ctx: &AnalysisContext,
    issues: &mut Vec<Issue>,
) {
    let empty_transforms = ctx.transforms_factory.empty();
    source_taint.visit(|source_frame| {
        let source_kind = ctx.kind_factory.discard_transforms(source_frame.kind());
        let Some(source_name) = source_kind.as_named().map(|s| s.to_string()) else { return };
        sink_taint.visit(|sink_frame| {
            let sink_kind = ctx.kind_factory.discard_transforms(sink_frame.kind());
            let Some(sink_name) = sink_kind.as_named().map(|s| s.to_string()) else { return };
            let rule_codes = ctx.rules.rules(
                ctx.transforms_factory,
                &source_name,
                &empty_transforms,
                &sink_name,
                &empty_transforms,
            );
            for code in rule_codes {
                issues.push(Issue {
                    rule_code: code,
                    source_kind: source_name.clone(),
                    sink_kind: sink_name.clone(),
                    callee_port: callee_port.clone(),
                });
            }
        });
    });
}

/// Multi-source/multi-sink rules: a sink declared `Partial(name, label)` only
/// completes its rule once every other label also has a source reaching a
/// `Partial(name, other_label)` sink in this same call. `fulfilled` carries
/// that state across the call's arguments, keyed by rule so an unrelated
/// rule sharing the same partial sink name is never conflated.
fn record_partial_issues(
    source_taint: &Taint,
    sink_taint: &Taint,
    callee_port: AccessPath,
    ctx: &AnalysisContext,
    fulfilled: &mut FxHashMap<RuleCode, FxHashMap<String, (Interned<Kind>, String)>>,
    issues: &mut Vec<Issue>,
) {
    sink_taint.visit(|sink_frame| {
        let sink_kind = ctx.kind_factory.discard_transforms(sink_frame.kind());
        let Kind::Partial(name, label) = &*sink_kind else { return };
        source_taint.visit(|source_frame| {
            let source_kind = ctx.kind_factory.discard_transforms(source_frame.kind());
            let Some(source_name) = source_kind.as_named().map(|s| s.to_string()) else { return };
            for rule_code in ctx.rules.partial_rules(&source_name, name) {
                let Some(fulfilled_label) = ctx.rules.label_of(rule_code, &source_name, name) else { continue };
                if &fulfilled_label != label {
                    continue;
                }
                let triggered = ctx.kind_factory.triggered(sink_kind.clone(), rule_code);
                let labels = fulfilled.entry(rule_code).or_default();
                labels.insert(fulfilled_label, (triggered, source_name.clone()));

                let total_labels = ctx.rules.label_count(rule_code);
                if total_labels > 0 && labels.len() >= total_labels {
                    let mut source_kinds: Vec<String> = labels.values().map(|(_, source)| source.clone()).collect();
                    source_kinds.sort();
                    issues.push(Issue {
                        rule_code,
                        source_kind: source_kinds.join("+"),
                        sink_kind: name.clone(),
                        callee_port: callee_port.clone(),
                    });
                }
            }
        });
    });
}

fn record_field_issues(value_taint: &Taint, sink_taint: &Taint, ctx: &AnalysisContext, issues: &mut Vec<Issue>) {
    record_issues(value_taint, sink_taint, AccessPath::root_only(Root::Leaf), ctx, issues);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, OriginSet};
    use crate::kind::KindFactory;
    use crate::memory_location::MemoryLocationFactory;
    use crate::registry::Registry;
    use crate::rules::{Rule, Rules, SourceSinkRule, UsedKinds};
    use crate::transform::TransformsFactory;
    use crate::crtex::DefaultCanonicalNameConverter;
    use crate::features::FeatureFactory;
    use crate::ir::Register;

    #[test]
    fn move_forwards_taint_between_registers() {
        let kinds = KindFactory::new();
        let locations = MemoryLocationFactory::new();
        let registry = Registry::new();
        let rules = Rules::new();
        let used_kinds = UsedKinds::new();
        let transforms_factory = TransformsFactory::new();
        let features = FeatureFactory::new();
        let converter = DefaultCanonicalNameConverter;
        let elements = crate::access_path::ElementFactory::new();
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

        let mut alias_env = ForwardAliasEnvironment::bottom();
        alias_env.memory_locations.bind_exact(Register(0), locations.parameter(0));
        alias_env.memory_locations.bind_exact(Register(1), locations.parameter(1));

        let mut taint_env = TaintEnvironment::bottom();
        let taint = Taint::leaf(Frame::leaf(kinds.named("UserInput"), OriginSet::default()));
        taint_env.write(&locations.parameter(0), taint.clone(), crate::tree::WriteKind::Strong, true);

        let methods: crate::intern::Interner<Method> = crate::intern::Interner::new();
        let caller = methods.intern(Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: true,
        });
        let program = Program::new();

        let (new_env, issues, _returned) = apply_instruction(
            &taint_env,
            &alias_env,
            &Instruction::Move { dest: Register(1), src: Register(0) },
            0,
            None,
            &caller,
            &program,
            &ctx,
        );
        assert!(issues.is_empty());
        assert!(taint.leq(&new_env.raw_read(&locations.parameter(1))));
    }

    #[test]
    fn invoke_raises_issue_when_rule_matches() {
        let kinds = KindFactory::new();
        let locations = MemoryLocationFactory::new();
        let registry = Registry::new();
        let mut rules = Rules::new();
        rules.add(Rule::SourceSink(SourceSinkRule {
            code: 1,
            name: "test".to_string(),
            source_kinds: vec!["UserInput".to_string()],
            sink_kinds: vec!["Log".to_string()],
            transforms: vec![],
        }));
        let used_kinds = UsedKinds::from_rules(&kinds, &rules);
        let transforms_factory = TransformsFactory::new();
        let features = FeatureFactory::new();
        let converter = DefaultCanonicalNameConverter;
        let elements = crate::access_path::ElementFactory::new();
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

        let methods: crate::intern::Interner<Method> = crate::intern::Interner::new();
        let caller = methods.intern(Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: true,
        });
        let callee = methods.intern(Method {
            signature: "LA;.snk".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec!["I".to_string()],
            return_type: "V".to_string(),
            is_static: true,
        });
        let mut callee_model = crate::model::Model::bottom();
        callee_model.sinks.write(
            &AccessPath::root_only(Root::Argument(0)),
            Taint::leaf(Frame::leaf(kinds.named("Log"), OriginSet::default())),
            crate::tree::WriteKind::Strong,
            true,
        );
        registry.set(callee.clone(), callee_model);

        let mut alias_env = ForwardAliasEnvironment::bottom();
        alias_env.memory_locations.bind_exact(Register(0), locations.parameter(0));

        let mut taint_env = TaintEnvironment::bottom();
        taint_env.write(
            &locations.parameter(0),
            Taint::leaf(Frame::leaf(kinds.named("UserInput"), OriginSet::default())),
            crate::tree::WriteKind::Strong,
            true,
        );

        let program = Program::new();
        let (_env, issues, _returned) = apply_instruction(
            &taint_env,
            &alias_env,
            &Instruction::Invoke { kind: InvokeKind::Static, callee: callee.clone(), args: vec![Register(0)] },
            0,
            None,
            &caller,
            &program,
            &ctx,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_code, 1);
    }
}
