//! End-to-end scenarios run through the public driver API: a source
//! reaching a sink is reported as an `Issue`, propagation through an
//! intermediate method carries taint to its caller, overrides join
//! unless `NoJoinVirtualOverrides` is set, and a method that cannot
//! converge degrades safely instead of poisoning the whole run.

use taint_engine::access_path::{AccessPath, ElementFactory, Root};
use taint_engine::crtex::DefaultCanonicalNameConverter;
use taint_engine::driver::{self, DriverOptions};
use taint_engine::features::FeatureFactory;
use taint_engine::frame::{Frame, OriginSet};
use taint_engine::intern::{Interned, Interner};
use taint_engine::ir::{BasicBlock, BlockId, ControlFlowGraph, Instruction, InvokeKind, Method, Program, Register};
use taint_engine::kind::KindFactory;
use taint_engine::memory_location::MemoryLocationFactory;
use taint_engine::model::Model;
use taint_engine::registry::Registry;
use taint_engine::rules::{MultiSourceMultiSinkRule, Rule, Rules, SourceSinkRule, UsedKinds};
use taint_engine::taint::Taint;
use taint_engine::transfer::AnalysisContext;
use taint_engine::transform::TransformsFactory;
use taint_engine::tree::WriteKind;

fn method(interner: &Interner<Method>, signature: &str, parameter_types: Vec<&str>) -> Interned<Method> {
    interner.intern(Method {
        signature: signature.to_string(),
        class_name: "A".to_string(),
        parameter_types: parameter_types.into_iter().map(|t| t.to_string()).collect(),
        return_type: "V".to_string(),
        is_static: true,
    })
}

fn straight_line(instructions: Vec<Instruction>) -> ControlFlowGraph {
    let entry = BlockId(0);
    let mut blocks = rustc_hash::FxHashMap::default();
    blocks.insert(entry, BasicBlock { id: entry, instructions, successors: vec![], predecessors: vec![] });
    ControlFlowGraph { entry, blocks, back_edges: vec![] }
}

struct Harness {
    kinds: KindFactory,
    locations: MemoryLocationFactory,
    elements: ElementFactory,
    registry: Registry,
    rules: Rules,
    transforms_factory: TransformsFactory,
    features: FeatureFactory,
    converter: DefaultCanonicalNameConverter,
}

impl Harness {
    fn new(rules: Rules) -> Self {
        Harness {
            kinds: KindFactory::new(),
            locations: MemoryLocationFactory::new(),
            elements: ElementFactory::new(),
            registry: Registry::new(),
            rules,
            transforms_factory: TransformsFactory::new(),
            features: FeatureFactory::new(),
            converter: DefaultCanonicalNameConverter,
        }
    }

    fn ctx(&self, used_kinds: &UsedKinds) -> AnalysisContext<'_> {
        AnalysisContext {
            registry: &self.registry,
            rules: &self.rules,
            used_kinds,
            transforms_factory: &self.transforms_factory,
            kind_factory: &self.kinds,
            features: &self.features,
            locations: &self.locations,
            elements: &self.elements,
            via_type_of_names: &[],
            canonical_name_converter: &self.converter,
            maximum_source_sink_distance: 10,
            class_interval_mode_enabled: false,
        }
    }

    fn source_sink_rule(code: u32, source: &str, sink: &str) -> Rule {
        Rule::SourceSink(SourceSinkRule {
            code,
            name: format!("rule-{}", code),
            source_kinds: vec![source.to_string()],
            sink_kinds: vec![sink.to_string()],
            transforms: vec![],
        })
    }
}

/// S1: a parameter declared `UserInput` flowing straight into a call whose
/// callee sinks `Argument(0)` as `Log` is reported as an issue.
#[test]
fn direct_flow_from_source_parameter_to_sink_call_is_an_issue() {
    let mut rules = Rules::new();
    rules.add(Harness::source_sink_rule(1, "UserInput", "Log"));
    let harness = Harness::new(rules);
    let used_kinds = UsedKinds::from_rules(&harness.kinds, &harness.rules);

    let methods: Interner<Method> = Interner::new();
    let caller = method(&methods, "LA;.caller", vec!["Ljava/lang/String;"]);
    let sink_method = method(&methods, "LA;.log", vec!["Ljava/lang/String;"]);

    let mut sink_model = Model::bottom();
    sink_model.sinks.write(
        &AccessPath::root_only(Root::Argument(0)),
        Taint::leaf(Frame::leaf(harness.kinds.named("Log"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    harness.registry.set(sink_method.clone(), sink_model);

    let mut program = Program::new();
    program.methods = vec![caller.clone(), sink_method.clone()];
    program.cfgs.insert(
        caller.clone(),
        straight_line(vec![
            Instruction::LoadParam { dest: Register(0), index: 0 },
            Instruction::Invoke { kind: InvokeKind::Static, callee: sink_method.clone(), args: vec![Register(0)] },
            Instruction::Return { value: None },
        ]),
    );
    program.cfgs.insert(sink_method.clone(), straight_line(vec![Instruction::Return { value: None }]));

    let ctx = harness.ctx(&used_kinds);
    let heuristics = taint_engine::model::Heuristics::default();
    let options = DriverOptions::default();
    let result = driver::analyze_program(&program, &heuristics, &ctx, &options).expect("converges");

    let caller_model = result.get(&caller);
    assert_eq!(caller_model.issues.len(), 1);
    assert_eq!(caller_model.issues[0].rule_code, 1);
    assert_eq!(caller_model.issues[0].source_kind, "UserInput");
    assert_eq!(caller_model.issues[0].sink_kind, "Log");
}

/// S2: a two-hop call chain (`outer` calls `middle` calls the sink) still
/// raises the issue against `outer`'s model once the driver reaches a
/// global fixpoint, because `middle`'s summary carries the sink forward.
#[test]
fn propagation_through_an_intermediate_method_reaches_its_caller() {
    let mut rules = Rules::new();
    rules.add(Harness::source_sink_rule(1, "UserInput", "Log"));
    let harness = Harness::new(rules);
    let used_kinds = UsedKinds::from_rules(&harness.kinds, &harness.rules);

    let methods: Interner<Method> = Interner::new();
    let outer = method(&methods, "LA;.outer", vec!["Ljava/lang/String;"]);
    let middle = method(&methods, "LA;.middle", vec!["Ljava/lang/String;"]);
    let sink_method = method(&methods, "LA;.log", vec!["Ljava/lang/String;"]);

    let mut sink_model = Model::bottom();
    sink_model.sinks.write(
        &AccessPath::root_only(Root::Argument(0)),
        Taint::leaf(Frame::leaf(harness.kinds.named("Log"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    harness.registry.set(sink_method.clone(), sink_model);

    let mut program = Program::new();
    program.methods = vec![outer.clone(), middle.clone(), sink_method.clone()];
    program.cfgs.insert(
        outer.clone(),
        straight_line(vec![
            Instruction::LoadParam { dest: Register(0), index: 0 },
            Instruction::Invoke { kind: InvokeKind::Static, callee: middle.clone(), args: vec![Register(0)] },
            Instruction::Return { value: None },
        ]),
    );
    program.cfgs.insert(
        middle.clone(),
        straight_line(vec![
            Instruction::LoadParam { dest: Register(0), index: 0 },
            Instruction::Invoke { kind: InvokeKind::Static, callee: sink_method.clone(), args: vec![Register(0)] },
            Instruction::Return { value: None },
        ]),
    );
    program.cfgs.insert(sink_method.clone(), straight_line(vec![Instruction::Return { value: None }]));

    let ctx = harness.ctx(&used_kinds);
    let heuristics = taint_engine::model::Heuristics::default();
    let options = DriverOptions::default();
    let result = driver::analyze_program(&program, &heuristics, &ctx, &options).expect("converges");

    assert!(!result.get(&middle).sinks.raw_read(&AccessPath::root_only(Root::Argument(0))).is_bottom());
    let outer_model = result.get(&outer);
    assert_eq!(outer_model.issues.len(), 1);
    assert_eq!(outer_model.issues[0].rule_code, 1);
}

/// S3: a call whose first argument carries a label-`a` source and second
/// argument a label-`b` source only raises the combined rule's issue once
/// both labels' partial sinks are fulfilled; neither source alone suffices.
#[test]
fn multi_source_call_raises_issue_only_once_both_labels_are_fulfilled() {
    let mut rules = Rules::new();
    let mut multi_source_kinds = rustc_hash::FxHashMap::default();
    multi_source_kinds.insert("a".to_string(), vec!["SourceA".to_string()]);
    multi_source_kinds.insert("b".to_string(), vec!["SourceB".to_string()]);
    let mut multi_sink_kinds = rustc_hash::FxHashMap::default();
    multi_sink_kinds.insert("a".to_string(), vec!["Combined".to_string()]);
    multi_sink_kinds.insert("b".to_string(), vec!["Combined".to_string()]);
    rules.add(Rule::MultiSourceMultiSink(MultiSourceMultiSinkRule {
        code: 3,
        name: "combined-source-sink".to_string(),
        multi_source_kinds,
        multi_sink_kinds,
    }));
    let harness = Harness::new(rules);
    let used_kinds = UsedKinds::new();

    let methods: Interner<Method> = Interner::new();
    let caller = method(&methods, "LA;.caller", vec![]);
    let get_a = method(&methods, "LA;.getA", vec![]);
    let get_b = method(&methods, "LA;.getB", vec![]);
    let combine = method(&methods, "LA;.combine", vec!["Ljava/lang/String;", "Ljava/lang/String;"]);

    let mut get_a_model = Model::bottom();
    get_a_model.generations.write(
        &AccessPath::root_only(Root::Return),
        Taint::leaf(Frame::leaf(harness.kinds.named("SourceA"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    harness.registry.set(get_a.clone(), get_a_model);

    let mut get_b_model = Model::bottom();
    get_b_model.generations.write(
        &AccessPath::root_only(Root::Return),
        Taint::leaf(Frame::leaf(harness.kinds.named("SourceB"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    harness.registry.set(get_b.clone(), get_b_model);

    let mut combine_model = Model::bottom();
    combine_model.sinks.write(
        &AccessPath::root_only(Root::Argument(0)),
        Taint::leaf(Frame::leaf(harness.kinds.partial("Combined", "a"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    combine_model.sinks.write(
        &AccessPath::root_only(Root::Argument(1)),
        Taint::leaf(Frame::leaf(harness.kinds.partial("Combined", "b"), OriginSet::default())),
        WriteKind::Strong,
        true,
    );
    harness.registry.set(combine.clone(), combine_model);

    let mut program = Program::new();
    program.methods = vec![caller.clone(), get_a.clone(), get_b.clone(), combine.clone()];
    program.cfgs.insert(
        caller.clone(),
        straight_line(vec![
            Instruction::Invoke { kind: InvokeKind::Static, callee: get_a.clone(), args: vec![] },
            Instruction::MoveResult { dest: Register(0) },
            Instruction::Invoke { kind: InvokeKind::Static, callee: get_b.clone(), args: vec![] },
            Instruction::MoveResult { dest: Register(1) },
            Instruction::Invoke { kind: InvokeKind::Static, callee: combine.clone(), args: vec![Register(0), Register(1)] },
            Instruction::Return { value: None },
        ]),
    );
    program.cfgs.insert(get_a.clone(), straight_line(vec![Instruction::Return { value: None }]));
    program.cfgs.insert(get_b.clone(), straight_line(vec![Instruction::Return { value: None }]));
    program.cfgs.insert(combine.clone(), straight_line(vec![Instruction::Return { value: None }]));

    let ctx = harness.ctx(&used_kinds);
    let heuristics = taint_engine::model::Heuristics::default();
    let options = DriverOptions::default();
    let result = driver::analyze_program(&program, &heuristics, &ctx, &options).expect("converges");

    let caller_model = result.get(&caller);
    assert_eq!(caller_model.issues.len(), 1);
    assert_eq!(caller_model.issues[0].rule_code, 3);
    assert_eq!(caller_model.issues[0].sink_kind, "Combined");
    assert_eq!(caller_model.issues[0].source_kind, "SourceA+SourceB");
}

/// S5: a virtual call with one override resolves to both the base method
/// and its override by default; once the base method's `Model` carries
/// `no_join_virtual_overrides`, the same call resolves to the base method
/// alone.
#[test]
fn overrides_join_unless_no_join_virtual_overrides_is_set() {
    let rules = Rules::new();
    let harness = Harness::new(rules);
    let used_kinds = UsedKinds::new();

    let methods: Interner<Method> = Interner::new();
    let caller = method(&methods, "LA;.caller", vec!["Ljava/lang/String;"]);
    let base = method(&methods, "LBase;.handle", vec!["Ljava/lang/String;"]);
    let override_one = method(&methods, "LOne;.handle", vec!["Ljava/lang/String;"]);

    let mut program = Program::new();
    program.methods = vec![caller.clone(), base.clone(), override_one.clone()];
    program.overrides.insert(base.clone(), vec![override_one.clone()]);

    let ctx = harness.ctx(&used_kinds);
    let invoke_index = taint_engine::ir::invoke_index(BlockId(0), 0);

    harness.registry.set(base.clone(), Model::bottom());
    let joined = taint_engine::transfer::resolve_callees(&program, &ctx, &caller, invoke_index, &base, InvokeKind::Virtual);
    assert_eq!(joined, vec![base.clone(), override_one.clone()]);

    let mut no_join_base_model = Model::bottom();
    no_join_base_model.modes.no_join_virtual_overrides = true;
    harness.registry.set(base.clone(), no_join_base_model);
    let base_only = taint_engine::transfer::resolve_callees(&program, &ctx, &caller, invoke_index, &base, InvokeKind::Virtual);
    assert_eq!(base_only, vec![base.clone()]);
}

/// S6: a run that would need more epochs than `max_global_iterations`
/// allows is reported as a `GlobalResource` error instead of looping
/// forever or silently truncating results.
#[test]
fn exceeding_the_global_iteration_budget_reports_global_resource_error() {
    let rules = Rules::new();
    let harness = Harness::new(rules);
    let used_kinds = UsedKinds::new();

    let methods: Interner<Method> = Interner::new();
    let a = method(&methods, "LA;.a", vec![]);
    let b = method(&methods, "LA;.b", vec![]);

    // `a` and `b` call each other; the driver's first epoch alone would
    // analyze both, but pinning `max_global_iterations` to zero forces the
    // cap to trip before the (non-empty, since every method starts on the
    // frontier) worklist can drain even once.
    let mut program = Program::new();
    program.methods = vec![a.clone(), b.clone()];
    program.cfgs.insert(
        a.clone(),
        straight_line(vec![
            Instruction::Invoke { kind: InvokeKind::Static, callee: b.clone(), args: vec![] },
            Instruction::Return { value: None },
        ]),
    );
    program.cfgs.insert(
        b.clone(),
        straight_line(vec![
            Instruction::Invoke { kind: InvokeKind::Static, callee: a.clone(), args: vec![] },
            Instruction::Return { value: None },
        ]),
    );

    let ctx = harness.ctx(&used_kinds);
    let heuristics = taint_engine::model::Heuristics::default();
    let options = DriverOptions { max_global_iterations: 0 };
    let result = driver::analyze_program(&program, &heuristics, &ctx, &options);
    assert!(matches!(result, Err(taint_engine::TaintError::GlobalResource { .. })));
}
