//! On-disk JSON formats: `rules.json`, `models.json`/`field_models.json`
//! (frontend-declared partial `Model`s), and the sharded `issues-N.json` /
//! `coverage.json` the driver emits after postprocessing, grounded on
//! `JsonReaderWriter.cpp`'s sharded-output convention and `config::io`'s
//! JSON(/YAML) schema types.

use crate::access_path::{AccessPath, Path, Root};
use crate::error::{Result, TaintError};
use crate::frame::{Frame, OriginSet};
use crate::intern::{Interned, Interner};
use crate::ir::{self, BasicBlock, BlockId, ClassInterval, ControlFlowGraph, Field, Instruction, InvokeKind, Method, Program, Register, Type};
use crate::kind::KindFactory;
use crate::model::{FieldModel, Issue, Model};
use crate::rules::{MultiSourceMultiSinkRule, Rule, Rules, RulesCoverage, SourceSinkRule};
use crate::taint::Taint;
use crate::tree::WriteKind;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<SourceSinkRule>,
    #[serde(default)]
    multi_source_rules: Vec<MultiSourceMultiSinkRule>,
}

pub fn load_rules(path: &FsPath) -> Result<Rules> {
    let content = std::fs::read_to_string(path)?;
    let file: RulesFile = serde_json::from_str(&content)?;
    let mut rules = Rules::new();
    for rule in file.rules {
        rules.add(Rule::SourceSink(rule));
    }
    for rule in file.multi_source_rules {
        rules.add(Rule::MultiSourceMultiSink(rule));
    }
    Ok(rules)
}

/// A declared source/sink/propagation entry at a port, by kind name.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortKind {
    port: String,
    kind: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MethodModelJson {
    method: String,
    #[serde(default)]
    parameter_sources: Vec<PortKind>,
    #[serde(default)]
    sinks: Vec<PortKind>,
    /// Kinds this method is declared to sink as a call-effect: flows into
    /// `Model::call_effect_sinks` at the fixed `Root::CallEffect(CallChain)`
    /// port rather than a per-argument one.
    #[serde(default)]
    call_effect_sinks: Vec<String>,
    #[serde(default)]
    frozen: bool,
    #[serde(default)]
    skip_analysis: bool,
    #[serde(default)]
    no_join_virtual_overrides: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelsFile {
    #[serde(default)]
    models: Vec<MethodModelJson>,
}

fn parse_root(port: &str) -> Result<Root> {
    match port {
        "Return" => Ok(Root::Return),
        "Leaf" => Ok(Root::Leaf),
        "Anchor" => Ok(Root::Anchor),
        "Producer" => Ok(Root::Producer),
        _ => {
            let inner = port
                .strip_prefix("Argument(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| TaintError::InputValidation(format!("unrecognized port '{}'", port)))?;
            let position: i64 = inner
                .parse()
                .map_err(|_| TaintError::InputValidation(format!("unrecognized port '{}'", port)))?;
            if position < 0 {
                Ok(Root::CanonicalThis)
            } else {
                Ok(Root::Argument(position as u32))
            }
        }
    }
}

fn find_method<'a>(program: &'a Program, signature: &str) -> Result<&'a Interned<Method>> {
    program
        .methods
        .iter()
        .find(|m| m.signature == signature)
        .ok_or_else(|| TaintError::InputValidation(format!("model declares unknown method '{}'", signature)))
}

/// Load frontend-declared partial `Model`s (a method's `parameter_sources`
/// and `sinks`, plus its mode flags) keyed by interned method, to seed the
/// `Registry` before the fixpoint starts.
pub fn load_models(path: &FsPath, program: &Program, kinds: &KindFactory) -> Result<Vec<(Interned<Method>, Model)>> {
    let content = std::fs::read_to_string(path)?;
    let file: ModelsFile = serde_json::from_str(&content)?;
    let mut out = Vec::with_capacity(file.models.len());
    for declared in file.models {
        let method = find_method(program, &declared.method)?.clone();
        let mut model = Model::bottom();
        for entry in &declared.parameter_sources {
            let root = parse_root(&entry.port)?;
            let taint = Taint::leaf(Frame::leaf(kinds.named(entry.kind.clone()), OriginSet::default()));
            model.parameter_sources.write(&AccessPath::root_only(root), taint, WriteKind::Strong, true);
        }
        for entry in &declared.sinks {
            let root = parse_root(&entry.port)?;
            let taint = Taint::leaf(Frame::leaf(kinds.named(entry.kind.clone()), OriginSet::default()));
            model.sinks.write(&AccessPath::root_only(root), taint, WriteKind::Strong, true);
        }
        for kind_name in &declared.call_effect_sinks {
            let taint = Taint::leaf(Frame::leaf(kinds.named(kind_name.clone()), OriginSet::default()));
            model.call_effect_sinks.write(&Path::empty(), taint, WriteKind::Strong, true);
        }
        model.frozen = declared.frozen;
        model.modes.skip_analysis = declared.skip_analysis;
        model.modes.no_join_virtual_overrides = declared.no_join_virtual_overrides;
        out.push((method, model));
    }
    Ok(out)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FieldModelJson {
    class_name: String,
    name: String,
    field_type: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    sinks: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldModelsFile {
    #[serde(default)]
    fields: Vec<FieldModelJson>,
}

fn find_field<'a>(program: &'a Program, class_name: &str, name: &str, field_type: &str) -> Result<&'a Interned<Field>> {
    program
        .fields
        .iter()
        .find(|f| f.class_name == class_name && f.name == name && f.field_type == field_type)
        .ok_or_else(|| TaintError::InputValidation(format!("field model declares unknown field '{}.{}'", class_name, name)))
}

/// Load per-field sources/sinks, resolved against the `Interned<Field>`
/// handles already produced by [`load_program`] (field identity is by
/// pointer, so this cannot mint its own `Field` values; the `Registry`
/// keys `FieldModel`s by the exact handle `IGet`/`IPut`/`SGet`/`SPut`
/// instructions carry).
pub fn load_field_models(path: &FsPath, program: &Program, kinds: &KindFactory) -> Result<Vec<(Interned<Field>, FieldModel)>> {
    let content = std::fs::read_to_string(path)?;
    let file: FieldModelsFile = serde_json::from_str(&content)?;
    let mut out = Vec::with_capacity(file.fields.len());
    for declared in file.fields {
        let field = find_field(program, &declared.class_name, &declared.name, &declared.field_type)?.clone();
        let mut model = FieldModel::bottom();
        for kind_name in declared.sources {
            let taint = Taint::leaf(Frame::leaf(kinds.named(kind_name), OriginSet::default()));
            model.sources.write(&Path::empty(), taint, WriteKind::Strong, true);
        }
        for kind_name in declared.sinks {
            let taint = Taint::leaf(Frame::leaf(kinds.named(kind_name), OriginSet::default()));
            model.sinks.write(&Path::empty(), taint, WriteKind::Strong, true);
        }
        out.push((field, model));
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
struct IssueJson {
    rule_code: u32,
    source_kind: String,
    sink_kind: String,
    callee_port: String,
}

impl From<&Issue> for IssueJson {
    fn from(issue: &Issue) -> Self {
        IssueJson {
            rule_code: issue.rule_code,
            source_kind: issue.source_kind.clone(),
            sink_kind: issue.sink_kind.clone(),
            callee_port: issue.callee_port.to_json_string(),
        }
    }
}

/// Write `issues` across `ceil(len / sharding_width)` files named
/// `issues-0.json`, `issues-1.json`, ... mirroring `JsonReaderWriter.cpp`'s
/// sharded-output convention (one shard per worker, bounded file size).
pub fn write_issues_sharded(output_directory: &FsPath, issues: &[Issue], sharding_width: u32) -> Result<()> {
    std::fs::create_dir_all(output_directory)?;
    let shard_count = sharding_width.max(1) as usize;
    let chunk_len = issues.len().div_ceil(shard_count).max(1);
    for (shard_index, chunk) in issues.chunks(chunk_len).enumerate() {
        let dtos: Vec<IssueJson> = chunk.iter().map(IssueJson::from).collect();
        let path = output_directory.join(format!("issues-{}.json", shard_index));
        std::fs::write(path, serde_json::to_string_pretty(&dtos)?)?;
    }
    Ok(())
}

pub fn write_coverage(output_directory: &FsPath, coverage: &RulesCoverage) -> Result<()> {
    std::fs::create_dir_all(output_directory)?;
    let path = output_directory.join("coverage.json");
    std::fs::write(path, serde_json::to_string_pretty(coverage)?)?;
    Ok(())
}

/// On-disk mirror of [`Method`]; the frontend is out of scope, so this and
/// the structs below exist purely so test fixtures and demo programs can
/// hand the driver a [`Program`] without hand-building `ir` values in Rust.
#[derive(Debug, Clone, Deserialize)]
struct MethodJson {
    signature: String,
    class_name: String,
    #[serde(default)]
    parameter_types: Vec<String>,
    return_type: String,
    #[serde(default)]
    is_static: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldRefJson {
    class_name: String,
    name: String,
    field_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op")]
enum InstructionJson {
    LoadParam { dest: u32, index: u32 },
    NewInstance { dest: u32, ty: String },
    NewArray { dest: u32, element_type: String },
    Move { dest: u32, src: u32 },
    IGet { dest: u32, object: u32, field: FieldRefJson },
    IPut { value: u32, object: u32, field: FieldRefJson },
    AGet { dest: u32, array: u32 },
    APut { value: u32, array: u32 },
    SGet { dest: u32, field: FieldRefJson },
    SPut { value: u32, field: FieldRefJson },
    Invoke { kind: String, callee: String, #[serde(default)] args: Vec<u32> },
    MoveResult { dest: u32 },
    Return { #[serde(default)] value: Option<u32> },
    Throw { value: u32 },
}

#[derive(Debug, Clone, Deserialize)]
struct BlockJson {
    id: u32,
    #[serde(default)]
    instructions: Vec<InstructionJson>,
    #[serde(default)]
    successors: Vec<u32>,
    #[serde(default)]
    predecessors: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct CfgJson {
    entry: u32,
    blocks: Vec<BlockJson>,
    #[serde(default)]
    back_edges: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Deserialize)]
struct MethodEntryJson {
    method: MethodJson,
    #[serde(default)]
    cfg: Option<CfgJson>,
    #[serde(default)]
    overrides: Vec<String>,
    /// `"<block id>:<instruction index>"` -> resolved callee signatures,
    /// a statically-known call graph entry (`Program::call_graph`) that
    /// bypasses override-joining at that callsite.
    #[serde(default)]
    call_graph: FxHashMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramJson {
    #[serde(default)]
    methods: Vec<MethodEntryJson>,
    #[serde(default)]
    class_intervals: FxHashMap<String, ClassInterval>,
}

fn parse_invoke_key(key: &str) -> Result<usize> {
    let (block, index) = key
        .split_once(':')
        .ok_or_else(|| TaintError::InputValidation(format!("malformed call graph key '{}'", key)))?;
    let block: u32 = block
        .parse()
        .map_err(|_| TaintError::InputValidation(format!("malformed call graph key '{}'", key)))?;
    let index: usize = index
        .parse()
        .map_err(|_| TaintError::InputValidation(format!("malformed call graph key '{}'", key)))?;
    Ok(ir::invoke_index(BlockId(block), index))
}

fn parse_invoke_kind(kind: &str) -> Result<InvokeKind> {
    match kind {
        "static" => Ok(InvokeKind::Static),
        "direct" => Ok(InvokeKind::Direct),
        "virtual" => Ok(InvokeKind::Virtual),
        "interface" => Ok(InvokeKind::Interface),
        "super" => Ok(InvokeKind::Super),
        _ => Err(TaintError::InputValidation(format!("unrecognized invoke kind '{}'", kind))),
    }
}

fn resolve_method(by_signature: &FxHashMap<String, Interned<Method>>, signature: &str) -> Result<Interned<Method>> {
    by_signature
        .get(signature)
        .cloned()
        .ok_or_else(|| TaintError::InputValidation(format!("program references unknown method '{}'", signature)))
}

fn convert_instruction(
    instruction: &InstructionJson,
    by_signature: &FxHashMap<String, Interned<Method>>,
    types: &Interner<Type>,
    fields: &Interner<Field>,
    seen_fields: &mut rustc_hash::FxHashSet<Interned<Field>>,
) -> Result<Instruction> {
    let mut field_of = |f: &FieldRefJson| {
        let field = fields.intern(Field { class_name: f.class_name.clone(), name: f.name.clone(), field_type: f.field_type.clone() });
        seen_fields.insert(field.clone());
        field
    };
    Ok(match instruction {
        InstructionJson::LoadParam { dest, index } => Instruction::LoadParam { dest: Register(*dest), index: *index },
        InstructionJson::NewInstance { dest, ty } => {
            Instruction::NewInstance { dest: Register(*dest), ty: types.intern(Type(ty.clone())) }
        }
        InstructionJson::NewArray { dest, element_type } => {
            Instruction::NewArray { dest: Register(*dest), element_type: types.intern(Type(element_type.clone())) }
        }
        InstructionJson::Move { dest, src } => Instruction::Move { dest: Register(*dest), src: Register(*src) },
        InstructionJson::IGet { dest, object, field } => {
            Instruction::IGet { dest: Register(*dest), object: Register(*object), field: field_of(field) }
        }
        InstructionJson::IPut { value, object, field } => {
            Instruction::IPut { value: Register(*value), object: Register(*object), field: field_of(field) }
        }
        InstructionJson::AGet { dest, array } => Instruction::AGet { dest: Register(*dest), array: Register(*array) },
        InstructionJson::APut { value, array } => Instruction::APut { value: Register(*value), array: Register(*array) },
        InstructionJson::SGet { dest, field } => Instruction::SGet { dest: Register(*dest), field: field_of(field) },
        InstructionJson::SPut { value, field } => Instruction::SPut { value: Register(*value), field: field_of(field) },
        InstructionJson::Invoke { kind, callee, args } => Instruction::Invoke {
            kind: parse_invoke_kind(kind)?,
            callee: resolve_method(by_signature, callee)?,
            args: args.iter().map(|r| Register(*r)).collect(),
        },
        InstructionJson::MoveResult { dest } => Instruction::MoveResult { dest: Register(*dest) },
        InstructionJson::Return { value } => Instruction::Return { value: value.map(Register) },
        InstructionJson::Throw { value } => Instruction::Throw { value: Register(*value) },
    })
}

/// Load a whole [`Program`] from a single JSON file: every method's
/// signature, its CFG (if the fixture provides one; declaration-only
/// methods such as library stubs may omit it), its override set, and any
/// statically-known call graph entries.
///
/// Methods are interned in a first pass so `overrides`/`call_graph`/
/// `Invoke.callee` entries, which reference methods by signature, can
/// resolve regardless of declaration order (`intern.rs`'s interners are
/// the only place identity is created; this loader never keeps its own
/// past this function, matching the frontend contract in `ir.rs`: a real
/// deployment's bytecode toolkit would own the interners instead).
pub fn load_program(path: &FsPath) -> Result<Program> {
    let content = std::fs::read_to_string(path)?;
    let file: ProgramJson = serde_json::from_str(&content)?;

    let methods_interner: Interner<Method> = Interner::new();
    let types_interner: Interner<Type> = Interner::new();
    let fields_interner: Interner<Field> = Interner::new();

    let mut by_signature: FxHashMap<String, Interned<Method>> = FxHashMap::default();
    for entry in &file.methods {
        let method = methods_interner.intern(Method {
            signature: entry.method.signature.clone(),
            class_name: entry.method.class_name.clone(),
            parameter_types: entry.method.parameter_types.clone(),
            return_type: entry.method.return_type.clone(),
            is_static: entry.method.is_static,
        });
        by_signature.insert(entry.method.signature.clone(), method);
    }

    let mut program = Program::new();
    program.methods = file.methods.iter().map(|entry| by_signature[&entry.method.signature].clone()).collect();
    program.class_intervals = file.class_intervals;

    let mut seen_fields: rustc_hash::FxHashSet<Interned<Field>> = rustc_hash::FxHashSet::default();

    for entry in &file.methods {
        let caller = by_signature[&entry.method.signature].clone();

        for target in &entry.overrides {
            let resolved = resolve_method(&by_signature, target)?;
            program.overrides.entry(caller.clone()).or_default().push(resolved);
        }

        if let Some(cfg_json) = &entry.cfg {
            let mut blocks = FxHashMap::default();
            for block in &cfg_json.blocks {
                let mut instructions = Vec::with_capacity(block.instructions.len());
                for instruction in &block.instructions {
                    instructions.push(convert_instruction(instruction, &by_signature, &types_interner, &fields_interner, &mut seen_fields)?);
                }
                let id = BlockId(block.id);
                blocks.insert(
                    id,
                    BasicBlock {
                        id,
                        instructions,
                        successors: block.successors.iter().map(|s| BlockId(*s)).collect(),
                        predecessors: block.predecessors.iter().map(|s| BlockId(*s)).collect(),
                    },
                );
            }
            let cfg = ControlFlowGraph {
                entry: BlockId(cfg_json.entry),
                blocks,
                back_edges: cfg_json.back_edges.iter().map(|(from, to)| (BlockId(*from), BlockId(*to))).collect(),
            };
            program.cfgs.insert(caller.clone(), cfg);
        }

        for (key, callees) in &entry.call_graph {
            let invoke_index = parse_invoke_key(key)?;
            let mut resolved = Vec::with_capacity(callees.len());
            for signature in callees {
                resolved.push(resolve_method(&by_signature, signature)?);
            }
            program.call_graph.insert((caller.clone(), invoke_index), resolved);
        }
    }

    program.fields = seen_fields.into_iter().collect();

    tracing::info!(methods = program.methods.len(), fields = program.fields.len(), path = %path.display(), "loaded program");
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_rules_file_with_both_rule_shapes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "rules": [{{"code": 1, "name": "r1", "source_kinds": ["UserInput"], "sink_kinds": ["Log"]}}],
                "multi_source_rules": []
            }}"#
        )
        .unwrap();
        let rules = load_rules(file.path()).unwrap();
        assert_eq!(rules.all().len(), 1);
    }

    #[test]
    fn loads_declared_model_and_seeds_parameter_source() {
        let kinds = KindFactory::new();
        let methods: crate::intern::Interner<Method> = crate::intern::Interner::new();
        let method = methods.intern(Method {
            signature: "LA;.f".to_string(),
            class_name: "A".to_string(),
            parameter_types: vec![],
            return_type: "V".to_string(),
            is_static: true,
        });
        let mut program = Program::new();
        program.methods = vec![method.clone()];

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "models": [{{
                    "method": "LA;.f",
                    "parameter_sources": [{{"port": "Argument(0)", "kind": "UserInput"}}],
                    "sinks": []
                }}]
            }}"#
        )
        .unwrap();

        let loaded = load_models(file.path(), &program, &kinds).unwrap();
        assert_eq!(loaded.len(), 1);
        let (loaded_method, model) = &loaded[0];
        assert_eq!(loaded_method, &method);
        assert!(model.parameter_sources.tree_at(Root::Argument(0)).is_some());
    }

    #[test]
    fn unknown_method_in_models_file_is_input_validation_error() {
        let kinds = KindFactory::new();
        let program = Program::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"models": [{{"method": "LA;.missing"}}]}}"#).unwrap();
        let result = load_models(file.path(), &program, &kinds);
        assert!(matches!(result, Err(TaintError::InputValidation(_))));
    }

    #[test]
    fn loads_program_with_forward_referenced_callee() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "methods": [
                    {{
                        "method": {{"signature": "LA;.caller", "class_name": "A", "parameter_types": ["Ljava/lang/String;"], "return_type": "V", "is_static": true}},
                        "cfg": {{
                            "entry": 0,
                            "blocks": [
                                {{
                                    "id": 0,
                                    "instructions": [
                                        {{"op": "LoadParam", "dest": 0, "index": 0}},
                                        {{"op": "Invoke", "kind": "static", "callee": "LA;.log", "args": [0]}},
                                        {{"op": "Return"}}
                                    ],
                                    "successors": [],
                                    "predecessors": []
                                }}
                            ],
                            "back_edges": []
                        }},
                        "call_graph": {{"0:1": ["LA;.log"]}}
                    }},
                    {{
                        "method": {{"signature": "LA;.log", "class_name": "A", "parameter_types": ["Ljava/lang/String;"], "return_type": "V", "is_static": true}},
                        "cfg": {{"entry": 0, "blocks": [{{"id": 0, "instructions": [{{"op": "Return"}}]}}]}}
                    }}
                ],
                "class_intervals": {{}}
            }}"#
        )
        .unwrap();

        let program = load_program(file.path()).unwrap();
        assert_eq!(program.methods.len(), 2);
        let caller = program.methods.iter().find(|m| m.signature == "LA;.caller").unwrap();
        let callee = program.methods.iter().find(|m| m.signature == "LA;.log").unwrap();
        let cfg = program.cfg_of(caller).unwrap();
        assert_eq!(cfg.blocks.len(), 1);
        let invoke_index = ir::invoke_index(BlockId(0), 1);
        assert_eq!(program.call_graph.get(&(caller.clone(), invoke_index)).unwrap(), &vec![callee.clone()]);
    }

    #[test]
    fn program_with_unknown_invoke_callee_is_input_validation_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "methods": [
                    {{
                        "method": {{"signature": "LA;.caller", "class_name": "A", "return_type": "V", "is_static": true}},
                        "cfg": {{
                            "entry": 0,
                            "blocks": [{{"id": 0, "instructions": [{{"op": "Invoke", "kind": "static", "callee": "LA;.missing", "args": []}}]}}]
                        }}
                    }}
                ]
            }}"#
        )
        .unwrap();
        let result = load_program(file.path());
        assert!(matches!(result, Err(TaintError::InputValidation(_))));
    }

    #[test]
    fn load_program_populates_fields_so_field_models_resolve_against_them() {
        let mut program_file = tempfile::NamedTempFile::new().unwrap();
        write!(
            program_file,
            r#"{{
                "methods": [
                    {{
                        "method": {{"signature": "LA;.f", "class_name": "A", "return_type": "V", "is_static": true}},
                        "cfg": {{
                            "entry": 0,
                            "blocks": [{{
                                "id": 0,
                                "instructions": [
                                    {{"op": "SGet", "dest": 0, "field": {{"class_name": "A", "name": "tag", "field_type": "Ljava/lang/String;"}}}},
                                    {{"op": "Return"}}
                                ]
                            }}]
                        }}
                    }}
                ]
            }}"#
        )
        .unwrap();
        let program = load_program(program_file.path()).unwrap();
        assert_eq!(program.fields.len(), 1);
        assert_eq!(program.fields[0].name, "tag");

        let kinds = KindFactory::new();
        let mut field_models_file = tempfile::NamedTempFile::new().unwrap();
        write!(
            field_models_file,
            r#"{{"fields": [{{"class_name": "A", "name": "tag", "field_type": "Ljava/lang/String;", "sources": ["UserInput"], "sinks": []}}]}}"#
        )
        .unwrap();
        let loaded = load_field_models(field_models_file.path(), &program, &kinds).unwrap();
        assert_eq!(loaded.len(), 1);
        let (loaded_field, _model) = &loaded[0];
        // Same interned handle `load_program` embedded in the `SGet`
        // instruction, not a structurally-equal but pointer-distinct one.
        let Instruction::SGet { field, .. } = &program.cfg_of(&program.methods[0]).unwrap().blocks[&BlockId(0)].instructions[0] else {
            panic!("expected SGet")
        };
        assert_eq!(loaded_field, field);
    }

    #[test]
    fn unknown_field_in_field_models_file_is_input_validation_error() {
        let program = Program::new();
        let kinds = KindFactory::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fields": [{{"class_name": "A", "name": "missing", "field_type": "I"}}]}}"#).unwrap();
        let result = load_field_models(file.path(), &program, &kinds);
        assert!(matches!(result, Err(TaintError::InputValidation(_))));
    }
}
