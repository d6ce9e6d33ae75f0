//! Per-method fixpoint: drives the three transfer functions
//! ([`crate::transfer::forward_alias`], [`crate::transfer::forward_taint`],
//! [`crate::transfer::backward_taint`]) to convergence over one method's
//! [`ControlFlowGraph`], then folds the converged state into a fresh
//! [`Model`].
//!
//! Blocks are visited in [`ControlFlowGraph::reverse_postorder`] order,
//! repeatedly, until no block's exit environment grows (or
//! `heuristics.max_number_iterations` outer passes are exhausted, at which
//! point the method degrades to [`crate::model::Modes::degrade_to_taint_through`]
//! rather than keep spinning). Joins at back edges use
//! `widen_with` instead of `join_with`, since only back edges can create an
//! unbounded ascending chain.
//!
//! The backward pass runs second, over the same blocks in reverse, because
//! it infers what a parameter must supply from what its *uses* downstream
//! already require, so it needs the forward pass's aliasing settled first.

use crate::access_path::{AccessPath, Path, Root};
use crate::environment::{ForwardAliasEnvironment, TaintEnvironment};
use crate::features::FeatureSet;
use crate::ir::{BlockId, ControlFlowGraph, Instruction, Method, Program};
use crate::kind::Kind;
use crate::model::{Heuristics, Issue, Model, Propagation};
use crate::taint::Taint;
use crate::transfer::backward_taint::{self, BackwardTaintEnvironment};
use crate::transfer::{forward_alias, forward_taint, AnalysisContext};
use crate::tree::WriteKind;
use rustc_hash::FxHashMap;

/// Packs a block and its in-block instruction index into the call-graph's
/// `usize` call-site key. 2^16 instructions per block and 2^48 blocks is far
/// beyond anything a single method's CFG would contain.
fn invoke_index_for(block: BlockId, instruction_index: u32) -> usize {
    ((block.0 as usize) << 16) | instruction_index as usize
}

fn identity_propagate(taint: &Taint, _element: &crate::access_path::Element) -> Taint {
    taint.clone()
}

/// A method's declared `parameter_sources` (seeded externally, e.g. from a
/// frontend's `models.json`) become the forward taint environment's initial
/// state at the CFG entry block.
fn seed_parameter_sources(model: &Model, locations: &crate::memory_location::MemoryLocationFactory) -> TaintEnvironment {
    let mut env = TaintEnvironment::bottom();
    for i in 0..64 {
        if let Some(tree) = model.parameter_sources.tree_at(Root::Argument(i)) {
            let taint = tree.root_value().clone();
            if !taint.is_bottom() {
                env.write(&locations.parameter(i), taint, WriteKind::Strong, true);
            }
        }
    }
    env
}

/// The per-method inputs the interprocedural driver assembles before calling
/// [`analyze_method`]; everything process-wide lives in [`AnalysisContext`]
/// instead.
pub struct MethodAnalysisRequest<'a> {
    pub method: crate::intern::Interned<Method>,
    pub cfg: &'a ControlFlowGraph,
    pub heuristics: &'a Heuristics,
    pub previous_model: &'a Model,
}

struct ForwardResult {
    exit_alias: FxHashMap<BlockId, ForwardAliasEnvironment>,
    exit_taint: FxHashMap<BlockId, TaintEnvironment>,
    issues: Vec<Issue>,
    returned: Taint,
    converged: bool,
}

fn join_predecessors<T: Clone + Default>(
    cfg: &ControlFlowGraph,
    block: BlockId,
    predecessors: &[BlockId],
    exits: &FxHashMap<BlockId, T>,
    join: impl Fn(&T, &T) -> T,
    widen: impl Fn(&T, &T) -> T,
) -> T {
    let mut result = T::default();
    for &pred in predecessors {
        if let Some(pred_exit) = exits.get(&pred) {
            result = if cfg.is_back_edge(pred, block) {
                widen(&result, pred_exit)
            } else {
                join(&result, pred_exit)
            };
        }
    }
    result
}

/// Forward-alias and forward-taint run together, instruction by instruction,
/// because forward-taint's reads/writes need each instruction's *own*
/// updated aliasing; the two run as one combined pass.
#[allow(clippy::too_many_arguments)]
fn run_forward(order: &[BlockId], request: &MethodAnalysisRequest, program: &Program, ctx: &AnalysisContext) -> ForwardResult {
    let cfg = request.cfg;
    let mut exit_alias: FxHashMap<BlockId, ForwardAliasEnvironment> = FxHashMap::default();
    let mut exit_taint: FxHashMap<BlockId, TaintEnvironment> = FxHashMap::default();
    let mut converged = false;
    let parameter_sources = seed_parameter_sources(request.previous_model, ctx.locations);

    for iteration in 0..request.heuristics.max_number_iterations {
        let mut changed = false;
        for &block_id in order {
            let Some(block) = cfg.blocks.get(&block_id) else { continue };
            let mut alias_env = join_predecessors(
                cfg,
                block_id,
                &block.predecessors,
                &exit_alias,
                ForwardAliasEnvironment::join_with,
                ForwardAliasEnvironment::widen_with,
            );
            let mut taint_env = join_predecessors(
                cfg,
                block_id,
                &block.predecessors,
                &exit_taint,
                TaintEnvironment::join_with,
                TaintEnvironment::widen_with,
            );
            if block_id == cfg.entry {
                taint_env = taint_env.join_with(&parameter_sources);
            }

            for (index, instruction) in block.instructions.iter().enumerate() {
                let invoke_index = invoke_index_for(block_id, index as u32);
                alias_env = forward_alias::apply_instruction(&alias_env, instruction, block_id, index as u32, ctx.locations, ctx.elements);
                let (new_taint_env, _issues, returned) =
                    forward_taint::apply_instruction(&taint_env, &alias_env, instruction, invoke_index, None, &request.method, program, ctx);
                taint_env = new_taint_env;
                if matches!(instruction, Instruction::Invoke { .. }) && !returned.is_bottom() {
                    let result_location = ctx.locations.instruction(block_id, index as u32);
                    taint_env.write(&result_location, returned, WriteKind::Strong, true);
                }
            }

            let stable = exit_alias.get(&block_id).is_some_and(|p| alias_env.leq(p))
                && exit_taint.get(&block_id).is_some_and(|p| taint_env.leq(p));
            if !stable {
                changed = true;
            }
            exit_alias.insert(block_id, alias_env);
            exit_taint.insert(block_id, taint_env);
        }
        if !changed {
            converged = true;
            tracing::debug!(method = %request.method.signature, iteration, "forward pass converged");
            break;
        }
    }
    if !converged {
        tracing::debug!(method = %request.method.signature, max_iterations = request.heuristics.max_number_iterations, "forward pass hit iteration cap");
    }

    // Converged environments settled; walk once more to collect the issues
    // and the taint actually returned at each `Return`, which the fixpoint
    // loop above discards (it only needs leq/widen to detect convergence).
    let mut issues = Vec::new();
    let mut returned = Taint::bottom();
    for &block_id in order {
        let Some(block) = cfg.blocks.get(&block_id) else { continue };
        let mut alias_env = join_predecessors(
            cfg,
            block_id,
            &block.predecessors,
            &exit_alias,
            ForwardAliasEnvironment::join_with,
            ForwardAliasEnvironment::widen_with,
        );
        let mut taint_env = join_predecessors(
            cfg,
            block_id,
            &block.predecessors,
            &exit_taint,
            TaintEnvironment::join_with,
            TaintEnvironment::widen_with,
        );
        if block_id == cfg.entry {
            taint_env = taint_env.join_with(&parameter_sources);
        }
        for (index, instruction) in block.instructions.iter().enumerate() {
            let invoke_index = invoke_index_for(block_id, index as u32);
            alias_env = forward_alias::apply_instruction(&alias_env, instruction, block_id, index as u32, ctx.locations, ctx.elements);
            let (new_taint_env, instruction_issues, invoke_returned) =
                forward_taint::apply_instruction(&taint_env, &alias_env, instruction, invoke_index, None, &request.method, program, ctx);
            taint_env = new_taint_env;
            issues.extend(instruction_issues);
            if matches!(instruction, Instruction::Invoke { .. }) && !invoke_returned.is_bottom() {
                let result_location = ctx.locations.instruction(block_id, index as u32);
                taint_env.write(&result_location, invoke_returned, WriteKind::Strong, true);
            }
            if let Instruction::Return { value: Some(register) } = instruction {
                let register_taint = taint_env.deep_read(&alias_env.memory_locations.locations(*register), identity_propagate);
                returned = returned.join_with(&register_taint);
            }
        }
    }

    ForwardResult { exit_alias, exit_taint, issues, returned, converged }
}

/// Second pass, over the same blocks in reverse program order: what a
/// register's producer must supply so that everything recorded downstream
/// (already folded into `env` by the time we reach it, since we walk
/// backwards) is satisfied.
fn run_backward(
    order: &[BlockId],
    request: &MethodAnalysisRequest,
    alias_envs: &FxHashMap<BlockId, ForwardAliasEnvironment>,
    program: &Program,
    ctx: &AnalysisContext,
) -> BackwardTaintEnvironment {
    let cfg = request.cfg;
    let reverse_order: Vec<BlockId> = order.iter().rev().copied().collect();
    let mut entry_env: FxHashMap<BlockId, BackwardTaintEnvironment> = FxHashMap::default();

    let exit_seed = backward_taint::initial_state(
        &request.method,
        true,
        request.previous_model.frozen,
        request.heuristics,
        ctx,
    );

    for _ in 0..request.heuristics.max_number_iterations {
        let mut changed = false;
        for &block_id in &reverse_order {
            let Some(block) = cfg.blocks.get(&block_id) else { continue };
            let mut env = if block.successors.is_empty() {
                exit_seed.clone()
            } else {
                join_predecessors(
                    cfg,
                    block_id,
                    &block.successors,
                    &entry_env,
                    BackwardTaintEnvironment::join_with,
                    BackwardTaintEnvironment::widen_with,
                )
            };

            let default_alias = ForwardAliasEnvironment::bottom();
            let alias_env = alias_envs.get(&block_id).unwrap_or(&default_alias);
            for (index, instruction) in block.instructions.iter().enumerate().rev() {
                let invoke_index = invoke_index_for(block_id, index as u32);
                env = backward_taint::apply_instruction(&env, alias_env, instruction, invoke_index, &request.method, program, ctx);
            }

            let stable = entry_env.get(&block_id).is_some_and(|p| env.leq(p));
            if !stable {
                changed = true;
            }
            entry_env.insert(block_id, env);
        }
        if !changed {
            break;
        }
    }

    entry_env.get(&cfg.entry).cloned().unwrap_or_else(BackwardTaintEnvironment::bottom)
}

/// Read the backward environment's requirement at parameter `position` and
/// split it into sink taint (ordinary kinds) and inferred propagations
/// (`Kind::Propagation` frames).
fn extract_parameter_requirement(env: &BackwardTaintEnvironment, ctx: &AnalysisContext, position: u32) -> (Taint, Vec<Propagation>) {
    let location = ctx.locations.parameter(position);
    let required = env.raw_read(&location);
    let sinks = required.filter(|frame| !matches!(&**frame.kind(), Kind::Propagation(_)));
    let mut propagations = Vec::new();
    required.visit(|frame| {
        let Kind::Propagation(output_root) = &**frame.kind() else { return };
        let input = AccessPath::root_only(Root::Argument(position));
        if frame.output_paths().is_empty() {
            propagations.push(Propagation { input: input.clone(), output: AccessPath::root_only(*output_root), transforms: None });
        }
        for path in frame.output_paths().keys() {
            let output = AccessPath::new(*output_root, path.clone());
            let entry = Propagation { input: input.clone(), output, transforms: None };
            if !propagations.contains(&entry) {
                propagations.push(entry);
            }
        }
    });
    (sinks, propagations)
}

/// Run a method's three-pass fixpoint and fold the result into a fresh
/// [`Model`], joined with `request.previous_model` so the interprocedural
/// driver sees monotonic growth across outer iterations. Does not touch the
/// `Registry`; the caller decides when to `set` the result.
pub fn analyze_method(request: &MethodAnalysisRequest, program: &Program, ctx: &AnalysisContext) -> Model {
    if request.previous_model.modes.skip_analysis {
        return request.previous_model.clone();
    }

    let order = request.cfg.reverse_postorder();
    let forward = run_forward(&order, request, program, ctx);

    let mut new_model = request.previous_model.clone();
    if !forward.converged {
        tracing::warn!(method = %request.method.signature, "forward pass did not converge, degrading to taint-through");
        new_model.modes = new_model.modes.join_with(&crate::model::Modes::degrade_to_taint_through());
        return new_model.join_with(request.previous_model).approximate(&FeatureSet::empty(), request.heuristics);
    }

    let backward_env = run_backward(&order, request, &forward.exit_alias, program, ctx);

    new_model.generations.write(&AccessPath::root_only(Root::Return), forward.returned, WriteKind::Strong, true);

    for position in 0..request.method.number_of_parameters() {
        let (sink_taint, propagations) = extract_parameter_requirement(&backward_env, ctx, position);
        if !sink_taint.is_bottom() {
            new_model
                .sinks
                .write(&AccessPath::new(Root::Argument(position), Path::empty()), sink_taint, WriteKind::Strong, true);
        }
        for propagation in propagations {
            if !new_model.propagations.contains(&propagation) {
                new_model.propagations.push(propagation);
            }
        }
    }

    let mut issues = request.previous_model.issues.clone();
    for issue in forward.issues {
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }
    new_model.issues = issues;

    if method_makes_any_call(request.cfg) {
        let call_chain = Taint::leaf(crate::frame::Frame::leaf(ctx.kind_factory.named("CallChain"), crate::frame::OriginSet::default()));
        new_model.call_effect_sources.write(&Path::empty(), call_chain, WriteKind::Strong, true);
    }

    new_model.join_with(request.previous_model).approximate(&FeatureSet::empty(), request.heuristics)
}

/// Whether any block in `cfg` contains an `invoke`: a method that calls out
/// is itself a source in the call-chain sense, distinct
/// from `call_effect_sinks`, which a method only carries when declared so
/// in its JSON model.
fn method_makes_any_call(cfg: &ControlFlowGraph) -> bool {
    cfg.blocks.values().any(|block| block.instructions.iter().any(|i| matches!(i, Instruction::Invoke { .. })))
}
