//! Interprocedural driver: repeatedly runs [`crate::fixpoint::analyze_method`]
//! over the program's methods until every `Model` in the [`Registry`]
//! stabilizes.
//!
//! Grounded on `ParallelAndersenSolver` (`points_to/infrastructure/
//! parallel_andersen.rs`): a frontier is processed with `rayon`'s parallel
//! iterators each epoch, and a method whose `Model` grew re-enqueues its
//! callers via a `dependencies` relation computed once up front, rather than
//! a lock-free work-stealing queue (the `Registry`'s `DashMap` already gives
//! us the concurrent point reads/writes a finer-grained queue would exist for).

use crate::fixpoint::{self, MethodAnalysisRequest};
use crate::intern::Interned;
use crate::ir::{InvokeKind, Method, Program};
use crate::model::Heuristics;
use crate::registry::Registry;
use crate::transfer::{resolve_callees, AnalysisContext};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// method -> methods whose analysis read its Model, and so must be
/// re-analyzed when it changes (`Dependencies.cpp`'s `dependency(m)`
/// relation, built once from the call graph + overrides rather than
/// inlined into the worklist below).
pub struct Dependencies {
    dependents: FxHashMap<Interned<Method>, Vec<Interned<Method>>>,
}

impl Dependencies {
    /// Every `invoke` in every method's CFG is a potential read of its
    /// callee's Model, so the callee's dependents include every caller that
    /// can reach it through `resolve_callees` (static callee, call graph
    /// entry, or override set).
    pub fn build(program: &Program, ctx: &AnalysisContext) -> Self {
        let mut dependents: FxHashMap<Interned<Method>, Vec<Interned<Method>>> = FxHashMap::default();
        for caller in &program.methods {
            let Some(cfg) = program.cfg_of(caller) else { continue };
            for block in cfg.blocks.values() {
                for (index, instruction) in block.instructions.iter().enumerate() {
                    if let crate::ir::Instruction::Invoke { kind, callee, .. } = instruction {
                        let invoke_index = crate::ir::invoke_index(block.id, index);
                        let callees = resolve_callees(program, ctx, caller, invoke_index, callee, *kind);
                        for resolved in callees {
                            let callers = dependents.entry(resolved).or_default();
                            if !callers.contains(caller) {
                                callers.push(caller.clone());
                            }
                        }
                    }
                }
            }
        }
        Dependencies { dependents }
    }

    pub fn dependents_of(&self, method: &Interned<Method>) -> &[Interned<Method>] {
        self.dependents.get(method).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Outer-loop iteration cap distinct from [`Heuristics::max_number_iterations`]
/// (that one bounds a single method's per-block fixpoint; this bounds how
/// many times the same method may be re-entered across the whole program
/// before the driver gives up and reports [`crate::error::TaintError::GlobalResource`]).
pub struct DriverOptions {
    pub max_global_iterations: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions { max_global_iterations: 100 }
    }
}

/// Run the fixpoint to convergence (or `options.max_global_iterations`
/// epochs, whichever comes first) and return the populated [`Registry`]. The
/// first epoch analyzes every method; subsequent epochs analyze only the
/// frontier: methods whose dependency's Model changed in the previous epoch.
pub fn analyze_program(program: &Program, heuristics: &Heuristics, ctx: &AnalysisContext, options: &DriverOptions) -> crate::Result<Registry> {
    let dependencies = Dependencies::build(program, ctx);
    let mut frontier: FxHashSet<Interned<Method>> = program.methods.iter().cloned().collect();
    let mut epoch = 0;

    while !frontier.is_empty() {
        epoch += 1;
        if epoch > options.max_global_iterations {
            return Err(crate::error::TaintError::GlobalResource {
                iterations: epoch - 1,
                unstable: frontier.iter().map(|m| m.signature.clone()).collect(),
            });
        }

        let batch: Vec<Interned<Method>> = frontier.drain().collect();
        let results: Vec<(Interned<Method>, crate::model::Model, bool)> = batch
            .par_iter()
            .filter_map(|method| {
                let cfg = program.cfg_of(method)?;
                let previous_model = ctx.registry.get(method);
                let request = MethodAnalysisRequest { method: method.clone(), cfg, heuristics, previous_model: &previous_model };
                let new_model = fixpoint::analyze_method(&request, program, ctx);
                let changed = !new_model.leq(&previous_model);
                Some((method.clone(), new_model, changed))
            })
            .collect();

        let mut next_frontier = FxHashSet::default();
        for (method, new_model, changed) in results {
            if changed {
                ctx.registry.set(method.clone(), new_model);
                for dependent in dependencies.dependents_of(&method) {
                    next_frontier.insert(dependent.clone());
                }
            }
        }
        tracing::debug!(epoch, analyzed = batch.len(), next_frontier = next_frontier.len(), "fixpoint epoch");
        frontier = next_frontier;
    }

    tracing::info!(epochs = epoch, methods = program.methods.len(), "interprocedural fixpoint converged");
    Ok(ctx.registry.join_with(&Registry::new()))
}
