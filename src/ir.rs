//! Frontend-provided program data.
//!
//! Bytecode parsing, CFG construction, class-hierarchy/override/type
//! inference are explicitly out of scope: they are external
//! collaborators. This module only defines the plain data shapes the core
//! consumes: methods, fields, types, positions, the call graph, overrides,
//! class intervals, and control-flow graphs. A real deployment populates a
//! [`Program`] from a bytecode toolkit; tests populate it by hand or from
//! JSON fixtures.

use crate::intern::{Interned, Interner};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub signature: String,
    pub class_name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
}

impl Method {
    /// Number of formal arguments, including the implicit receiver for
    /// instance methods (`Argument(0)`).
    pub fn number_of_parameters(&self) -> u32 {
        let implicit_this = if self.is_static { 0 } else { 1 };
        self.parameter_types.len() as u32 + implicit_this
    }

    pub fn is_valid_parameter_position(&self, position: u32) -> bool {
        position < self.number_of_parameters()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub class_name: String,
    pub name: String,
    pub field_type: String,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class_name, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub path: Option<String>,
    pub line: i32,
}

/// A nested-set-model label on classes, used to cheaply refine receiver
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassInterval {
    pub lower: u32,
    pub upper: u32,
}

impl ClassInterval {
    pub fn top() -> Self {
        ClassInterval {
            lower: 0,
            upper: u32::MAX,
        }
    }

    pub fn intersects(&self, other: &ClassInterval) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    /// Smallest interval enclosing both (safe over-approximation on join).
    pub fn join(&self, other: &ClassInterval) -> ClassInterval {
        ClassInterval {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }
}

/// Interval context carried by a [`crate::frame::Frame`]: the interval plus
/// whether it still preserves the static type at the call (vs. having been
/// widened away).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallClassIntervalContext {
    pub interval: ClassInterval,
    pub preserves_type_context: bool,
}

impl CallClassIntervalContext {
    pub fn top() -> Self {
        CallClassIntervalContext {
            interval: ClassInterval::top(),
            preserves_type_context: false,
        }
    }

    pub fn join(&self, other: &CallClassIntervalContext) -> CallClassIntervalContext {
        CallClassIntervalContext {
            interval: self.interval.join(&other.interval),
            preserves_type_context: self.preserves_type_context && other.preserves_type_context,
        }
    }

    pub fn intersects(&self, other: &CallClassIntervalContext) -> bool {
        self.interval.intersects(&other.interval)
    }

    /// `self <= other` iff `self`'s interval is contained in `other`'s (more
    /// refined) and `self` preserves the type context at least as strongly.
    pub fn leq(&self, other: &CallClassIntervalContext) -> bool {
        other.interval.lower <= self.interval.lower
            && self.interval.upper <= other.interval.upper
            && (self.preserves_type_context || !other.preserves_type_context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Direct,
    Virtual,
    Interface,
    Super,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    LoadParam {
        dest: Register,
        index: u32,
    },
    NewInstance {
        dest: Register,
        ty: Interned<Type>,
    },
    NewArray {
        dest: Register,
        element_type: Interned<Type>,
    },
    Move {
        dest: Register,
        src: Register,
    },
    IGet {
        dest: Register,
        object: Register,
        field: Interned<Field>,
    },
    IPut {
        value: Register,
        object: Register,
        field: Interned<Field>,
    },
    AGet {
        dest: Register,
        array: Register,
    },
    APut {
        value: Register,
        array: Register,
    },
    SGet {
        dest: Register,
        field: Interned<Field>,
    },
    SPut {
        value: Register,
        field: Interned<Field>,
    },
    Invoke {
        kind: InvokeKind,
        callee: Interned<Method>,
        args: Vec<Register>,
    },
    MoveResult {
        dest: Register,
    },
    Return {
        value: Option<Register>,
    },
    Throw {
        value: Register,
    },
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub entry: BlockId,
    pub blocks: FxHashMap<BlockId, BasicBlock>,
    /// Back edges (source, target) as determined by a DFS from `entry`;
    /// these are the widening points for the per-method fixpoint.
    pub back_edges: Vec<(BlockId, BlockId)>,
}

/// Pack a block id and an in-block instruction index into the single
/// `usize` used to key `Program::call_graph` and `Dependencies` (an
/// `invoke` is uniquely identified by where it sits in its method's CFG).
pub fn invoke_index(block: BlockId, instruction_index: usize) -> usize {
    (block.0 as usize) << 16 | instruction_index
}

impl ControlFlowGraph {
    /// Reverse-postorder traversal of blocks, used to iterate the worklist
    /// in an order that converges quickly.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = rustc_hash::FxHashSet::default();
        let mut postorder = Vec::new();
        self.dfs(self.entry, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn dfs(
        &self,
        block: BlockId,
        visited: &mut rustc_hash::FxHashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(block) {
            return;
        }
        if let Some(b) = self.blocks.get(&block) {
            for &succ in &b.successors {
                self.dfs(succ, visited, postorder);
            }
        }
        postorder.push(block);
    }

    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.back_edges.contains(&(from, to))
    }
}

#[derive(Default)]
pub struct Context {
    pub strings: Interner<String>,
    pub types: Interner<Type>,
    pub methods: Interner<Method>,
    pub fields: Interner<Field>,
    pub positions: Interner<Position>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The in-memory program the driver iterates over: methods, their CFGs, and
/// the supporting call-graph / hierarchy data, all provided by the (out of
/// scope) frontend.
#[derive(Default)]
pub struct Program {
    pub methods: Vec<Interned<Method>>,
    pub cfgs: FxHashMap<Interned<Method>, ControlFlowGraph>,
    pub fields: Vec<Interned<Field>>,
    /// method -> methods that may override it (virtual dispatch targets).
    pub overrides: FxHashMap<Interned<Method>, Vec<Interned<Method>>>,
    /// callsite (caller, invoke index) -> resolved callee methods.
    pub call_graph: FxHashMap<(Interned<Method>, usize), Vec<Interned<Method>>>,
    pub class_intervals: FxHashMap<String, ClassInterval>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cfg_of(&self, method: &Interned<Method>) -> Option<&ControlFlowGraph> {
        self.cfgs.get(method)
    }

    pub fn overrides_of(&self, method: &Interned<Method>) -> &[Interned<Method>] {
        self.overrides
            .get(method)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn resolved_callees(
        &self,
        caller: &Interned<Method>,
        invoke_index: usize,
        static_callee: &Interned<Method>,
        kind: InvokeKind,
    ) -> Vec<Interned<Method>> {
        if let Some(resolved) = self.call_graph.get(&(caller.clone(), invoke_index)) {
            return resolved.clone();
        }
        match kind {
            InvokeKind::Virtual | InvokeKind::Interface => {
                let mut callees = vec![static_callee.clone()];
                callees.extend(self.overrides_of(static_callee).iter().cloned());
                callees
            }
            _ => vec![static_callee.clone()],
        }
    }
}

pub type Shared<T> = Arc<T>;
