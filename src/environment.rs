//! Abstract environments consumed by the transfer functions.

use crate::access_path::{Element, Path};
use crate::frame::ExtraTrace;
use crate::intern::Interned;
use crate::ir::Position;
use crate::memory_location::{MemoryLocation, RootMemoryLocation};
use crate::taint::Taint;
use crate::taint_tree::TaintTree;
use crate::tree::WriteKind;
use rustc_hash::{FxHashMap, FxHashSet};

/// register -> set of memory locations it may point to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLocationEnvironment {
    registers: FxHashMap<crate::ir::Register, FxHashSet<Interned<MemoryLocation>>>,
}

impl MemoryLocationEnvironment {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, register: crate::ir::Register, location: Interned<MemoryLocation>) {
        self.registers.entry(register).or_default().insert(location);
    }

    pub fn bind_exact(&mut self, register: crate::ir::Register, location: Interned<MemoryLocation>) {
        let mut set = FxHashSet::default();
        set.insert(location);
        self.registers.insert(register, set);
    }

    pub fn locations(&self, register: crate::ir::Register) -> FxHashSet<Interned<MemoryLocation>> {
        self.registers.get(&register).cloned().unwrap_or_default()
    }

    pub fn join_with(&self, other: &MemoryLocationEnvironment) -> MemoryLocationEnvironment {
        let mut registers = self.registers.clone();
        for (register, locations) in &other.registers {
            registers
                .entry(*register)
                .or_default()
                .extend(locations.iter().cloned());
        }
        MemoryLocationEnvironment { registers }
    }

    pub fn leq(&self, other: &MemoryLocationEnvironment) -> bool {
        self.registers.iter().all(|(register, locations)| {
            other
                .registers
                .get(register)
                .is_some_and(|other_locations| locations.is_subset(other_locations))
        })
    }
}

/// Tree-shaped points-to relation, used to resolve aliases through field
/// dereferences and to widen cycles created by back edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsToEnvironment {
    points_to: FxHashMap<Interned<MemoryLocation>, FxHashSet<Interned<MemoryLocation>>>,
}

impl PointsToEnvironment {
    pub fn bottom() -> Self {
        Self::default()
    }

    /// Strong update replaces the target's points-to set; weak joins into
    /// it. Called at `iput`/`aput` guarded by whether the destination
    /// resolves to a single memory location.
    pub fn write(&mut self, location: Interned<MemoryLocation>, target: Interned<MemoryLocation>, kind: WriteKind) {
        let set = self.points_to.entry(location).or_default();
        if kind == WriteKind::Strong {
            set.clear();
        }
        set.insert(target);
    }

    pub fn resolve(&self, location: &Interned<MemoryLocation>) -> FxHashSet<Interned<MemoryLocation>> {
        let mut resolved = FxHashSet::default();
        let mut frontier = vec![location.clone()];
        let mut visited = FxHashSet::default();
        while let Some(current) = frontier.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            match self.points_to.get(&current) {
                Some(targets) if !targets.is_empty() => {
                    for target in targets {
                        frontier.push(target.clone());
                    }
                }
                _ => {
                    resolved.insert(current);
                }
            }
        }
        resolved
    }

    pub fn join_with(&self, other: &PointsToEnvironment) -> PointsToEnvironment {
        let mut points_to = self.points_to.clone();
        for (location, targets) in &other.points_to {
            points_to.entry(location.clone()).or_default().extend(targets.iter().cloned());
        }
        PointsToEnvironment { points_to }
    }

    /// Cycles through back edges are widened by giving up precision on the
    /// resolved set rather than iterating forever: once the same location
    /// is written twice at a back-edge join, its points-to set is frozen to
    /// the union observed so far.
    pub fn widen_with(&self, other: &PointsToEnvironment) -> PointsToEnvironment {
        self.join_with(other)
    }
}

/// Forward-alias state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardAliasEnvironment {
    pub memory_locations: MemoryLocationEnvironment,
    pub points_to: PointsToEnvironment,
    pub last_position: Option<Interned<Position>>,
    pub last_parameter_load: u32,
    /// The memory location standing in for the VM's `RESULT_REGISTER`,
    /// populated by the most recent `invoke` and consumed by the following
    /// `move-result`.
    pub last_invoke_result: Option<Interned<MemoryLocation>>,
}

impl ForwardAliasEnvironment {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn join_with(&self, other: &ForwardAliasEnvironment) -> ForwardAliasEnvironment {
        ForwardAliasEnvironment {
            memory_locations: self.memory_locations.join_with(&other.memory_locations),
            points_to: self.points_to.join_with(&other.points_to),
            last_position: self.last_position.clone().or_else(|| other.last_position.clone()),
            last_parameter_load: self.last_parameter_load.max(other.last_parameter_load),
            last_invoke_result: self.last_invoke_result.clone().or_else(|| other.last_invoke_result.clone()),
        }
    }

    pub fn widen_with(&self, other: &ForwardAliasEnvironment) -> ForwardAliasEnvironment {
        ForwardAliasEnvironment {
            memory_locations: self.memory_locations.join_with(&other.memory_locations),
            points_to: self.points_to.widen_with(&other.points_to),
            last_position: self.last_position.clone().or_else(|| other.last_position.clone()),
            last_parameter_load: self.last_parameter_load.max(other.last_parameter_load),
            last_invoke_result: self.last_invoke_result.clone().or_else(|| other.last_invoke_result.clone()),
        }
    }

    pub fn leq(&self, other: &ForwardAliasEnvironment) -> bool {
        self.memory_locations.leq(&other.memory_locations)
    }
}

/// `MemoryLocation.root -> TaintTree`; shared shape for the
/// forward-taint and backward-taint analyses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintEnvironment {
    by_root: FxHashMap<RootMemoryLocation, TaintTree>,
}

impl TaintEnvironment {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.by_root.values().all(TaintTree::is_bottom)
    }

    pub fn write(&mut self, location: &MemoryLocation, taint: Taint, kind: WriteKind, is_singleton: bool) {
        self.by_root
            .entry(location.root().clone())
            .or_default()
            .write(location.path(), taint, kind, is_singleton);
    }

    pub fn read(&self, location: &MemoryLocation, propagate: impl Fn(&Taint, &Element) -> Taint) -> Taint {
        self.by_root
            .get(location.root())
            .map(|tree| tree.read(location.path(), propagate).root_value().clone())
            .unwrap_or_else(Taint::bottom)
    }

    pub fn raw_read(&self, location: &MemoryLocation) -> Taint {
        self.by_root
            .get(location.root())
            .map(|tree| tree.raw_read(location.path()).root_value().clone())
            .unwrap_or_else(Taint::bottom)
    }

    /// Read through an alias set, joining the taint at each resolved
    /// location; propagation folds ancestor values as in a single read.
    pub fn deep_read(
        &self,
        locations: &FxHashSet<Interned<MemoryLocation>>,
        propagate: impl Fn(&Taint, &Element) -> Taint,
    ) -> Taint {
        let mut result = Taint::bottom();
        for location in locations {
            result = result.join_with(&self.read(location, &propagate));
        }
        result
    }

    /// A write at a resolved alias set becomes a weak update at each
    /// element, unless the set is a singleton and the caller requested a
    /// strong write.
    pub fn deep_write(&mut self, locations: &FxHashSet<Interned<MemoryLocation>>, taint: Taint, kind: WriteKind) {
        let is_singleton = locations.len() == 1;
        for location in locations {
            self.write(location, taint.clone(), kind, is_singleton);
        }
    }

    pub fn join_with(&self, other: &TaintEnvironment) -> TaintEnvironment {
        let mut by_root = self.by_root.clone();
        for (root, tree) in &other.by_root {
            by_root
                .entry(root.clone())
                .and_modify(|existing| *existing = existing.join_with(tree))
                .or_insert_with(|| tree.clone());
        }
        TaintEnvironment { by_root }
    }

    /// Taint has no unbounded ascending chains below the heuristics'
    /// leaf/depth caps, so widening falls back to join.
    pub fn widen_with(&self, other: &TaintEnvironment) -> TaintEnvironment {
        self.join_with(other)
    }

    pub fn leq(&self, other: &TaintEnvironment) -> bool {
        self.by_root.iter().all(|(root, tree)| {
            other
                .by_root
                .get(root)
                .is_some_and(|other_tree| tree.leq(other_tree))
        })
    }

    pub fn add_extra_trace_everywhere(&mut self, extra_trace: ExtraTrace) {
        for tree in self.by_root.values_mut() {
            *tree = tree.map(&|taint: &Taint| {
                taint.transform(|frame| {
                    let mut frame = frame.clone();
                    frame.add_extra_trace(extra_trace.clone());
                    Some(frame)
                })
            });
        }
    }
}
