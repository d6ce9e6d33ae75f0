//! The atom of taint: [`Frame`], plus its [`CallInfo`] provenance tag.

use crate::access_path::{Element, Path, Root};
use crate::crtex::CanonicalName;
use crate::features::{Feature, FeatureMayAlwaysSet, FeatureSet};
use crate::ir::{CallClassIntervalContext, Field, Method};
use crate::kind::Kind;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// How a frame was produced.
///
/// Transitions: `Declaration.propagate() = Origin`, `Origin.propagate() =
/// CallSite`, `CallSite.propagate() = CallSite`,
/// `PropagationWithTrace.propagate() = PropagationWithTrace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallInfo {
    /// Straight from the input model.
    Declaration,
    /// A leaf created during analysis (e.g. by `attach_position`).
    Origin,
    /// The result of one or more `propagate` hops.
    CallSite,
    /// A propagation frame that must also carry a trace, because it was
    /// produced while reading *through* a nested propagation. Once set,
    /// it is sticky across further propagation hops.
    PropagationWithTrace,
}

impl CallInfo {
    pub fn propagate(self) -> CallInfo {
        match self {
            CallInfo::Declaration => CallInfo::Origin,
            CallInfo::Origin => CallInfo::CallSite,
            CallInfo::CallSite => CallInfo::CallSite,
            CallInfo::PropagationWithTrace => CallInfo::PropagationWithTrace,
        }
    }

    pub fn is_declaration(self) -> bool {
        matches!(self, CallInfo::Declaration)
    }

    pub fn is_propagation(self) -> bool {
        matches!(self, CallInfo::CallSite | CallInfo::PropagationWithTrace)
    }
}

/// The ultimate producer of a piece of taint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    MethodPort(crate::intern::Interned<Method>, Root),
    Field(crate::intern::Interned<Field>),
    Literal(String),
    Canonical(String),
}

pub type OriginSet = FxHashSet<Origin>;

/// A set of ports materializing "via-type-of"/"via-value-of" features.
pub type TaggedRootSet = FxHashSet<Root>;

pub type CanonicalNameSet = FxHashSet<CanonicalName>;

/// Records that a frame's trace should be supplemented with a second,
/// auxiliary trace (e.g. the trace through a propagation's transform).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtraTrace {
    pub kind: crate::intern::Interned<Kind>,
    pub call_info: CallInfo,
    pub message: String,
}

pub type ExtraTraceSet = FxHashSet<ExtraTrace>;

/// How many levels deep a propagation's output path may still be written
/// before it must be collapsed into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollapseDepth(pub u32);

impl CollapseDepth {
    pub const NO_COLLAPSE: CollapseDepth = CollapseDepth(u32::MAX);

    pub fn min(self, other: CollapseDepth) -> CollapseDepth {
        CollapseDepth(self.0.min(other.0))
    }
}

/// Output paths a propagation frame writes to, each with the maximum
/// collapse depth still permitted at that path (`output_paths`).
pub type OutputPaths = BTreeMap<Path, CollapseDepth>;

fn join_output_paths(a: &OutputPaths, b: &OutputPaths) -> OutputPaths {
    let mut result = a.clone();
    for (path, depth) in b {
        result
            .entry(path.clone())
            .and_modify(|d| *d = (*d).min(*depth))
            .or_insert(*depth);
    }
    result
}

fn subset_output_paths(a: &OutputPaths, b: &OutputPaths) -> bool {
    a.iter().all(|(path, depth)| b.get(path).is_some_and(|d| d.0 <= depth.0))
}

/// A single annotated hop in a taint trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: crate::intern::Interned<Kind>,
    class_interval_context: CallClassIntervalContext,
    distance: u32,
    origins: OriginSet,
    inferred_features: FeatureMayAlwaysSet,
    user_features: FeatureSet,
    via_type_of_ports: TaggedRootSet,
    via_value_of_ports: TaggedRootSet,
    canonical_names: CanonicalNameSet,
    output_paths: OutputPaths,
    extra_traces: ExtraTraceSet,
}

impl Frame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: crate::intern::Interned<Kind>,
        class_interval_context: CallClassIntervalContext,
        distance: u32,
        origins: OriginSet,
        inferred_features: FeatureMayAlwaysSet,
        user_features: FeatureSet,
    ) -> Self {
        Frame {
            kind,
            class_interval_context,
            distance,
            origins,
            inferred_features,
            user_features,
            via_type_of_ports: TaggedRootSet::default(),
            via_value_of_ports: TaggedRootSet::default(),
            canonical_names: CanonicalNameSet::default(),
            output_paths: OutputPaths::default(),
            extra_traces: ExtraTraceSet::default(),
        }
    }

    pub fn leaf(kind: crate::intern::Interned<Kind>, origins: OriginSet) -> Self {
        Frame::new(
            kind,
            CallClassIntervalContext::top(),
            0,
            origins,
            FeatureMayAlwaysSet::bottom(),
            FeatureSet::empty(),
        )
    }

    pub fn kind(&self) -> &crate::intern::Interned<Kind> {
        &self.kind
    }

    pub fn class_interval_context(&self) -> &CallClassIntervalContext {
        &self.class_interval_context
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    pub fn origins(&self) -> &OriginSet {
        &self.origins
    }

    pub fn origins_mut(&mut self) -> &mut OriginSet {
        &mut self.origins
    }

    pub fn set_distance(&mut self, distance: u32) {
        self.distance = distance;
    }

    pub fn set_distance_zero(&mut self) {
        self.distance = 0;
    }

    pub fn inferred_features(&self) -> &FeatureMayAlwaysSet {
        &self.inferred_features
    }

    pub fn user_features(&self) -> &FeatureSet {
        &self.user_features
    }

    pub fn via_type_of_ports(&self) -> &TaggedRootSet {
        &self.via_type_of_ports
    }

    pub fn via_value_of_ports(&self) -> &TaggedRootSet {
        &self.via_value_of_ports
    }

    pub fn canonical_names(&self) -> &CanonicalNameSet {
        &self.canonical_names
    }

    pub fn output_paths(&self) -> &OutputPaths {
        &self.output_paths
    }

    pub fn extra_traces(&self) -> &ExtraTraceSet {
        &self.extra_traces
    }

    pub fn with_via_type_of_ports(mut self, ports: TaggedRootSet) -> Self {
        self.via_type_of_ports = ports;
        self
    }

    pub fn with_via_value_of_ports(mut self, ports: TaggedRootSet) -> Self {
        self.via_value_of_ports = ports;
        self
    }

    pub fn with_canonical_names(mut self, names: CanonicalNameSet) -> Self {
        self.canonical_names = names;
        self
    }

    /// Identity on every field except `kind`; used by transform rewriting.
    pub fn with_kind(&self, new_kind: crate::intern::Interned<Kind>) -> Self {
        let mut frame = self.clone();
        frame.kind = new_kind;
        frame
    }

    /// Identity except for the class-interval context.
    pub fn with_interval(&self, interval: CallClassIntervalContext) -> Self {
        let mut frame = self.clone();
        frame.class_interval_context = interval;
        frame
    }

    /// Only meaningful for propagation frames; a no-op otherwise.
    pub fn append_to_propagation_output_paths(&mut self, element: Element) {
        if !matches!(&*self.kind, Kind::Propagation(_)) {
            return;
        }
        let mut appended = OutputPaths::new();
        if self.output_paths.is_empty() {
            appended.insert(Path::from_elements(vec![element]), CollapseDepth::NO_COLLAPSE);
        } else {
            for (path, depth) in &self.output_paths {
                appended.insert(path.with_appended(element.clone()), *depth);
            }
        }
        self.output_paths = appended;
    }

    /// Only meaningful for propagation frames; a no-op otherwise.
    pub fn update_maximum_collapse_depth(&mut self, depth: CollapseDepth) {
        if !matches!(&*self.kind, Kind::Propagation(_)) {
            return;
        }
        if self.output_paths.is_empty() {
            self.output_paths.insert(Path::empty(), depth);
        } else {
            for d in self.output_paths.values_mut() {
                *d = (*d).min(depth);
            }
        }
    }

    /// Emit one synthetic "via-type-of" feature per configured port.
    pub fn materialize_via_type_of_ports(
        &self,
        features: &crate::features::FeatureFactory,
        source_register_types: &rustc_hash::FxHashMap<Root, String>,
    ) -> Vec<Feature> {
        self.via_type_of_ports
            .iter()
            .filter_map(|port| {
                source_register_types
                    .get(port)
                    .map(|ty| features.get(format!("via-type-of:{}", ty)))
            })
            .collect()
    }

    /// Emit one synthetic "via-value-of" feature per configured port.
    pub fn materialize_via_value_of_ports(
        &self,
        features: &crate::features::FeatureFactory,
        source_constant_arguments: &rustc_hash::FxHashMap<Root, String>,
    ) -> Vec<Feature> {
        self.via_value_of_ports
            .iter()
            .filter_map(|port| {
                source_constant_arguments
                    .get(port)
                    .map(|value| features.get(format!("via-value-of:{}", value)))
            })
            .collect()
    }

    /// Drop via-ports whose position is out of range for `method`.
    pub fn filter_invalid_via_features(&mut self, method: &Method) {
        self.via_type_of_ports
            .retain(|root| root.parameter_position().map_or(true, |p| method.is_valid_parameter_position(p)));
        self.via_value_of_ports
            .retain(|root| root.parameter_position().map_or(true, |p| method.is_valid_parameter_position(p)));
    }

    pub fn add_inferred_features(&mut self, features: &FeatureMayAlwaysSet) {
        self.inferred_features = self.inferred_features.join_with(features);
    }

    pub fn add_user_features(&mut self, features: &FeatureSet) {
        self.user_features = self.user_features.union(features);
    }

    pub fn leq(&self, other: &Frame) -> bool {
        self.kind == other.kind
            && self.class_interval_context.leq(&other.class_interval_context)
            && self.distance >= other.distance
            && self.origins.is_subset(&other.origins)
            && self.inferred_features.leq(&other.inferred_features)
            && self.user_features.is_subset(&other.user_features)
            && self.via_type_of_ports.is_subset(&other.via_type_of_ports)
            && self.via_value_of_ports.is_subset(&other.via_value_of_ports)
            && self.canonical_names.is_subset(&other.canonical_names)
            && self.extra_traces.is_subset(&other.extra_traces)
            && subset_output_paths(&self.output_paths, &other.output_paths)
    }

    /// Requires `self.kind == other.kind` (enforced by an assert; mismatching
    /// kinds are joined one layer up, at [`crate::kind_frames::KindFrames`]).
    pub fn join_with(&self, other: &Frame) -> Frame {
        debug_assert_eq!(self.kind, other.kind, "Frame::join_with requires matching kinds");
        Frame {
            kind: self.kind.clone(),
            class_interval_context: self.class_interval_context.join(&other.class_interval_context),
            distance: self.distance.min(other.distance),
            origins: self.origins.union(&other.origins).cloned().collect(),
            inferred_features: self.inferred_features.join_with(&other.inferred_features),
            user_features: self.user_features.union(&other.user_features),
            via_type_of_ports: self.via_type_of_ports.union(&other.via_type_of_ports).cloned().collect(),
            via_value_of_ports: self.via_value_of_ports.union(&other.via_value_of_ports).cloned().collect(),
            canonical_names: self.canonical_names.union(&other.canonical_names).cloned().collect(),
            output_paths: join_output_paths(&self.output_paths, &other.output_paths),
            extra_traces: self.extra_traces.union(&other.extra_traces).cloned().collect(),
        }
    }

    pub fn add_extra_trace(&mut self, extra_trace: ExtraTrace) {
        self.extra_traces.insert(extra_trace);
    }
}
