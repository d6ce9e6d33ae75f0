//! `Taint`: the top of the five-layer frame lattice, partitioned by
//! `(callee, call-info)`.

use crate::access_path::{AccessPath, Root};
use crate::callee_frames::CalleeFrames;
use crate::crtex::{CanonicalName, CanonicalNameConverter};
use crate::features::{FeatureFactory, FeatureMayAlwaysSet, FeatureSet};
use crate::frame::{CallInfo, Frame, Origin};
use crate::intern::Interned;
use crate::ir::{CallClassIntervalContext, ClassInterval, Method, Position};
use crate::kind::Kind;
use rustc_hash::FxHashMap;

type CalleeKey = (Option<Interned<Method>>, CallInfo);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taint {
    by_callee: FxHashMap<CalleeKey, CalleeFrames>,
}

impl Taint {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.by_callee.values().all(CalleeFrames::is_bottom)
    }

    pub fn leaf(frame: Frame) -> Self {
        let mut taint = Taint::bottom();
        taint.add_frame(None, CallInfo::Declaration, None, AccessPath::root_only(Root::Leaf), frame);
        taint
    }

    pub fn add_frame(
        &mut self,
        callee: Option<Interned<Method>>,
        call_info: CallInfo,
        call_position: Option<Interned<Position>>,
        callee_port: AccessPath,
        frame: Frame,
    ) {
        self.by_callee
            .entry((callee.clone(), call_info))
            .or_insert_with(|| CalleeFrames::new(callee, call_info))
            .add_frame(call_position, callee_port, frame);
    }

    pub fn contains_kind(&self, kind: &Interned<Kind>) -> bool {
        self.by_callee.values().any(|frames| frames.contains_kind(kind))
    }

    pub fn groups(&self) -> impl Iterator<Item = &CalleeFrames> {
        self.by_callee.values()
    }

    pub fn visit(&self, mut f: impl FnMut(&Frame)) {
        for frames in self.by_callee.values() {
            frames.visit(&mut f);
        }
    }

    pub fn leq(&self, other: &Taint) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.by_callee.iter().all(|(key, frames)| {
            other
                .by_callee
                .get(key)
                .is_some_and(|other_frames| frames.leq(other_frames))
        })
    }

    pub fn join_with(&self, other: &Taint) -> Taint {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        let mut by_callee = self.by_callee.clone();
        for (key, frames) in &other.by_callee {
            by_callee
                .entry(key.clone())
                .and_modify(|existing| *existing = existing.join_with(frames))
                .or_insert_with(|| frames.clone());
        }
        Taint { by_callee }
    }

    pub fn widen_with(&self, other: &Taint) -> Taint {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        let mut by_callee = self.by_callee.clone();
        for (key, frames) in &other.by_callee {
            by_callee
                .entry(key.clone())
                .and_modify(|existing| *existing = existing.widen_with(frames))
                .or_insert_with(|| frames.clone());
        }
        Taint { by_callee }
    }

    pub fn transform(&self, f: impl Fn(&Frame) -> Option<Frame>) -> Taint {
        let by_callee = self
            .by_callee
            .iter()
            .map(|(key, frames)| (key.clone(), frames.transform(&f)))
            .filter(|(_, frames)| !frames.is_bottom())
            .collect();
        Taint { by_callee }
    }

    pub fn filter(&self, pred: impl Fn(&Frame) -> bool) -> Taint {
        let by_callee = self
            .by_callee
            .iter()
            .map(|(key, frames)| (key.clone(), frames.filter(&pred)))
            .filter(|(_, frames)| !frames.is_bottom())
            .collect();
        Taint { by_callee }
    }

    /// Produce a new leaf-like copy where every frame becomes a leaf
    /// (`distance = 0`) at `position`, tagged `CallInfo::Origin`.
    pub fn attach_position(&self, position: Interned<Position>) -> Taint {
        let mut result = Taint::bottom();
        self.visit(|frame| {
            let mut leaf = frame.clone();
            leaf.set_distance_zero();
            result.add_frame(
                None,
                CallInfo::Origin,
                Some(position.clone()),
                AccessPath::root_only(Root::Leaf),
                leaf,
            );
        });
        result
    }
}

/// Inputs describing one call site, consumed by [`Taint::propagate`].
pub struct CallSite<'a> {
    pub callee: Interned<Method>,
    pub callee_port: AccessPath,
    pub call_position: Option<Interned<Position>>,
    pub source_register_types: &'a rustc_hash::FxHashMap<Root, String>,
    pub source_constant_arguments: &'a rustc_hash::FxHashMap<Root, String>,
    pub class_interval_context: CallClassIntervalContext,
    pub caller_class_interval: ClassInterval,
    pub class_interval_mode_enabled: bool,
    pub maximum_source_sink_distance: u32,
    pub features: &'a FeatureFactory,
    pub via_type_of_names: &'a [String],
    pub canonical_name_converter: &'a dyn CanonicalNameConverter,
}

impl Taint {
    /// Propagate `self` (the callee's Taint) across `site`, producing the
    /// Taint that flows back into the caller.
    pub fn propagate(&self, site: &CallSite) -> Taint {
        if site.class_interval_mode_enabled
            && !site
                .class_interval_context
                .interval
                .intersects(&site.caller_class_interval)
        {
            return Taint::bottom();
        }

        let mut result = Taint::bottom();
        for ((_old_callee, old_call_info), callee_frames) in &self.by_callee {
            let new_call_info = old_call_info.propagate();
            for (_old_position, ports) in callee_frames.positions() {
                for kind_frames in ports.kinds() {
                    for frame in kind_frames.frames() {
                        if frame.distance().saturating_add(1) > site.maximum_source_sink_distance {
                            continue;
                        }
                        let mut new_frame = frame.with_interval(site.class_interval_context);
                        new_frame.set_distance(frame.distance() + 1);

                        let mut extra = FeatureSet::empty();
                        for feature in frame.materialize_via_type_of_ports(site.features, site.source_register_types)
                        {
                            extra.insert(feature);
                        }
                        for feature in
                            frame.materialize_via_value_of_ports(site.features, site.source_constant_arguments)
                        {
                            extra.insert(feature);
                        }
                        new_frame.add_inferred_features(&FeatureMayAlwaysSet::make_always(extra));

                        result.add_frame(
                            Some(site.callee.clone()),
                            new_call_info,
                            site.call_position.clone(),
                            site.callee_port.clone(),
                            new_frame,
                        );
                    }
                }
            }
        }

        instantiate_crtex(result, site)
    }
}

/// Rewrite `Anchor`-ported groups whose frames carry template canonical
/// names into `Producer`-ported groups with the templates instantiated.
fn instantiate_crtex(taint: Taint, site: &CallSite) -> Taint {
    if site.callee_port.root() != Root::Anchor {
        return taint;
    }
    let mut result = Taint::bottom();
    for ((callee, call_info), callee_frames) in taint.by_callee {
        for (call_position, ports) in callee_frames.positions() {
            for kind_frames in ports.kinds() {
                for frame in kind_frames.frames() {
                    let mut new_frame = frame.clone();
                    let mut templates: Vec<String> = Vec::new();
                    for name in frame.canonical_names() {
                        if let CanonicalName::Template(text) = name {
                            templates.push(text.clone());
                        }
                    }
                    if templates.is_empty() {
                        result.add_frame(
                            callee.clone(),
                            call_info,
                            call_position.clone(),
                            site.callee_port.clone(),
                            new_frame,
                        );
                        continue;
                    }
                    let mut instantiated = crate::frame::CanonicalNameSet::default();
                    for template in &templates {
                        let name = crate::crtex::instantiate(
                            template,
                            &site.callee,
                            site.via_type_of_names,
                            site.canonical_name_converter,
                        );
                        if let CanonicalName::Instance(text) = &name {
                            new_frame.origins_mut().insert(Origin::Canonical(text.clone()));
                        }
                        instantiated.insert(name);
                    }
                    new_frame = new_frame.with_canonical_names(instantiated);
                    let producer_port = AccessPath::new(Root::Producer, site.callee_port.path().clone());
                    result.add_frame(callee.clone(), call_info, call_position.clone(), producer_port, new_frame);
                }
            }
        }
    }
    result
}
