//! `CalleePortFrames`: frames at one callee port, partitioned by kind.

use crate::access_path::AccessPath;
use crate::frame::Frame;
use crate::intern::Interned;
use crate::ir::Position;
use crate::kind::Kind;
use crate::kind_frames::KindFrames;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalleePortFrames {
    callee_port: Option<AccessPath>,
    kinds: FxHashMap<Interned<Kind>, KindFrames>,
    local_positions: BTreeSet<Interned<Position>>,
    inferred_features: crate::features::FeatureMayAlwaysSet,
}

impl CalleePortFrames {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.kinds.values().all(KindFrames::is_bottom)
    }

    pub fn new(callee_port: AccessPath) -> Self {
        CalleePortFrames {
            callee_port: Some(callee_port),
            ..Default::default()
        }
    }

    pub fn callee_port(&self) -> Option<&AccessPath> {
        self.callee_port.as_ref()
    }

    pub fn local_positions(&self) -> &BTreeSet<Interned<Position>> {
        &self.local_positions
    }

    pub fn inferred_features(&self) -> &crate::features::FeatureMayAlwaysSet {
        &self.inferred_features
    }

    pub fn add_local_position(&mut self, position: Interned<Position>) {
        self.local_positions.insert(position);
    }

    pub fn add_inferred_features(&mut self, features: &crate::features::FeatureMayAlwaysSet) {
        self.inferred_features = self.inferred_features.join_with(features);
    }

    pub fn add_frame(&mut self, frame: Frame) {
        self.kinds
            .entry(frame.kind().clone())
            .or_insert_with(KindFrames::bottom)
            .add_frame(frame);
    }

    pub fn contains_kind(&self, kind: &Interned<Kind>) -> bool {
        self.kinds.get(kind).is_some_and(|k| !k.is_bottom())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindFrames> {
        self.kinds.values()
    }

    pub fn leq(&self, other: &CalleePortFrames) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.kinds.iter().all(|(kind, frames)| {
            other
                .kinds
                .get(kind)
                .is_some_and(|other_frames| frames.leq(other_frames))
        }) && self.local_positions.is_subset(&other.local_positions)
            && self.inferred_features.leq(&other.inferred_features)
    }

    pub fn join_with(&self, other: &CalleePortFrames) -> CalleePortFrames {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        let mut kinds = self.kinds.clone();
        for (kind, frames) in &other.kinds {
            kinds
                .entry(kind.clone())
                .and_modify(|existing| *existing = existing.join_with(frames))
                .or_insert_with(|| frames.clone());
        }
        CalleePortFrames {
            callee_port: self.callee_port.clone().or_else(|| other.callee_port.clone()),
            kinds,
            local_positions: self.local_positions.union(&other.local_positions).cloned().collect(),
            inferred_features: self.inferred_features.join_with(&other.inferred_features),
        }
    }

    pub fn widen_with(&self, other: &CalleePortFrames) -> CalleePortFrames {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        let mut kinds = self.kinds.clone();
        for (kind, frames) in &other.kinds {
            kinds
                .entry(kind.clone())
                .and_modify(|existing| *existing = existing.widen_with(frames))
                .or_insert_with(|| frames.clone());
        }
        CalleePortFrames {
            callee_port: self.callee_port.clone().or_else(|| other.callee_port.clone()),
            kinds,
            local_positions: self.local_positions.union(&other.local_positions).cloned().collect(),
            inferred_features: self.inferred_features.join_with(&other.inferred_features),
        }
    }

    pub fn transform(&self, f: impl Fn(&Frame) -> Option<Frame>) -> CalleePortFrames {
        let mut result = self.clone();
        result.kinds = self
            .kinds
            .iter()
            .map(|(kind, frames)| (kind.clone(), frames.transform(&f)))
            .filter(|(_, frames)| !frames.is_bottom())
            .collect();
        result
    }

    pub fn filter(&self, pred: impl Fn(&Frame) -> bool) -> CalleePortFrames {
        let mut result = self.clone();
        result.kinds = self
            .kinds
            .iter()
            .map(|(kind, frames)| (kind.clone(), frames.filter(&pred)))
            .filter(|(_, frames)| !frames.is_bottom())
            .collect();
        result
    }

    pub fn visit(&self, mut f: impl FnMut(&Frame)) {
        for frames in self.kinds.values() {
            frames.visit(&mut f);
        }
    }

    /// Wrap each frame's kind with `local`/`global` transforms, dropping any
    /// kind that no live rule references.
    pub fn apply_transform(
        &self,
        kinds_factory: &crate::kind::KindFactory,
        local: Interned<crate::transform::TransformList>,
        global: Interned<crate::transform::TransformList>,
        used_kinds: &crate::rules::UsedKinds,
    ) -> CalleePortFrames {
        let mut result = CalleePortFrames {
            callee_port: self.callee_port.clone(),
            local_positions: self.local_positions.clone(),
            inferred_features: self.inferred_features.clone(),
            ..Default::default()
        };
        for frames in self.kinds.values() {
            for frame in frames.frames() {
                let transformed_kind =
                    kinds_factory.transform(frame.kind().clone(), local.clone(), global.clone());
                if used_kinds.contains(&transformed_kind) {
                    result.add_frame(frame.with_kind(transformed_kind));
                }
            }
        }
        result
    }

    /// For each frame, map its kind to zero or more new kinds, producing the
    /// cartesian product of frames; `add_features` computes extra features
    /// to add only on the transformed frames.
    pub fn transform_kind_with_features(
        &self,
        map_kind: impl Fn(&Interned<Kind>) -> Vec<Interned<Kind>>,
        add_features: impl Fn(&Interned<Kind>) -> crate::features::FeatureSet,
    ) -> CalleePortFrames {
        let mut result = CalleePortFrames {
            callee_port: self.callee_port.clone(),
            local_positions: self.local_positions.clone(),
            inferred_features: self.inferred_features.clone(),
            ..Default::default()
        };
        for frames in self.kinds.values() {
            for frame in frames.frames() {
                for new_kind in map_kind(frame.kind()) {
                    let mut new_frame = frame.with_kind(new_kind.clone());
                    new_frame.add_user_features(&add_features(&new_kind));
                    result.add_frame(new_frame);
                }
            }
        }
        result
    }
}
