//! `CalleeFrames`: frames for one `(callee, call-info)` key, partitioned by
//! call position.

use crate::callee_port_frames::CalleePortFrames;
use crate::frame::{CallInfo, Frame};
use crate::intern::Interned;
use crate::ir::{Method, Position};
use crate::kind::Kind;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalleeFrames {
    callee: Option<Interned<Method>>,
    call_info: Option<CallInfo>,
    positions: FxHashMap<Option<Interned<Position>>, CalleePortFrames>,
}

impl CalleeFrames {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn is_bottom(&self) -> bool {
        self.positions.values().all(CalleePortFrames::is_bottom)
    }

    pub fn new(callee: Option<Interned<Method>>, call_info: CallInfo) -> Self {
        CalleeFrames {
            callee,
            call_info: Some(call_info),
            positions: FxHashMap::default(),
        }
    }

    pub fn callee(&self) -> Option<&Interned<Method>> {
        self.callee.as_ref()
    }

    pub fn call_info(&self) -> Option<CallInfo> {
        self.call_info
    }

    pub fn add_frame(&mut self, call_position: Option<Interned<Position>>, callee_port: crate::access_path::AccessPath, frame: Frame) {
        self.positions
            .entry(call_position)
            .or_insert_with(|| CalleePortFrames::new(callee_port))
            .add_frame(frame);
    }

    pub fn ports_at(&self, call_position: &Option<Interned<Position>>) -> Option<&CalleePortFrames> {
        self.positions.get(call_position)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&Option<Interned<Position>>, &CalleePortFrames)> {
        self.positions.iter()
    }

    pub fn contains_kind(&self, kind: &Interned<Kind>) -> bool {
        self.positions.values().any(|p| p.contains_kind(kind))
    }

    pub fn leq(&self, other: &CalleeFrames) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() || self.callee != other.callee || self.call_info != other.call_info {
            return false;
        }
        self.positions.iter().all(|(pos, ports)| {
            other
                .positions
                .get(pos)
                .is_some_and(|other_ports| ports.leq(other_ports))
        })
    }

    pub fn join_with(&self, other: &CalleeFrames) -> CalleeFrames {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        debug_assert_eq!(self.callee, other.callee, "CalleeFrames::join_with requires matching callee");
        debug_assert_eq!(self.call_info, other.call_info, "CalleeFrames::join_with requires matching call_info");
        let mut positions = self.positions.clone();
        for (pos, ports) in &other.positions {
            positions
                .entry(pos.clone())
                .and_modify(|existing| *existing = existing.join_with(ports))
                .or_insert_with(|| ports.clone());
        }
        CalleeFrames {
            callee: self.callee.clone(),
            call_info: self.call_info,
            positions,
        }
    }

    pub fn widen_with(&self, other: &CalleeFrames) -> CalleeFrames {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        let mut positions = self.positions.clone();
        for (pos, ports) in &other.positions {
            positions
                .entry(pos.clone())
                .and_modify(|existing| *existing = existing.widen_with(ports))
                .or_insert_with(|| ports.clone());
        }
        CalleeFrames {
            callee: self.callee.clone(),
            call_info: self.call_info,
            positions,
        }
    }

    pub fn transform(&self, f: impl Fn(&Frame) -> Option<Frame>) -> CalleeFrames {
        let mut result = self.clone();
        result.positions = self
            .positions
            .iter()
            .map(|(pos, ports)| (pos.clone(), ports.transform(&f)))
            .filter(|(_, ports)| !ports.is_bottom())
            .collect();
        result
    }

    pub fn filter(&self, pred: impl Fn(&Frame) -> bool) -> CalleeFrames {
        let mut result = self.clone();
        result.positions = self
            .positions
            .iter()
            .map(|(pos, ports)| (pos.clone(), ports.filter(&pred)))
            .filter(|(_, ports)| !ports.is_bottom())
            .collect();
        result
    }

    pub fn visit(&self, mut f: impl FnMut(&Frame)) {
        for ports in self.positions.values() {
            ports.visit(&mut f);
        }
    }
}
