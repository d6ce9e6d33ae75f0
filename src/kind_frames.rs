//! `KindFrames`: frames of one kind, partitioned by class-interval
//! subsumption.

use crate::frame::Frame;
use crate::intern::Interned;
use crate::kind::Kind;

/// An antichain of frames sharing one `kind`, deduplicated by interval
/// subsumption: no two frames in the set have comparable intervals, since a
/// subsumed one is always joined into the frame that subsumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFrames {
    kind: Option<Interned<Kind>>,
    frames: Vec<Frame>,
}

impl KindFrames {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn singleton(frame: Frame) -> Self {
        let kind = frame.kind().clone();
        KindFrames {
            kind: Some(kind),
            frames: vec![frame],
        }
    }

    pub fn is_bottom(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn kind(&self) -> Option<&Interned<Kind>> {
        self.kind.as_ref()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Insert `frame`, merging with any frame whose interval is comparable
    /// (joins subsume; equal/narrower frames are absorbed).
    pub fn add_frame(&mut self, frame: Frame) {
        match &self.kind {
            None => self.kind = Some(frame.kind().clone()),
            Some(kind) => debug_assert_eq!(kind, frame.kind(), "KindFrames::add_frame requires matching kind"),
        }
        for existing in &mut self.frames {
            if frame.leq(existing) {
                return;
            }
            if existing.leq(&frame) {
                *existing = existing.join_with(&frame);
                return;
            }
        }
        self.frames.push(frame);
    }

    pub fn contains_kind(&self, kind: &Interned<Kind>) -> bool {
        self.kind.as_ref() == Some(kind)
    }

    pub fn leq(&self, other: &KindFrames) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        debug_assert_eq!(self.kind, other.kind);
        self.frames.iter().all(|f| other.frames.iter().any(|g| f.leq(g)))
    }

    pub fn join_with(&self, other: &KindFrames) -> KindFrames {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        debug_assert_eq!(self.kind, other.kind, "KindFrames::join_with requires matching kind");
        let mut result = self.clone();
        for frame in &other.frames {
            result.add_frame(frame.clone());
        }
        result
    }

    /// No unbounded ascending chains at this level (interval/feature sets
    /// are finite per input model), so widening is exact join.
    pub fn widen_with(&self, other: &KindFrames) -> KindFrames {
        self.join_with(other)
    }

    /// Frames present in both, pairwise joined down to their common
    /// information; conservative but sound meet.
    pub fn meet_with(&self, other: &KindFrames) -> KindFrames {
        if self.is_bottom() || other.is_bottom() {
            return KindFrames::bottom();
        }
        let mut result = KindFrames::bottom();
        for f in &self.frames {
            for g in &other.frames {
                if f.leq(g) {
                    result.add_frame(f.clone());
                } else if g.leq(f) {
                    result.add_frame(g.clone());
                }
            }
        }
        result
    }

    pub fn narrow_with(&self, other: &KindFrames) -> KindFrames {
        self.meet_with(other)
    }

    pub fn difference_with(&self, other: &KindFrames) -> KindFrames {
        let mut result = KindFrames::bottom();
        for f in &self.frames {
            if !other.frames.iter().any(|g| f.leq(g)) {
                result.add_frame(f.clone());
            }
        }
        result
    }

    pub fn transform(&self, f: impl Fn(&Frame) -> Option<Frame>) -> KindFrames {
        let mut result = KindFrames::bottom();
        for frame in &self.frames {
            if let Some(transformed) = f(frame) {
                result.add_frame(transformed);
            }
        }
        result
    }

    pub fn filter(&self, pred: impl Fn(&Frame) -> bool) -> KindFrames {
        let mut result = KindFrames::bottom();
        result.kind = self.kind.clone();
        for frame in self.frames.iter().filter(|f| pred(f)) {
            result.frames.push(frame.clone());
        }
        result
    }

    pub fn visit(&self, mut f: impl FnMut(&Frame)) {
        for frame in &self.frames {
            f(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OriginSet;
    use crate::kind::KindFactory;

    #[test]
    fn add_frame_merges_subsumed_intervals() {
        let kinds = KindFactory::new();
        let kind = kinds.named("UserInput");
        let mut frames = KindFrames::bottom();
        frames.add_frame(Frame::leaf(kind.clone(), OriginSet::default()));
        frames.add_frame(Frame::leaf(kind, OriginSet::default()));
        assert_eq!(frames.frames().len(), 1);
    }

    #[test]
    fn join_with_bottom_is_identity() {
        let kinds = KindFactory::new();
        let kind = kinds.named("UserInput");
        let frames = KindFrames::singleton(Frame::leaf(kind, OriginSet::default()));
        let joined = frames.join_with(&KindFrames::bottom());
        assert_eq!(joined, frames);
    }

    #[test]
    fn leq_reflexive() {
        let kinds = KindFactory::new();
        let kind = kinds.named("UserInput");
        let frames = KindFrames::singleton(Frame::leaf(kind, OriginSet::default()));
        assert!(frames.leq(&frames));
        assert!(KindFrames::bottom().leq(&frames));
    }
}
