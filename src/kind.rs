//! Named, partial, triggered, propagation, and transform kinds.

use crate::access_path::Root;
use crate::intern::{Interned, Interner};
use crate::transform::TransformList;

/// The label on a piece of taint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A plain, user-declared source or sink kind, e.g. `UserInput`.
    Named(String),
    /// One label of a multi-source/multi-sink rule: `Partial(sink_name, label)`.
    Partial(String, String),
    /// A partial sink kind that became live because the other half of its
    /// rule was already fulfilled; carries the rule code so that a second,
    /// unrelated rule sharing the same partial sink is not conflated

    Triggered(Interned<Kind>, u32),
    /// The kind of a propagation summary entry, tagged by the output port's
    /// root.
    Propagation(Root),
    /// `base` decorated with local (this call) and global (sanitizer-wide)
    /// transform sequences.
    Transform {
        base: Interned<Kind>,
        local: Interned<TransformList>,
        global: Interned<TransformList>,
    },
}

impl Kind {
    pub fn as_named(&self) -> Option<&str> {
        match self {
            Kind::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, Kind::Transform { .. })
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self, Kind::Triggered(..))
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Named(name) => write!(f, "{}", name),
            Kind::Partial(name, label) => write!(f, "Partial({}, {})", name, label),
            Kind::Triggered(partial, rule) => write!(f, "Triggered({}, rule={})", partial, rule),
            Kind::Propagation(root) => write!(f, "Propagation({})", root),
            Kind::Transform { base, local, global } => {
                write!(f, "Transform({}, local={:?}, global={:?})", base, local.elements(), global.elements())
            }
        }
    }
}

#[derive(Default)]
pub struct KindFactory {
    interner: Interner<Kind>,
}

impl KindFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(&self, name: impl Into<String>) -> Interned<Kind> {
        self.interner.intern(Kind::Named(name.into()))
    }

    pub fn partial(&self, name: impl Into<String>, label: impl Into<String>) -> Interned<Kind> {
        self.interner.intern(Kind::Partial(name.into(), label.into()))
    }

    pub fn triggered(&self, partial: Interned<Kind>, rule_code: u32) -> Interned<Kind> {
        self.interner.intern(Kind::Triggered(partial, rule_code))
    }

    pub fn propagation(&self, root: Root) -> Interned<Kind> {
        self.interner.intern(Kind::Propagation(root))
    }

    pub fn transform(
        &self,
        base: Interned<Kind>,
        local: Interned<TransformList>,
        global: Interned<TransformList>,
    ) -> Interned<Kind> {
        self.interner.intern(Kind::Transform { base, local, global })
    }

    /// Strip any transform decoration, returning the underlying base kind.
    pub fn discard_transforms(&self, kind: &Interned<Kind>) -> Interned<Kind> {
        match &**kind {
            Kind::Transform { base, .. } => base.clone(),
            _ => kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformsFactory;

    #[test]
    fn interning_deduplicates_named_kinds() {
        let factory = KindFactory::new();
        let a = factory.named("UserInput");
        let b = factory.named("UserInput");
        assert_eq!(a, b);
    }

    #[test]
    fn discard_transforms_returns_base() {
        let kinds = KindFactory::new();
        let transforms = TransformsFactory::new();
        let base = kinds.named("UserInput");
        let wrapped = kinds.transform(base.clone(), transforms.empty(), transforms.empty());
        assert_eq!(kinds.discard_transforms(&wrapped), base);
        assert_eq!(kinds.discard_transforms(&base), base);
    }
}
