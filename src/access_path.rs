//! Access paths and ports: the lingua franca of every domain.

use crate::intern::{Interned, Interner};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a [`Path`]: a field name or an array index marker.
pub type Element = Interned<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEffectKind {
    /// The only call-effect kind this engine currently tracks: a taint
    /// label that flows along the call chain rather than through a
    /// register.
    CallChain,
}

/// The root of an access path: where, inside a method, taint enters or
/// leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Root {
    /// `Argument(0)` is the receiver for instance methods.
    Argument(u32),
    Return,
    Leaf,
    /// Templated CRTEX port: the canonical name has not yet been
    /// instantiated.
    Anchor,
    /// Instantiated CRTEX port: the canonical name has been resolved.
    Producer,
    /// `Argument(-1)` alias; never serialized by this analyzer.
    CanonicalThis,
    CallEffect(CallEffectKind),
}

impl Root {
    pub fn is_argument(&self) -> bool {
        matches!(self, Root::Argument(_))
    }

    pub fn parameter_position(&self) -> Option<u32> {
        match self {
            Root::Argument(i) => Some(*i),
            Root::CanonicalThis => Some(0),
            _ => None,
        }
    }

    pub fn to_json_string(&self) -> String {
        match self {
            Root::Argument(i) => format!("Argument({})", i),
            Root::Return => "Return".to_string(),
            Root::Leaf => "Leaf".to_string(),
            Root::Anchor => "Anchor".to_string(),
            Root::Producer => "Producer".to_string(),
            Root::CanonicalThis => "Argument(-1)".to_string(),
            Root::CallEffect(CallEffectKind::CallChain) => "CallEffect(CallChain)".to_string(),
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

/// An ordered sequence of interned field/index elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<Element>);

impl Path {
    pub fn empty() -> Self {
        Path(Vec::new())
    }

    pub fn from_elements(elements: Vec<Element>) -> Self {
        Path(elements)
    }

    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append(&mut self, element: Element) {
        self.0.push(element);
    }

    pub fn pop(&mut self) -> Option<Element> {
        self.0.pop()
    }

    pub fn truncate(&mut self, max_len: usize) {
        self.0.truncate(max_len);
    }

    /// Is `self` a prefix of `other`?
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Longest common prefix of `self` and `other`.
    pub fn reduce_to_common_prefix(&self, other: &Path) -> Path {
        let common: Vec<Element> = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.clone())
            .collect();
        Path(common)
    }

    pub fn with_appended(&self, element: Element) -> Path {
        let mut elements = self.0.clone();
        elements.push(element);
        Path(elements)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, ".{}", element.as_str())?;
        }
        Ok(())
    }
}

/// Root + sequence of field/index elements.
///
/// Partial order: `a <= b` iff same root and `b.path` is a prefix of
/// `a.path`; longer (more specific) paths are *smaller* in the lattice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    root: Root,
    path: Path,
}

impl AccessPath {
    pub fn new(root: Root, path: Path) -> Self {
        AccessPath { root, path }
    }

    pub fn root_only(root: Root) -> Self {
        AccessPath {
            root,
            path: Path::empty(),
        }
    }

    pub fn root(&self) -> Root {
        self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn leq(&self, other: &AccessPath) -> bool {
        self.root == other.root && other.path.is_prefix_of(&self.path)
    }

    /// Join requires the same root; result keeps the longest common prefix
    /// (the *less specific* of the two paths).
    pub fn join_with(&self, other: &AccessPath) -> AccessPath {
        debug_assert_eq!(self.root, other.root, "AccessPath::join_with requires same root");
        AccessPath {
            root: self.root,
            path: self.path.reduce_to_common_prefix(&other.path),
        }
    }

    pub fn to_json_string(&self) -> String {
        format!("{}{}", self.root.to_json_string(), self.path)
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

pub struct ElementFactory {
    interner: Interner<String>,
}

impl Default for ElementFactory {
    fn default() -> Self {
        Self {
            interner: Interner::new(),
        }
    }
}

impl ElementFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, name: impl Into<String>) -> Element {
        self.interner.intern(name.into())
    }

    pub fn index(&self, index: u32) -> Element {
        self.interner.intern(format!("[{}]", index))
    }

    pub fn any_index(&self) -> Element {
        self.interner.intern("[*]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(factory: &ElementFactory, names: &[&str]) -> Path {
        Path::from_elements(names.iter().map(|n| factory.field(*n)).collect())
    }

    #[test]
    fn leq_is_reflexive_and_orients_longer_as_smaller() {
        let f = ElementFactory::new();
        let a = AccessPath::new(Root::Argument(0), path(&f, &["x", "y"]));
        let b = AccessPath::new(Root::Argument(0), path(&f, &["x"]));

        assert!(a.leq(&a));
        assert!(b.leq(&b));
        assert!(a.leq(&b)); // a is more specific (longer path) => a <= b
        assert!(!b.leq(&a));
    }

    #[test]
    fn join_keeps_common_prefix() {
        let f = ElementFactory::new();
        let a = AccessPath::new(Root::Argument(0), path(&f, &["x", "y"]));
        let b = AccessPath::new(Root::Argument(0), path(&f, &["x", "z"]));
        let joined = a.join_with(&b);
        assert_eq!(joined.path().len(), 1);
        assert!(a.leq(&joined));
        assert!(b.leq(&joined));
    }

    #[test]
    fn to_json_string_grammar() {
        let f = ElementFactory::new();
        let ap = AccessPath::new(Root::Argument(1), path(&f, &["field"]));
        assert_eq!(ap.to_json_string(), "Argument(1).field");
        assert_eq!(Root::CanonicalThis.to_json_string(), "Argument(-1)");
    }
}
