//! Transform kinds and transform lists.
//!
//! A [`TransformList`] is an ordered decoration on a [`crate::kind::Kind`]
//! recording intervening operations (encoders, sanitizer checks) a tainted
//! value has passed through. Rules may require a flow to carry a specific
//! transform sequence.

use crate::intern::{Interned, Interner};
use std::collections::BTreeSet;

/// One element of a transform list: either a pure, order-sensitive
/// transform, or a sanitizer set (the kinds it blocks), which is
/// commutative with adjacent sanitizer sets and therefore canonicalized by
/// merging them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformElement {
    Named(String),
    SanitizerSet(BTreeSet<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformList(Vec<TransformElement>);

impl TransformList {
    pub fn empty() -> Self {
        TransformList(Vec::new())
    }

    pub fn from_elements(elements: Vec<TransformElement>) -> Self {
        canonicalize(elements)
    }

    pub fn elements(&self) -> &[TransformElement] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn reverse(&self) -> TransformList {
        let mut elements = self.0.clone();
        elements.reverse();
        // Reversing cannot break canonicalization: sanitizer sets are
        // already maximal runs, and reversing a sequence of maximal runs
        // yields maximal runs.
        TransformList(elements)
    }

    pub fn concat(&self, other: &TransformList) -> TransformList {
        let mut elements = self.0.clone();
        elements.extend(other.0.iter().cloned());
        canonicalize(elements)
    }
}

fn canonicalize(elements: Vec<TransformElement>) -> TransformList {
    let mut result: Vec<TransformElement> = Vec::with_capacity(elements.len());
    for element in elements {
        match (&element, result.last_mut()) {
            (TransformElement::SanitizerSet(new_set), Some(TransformElement::SanitizerSet(last))) => {
                last.extend(new_set.iter().cloned());
            }
            _ => result.push(element),
        }
    }
    TransformList(result)
}

#[derive(Default)]
pub struct TransformsFactory {
    interner: Interner<TransformList>,
}

impl TransformsFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, list: TransformList) -> Interned<TransformList> {
        self.interner.intern(list)
    }

    pub fn empty(&self) -> Interned<TransformList> {
        self.intern(TransformList::empty())
    }

    pub fn reverse(&self, list: &Interned<TransformList>) -> Interned<TransformList> {
        self.intern(list.reverse())
    }

    pub fn concat(
        &self,
        left: &Interned<TransformList>,
        right: &Interned<TransformList>,
    ) -> Interned<TransformList> {
        self.intern(left.concat(&right))
    }
}
