//! May/always feature sets carried on frames.
//!
//! "Features" are tags giving extra context about a trace (e.g.
//! `"via-numerical-operator"`). `inferred_features` is a may/always pair:
//! `always` features are guaranteed on every path that produced the frame,
//! `may` features are possible on at least one. `user_features` is a plain
//! always-set coming straight from a JSON model.

use crate::intern::{Interned, Interner};
use std::collections::BTreeSet;

pub type Feature = Interned<String>;

#[derive(Default)]
pub struct FeatureFactory {
    interner: Interner<String>,
}

impl FeatureFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: impl Into<String>) -> Feature {
        self.interner.intern(name.into())
    }
}

/// A plain set of features, always true when present (used for user-supplied
/// features and as the building block of [`FeatureMayAlwaysSet`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(BTreeSet<Feature>);

impl FeatureSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(feature: Feature) -> Self {
        let mut set = Self::empty();
        set.insert(feature);
        set
    }

    pub fn insert(&mut self, feature: Feature) {
        self.0.insert(feature);
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.0.contains(feature)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    pub fn union(&self, other: &FeatureSet) -> FeatureSet {
        FeatureSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &FeatureSet) -> FeatureSet {
        FeatureSet(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn is_subset(&self, other: &FeatureSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

/// A may/always pair. Join takes the union of `may` and the intersection of
/// `always`: a feature stays "always" only if both paths guarantee it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMayAlwaysSet {
    pub may: FeatureSet,
    pub always: FeatureSet,
}

impl FeatureMayAlwaysSet {
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn make_always(features: FeatureSet) -> Self {
        FeatureMayAlwaysSet {
            may: features.clone(),
            always: features,
        }
    }

    pub fn make_may(features: FeatureSet) -> Self {
        FeatureMayAlwaysSet {
            may: features,
            always: FeatureSet::empty(),
        }
    }

    pub fn add_always(&mut self, features: &FeatureSet) {
        self.may = self.may.union(features);
        self.always = self.always.union(features);
    }

    pub fn add_may(&mut self, features: &FeatureSet) {
        self.may = self.may.union(features);
    }

    pub fn leq(&self, other: &FeatureMayAlwaysSet) -> bool {
        self.may.is_subset(&other.may) && other.always.is_subset(&self.always)
    }

    pub fn join_with(&self, other: &FeatureMayAlwaysSet) -> FeatureMayAlwaysSet {
        FeatureMayAlwaysSet {
            may: self.may.union(&other.may),
            always: self.always.intersection(&other.always),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_unions_may_and_intersects_always() {
        let factory = FeatureFactory::new();
        let a = factory.get("a");
        let b = factory.get("b");

        let mut left = FeatureMayAlwaysSet::bottom();
        left.add_always(&FeatureSet::singleton(a.clone()));
        let mut right = FeatureMayAlwaysSet::bottom();
        right.add_always(&FeatureSet::singleton(b.clone()));

        let joined = left.join_with(&right);
        assert!(joined.may.contains(&a));
        assert!(joined.may.contains(&b));
        assert!(joined.always.is_empty());
    }

    #[test]
    fn leq_reflexive() {
        let factory = FeatureFactory::new();
        let mut set = FeatureMayAlwaysSet::bottom();
        set.add_always(&FeatureSet::singleton(factory.get("a")));
        assert!(set.leq(&set));
    }
}
