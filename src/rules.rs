//! Rule engine: source-to-sink and multi-source/multi-sink rules, unused-kind
//! pruning, and coverage reporting.
//!
//! Grounded on `Rules::add`/`Rules::rules` in `original_source/source/Rules.cpp`:
//! a direct `source -> sink -> rules` map for plain rules, plus a second map
//! keyed by `Triggered` kinds for partial fulfillment of multi-source rules.

use crate::intern::Interned;
use crate::kind::{Kind, KindFactory};
use crate::transform::{TransformList, TransformsFactory};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub type RuleCode = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSinkRule {
    pub code: RuleCode,
    pub name: String,
    pub source_kinds: Vec<String>,
    pub sink_kinds: Vec<String>,
    #[serde(default)]
    pub transforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSourceMultiSinkRule {
    pub code: RuleCode,
    pub name: String,
    /// label -> source kinds contributing to that label.
    pub multi_source_kinds: FxHashMap<String, Vec<String>>,
    /// label -> partial sink kinds fulfilled by that label.
    pub multi_sink_kinds: FxHashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub enum Rule {
    SourceSink(SourceSinkRule),
    MultiSourceMultiSink(MultiSourceMultiSinkRule),
}

impl Rule {
    pub fn code(&self) -> RuleCode {
        match self {
            Rule::SourceSink(r) => r.code,
            Rule::MultiSourceMultiSink(r) => r.code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::SourceSink(r) => &r.name,
            Rule::MultiSourceMultiSink(r) => &r.name,
        }
    }
}

/// Transform sequence attached to a matched `(source, sink)` pair at a
/// callsite: composed from the source-side trace reversed, then the
/// sink-side trace forward.
fn composed_transforms(
    transforms_factory: &TransformsFactory,
    source_side: &Interned<TransformList>,
    sink_side: &Interned<TransformList>,
) -> Interned<TransformList> {
    let reversed_source = transforms_factory.reverse(source_side);
    transforms_factory.concat(&reversed_source, sink_side)
}

#[derive(Default)]
pub struct Rules {
    rules: Vec<Rule>,
    /// (source kind, sink kind) -> plain rules matching with no transform.
    source_to_sink_to_rules: FxHashMap<(String, String), Vec<RuleCode>>,
    /// (source kind, partial sink kind) -> multi-source rules to consider.
    source_to_partial_sink_to_rules: FxHashMap<(String, String), Vec<RuleCode>>,
    /// rule code -> required composed transform sequence (plain rules only).
    required_transforms: FxHashMap<RuleCode, TransformList>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: Rule) {
        let code = rule.code();
        match &rule {
            Rule::SourceSink(r) => {
                let transform_list = TransformList::from_elements(
                    r.transforms
                        .iter()
                        .map(|t| crate::transform::TransformElement::Named(t.clone()))
                        .collect(),
                );
                if !transform_list.is_empty() {
                    self.required_transforms.insert(code, transform_list);
                }
                for source in &r.source_kinds {
                    for sink in &r.sink_kinds {
                        self.source_to_sink_to_rules
                            .entry((source.clone(), sink.clone()))
                            .or_default()
                            .push(code);
                    }
                }
            }
            Rule::MultiSourceMultiSink(r) => {
                // A label's sources only fulfill that same label's partial
                // sinks; a source from one label never fulfills another
                // label's sink (that pairing is handled by `label_of` once
                // one side has already fulfilled, to find its complement).
                for (label, sources) in &r.multi_source_kinds {
                    let Some(sinks) = r.multi_sink_kinds.get(label) else { continue };
                    for source in sources {
                        for sink in sinks {
                            self.source_to_partial_sink_to_rules
                                .entry((source.clone(), sink.clone()))
                                .or_default()
                                .push(code);
                        }
                    }
                }
            }
        }
        self.rules.push(rule);
    }

    pub fn all(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, code: RuleCode) -> Option<&Rule> {
        self.rules.iter().find(|r| r.code() == code)
    }

    /// Plain rules whose composed transform sequence (source reversed +
    /// sink forward) matches the rule's required sequence exactly.
    pub fn rules(
        &self,
        transforms_factory: &TransformsFactory,
        source_kind: &str,
        source_transforms: &Interned<TransformList>,
        sink_kind: &str,
        sink_transforms: &Interned<TransformList>,
    ) -> Vec<RuleCode> {
        let composed = composed_transforms(transforms_factory, source_transforms, sink_transforms);
        self.source_to_sink_to_rules
            .get(&(source_kind.to_string(), sink_kind.to_string()))
            .into_iter()
            .flatten()
            .copied()
            .filter(|code| {
                self.required_transforms
                    .get(code)
                    .map(|required| required == &*composed)
                    .unwrap_or_else(|| composed.is_empty())
            })
            .collect()
    }

    pub fn partial_rules(&self, source_kind: &str, partial_sink_kind: &str) -> Vec<RuleCode> {
        self.source_to_partial_sink_to_rules
            .get(&(source_kind.to_string(), partial_sink_kind.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// The label whose source/partial-sink lists contain `source_kind` and
    /// `partial_sink_kind` respectively, for `rule_code`'s multi-source rule.
    /// Used once a label has fulfilled a partial sink, to learn which label
    /// it was so the complementary label can be tracked.
    pub fn label_of(&self, rule_code: RuleCode, source_kind: &str, partial_sink_kind: &str) -> Option<String> {
        let Some(Rule::MultiSourceMultiSink(r)) = self.get(rule_code) else { return None };
        r.multi_source_kinds.iter().find_map(|(label, sources)| {
            let sinks = r.multi_sink_kinds.get(label)?;
            if sources.iter().any(|s| s == source_kind) && sinks.iter().any(|s| s == partial_sink_kind) {
                Some(label.clone())
            } else {
                None
            }
        })
    }

    /// How many distinct labels `rule_code`'s multi-source rule declares;
    /// a rule fires once every label has a fulfilled partial sink.
    pub fn label_count(&self, rule_code: RuleCode) -> usize {
        match self.get(rule_code) {
            Some(Rule::MultiSourceMultiSink(r)) => r.multi_source_kinds.len(),
            _ => 0,
        }
    }

    /// Every kind name referenced by at least one rule.
    pub fn referenced_kind_names(&self) -> FxHashSet<String> {
        let mut names = FxHashSet::default();
        for rule in &self.rules {
            match rule {
                Rule::SourceSink(r) => {
                    names.extend(r.source_kinds.iter().cloned());
                    names.extend(r.sink_kinds.iter().cloned());
                }
                Rule::MultiSourceMultiSink(r) => {
                    for sources in r.multi_source_kinds.values() {
                        names.extend(sources.iter().cloned());
                    }
                    for sinks in r.multi_sink_kinds.values() {
                        names.extend(sinks.iter().cloned());
                    }
                }
            }
        }
        names
    }

    /// Interned kinds that no rule references, by inspecting every kind the
    /// factory has produced so far.
    pub fn collect_unused_kinds(&self, kind_factory: &KindFactory, all_named: &[Interned<Kind>]) -> Vec<Interned<Kind>> {
        let referenced = self.referenced_kind_names();
        all_named
            .iter()
            .filter(|kind| {
                let base = kind_factory.discard_transforms(kind);
                match base.as_named() {
                    Some(name) => !referenced.contains(name),
                    None => false,
                }
            })
            .cloned()
            .collect()
    }
}

/// Tracks which interned kinds a live rule can still match, so that frame
/// transforms can drop dead branches early (`apply_transform` in
/// [`crate::callee_port_frames::CalleePortFrames`]).
#[derive(Default)]
pub struct UsedKinds {
    live: FxHashSet<Interned<Kind>>,
}

impl UsedKinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(kind_factory: &KindFactory, rules: &Rules) -> Self {
        let referenced = rules.referenced_kind_names();
        let mut live = FxHashSet::default();
        for name in referenced {
            live.insert(kind_factory.named(name));
        }
        UsedKinds { live }
    }

    pub fn mark(&mut self, kind: Interned<Kind>) {
        self.live.insert(kind);
    }

    pub fn contains(&self, kind: &Interned<Kind>) -> bool {
        self.live.contains(kind)
    }
}

/// For each rule, which of its source/sink kinds (and, for multi-source
/// rules, transforms) were actually observed during analysis.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RulesCoverage {
    pub observed_source_kinds: FxHashMap<RuleCode, FxHashSet<String>>,
    pub observed_sink_kinds: FxHashMap<RuleCode, FxHashSet<String>>,
}

impl RulesCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_source(&mut self, code: RuleCode, kind: impl Into<String>) {
        self.observed_source_kinds.entry(code).or_default().insert(kind.into());
    }

    pub fn observe_sink(&mut self, code: RuleCode, kind: impl Into<String>) {
        self.observed_sink_kinds.entry(code).or_default().insert(kind.into());
    }

    /// Record one detected issue's source/sink kinds against its rule.
    pub fn observe_issue(&mut self, issue: &crate::model::Issue) {
        self.observe_source(issue.rule_code, issue.source_kind.clone());
        self.observe_sink(issue.rule_code, issue.sink_kind.clone());
    }

    /// A rule is "covered" once at least one of its source kinds and one of
    /// its sink kinds has been observed.
    pub fn is_covered(&self, rule: &SourceSinkRule) -> bool {
        let sources = self.observed_source_kinds.get(&rule.code);
        let sinks = self.observed_sink_kinds.get(&rule.code);
        match (sources, sinks) {
            (Some(s), Some(k)) => {
                rule.source_kinds.iter().any(|k2| s.contains(k2)) && rule.sink_kinds.iter().any(|k3| k.contains(k3))
            }
            _ => false,
        }
    }
}
