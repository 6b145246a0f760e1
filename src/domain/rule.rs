//! Canonical rule model.
//!
//! A [`RuleSpec`] holds the rules attached to one "from" option. A
//! [`Ruleset`] maps option ids to their spec, and [`Rulesets`] holds every
//! named ruleset of a schema together with the one that is currently active.
//!
//! Every `RuleSpec` is built by the normalizer (see
//! [`crate::domain::normalize`]); deserialisation goes through it too, so
//! nothing downstream has to care which shape the data was stored in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::OptionId;

/// The two flavours of quantified group.
///
/// They share a shape but differ in the threshold used when `min` is not
/// given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// "At least `min` of these must be selected". Defaults to all of them.
    Requires,
    /// "Selecting at least `min` of these blocks the option". Defaults to
    /// two, or fewer when the group is smaller.
    Incompatible,
}

impl GroupKind {
    /// Resolves the effective threshold for a group with `len` distinct
    /// candidates.
    ///
    /// Explicit values are clamped to `0..=len`.
    #[must_use]
    pub fn resolve_min(self, min: Option<i64>, len: usize) -> usize {
        min.map_or_else(
            || match self {
                Self::Requires => len,
                Self::Incompatible => len.min(2),
            },
            |min| usize::try_from(min.max(0)).map_or(len, |min| min.min(len)),
        )
    }
}

/// A quantified group: "at least `min` of `of`".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuantifiedGroup {
    /// The raw threshold. `None` means "use the default for the group kind".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    /// Candidate option ids, possibly containing duplicates.
    pub of: Vec<OptionId>,
}

impl QuantifiedGroup {
    /// Creates a group with an explicit threshold.
    #[must_use]
    pub fn new(min: usize, of: impl IntoIterator<Item = impl Into<OptionId>>) -> Self {
        Self {
            min: i64::try_from(min).ok(),
            of: of.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a group that uses the default threshold of its kind.
    #[must_use]
    pub fn with_default_min(of: impl IntoIterator<Item = impl Into<OptionId>>) -> Self {
        Self {
            min: None,
            of: of.into_iter().map(Into::into).collect(),
        }
    }

    /// The candidate ids with duplicates removed, in first-seen order.
    #[must_use]
    pub fn distinct(&self) -> Vec<&OptionId> {
        dedupe(&self.of)
    }
}

/// The rules attached to a single "from" option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct RuleSpec {
    /// Options that must all be selected (legacy flat requirement).
    pub requires: Vec<OptionId>,
    /// Options that may not be selected together with this one.
    pub incompatible_with: Vec<OptionId>,
    /// Options that are added automatically when this one is selected.
    pub mandatory: Vec<OptionId>,
    /// Quantified requirements. All of them must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_groups: Vec<QuantifiedGroup>,
    /// Quantified incompatibilities. Any active one blocks the option.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incompatible_groups: Vec<QuantifiedGroup>,
}

static EMPTY_SPEC: RuleSpec = RuleSpec {
    requires: Vec::new(),
    incompatible_with: Vec::new(),
    mandatory: Vec::new(),
    requires_groups: Vec::new(),
    incompatible_groups: Vec::new(),
};

impl RuleSpec {
    /// Returns the effective requires-groups.
    ///
    /// When no explicit groups exist, a non-empty flat `requires` list becomes
    /// a single group requiring all of its members.
    #[must_use]
    pub fn effective_requires_groups(&self) -> Vec<QuantifiedGroup> {
        if !self.requires_groups.is_empty() {
            return self.requires_groups.clone();
        }
        if self.requires.is_empty() {
            return Vec::new();
        }
        let of: Vec<OptionId> = dedupe(&self.requires).into_iter().cloned().collect();
        vec![QuantifiedGroup::new(of.len(), of)]
    }

    /// Number of simple edges (requires, incompatible and mandatory targets).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.requires.len() + self.incompatible_with.len() + self.mandatory.len()
    }

    /// Whether the spec holds no rule at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
            && self.requires_groups.is_empty()
            && self.incompatible_groups.is_empty()
    }

    /// Whether `id` appears in this spec's direct incompatibility list.
    #[must_use]
    pub fn is_incompatible_with(&self, id: &str) -> bool {
        self.incompatible_with.iter().any(|other| other == id)
    }
}

/// Rules for a set of options, keyed by the "from" option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ruleset(BTreeMap<OptionId, RuleSpec>);

static EMPTY_RULESET: Ruleset = Ruleset(BTreeMap::new());

impl Ruleset {
    /// Creates an empty ruleset.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the spec for `id`, or an empty spec if the option has no rules.
    #[must_use]
    pub fn spec(&self, id: &str) -> &RuleSpec {
        self.0.get(id).unwrap_or(&EMPTY_SPEC)
    }

    /// Returns the spec for `id` if one is defined.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RuleSpec> {
        self.0.get(id)
    }

    /// Inserts or replaces the spec for `id`.
    pub fn insert(&mut self, id: impl Into<OptionId>, spec: RuleSpec) -> Option<RuleSpec> {
        self.0.insert(id.into(), spec)
    }

    /// Iterates over `(from, spec)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&OptionId, &RuleSpec)> {
        self.0.iter()
    }

    /// The ids that carry rules.
    pub fn ids(&self) -> impl Iterator<Item = &OptionId> {
        self.0.keys()
    }

    /// Number of options carrying rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no option carries rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of simple edges across all specs.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.0.values().map(RuleSpec::edge_count).sum()
    }
}

impl FromIterator<(OptionId, RuleSpec)> for Ruleset {
    fn from_iter<T: IntoIterator<Item = (OptionId, RuleSpec)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Ruleset {
    type Item = (&'a OptionId, &'a RuleSpec);
    type IntoIter = std::collections::btree_map::Iter<'a, OptionId, RuleSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// All named rulesets of a schema, with exactly one of them active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rulesets {
    sets: BTreeMap<String, Ruleset>,
    active: String,
}

impl Rulesets {
    /// Creates a collection holding a single empty ruleset, which is active.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut sets = BTreeMap::new();
        sets.insert(name.clone(), Ruleset::new());
        Self { sets, active: name }
    }

    /// Builds a collection from named rulesets.
    ///
    /// `active` is used when it names one of the rulesets; otherwise the first
    /// ruleset (in name order) is active. An empty iterator yields a single
    /// empty ruleset named `active`.
    #[must_use]
    pub fn from_sets(sets: impl IntoIterator<Item = (String, Ruleset)>, active: &str) -> Self {
        let sets: BTreeMap<_, _> = sets.into_iter().collect();
        if sets.is_empty() {
            return Self::new(active);
        }
        let active = if sets.contains_key(active) {
            active.to_string()
        } else {
            sets.keys().next().cloned().unwrap_or_default()
        };
        Self { sets, active }
    }

    /// Name of the active ruleset.
    #[must_use]
    pub fn active_name(&self) -> &str {
        &self.active
    }

    /// The active ruleset.
    #[must_use]
    pub fn active(&self) -> &Ruleset {
        self.sets.get(&self.active).unwrap_or(&EMPTY_RULESET)
    }

    /// Mutable access to the active ruleset.
    pub fn active_mut(&mut self) -> &mut Ruleset {
        self.sets.entry(self.active.clone()).or_default()
    }

    /// Makes `name` the active ruleset if it exists.
    ///
    /// Returns `true` if the active ruleset changed.
    pub fn set_active(&mut self, name: &str) -> bool {
        if self.active == name || !self.sets.contains_key(name) {
            return false;
        }
        self.active = name.to_string();
        true
    }

    /// Returns the ruleset called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Ruleset> {
        self.sets.get(name)
    }

    /// Inserts or replaces a named ruleset.
    pub fn insert(&mut self, name: impl Into<String>, ruleset: Ruleset) -> Option<Ruleset> {
        self.sets.insert(name.into(), ruleset)
    }

    /// Iterates over `(name, ruleset)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Ruleset)> {
        self.sets.iter().map(|(name, set)| (name.as_str(), set))
    }

    /// Names of all rulesets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

/// Removes duplicates while keeping first-seen order.
pub(crate) fn dedupe(ids: &[OptionId]) -> Vec<&OptionId> {
    let mut seen = BTreeSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).collect()
}
