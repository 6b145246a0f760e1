//! The catalog of selectable options.
//!
//! Options are only ever referenced by id. The catalog groups them for display
//! and supplies their labels. The rule engine itself only needs the set of
//! known ids.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{OptionId, rule::dedupe};

/// One named group: options at the group root and named subgroups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Options directly under the group.
    #[serde(default)]
    pub root: Vec<OptionId>,
    /// Named subgroups and their options.
    #[serde(default)]
    pub subgroups: BTreeMap<String, Vec<OptionId>>,
}

impl Group {
    /// Creates a group whose options all sit at the root.
    #[must_use]
    pub fn flat(ids: impl IntoIterator<Item = impl Into<OptionId>>) -> Self {
        Self {
            root: ids.into_iter().map(Into::into).collect(),
            subgroups: BTreeMap::new(),
        }
    }

    /// Adds a subgroup, replacing any subgroup with the same name.
    #[must_use]
    pub fn with_subgroup(
        mut self,
        name: impl Into<String>,
        ids: impl IntoIterator<Item = impl Into<OptionId>>,
    ) -> Self {
        self.subgroups
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    /// The root options, each once.
    #[must_use]
    pub fn distinct_root(&self) -> Vec<&OptionId> {
        dedupe(&self.root)
    }

    /// The subgroups with each list holding every option once.
    #[must_use]
    pub fn distinct_subgroups(&self) -> BTreeMap<&str, Vec<&OptionId>> {
        self.subgroups
            .iter()
            .map(|(name, ids)| (name.as_str(), dedupe(ids)))
            .collect()
    }

    /// Every option of the group, root first, each once.
    #[must_use]
    pub fn ids(&self) -> Vec<&OptionId> {
        let mut seen = BTreeSet::new();
        self.root
            .iter()
            .chain(self.subgroups.values().flatten())
            .filter(|id| seen.insert(id.as_str()))
            .collect()
    }
}

/// Option groups and labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    groups: BTreeMap<String, Group>,
    labels: BTreeMap<OptionId, String>,
}

impl Catalog {
    /// Creates a catalog from groups and labels.
    #[must_use]
    pub const fn new(groups: BTreeMap<String, Group>, labels: BTreeMap<OptionId, String>) -> Self {
        Self { groups, labels }
    }

    /// Adds a group, replacing any group with the same name.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>, group: Group) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    /// Sets the display label of `id`.
    #[must_use]
    pub fn with_label(mut self, id: impl Into<OptionId>, label: impl Into<String>) -> Self {
        self.labels.insert(id.into(), label.into());
        self
    }

    /// The groups, by name.
    #[must_use]
    pub const fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    /// The explicit labels, by id.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<OptionId, String> {
        &self.labels
    }

    /// The display label of `id`, falling back to the id itself.
    #[must_use]
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.labels.get(id).map_or(id, String::as_str)
    }

    /// Every option in display order: group by group, each once.
    #[must_use]
    pub fn options(&self) -> Vec<&OptionId> {
        let mut seen = BTreeSet::new();
        self.groups
            .values()
            .flat_map(Group::ids)
            .filter(|id| seen.insert(id.as_str()))
            .collect()
    }

    /// The universe of ids that rules may legitimately reference.
    #[must_use]
    pub fn known_ids(&self) -> BTreeSet<OptionId> {
        self.groups
            .values()
            .flat_map(Group::ids)
            .cloned()
            .collect()
    }

    /// Whether the catalog holds no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
