//! The set of selected options and the toggle operation that mutates it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{OptionId, Ruleset, closure::mandatory_closure};

/// The options currently selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<OptionId>);

impl Selection {
    /// Whether `id` is selected.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Adds `id`. Returns `true` if it was not selected before.
    pub fn insert(&mut self, id: impl Into<OptionId>) -> bool {
        self.0.insert(id.into())
    }

    /// Removes `id`. Returns `true` if it was selected.
    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    /// Iterates over the selected ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionId> {
        self.0.iter()
    }

    /// Number of selected options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Toggles `id`, returning the new selection.
    ///
    /// Selecting an option also selects its whole mandatory closure in the same
    /// step. Deselecting removes only `id`; options that were pulled in by its
    /// closure stay selected.
    #[must_use]
    #[instrument(level = "debug", skip(self, ruleset))]
    pub fn toggle(&self, id: &str, ruleset: &Ruleset) -> Toggle {
        let mut selection = self.clone();

        if selection.remove(id) {
            debug!("deselected");
            return Toggle {
                selection,
                selected: false,
                newly_added: Vec::new(),
            };
        }

        selection.insert(id);
        let newly_added: Vec<OptionId> = mandatory_closure(id, ruleset)
            .into_iter()
            .filter(|other| selection.insert(other.clone()))
            .collect();
        debug!(?newly_added, "selected");

        Toggle {
            selection,
            selected: true,
            newly_added,
        }
    }
}

impl<T: Into<OptionId>> FromIterator<T> for Selection {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a OptionId;
    type IntoIter = std::collections::btree_set::Iter<'a, OptionId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The outcome of toggling one option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle {
    /// The selection after the toggle.
    pub selection: Selection,
    /// Whether the toggled option ended up selected.
    pub selected: bool,
    /// Options added by the mandatory closure that were not selected before,
    /// in breadth-first order. Empty on deselection.
    pub newly_added: Vec<OptionId>,
}

/// Toggles `id` in `selection` under `ruleset`.
///
/// Free-function form of [`Selection::toggle`].
#[must_use]
pub fn toggle_selection(id: &str, ruleset: &Ruleset, selection: &Selection) -> Toggle {
    selection.toggle(id, ruleset)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::RuleSpec;

    fn mandatory(targets: &[&str]) -> RuleSpec {
        RuleSpec {
            mandatory: targets.iter().copied().map(OptionId::from).collect(),
            ..RuleSpec::default()
        }
    }

    fn ruleset() -> Ruleset {
        [
            ("A".into(), mandatory(&["B", "C"])),
            ("B".into(), mandatory(&[])),
            ("C".into(), mandatory(&["D"])),
            ("D".into(), mandatory(&[])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn selecting_adds_mandatory_closure() {
        let toggle = toggle_selection("A", &ruleset(), &Selection::default());

        assert!(toggle.selected);
        assert_eq!(toggle.selection, Selection::from_iter(["A", "B", "C", "D"]));
        let added: BTreeSet<_> = toggle.newly_added.into_iter().collect();
        assert_eq!(
            added,
            ["B", "C", "D"].into_iter().map(OptionId::from).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn already_selected_targets_are_not_reported() {
        let start = Selection::from_iter(["C"]);

        let toggle = start.toggle("A", &ruleset());

        assert_eq!(toggle.newly_added, vec![OptionId::from("B"), OptionId::from("D")]);
    }

    #[test]
    fn deselecting_does_not_cascade() {
        let rules = ruleset();
        let selected = Selection::default().toggle("A", &rules).selection;

        let toggle = selected.toggle("A", &rules);

        assert!(!toggle.selected);
        assert!(toggle.newly_added.is_empty());
        assert_eq!(toggle.selection, Selection::from_iter(["B", "C", "D"]));
    }

    #[test]
    fn toggle_leaves_input_untouched() {
        let start = Selection::default();
        let _ = start.toggle("A", &ruleset());
        assert!(start.is_empty());
    }

    #[test]
    fn mandatory_cycle_terminates() {
        let rules: Ruleset = [
            ("A".into(), mandatory(&["B"])),
            ("B".into(), mandatory(&["A"])),
        ]
        .into_iter()
        .collect();

        let toggle = Selection::default().toggle("A", &rules);

        assert_eq!(toggle.selection, Selection::from_iter(["A", "B"]));
        assert_eq!(toggle.newly_added, vec![OptionId::from("B")]);
    }
}
