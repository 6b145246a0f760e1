//! Per-option status under the current selection.
//!
//! An option is evaluated against the active ruleset and the selection:
//!
//! 1. it is **blocked** when any of its requires-groups is unmet;
//! 2. otherwise, if it is not selected, it is **incompatible** when a
//!    selected option conflicts with it (from either side) or one of its
//!    incompatible-groups is active;
//! 3. otherwise it is **selected** if it is in the selection;
//! 4. otherwise it is **normal**, i.e. freely selectable.
//!
//! Evaluation has no hidden state. The same ruleset and selection always
//! produce the same [`Evaluation`].

use std::fmt;

use serde::Serialize;

use crate::domain::{
    Catalog, GroupKind, OptionId, Ruleset, Selection,
    group::{GroupEvaluation, evaluate_group},
};

/// Display status of an option, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStatus {
    /// A dependency is unmet.
    Blocked,
    /// A selected option conflicts with this one.
    Incompatible,
    /// In the selection, with nothing wrong.
    Selected,
    /// Not selected and freely selectable.
    Normal,
}

impl fmt::Display for OptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blocked => "blocked",
            Self::Incompatible => "incompatible",
            Self::Selected => "selected",
            Self::Normal => "normal",
        })
    }
}

/// The full result of evaluating one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// The option evaluated.
    pub id: OptionId,
    /// The resulting status.
    pub status: OptionStatus,
    /// Whether the option is in the selection.
    pub is_selected: bool,
    /// Every effective requires-group, met or not.
    pub requires_groups: Vec<GroupEvaluation>,
    /// Selected options that conflict with this one directly, from either
    /// side of the `incompatible_with` relation.
    pub incompatible_with: Vec<OptionId>,
    /// Every incompatible-group, active or not.
    pub incompatible_group_states: Vec<GroupEvaluation>,
    /// The option's mandatory targets.
    pub mandatory: Vec<OptionId>,
}

impl Evaluation {
    /// The requires-groups that are not met.
    pub fn missing_groups(&self) -> impl Iterator<Item = &GroupEvaluation> {
        self.requires_groups.iter().filter(|group| !group.satisfied)
    }

    /// Whether some incompatible-group currently blocks the option.
    #[must_use]
    pub fn has_active_incompatible_group(&self) -> bool {
        self.incompatible_group_states
            .iter()
            .any(GroupEvaluation::is_active)
    }

    /// Whether a click on the option would be accepted.
    ///
    /// Unlike [`Self::status`], this ignores whether the option is already
    /// selected: a selected option that has become incompatible cannot be
    /// clicked either.
    #[must_use]
    pub fn can_select(&self) -> bool {
        self.status != OptionStatus::Blocked
            && self.incompatible_with.is_empty()
            && !self.has_active_incompatible_group()
    }

    /// Human-readable diagnostic lines, using the catalog's labels.
    #[must_use]
    pub fn describe(&self, catalog: &Catalog) -> Vec<String> {
        let labels = |ids: &[OptionId]| {
            ids.iter()
                .map(|id| catalog.label(id))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut lines = Vec::new();

        if !self.mandatory.is_empty() {
            lines.push(format!("Mandatory: {}", labels(&self.mandatory)));
        }

        if !self.requires_groups.is_empty() {
            lines.push("Dependencies:".to_string());
            for group in &self.requires_groups {
                let base = format!(
                    "- {} of ({}) - {}/{}",
                    group.threshold(),
                    labels(&group.of),
                    group.count,
                    group.of.len()
                );
                if group.satisfied {
                    lines.push(format!("{base} - ok"));
                } else {
                    lines.push(format!("{base} - missing: {}", labels(&group.missing)));
                }
            }
        }

        if !self.incompatible_with.is_empty() {
            lines.push(format!(
                "Incompatible with: {}",
                labels(&self.incompatible_with)
            ));
        }

        if !self.incompatible_group_states.is_empty() {
            lines.push("Conditional incompatibilities:".to_string());
            for group in &self.incompatible_group_states {
                let base = format!(
                    "- {} of ({}) - {}/{}",
                    group.threshold(),
                    labels(&group.of),
                    group.count,
                    group.of.len()
                );
                if group.is_active() {
                    lines.push(format!("{base} - blocking (selected: {})", labels(&group.present)));
                } else {
                    lines.push(base);
                }
            }
        }

        lines
    }
}

/// Evaluates option `id` under `ruleset` and `selection`.
///
/// Ids without rules, and ids unknown to the catalog, evaluate like any other
/// option with an empty rule.
#[must_use]
pub fn evaluate_option(id: &str, ruleset: &Ruleset, selection: &Selection) -> Evaluation {
    let spec = ruleset.spec(id);
    let is_selected = selection.contains(id);

    let requires_groups: Vec<_> = spec
        .effective_requires_groups()
        .iter()
        .map(|group| evaluate_group(group, GroupKind::Requires, selection))
        .collect();
    let blocked = requires_groups.iter().any(|group| !group.satisfied);

    let incompatible_with: Vec<OptionId> = selection
        .iter()
        .filter(|other| other.as_str() != id)
        .filter(|other| {
            spec.is_incompatible_with(other) || ruleset.spec(other).is_incompatible_with(id)
        })
        .cloned()
        .collect();

    let incompatible_group_states: Vec<_> = spec
        .incompatible_groups
        .iter()
        .map(|group| evaluate_group(group, GroupKind::Incompatible, selection))
        .collect();
    let conflicting = !incompatible_with.is_empty()
        || incompatible_group_states
            .iter()
            .any(GroupEvaluation::is_active);

    let status = if blocked {
        OptionStatus::Blocked
    } else if conflicting && !is_selected {
        OptionStatus::Incompatible
    } else if is_selected {
        OptionStatus::Selected
    } else {
        OptionStatus::Normal
    };

    Evaluation {
        id: OptionId::from(id),
        status,
        is_selected,
        requires_groups,
        incompatible_with,
        incompatible_group_states,
        mandatory: spec.mandatory.clone(),
    }
}

/// Evaluates every option in `ids`, in iteration order.
#[must_use]
pub fn evaluate_all<'a>(
    ids: impl IntoIterator<Item = &'a OptionId>,
    ruleset: &Ruleset,
    selection: &Selection,
) -> Vec<Evaluation> {
    ids.into_iter()
        .map(|id| evaluate_option(id, ruleset, selection))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::normalize::normalize_ruleset;

    fn rules() -> Ruleset {
        normalize_ruleset(&json!({
            "engine": { "requires": ["chassis"] },
            "turbo": { "requires_groups": [{ "min": 1, "of": ["engine", "hybrid"] }] },
            "diesel": { "incompatible_with": ["electric"] },
            "roof": { "incompatible_groups": [{ "of": ["rack", "box", "bars"] }] },
            "tow": { "requires": ["engine"], "incompatible_with": ["sport"] },
        }))
    }

    #[test]
    fn unmet_requirement_blocks() {
        let evaluation = evaluate_option("engine", &rules(), &Selection::default());

        assert_eq!(evaluation.status, OptionStatus::Blocked);
        let missing: Vec<_> = evaluation.missing_groups().collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].missing, vec![OptionId::from("chassis")]);
        assert!(!evaluation.can_select());
    }

    #[test]
    fn met_requirement_is_normal() {
        let evaluation = evaluate_option("engine", &rules(), &Selection::from_iter(["chassis"]));
        assert_eq!(evaluation.status, OptionStatus::Normal);
        assert!(evaluation.can_select());
    }

    #[test]
    fn one_of_group_needs_a_single_member() {
        let rules = rules();
        let blocked = evaluate_option("turbo", &rules, &Selection::default());
        let open = evaluate_option("turbo", &rules, &Selection::from_iter(["hybrid"]));

        assert_eq!(blocked.status, OptionStatus::Blocked);
        assert_eq!(open.status, OptionStatus::Normal);
    }

    #[test]
    fn incompatibility_is_checked_from_both_sides() {
        let rules = rules();

        let forward = evaluate_option("diesel", &rules, &Selection::from_iter(["electric"]));
        let backward = evaluate_option("electric", &rules, &Selection::from_iter(["diesel"]));

        assert_eq!(forward.status, OptionStatus::Incompatible);
        assert_eq!(backward.status, OptionStatus::Incompatible);
        assert_eq!(backward.incompatible_with, vec![OptionId::from("diesel")]);
    }

    #[test]
    fn incompatible_group_activates_at_default_threshold() {
        let rules = rules();

        let one = evaluate_option("roof", &rules, &Selection::from_iter(["rack"]));
        let two = evaluate_option("roof", &rules, &Selection::from_iter(["rack", "bars"]));

        assert_eq!(one.status, OptionStatus::Normal);
        assert_eq!(two.status, OptionStatus::Incompatible);
        assert!(two.has_active_incompatible_group());
    }

    #[test]
    fn blocked_takes_precedence_over_incompatible() {
        let evaluation = evaluate_option("tow", &rules(), &Selection::from_iter(["sport"]));
        assert_eq!(evaluation.status, OptionStatus::Blocked);
        assert_eq!(evaluation.incompatible_with, vec![OptionId::from("sport")]);
    }

    #[test]
    fn selected_option_is_shown_selected_despite_conflict() {
        let evaluation = evaluate_option(
            "diesel",
            &rules(),
            &Selection::from_iter(["diesel", "electric"]),
        );

        assert_eq!(evaluation.status, OptionStatus::Selected);
        assert!(!evaluation.can_select());
    }

    #[test]
    fn option_without_rules_follows_the_selection() {
        let evaluation = evaluate_option("ghost", &rules(), &Selection::from_iter(["ghost"]));
        assert_eq!(evaluation.status, OptionStatus::Selected);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let rules = rules();
        let selection = Selection::from_iter(["rack", "box", "chassis"]);

        let ids: Vec<OptionId> = ["engine", "roof", "turbo"].into_iter().map(OptionId::from).collect();

        assert_eq!(
            evaluate_all(&ids, &rules, &selection),
            evaluate_all(&ids, &rules, &selection)
        );
    }

    #[test]
    fn describe_lists_missing_members() {
        let catalog = Catalog::default().with_label("chassis", "Steel chassis");
        let evaluation = evaluate_option("engine", &rules(), &Selection::default());

        let lines = evaluation.describe(&catalog);

        assert_eq!(
            lines,
            vec![
                "Dependencies:".to_string(),
                "- all of (Steel chassis) - 0/1 - missing: Steel chassis".to_string(),
            ]
        );
    }

    #[test]
    fn describe_reports_blocking_group() {
        let catalog = Catalog::default();
        let evaluation = evaluate_option("roof", &rules(), &Selection::from_iter(["rack", "box"]));

        let lines = evaluation.describe(&catalog);

        assert_eq!(
            lines.last().map(String::as_str),
            Some("- ≥2 of (rack, box, bars) - 2/3 - blocking (selected: rack, box)")
        );
    }
}
