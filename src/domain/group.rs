//! Evaluation of a single quantified group against a selection.

use std::fmt;

use serde::Serialize;

use crate::domain::{GroupKind, OptionId, QuantifiedGroup, Selection};

/// The state of one quantified group under a given selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEvaluation {
    /// The resolved threshold.
    pub min: usize,
    /// Distinct candidates, in first-seen order.
    pub of: Vec<OptionId>,
    /// Number of candidates that are selected.
    pub count: usize,
    /// Whether at least `min` candidates are selected. Always true when
    /// `min` is zero.
    pub satisfied: bool,
    /// Candidates that are not selected.
    pub missing: Vec<OptionId>,
    /// Candidates that are selected.
    pub present: Vec<OptionId>,
}

impl GroupEvaluation {
    /// Whether the group blocks its owner when read as an incompatibility.
    ///
    /// A group with a threshold of zero never blocks.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.min > 0 && self.satisfied
    }

    /// How the threshold reads in diagnostics.
    #[must_use]
    pub const fn threshold(&self) -> Threshold {
        Threshold {
            min: self.min,
            size: self.of.len(),
        }
    }
}

/// Evaluates `group` against `selection`.
///
/// The threshold is resolved with the default of `kind` when the group does
/// not set one. Unknown ids are simply never selected.
#[must_use]
pub fn evaluate_group(
    group: &QuantifiedGroup,
    kind: GroupKind,
    selection: &Selection,
) -> GroupEvaluation {
    let of: Vec<OptionId> = group.distinct().into_iter().cloned().collect();
    let min = kind.resolve_min(group.min, of.len());
    let (present, missing): (Vec<_>, Vec<_>) =
        of.iter().cloned().partition(|id| selection.contains(id));
    let count = present.len();

    GroupEvaluation {
        min,
        satisfied: min == 0 || count >= min,
        count,
        missing,
        present,
        of,
    }
}

/// A group threshold as shown to users: "all", "≥1" or "≥N".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    min: usize,
    size: usize,
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min >= self.size {
            f.write_str("all")
        } else if self.min == 1 {
            f.write_str("≥1")
        } else {
            write!(f, "≥{}", self.min)
        }
    }
}
