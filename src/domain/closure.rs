//! Transitive closure of the mandatory relation.

use crate::domain::{
    OptionId, Ruleset,
    graph::{Relation, RelationGraph},
};

/// Every option that selecting `start` forces into the selection.
///
/// The result follows `mandatory` edges transitively in breadth-first order
/// and holds each id once. Cycles terminate, and `start` is excluded even
/// when a cycle leads back to it.
#[must_use]
pub fn mandatory_closure(start: &str, ruleset: &Ruleset) -> Vec<OptionId> {
    RelationGraph::new(ruleset, Relation::Mandatory).reachable_from(start)
}
