//! Directed graphs over the `requires` and `mandatory` relations.
//!
//! Both relations are plain adjacency structures (`from -> [to]`) and may
//! contain cycles, so every traversal here tracks visited nodes explicitly.

use std::collections::{HashMap, HashSet};

use petgraph::{graphmap::DiGraphMap, visit::Bfs};

use crate::domain::{OptionId, RuleSpec, Ruleset};

/// A relation between options that forms a directed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `from` requires each of its `requires` targets.
    Requires,
    /// `from` forces each of its `mandatory` targets into the selection.
    Mandatory,
}

impl Relation {
    fn targets(self, spec: &RuleSpec) -> &[OptionId] {
        match self {
            Self::Requires => &spec.requires,
            Self::Mandatory => &spec.mandatory,
        }
    }
}

/// One relation of a ruleset as a graph.
///
/// Nodes borrow their ids from the ruleset. Node and edge order follow the
/// ruleset's id order, which keeps traversals deterministic. Parallel edges
/// collapse into one.
#[derive(Debug)]
pub struct RelationGraph<'a> {
    graph: DiGraphMap<&'a str, ()>,
    roots: Vec<&'a str>,
}

impl<'a> RelationGraph<'a> {
    /// Builds the graph of `relation` over `ruleset`.
    #[must_use]
    pub fn new(ruleset: &'a Ruleset, relation: Relation) -> Self {
        let mut graph = DiGraphMap::with_capacity(ruleset.len(), ruleset.edge_count());
        let mut roots = Vec::with_capacity(ruleset.len());

        for (from, _) in ruleset {
            graph.add_node(from.as_str());
            roots.push(from.as_str());
        }
        for (from, spec) in ruleset {
            for to in relation.targets(spec) {
                graph.add_edge(from.as_str(), to.as_str(), ());
            }
        }

        Self { graph, roots }
    }

    /// Every id reachable from `start`, in breadth-first order.
    ///
    /// `start` itself is never part of the result, even when a cycle leads
    /// back to it.
    #[must_use]
    pub fn reachable_from(&self, start: &str) -> Vec<OptionId> {
        // Only ids with rules have outgoing edges.
        let Ok(index) = self.roots.binary_search_by(|root| (*root).cmp(start)) else {
            return Vec::new();
        };
        let start = self.roots[index];

        let mut bfs = Bfs::new(&self.graph, start);
        let mut reached = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                reached.push(OptionId::from(node));
            }
        }
        reached
    }

    /// Finds cycles with a three-colour depth-first search.
    ///
    /// Every back edge `u -> v` yields one cycle, reported as the tree path
    /// from `v` down to `u` followed by `v` again, so each path starts and
    /// ends at the node that closes it. Roots are visited in id order.
    ///
    /// The search keeps its own stack of `(node, neighbours)` frames, so
    /// chain length is bounded by memory rather than by the call stack.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<OptionId>> {
        let mut discovered: HashSet<&str> = HashSet::new();
        let mut finished: HashSet<&str> = HashSet::new();
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut cycles = Vec::new();

        for &root in &self.roots {
            if !discovered.insert(root) {
                continue;
            }
            let mut stack = vec![(root, self.graph.neighbors(root))];
            while let Some((node, neighbors)) = stack.last_mut() {
                let node = *node;
                match neighbors.next() {
                    // Tree edge: descend.
                    Some(next) if discovered.insert(next) => {
                        parent.insert(next, node);
                        stack.push((next, self.graph.neighbors(next)));
                    }
                    // Back edge: `next` is still on the stack.
                    Some(next) if !finished.contains(next) => {
                        cycles.push(trace_cycle(&parent, node, next));
                    }
                    Some(_) => {}
                    None => {
                        finished.insert(node);
                        stack.pop();
                    }
                }
            }
        }

        cycles
    }
}

/// Walks parent links from `from` up to `to` and closes the loop.
fn trace_cycle(parent: &HashMap<&str, &str>, from: &str, to: &str) -> Vec<OptionId> {
    let mut path = vec![OptionId::from(to)];
    let mut current = Some(from);
    while let Some(node) = current {
        if node == to {
            break;
        }
        path.push(OptionId::from(node));
        current = parent.get(node).copied();
    }
    path.push(OptionId::from(to));
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(requires: &[&str], mandatory: &[&str]) -> RuleSpec {
        RuleSpec {
            requires: requires.iter().copied().map(OptionId::from).collect(),
            mandatory: mandatory.iter().copied().map(OptionId::from).collect(),
            ..RuleSpec::default()
        }
    }

    fn path(items: &[&str]) -> Vec<OptionId> {
        items.iter().copied().map(OptionId::from).collect()
    }

    #[test]
    fn two_node_cycle_is_reported_once() {
        let ruleset: Ruleset = [
            ("A".into(), spec(&["B"], &[])),
            ("B".into(), spec(&["A"], &[])),
        ]
        .into_iter()
        .collect();

        let cycles = RelationGraph::new(&ruleset, Relation::Requires).cycles();

        assert_eq!(cycles, vec![path(&["A", "B", "A"])]);
    }

    #[test]
    fn three_node_cycle_follows_traversal_order() {
        let ruleset: Ruleset = [
            ("A".into(), spec(&["B"], &[])),
            ("B".into(), spec(&["C"], &[])),
            ("C".into(), spec(&["A"], &[])),
        ]
        .into_iter()
        .collect();

        let cycles = RelationGraph::new(&ruleset, Relation::Requires).cycles();

        assert_eq!(cycles, vec![path(&["A", "B", "C", "A"])]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let ruleset: Ruleset = [("A".into(), spec(&[], &["A"]))].into_iter().collect();

        let cycles = RelationGraph::new(&ruleset, Relation::Mandatory).cycles();

        assert_eq!(cycles, vec![path(&["A", "A"])]);
    }

    #[test]
    fn disjoint_cycles_are_all_reported() {
        let ruleset: Ruleset = [
            ("A".into(), spec(&["B"], &[])),
            ("B".into(), spec(&["A"], &[])),
            ("X".into(), spec(&["Y"], &[])),
            ("Y".into(), spec(&["X"], &[])),
        ]
        .into_iter()
        .collect();

        let cycles = RelationGraph::new(&ruleset, Relation::Requires).cycles();

        assert_eq!(cycles.len(), 2);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let ruleset: Ruleset = [
            ("A".into(), spec(&["B", "C"], &[])),
            ("B".into(), spec(&["D"], &[])),
            ("C".into(), spec(&["D"], &[])),
        ]
        .into_iter()
        .collect();

        assert!(RelationGraph::new(&ruleset, Relation::Requires).cycles().is_empty());
    }

    #[test]
    fn reachable_excludes_start_on_cycle() {
        let ruleset: Ruleset = [
            ("A".into(), spec(&[], &["B"])),
            ("B".into(), spec(&[], &["A", "C"])),
        ]
        .into_iter()
        .collect();

        let reached = RelationGraph::new(&ruleset, Relation::Mandatory).reachable_from("A");

        assert_eq!(reached, path(&["B", "C"]));
    }

    fn chain(len: usize, relation: Relation) -> Ruleset {
        (0..len)
            .map(|i| {
                let next = format!("o{}", i + 1);
                let spec = match relation {
                    Relation::Requires => spec(&[&next], &[]),
                    Relation::Mandatory => spec(&[], &[&next]),
                };
                (OptionId::from(format!("o{i}")), spec)
            })
            .collect()
    }

    #[test]
    fn long_chain_has_no_cycle() {
        let ruleset = chain(100_000, Relation::Requires);

        assert!(RelationGraph::new(&ruleset, Relation::Requires).cycles().is_empty());
    }

    #[test]
    fn long_closed_chain_is_one_cycle() {
        let mut ruleset = chain(50_000, Relation::Mandatory);
        ruleset.insert("o50000", spec(&[], &["o0"]));

        let cycles = RelationGraph::new(&ruleset, Relation::Mandatory).cycles();

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 50_002);
        assert_eq!(cycles[0].first(), cycles[0].last());
    }

    #[test]
    fn reachable_from_unknown_start_is_empty() {
        let ruleset = Ruleset::new();
        let graph = RelationGraph::new(&ruleset, Relation::Mandatory);
        assert!(graph.reachable_from("ghost").is_empty());
    }
}
