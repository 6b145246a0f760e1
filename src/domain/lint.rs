//! Static analysis of rulesets.
//!
//! The linter never fails: every inconsistency it finds becomes an [`Issue`]
//! with a [`Severity`], and callers decide what to block on. Checks run in a
//! fixed order (unknown ids, then per-rule checks, then cross contradictions,
//! then cycles) and rulesets iterate in id order, so the same input always
//! yields the same report.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{
    Catalog, OptionId, RuleSpec, Ruleset, Rulesets,
    graph::{Relation, RelationGraph},
    rule::dedupe,
};

/// What an issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A rule is attached to an option that is not in the catalog.
    UnknownFrom,
    /// A rule references an option that is not in the catalog.
    UnknownTarget,
    /// A list holds the same id more than once.
    Duplicate,
    /// An option requires itself.
    SelfDependency,
    /// An option is incompatible with itself.
    SelfIncompatibility,
    /// An option is mandatory for itself.
    SelfMandatory,
    /// An option both requires and is incompatible with the same target.
    ContradictionDirect,
    /// An option both mandates and is incompatible with the same target.
    ContradictionMandatoryDirect,
    /// An option requires a target that is incompatible with it.
    ContradictionCross,
    /// An option mandates a target that is incompatible with it.
    ContradictionMandatoryCross,
    /// The requires relation contains a cycle.
    CycleRequires,
    /// The mandatory relation contains a cycle.
    CycleMandatory,
}

impl IssueKind {
    /// The default severity of this kind of issue.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Duplicate => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownFrom => "unknown_from",
            Self::UnknownTarget => "unknown_target",
            Self::Duplicate => "duplicate",
            Self::SelfDependency => "self_dependency",
            Self::SelfIncompatibility => "self_incompatibility",
            Self::SelfMandatory => "self_mandatory",
            Self::ContradictionDirect => "contradiction_direct",
            Self::ContradictionMandatoryDirect => "contradiction_mandatory_direct",
            Self::ContradictionCross => "contradiction_cross",
            Self::ContradictionMandatoryCross => "contradiction_mandatory_cross",
            Self::CycleRequires => "cycle_requires",
            Self::CycleMandatory => "cycle_mandatory",
        })
    }
}

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The ruleset cannot behave as intended.
    Error,
    /// Informational; the ruleset still behaves as intended.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
        })
    }
}

/// The rule list an issue was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// The flat `requires` list.
    Requires,
    /// The `incompatible_with` list.
    IncompatibleWith,
    /// The `mandatory` list.
    Mandatory,
    /// The `of` list of a requires-group.
    RequiresGroup,
    /// The `of` list of an incompatible-group.
    IncompatibleGroup,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requires => "requires",
            Self::IncompatibleWith => "incompatible_with",
            Self::Mandatory => "mandatory",
            Self::RequiresGroup => "requires_group",
            Self::IncompatibleGroup => "incompatible_group",
        })
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// What the issue is about.
    pub kind: IssueKind,
    /// How serious it is.
    pub severity: Severity,
    /// The ruleset it was found in.
    pub ruleset: String,
    /// The option whose rule is at fault. Absent for cycles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<OptionId>,
    /// The target involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<OptionId>,
    /// The rule list involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<Edge>,
    /// For cycles, the path that closes on itself.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<OptionId>,
    /// A plain-id rendering of the issue.
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, ruleset: &str) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            ruleset: ruleset.to_string(),
            from: None,
            to: None,
            edge: None,
            path: Vec::new(),
            message: String::new(),
        }
    }

    fn with_from(mut self, from: &OptionId) -> Self {
        self.from = Some(from.clone());
        self
    }

    fn with_to(mut self, to: &OptionId) -> Self {
        self.to = Some(to.clone());
        self
    }

    const fn with_edge(mut self, edge: Edge) -> Self {
        self.edge = Some(edge);
        self
    }

    fn with_path(mut self, path: Vec<OptionId>) -> Self {
        self.path = path;
        self
    }

    fn finish(mut self) -> Self {
        let message = self.render(|id| id);
        self.message = message;
        self
    }

    /// Renders the issue using the catalog's labels.
    #[must_use]
    pub fn describe(&self, catalog: &Catalog) -> String {
        self.render(|id| catalog.label(id))
    }

    fn render<'a>(&'a self, label: impl Fn(&'a str) -> &'a str) -> String {
        let from = self.from.as_deref().map_or("?", &label);
        let to = self.to.as_deref().map_or("?", &label);
        let edge = self.edge.map_or_else(String::new, |edge| edge.to_string());
        let path = || {
            self.path
                .iter()
                .map(|id| label(id.as_str()))
                .collect::<Vec<_>>()
                .join(" -> ")
        };

        match self.kind {
            IssueKind::UnknownFrom => format!("rule on unknown option: {from}"),
            IssueKind::UnknownTarget => format!("{from} -> {to} ({edge}) points to an unknown id"),
            IssueKind::Duplicate => format!("duplicates in {edge} of {from}"),
            IssueKind::SelfDependency => format!("{from} requires itself"),
            IssueKind::SelfIncompatibility => format!("{from} is incompatible with itself"),
            IssueKind::SelfMandatory => format!("{from} is mandatory for itself"),
            IssueKind::ContradictionDirect => {
                format!("{from} requires {to} and is incompatible with {to}")
            }
            IssueKind::ContradictionMandatoryDirect => {
                format!("{from} makes {to} mandatory but is incompatible with {to}")
            }
            IssueKind::ContradictionCross => {
                format!("{from} requires {to}, but {to} is incompatible with {from}")
            }
            IssueKind::ContradictionMandatoryCross => {
                format!("{from} makes {to} mandatory, but {to} is incompatible with {from}")
            }
            IssueKind::CycleRequires => format!("requires cycle: {}", path()),
            IssueKind::CycleMandatory => format!("mandatory cycle: {}", path()),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Issue counts for summary display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Total number of issues.
    pub total: usize,
    /// Issues per severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Issues per kind.
    pub by_kind: BTreeMap<IssueKind, usize>,
}

impl Counts {
    fn tally(issues: &[Issue]) -> Self {
        let mut counts = Self {
            total: issues.len(),
            ..Self::default()
        };
        for issue in issues {
            *counts.by_severity.entry(issue.severity).or_default() += 1;
            *counts.by_kind.entry(issue.kind).or_default() += 1;
        }
        counts
    }

    /// Number of issues with the given severity.
    #[must_use]
    pub fn severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or_default()
    }

    /// Number of issues of the given kind.
    #[must_use]
    pub fn kind(&self, kind: IssueKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }
}

/// The lint result for one ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintReport {
    /// The ruleset's name.
    pub ruleset: String,
    /// Aggregated counts.
    pub counts: Counts,
    /// Every issue found, in check order.
    pub issues: Vec<Issue>,
}

impl LintReport {
    /// Whether any issue is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.counts.severity(Severity::Error) > 0
    }

    /// Whether the report holds no issue at all.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.counts.total == 0
    }
}

/// Totals across several rulesets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Total number of issues.
    pub total: usize,
    /// Number of errors.
    pub error: usize,
    /// Number of warnings.
    pub warning: usize,
}

/// The lint result for every ruleset of a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintSummary {
    /// Reports by ruleset name.
    pub by_ruleset: BTreeMap<String, LintReport>,
    /// Totals across all reports.
    pub totals: Totals,
}

/// Lints one ruleset against the set of known option ids.
#[instrument(level = "debug", skip(ruleset, known), fields(rules = ruleset.len()))]
pub fn lint_ruleset(name: &str, ruleset: &Ruleset, known: &BTreeSet<OptionId>) -> LintReport {
    let mut issues = Vec::new();

    for (from, spec) in ruleset {
        unknown_references(name, from, spec, known, &mut issues);
    }
    for (from, spec) in ruleset {
        rule_checks(name, from, spec, &mut issues);
    }
    for (from, spec) in ruleset {
        cross_contradictions(name, from, spec, ruleset, &mut issues);
    }
    for (relation, kind) in [
        (Relation::Requires, IssueKind::CycleRequires),
        (Relation::Mandatory, IssueKind::CycleMandatory),
    ] {
        for path in RelationGraph::new(ruleset, relation).cycles() {
            issues.push(Issue::new(kind, name).with_path(path).finish());
        }
    }

    let counts = Counts::tally(&issues);
    debug!(total = counts.total, "linted");

    LintReport {
        ruleset: name.to_string(),
        counts,
        issues,
    }
}

/// Lints every ruleset against the ids known to `catalog`.
#[instrument(level = "debug", skip_all)]
pub fn lint_all(catalog: &Catalog, rulesets: &Rulesets) -> LintSummary {
    let known = catalog.known_ids();
    let mut summary = LintSummary::default();

    for (name, ruleset) in rulesets.iter() {
        let report = lint_ruleset(name, ruleset, &known);
        summary.totals.total += report.counts.total;
        summary.totals.error += report.counts.severity(Severity::Error);
        summary.totals.warning += report.counts.severity(Severity::Warning);
        summary.by_ruleset.insert(name.to_string(), report);
    }

    summary
}

fn unknown_references(
    name: &str,
    from: &OptionId,
    spec: &RuleSpec,
    known: &BTreeSet<OptionId>,
    issues: &mut Vec<Issue>,
) {
    if !known.contains(from) {
        issues.push(Issue::new(IssueKind::UnknownFrom, name).with_from(from).finish());
    }

    let flat = [
        (Edge::Requires, &spec.requires),
        (Edge::IncompatibleWith, &spec.incompatible_with),
        (Edge::Mandatory, &spec.mandatory),
    ];
    let grouped = spec
        .requires_groups
        .iter()
        .map(|group| (Edge::RequiresGroup, &group.of))
        .chain(
            spec.incompatible_groups
                .iter()
                .map(|group| (Edge::IncompatibleGroup, &group.of)),
        );

    for (edge, targets) in flat.into_iter().chain(grouped) {
        for to in targets.iter().filter(|to| !known.contains(*to)) {
            issues.push(
                Issue::new(IssueKind::UnknownTarget, name)
                    .with_from(from)
                    .with_to(to)
                    .with_edge(edge)
                    .finish(),
            );
        }
    }
}

fn rule_checks(name: &str, from: &OptionId, spec: &RuleSpec, issues: &mut Vec<Issue>) {
    let requires = dedupe(&spec.requires);
    let incompatible = dedupe(&spec.incompatible_with);
    let mandatory = dedupe(&spec.mandatory);

    let lists = [
        (Edge::Requires, &spec.requires, requires.len()),
        (Edge::IncompatibleWith, &spec.incompatible_with, incompatible.len()),
        (Edge::Mandatory, &spec.mandatory, mandatory.len()),
    ];
    let groups = spec
        .requires_groups
        .iter()
        .map(|group| (Edge::RequiresGroup, &group.of, group.distinct().len()))
        .chain(
            spec.incompatible_groups
                .iter()
                .map(|group| (Edge::IncompatibleGroup, &group.of, group.distinct().len())),
        );
    for (edge, list, distinct) in lists.into_iter().chain(groups) {
        if distinct != list.len() {
            issues.push(
                Issue::new(IssueKind::Duplicate, name)
                    .with_from(from)
                    .with_edge(edge)
                    .finish(),
            );
        }
    }

    for (list, kind) in [
        (&requires, IssueKind::SelfDependency),
        (&incompatible, IssueKind::SelfIncompatibility),
        (&mandatory, IssueKind::SelfMandatory),
    ] {
        if list.contains(&from) {
            issues.push(Issue::new(kind, name).with_from(from).finish());
        }
    }

    for (list, kind) in [
        (&requires, IssueKind::ContradictionDirect),
        (&mandatory, IssueKind::ContradictionMandatoryDirect),
    ] {
        for to in list.iter().copied().filter(|to| incompatible.contains(to)) {
            issues.push(Issue::new(kind, name).with_from(from).with_to(to).finish());
        }
    }
}

fn cross_contradictions(
    name: &str,
    from: &OptionId,
    spec: &RuleSpec,
    ruleset: &Ruleset,
    issues: &mut Vec<Issue>,
) {
    for (list, kind) in [
        (&spec.requires, IssueKind::ContradictionCross),
        (&spec.mandatory, IssueKind::ContradictionMandatoryCross),
    ] {
        for to in dedupe(list) {
            if ruleset.spec(to).is_incompatible_with(from) {
                issues.push(Issue::new(kind, name).with_from(from).with_to(to).finish());
            }
        }
    }
}
