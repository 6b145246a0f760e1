//! The rule engine.
//!
//! This module holds the option and rule model, the normalizer that turns raw
//! rule data into that model, and the pure operations on top of it: group
//! evaluation, per-option status, mandatory closure, selection toggling and
//! ruleset linting. Nothing in here performs I/O except [`Config`].

mod option_id;
pub use option_id::OptionId;

mod rule;
pub use rule::{GroupKind, QuantifiedGroup, RuleSpec, Ruleset, Rulesets};

pub mod normalize;
pub use normalize::{normalize_ruleset, normalize_rulesets, normalize_spec};

mod catalog;
pub use catalog::{Catalog, Group};

pub mod group;
pub use group::{GroupEvaluation, evaluate_group};

mod graph;

pub mod closure;
pub use closure::mandatory_closure;

mod selection;
pub use selection::{Selection, Toggle, toggle_selection};

pub mod status;
pub use status::{Evaluation, OptionStatus, evaluate_all, evaluate_option};

pub mod lint;
pub use lint::{Issue, IssueKind, LintReport, LintSummary, Severity, lint_all, lint_ruleset};

mod session;
pub use session::{SelectionChange, Session};

mod config;
pub use config::{Config, ConfigError};
