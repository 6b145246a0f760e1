//! Rules for product configurators.
//!
//! A configurator offers a catalog of options. Rules say which options
//! require others, which exclude each other, which pull others in
//! automatically, and which need "at least N of" a group. This crate
//! normalizes rule data, evaluates options against a selection, resolves
//! mandatory additions and lints rulesets for structural problems.

pub mod domain;
pub use domain::{
    Catalog, Config, Evaluation, LintSummary, OptionId, OptionStatus, RuleSpec, Ruleset,
    Rulesets, Selection, Session,
};

pub mod storage;
pub use storage::{Directory, Schema, SchemaStore};
