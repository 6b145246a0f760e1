//! An interactive configuration session.

use tracing::{debug, instrument};

use crate::domain::{
    Catalog, OptionId, Rulesets, Selection,
    lint::{LintSummary, lint_all},
    selection::{Toggle, toggle_selection},
    status::{Evaluation, evaluate_all, evaluate_option},
};

/// Catalog, rules and the current selection, held together for the length of
/// one configuration session.
///
/// The session is the only place where the selection changes, so every
/// addition carries its mandatory closure.
#[derive(Debug, Clone)]
pub struct Session {
    catalog: Catalog,
    rulesets: Rulesets,
    selection: Selection,
}

/// What a [`Session::toggle`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    /// Whether the toggled option is now selected.
    pub selected: bool,
    /// Options pulled in by the mandatory closure that were not selected
    /// before.
    pub newly_added: Vec<OptionId>,
}

impl Session {
    /// Starts a session with an empty selection.
    #[must_use]
    pub fn new(catalog: Catalog, rulesets: Rulesets) -> Self {
        Self {
            catalog,
            rulesets,
            selection: Selection::default(),
        }
    }

    /// The option catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Every ruleset, with the active one marked.
    #[must_use]
    pub const fn rulesets(&self) -> &Rulesets {
        &self.rulesets
    }

    /// The current selection.
    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Selects or deselects `id` under the active ruleset.
    #[instrument(level = "debug", skip(self))]
    pub fn toggle(&mut self, id: &str) -> SelectionChange {
        let Toggle {
            selection,
            selected,
            newly_added,
        } = toggle_selection(id, self.rulesets.active(), &self.selection);
        self.selection = selection;

        SelectionChange {
            selected,
            newly_added,
        }
    }

    /// Switches to the ruleset called `name`, clearing the selection.
    ///
    /// Returns `false`, and leaves everything untouched, if `name` is already
    /// active or does not exist.
    #[instrument(level = "debug", skip(self))]
    pub fn set_active_ruleset(&mut self, name: &str) -> bool {
        if !self.rulesets.set_active(name) {
            return false;
        }
        self.selection = Selection::default();
        debug!("switched ruleset");
        true
    }

    /// Clears the selection.
    pub fn reset(&mut self) {
        self.selection = Selection::default();
    }

    /// Evaluates `id` against the active ruleset and the current selection.
    #[must_use]
    pub fn status(&self, id: &str) -> Evaluation {
        evaluate_option(id, self.rulesets.active(), &self.selection)
    }

    /// Evaluates every catalog option, in display order.
    #[must_use]
    pub fn statuses(&self) -> Vec<Evaluation> {
        evaluate_all(
            self.catalog.options(),
            self.rulesets.active(),
            &self.selection,
        )
    }

    /// Lints every ruleset against the catalog.
    #[must_use]
    pub fn lint(&self) -> LintSummary {
        lint_all(&self.catalog, &self.rulesets)
    }
}
