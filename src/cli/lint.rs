use std::{collections::BTreeMap, path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use configurator::{
    Catalog, Directory,
    domain::{LintReport, LintSummary, Severity, lint_all, lint_ruleset},
};
use tracing::instrument;

use super::terminal::{self, Colorize};

/// Exit code when warnings fail a strict run.
const EXIT_WARNINGS: i32 = 2;
/// Exit code when any ruleset has errors.
const EXIT_ERRORS: i32 = 3;

#[derive(Debug, Parser)]
#[command(about = "Check rulesets for unknown ids, contradictions and cycles")]
pub struct Lint {
    /// Payload file, or the name of a stored schema
    schema: String,

    /// Lint only this ruleset
    #[arg(long)]
    ruleset: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,

    /// Treat warnings as failures
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

impl Lint {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = Directory::new(root).load_all()?;
        let strict = self.strict || directory.config().strict;
        let schema = super::load_schema(&directory, &self.schema)?;

        let summary = match &self.ruleset {
            Some(name) => {
                let ruleset = schema
                    .rulesets
                    .get(name)
                    .with_context(|| format!("Unknown ruleset '{name}'"))?;
                summarize(lint_ruleset(name, ruleset, &schema.catalog.known_ids()))
            }
            None => lint_all(&schema.catalog, &schema.rulesets),
        };

        if !self.quiet {
            match self.output {
                OutputFormat::Table => output_table(&summary, &schema.catalog),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Summary => output_summary(&summary),
            }
        }

        if summary.totals.error > 0 {
            process::exit(EXIT_ERRORS);
        }
        if strict && summary.totals.warning > 0 {
            process::exit(EXIT_WARNINGS);
        }
        Ok(())
    }
}

fn summarize(report: LintReport) -> LintSummary {
    let mut summary = LintSummary::default();
    summary.totals.total = report.counts.total;
    summary.totals.error = report.counts.severity(Severity::Error);
    summary.totals.warning = report.counts.severity(Severity::Warning);
    summary.by_ruleset = BTreeMap::from([(report.ruleset.clone(), report)]);
    summary
}

fn output_table(summary: &LintSummary, catalog: &Catalog) {
    for report in summary.by_ruleset.values() {
        if report.is_clean() {
            println!("{} {}", "✓".success(), report.ruleset);
            continue;
        }

        println!("{} {}", "✗".error(), report.ruleset);
        for issue in &report.issues {
            println!(
                "  {} {} {}",
                terminal::severity(issue.severity, 8),
                format!("{:<32}", issue.kind.to_string()).dim(),
                issue.describe(catalog)
            );
        }
    }
    println!();
    output_summary(summary);
}

fn output_summary(summary: &LintSummary) {
    let totals = summary.totals;
    if totals.total == 0 {
        println!(
            "{}",
            format!("No issues in {} ruleset(s)", summary.by_ruleset.len()).success()
        );
        return;
    }
    println!(
        "{} issue(s): {} error(s), {} warning(s) across {} ruleset(s)",
        totals.total,
        totals.error.to_string().error(),
        totals.warning.to_string().warning(),
        summary.by_ruleset.len()
    );
}
