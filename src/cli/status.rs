use std::path::PathBuf;

use clap::Parser;
use configurator::{Directory, Evaluation, Session};
use tracing::instrument;

use super::terminal::{self, Colorize};

#[derive(Debug, Parser)]
#[command(about = "Evaluate every option against a selection")]
pub struct Status {
    /// Payload file, or the name of a stored schema
    schema: String,

    /// Evaluate under this ruleset instead of the active one
    #[arg(long)]
    ruleset: Option<String>,

    /// Options to toggle, in order, before evaluating
    #[arg(long = "select", value_name = "ID")]
    selected: Vec<String>,

    /// Show only this option, with full diagnostics
    #[arg(long, value_name = "ID")]
    option: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = Directory::new(root).load_all()?;
        let schema = super::load_schema(&directory, &self.schema)?;
        let mut session = super::start_session(schema, self.ruleset.as_deref())?;
        for id in &self.selected {
            session.toggle(id);
        }

        let evaluations = match &self.option {
            Some(id) => vec![session.status(id)],
            None => session.statuses(),
        };

        match self.output {
            OutputFormat::Table => output_table(&session, &evaluations, self.option.is_some()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&evaluations)?),
        }
        Ok(())
    }
}

fn output_table(session: &Session, evaluations: &[Evaluation], detailed: bool) {
    let catalog = session.catalog();
    println!(
        "{} {}",
        "Ruleset:".dim(),
        session.rulesets().active_name().info()
    );
    let selection: Vec<&str> = session
        .selection()
        .iter()
        .map(|id| catalog.label(id))
        .collect();
    println!("{} {}\n", "Selection:".dim(), selection.join(", "));

    let narrow = terminal::is_narrow();
    for evaluation in evaluations {
        let id = evaluation.id.as_str();
        if narrow {
            println!("{} {id}", terminal::status(evaluation.status, 12));
        } else {
            println!(
                "{} {:<24} {}",
                terminal::status(evaluation.status, 12),
                id,
                catalog.label(id).dim()
            );
        }

        // Diagnostics for everything that is not freely selectable.
        if detailed || !evaluation.can_select() {
            for line in evaluation.describe(catalog) {
                println!("    {line}");
            }
        }
    }
}
