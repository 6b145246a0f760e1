use std::path::PathBuf;

use clap::Parser;
use configurator::{Directory, OptionId, OptionStatus};
use tracing::instrument;

use super::terminal::{self, Colorize};

#[derive(Debug, Parser)]
#[command(about = "Toggle options in order and report what each toggle changed")]
pub struct Select {
    /// Payload file, or the name of a stored schema
    schema: String,

    /// Options to toggle, in order
    #[arg(required = true, value_name = "ID")]
    ids: Vec<String>,

    /// Select under this ruleset instead of the active one
    #[arg(long)]
    ruleset: Option<String>,
}

impl Select {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = Directory::new(root).load_all()?;
        let schema = super::load_schema(&directory, &self.schema)?;
        let mut session = super::start_session(schema, self.ruleset.as_deref())?;

        for id in &self.ids {
            // Toggling does not check eligibility; report it alongside.
            let before = session.status(id);
            let change = session.toggle(id);
            let label = session.catalog().label(id);

            if change.selected {
                println!("{} {label}", "+".success());
                if before.status != OptionStatus::Normal && !before.is_selected {
                    println!(
                        "    {} was {}",
                        "note:".warning(),
                        terminal::status(before.status, 0)
                    );
                }
            } else {
                println!("{} {label}", "-".warning());
            }
            for added in &change.newly_added {
                println!(
                    "    {} {}",
                    "added:".info(),
                    session.catalog().label(added)
                );
            }
        }

        let selection: Vec<&str> = session.selection().iter().map(OptionId::as_str).collect();
        println!("\n{} {}", "Selection:".dim(), selection.join(", "));
        Ok(())
    }
}
