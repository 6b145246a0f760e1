use std::{
    fs,
    path::{Path, PathBuf},
};

mod lint;
mod schema;
mod select;
mod status;
mod terminal;

use anyhow::Context;
use clap::ArgAction;
use configurator::{
    Config, Session,
    storage::{Directory, Loaded, Schema, SchemaStore, parse_payload_text},
};
use lint::Lint;
use schema::SchemaCommand;
use select::Select;
use status::Status;
use tracing::{debug, instrument};

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the schema store
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Initialize a schema store
    Init(Init),

    /// Check rulesets for structural problems
    Lint(Lint),

    /// Show the status of every option under a selection
    Status(Status),

    /// Toggle options and report what the rules added
    Select(Select),

    /// Manage stored schemas
    #[command(subcommand)]
    Schema(SchemaCommand),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Init(command) => command.run(root)?,
            Self::Lint(command) => command.run(root)?,
            Self::Status(command) => command.run(root)?,
            Self::Select(command) => command.run(root)?,
            Self::Schema(command) => command.run(root)?,
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Init {
    /// Ruleset name used when a payload carries no ruleset
    #[arg(long)]
    default_ruleset: Option<String>,

    /// Name recorded in the audit log
    #[arg(long)]
    actor: Option<String>,

    /// Treat lint warnings as failures
    #[arg(long)]
    strict: bool,
}

impl Init {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = Directory::new(root).load_all()?;
        let config_path = directory.config_path();
        if config_path.exists() {
            anyhow::bail!(
                "Store already initialized (found {})",
                config_path.display()
            );
        }

        let mut config = Config::default();
        if let Some(name) = &self.default_ruleset {
            config.set_default_ruleset(name);
        }
        config.actor = self.actor;
        config.strict = self.strict;
        directory.set_config(config)?;

        println!(
            "Initialized schema store in {}",
            directory.root().display()
        );
        println!("  Created: {}", config_path.display());
        Ok(())
    }
}

/// Loads a schema from a payload file, or from the store when no such file
/// exists.
fn load_schema(directory: &Directory<Loaded>, source: &str) -> anyhow::Result<Schema> {
    let default_ruleset = directory.config().default_ruleset();
    let path = Path::new(source);

    let payload = if path.is_file() {
        debug!(path = %path.display(), "reading payload file");
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_payload_text(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        directory
            .find(source)
            .with_context(|| format!("No payload file or stored schema named '{source}'"))?
            .payload
    };

    Ok(Schema::hydrate(&payload, default_ruleset))
}

/// Starts a session on `schema`, switching to `ruleset` when given.
fn start_session(schema: Schema, ruleset: Option<&str>) -> anyhow::Result<Session> {
    let mut session = schema.into_session();
    if let Some(name) = ruleset {
        if session.rulesets().get(name).is_none() {
            let known: Vec<_> = session.rulesets().names().collect();
            anyhow::bail!("Unknown ruleset '{name}' (available: {})", known.join(", "));
        }
        session.set_active_ruleset(name);
    }
    Ok(session)
}

/// The actor to record: the explicit one, else the configured one.
fn actor<'a>(explicit: Option<&'a str>, config: &'a Config) -> Option<&'a str> {
    explicit.or(config.actor.as_deref())
}
