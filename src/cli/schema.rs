use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use configurator::{
    Directory,
    storage::{
        ArchiveFilter, AuditEntry, Loaded, Schema, SchemaStore, StoredSchema, parse_payload_text,
    },
};
use tracing::instrument;
use uuid::Uuid;

use super::terminal::Colorize;

#[derive(Debug, clap::Subcommand)]
pub enum SchemaCommand {
    /// Store a payload file under a name, replacing any schema with that name
    ///
    /// The payload is stored in canonical form, whatever shape its rules
    /// were written in.
    Save(Save),

    /// Print a stored schema
    Show(Show),

    /// Write a schema out as a canonical payload
    Export(Export),

    /// List stored schemas, most recently changed first
    List(List),

    /// Archive a stored schema
    Archive(Target),

    /// Restore an archived schema
    Restore(Target),

    /// Delete a stored schema
    ///
    /// The payload is kept in the audit log.
    Delete(Delete),

    /// Show the audit log of a schema
    History(History),

    /// Show the latest change to every schema ever stored
    Audit,
}

impl SchemaCommand {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = Directory::new(root).load_all()?;
        match self {
            Self::Save(command) => command.run(directory),
            Self::Show(command) => command.run(&directory),
            Self::Export(command) => command.run(&directory),
            Self::List(command) => {
                command.run(&directory);
                Ok(())
            }
            Self::Archive(target) => target.set_archived(directory, true),
            Self::Restore(target) => target.set_archived(directory, false),
            Self::Delete(command) => command.run(directory),
            Self::History(command) => command.run(&directory),
            Self::Audit => {
                audit(&directory);
                Ok(())
            }
        }
    }
}

/// Finds a stored schema by id or, ignoring case, by name.
fn resolve(directory: &Directory<Loaded>, schema: &str) -> anyhow::Result<StoredSchema> {
    if let Ok(id) = Uuid::parse_str(schema) {
        return Ok(directory.get(id)?);
    }
    directory
        .find(schema)
        .with_context(|| format!("No stored schema named '{schema}'"))
}

#[derive(Debug, Parser)]
pub struct Save {
    /// The schema name
    name: String,

    /// The payload file (JSON, or JavaScript-module exports)
    file: PathBuf,

    /// Set the archive flag; the current flag is kept when omitted
    #[arg(long)]
    archived: Option<bool>,

    /// Name recorded in the audit log
    #[arg(long)]
    actor: Option<String>,
}

impl Save {
    #[instrument(level = "debug", skip(self, directory))]
    fn run(self, mut directory: Directory<Loaded>) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let payload = parse_payload_text(&text)
            .with_context(|| format!("Failed to parse {}", self.file.display()))?;
        let payload = Schema::hydrate(&payload, directory.config().default_ruleset()).to_payload();

        let actor = super::actor(self.actor.as_deref(), directory.config()).map(str::to_string);
        let schema = directory.save(&self.name, payload, self.archived, actor.as_deref())?;

        println!("{} {} ({})", "✓".success(), schema.name, schema.id.to_string().dim());
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Show {
    /// Schema name or id
    schema: String,

    /// Print the schema record instead of just its payload
    #[arg(long)]
    full: bool,
}

impl Show {
    fn run(self, directory: &Directory<Loaded>) -> anyhow::Result<()> {
        let schema = resolve(directory, &self.schema)?;
        let output = if self.full {
            serde_json::to_string_pretty(&schema)?
        } else {
            serde_json::to_string_pretty(&schema.payload)?
        };
        println!("{output}");
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Export {
    /// Payload file, or the name of a stored schema
    schema: String,

    /// Write to this file instead of standard output
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Export {
    #[instrument(level = "debug", skip(self, directory))]
    fn run(self, directory: &Directory<Loaded>) -> anyhow::Result<()> {
        let schema = super::load_schema(directory, &self.schema)?;
        let payload = serde_json::to_string_pretty(&schema.to_payload())?;

        match &self.output {
            Some(path) => {
                fs::write(path, payload + "\n")
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{} Exported to {}", "✓".success(), path.display());
            }
            None => println!("{payload}"),
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct List {
    /// Only archived schemas
    #[arg(long, conflicts_with = "active")]
    archived: bool,

    /// Only schemas that are not archived
    #[arg(long)]
    active: bool,
}

impl List {
    fn run(self, directory: &Directory<Loaded>) {
        let filter = if self.archived {
            ArchiveFilter::Archived
        } else if self.active {
            ArchiveFilter::Active
        } else {
            ArchiveFilter::All
        };

        let schemas = directory.list(filter);
        if schemas.is_empty() {
            println!("{}", "No schemas".dim());
            return;
        }
        for schema in schemas {
            let flag = if schema.archived {
                format!("{:<10}", "archived").warning()
            } else {
                format!("{:<10}", "active").success()
            };
            println!(
                "{:<32} {} {} {}",
                schema.name,
                flag,
                schema.updated_at.format("%Y-%m-%d %H:%M"),
                schema.id.to_string().dim()
            );
        }
    }
}

#[derive(Debug, Parser)]
pub struct Target {
    /// Schema name or id
    schema: String,

    /// Name recorded in the audit log
    #[arg(long)]
    actor: Option<String>,
}

impl Target {
    #[instrument(level = "debug", skip(self, directory))]
    fn set_archived(self, mut directory: Directory<Loaded>, archived: bool) -> anyhow::Result<()> {
        let schema = resolve(&directory, &self.schema)?;
        let actor = super::actor(self.actor.as_deref(), directory.config()).map(str::to_string);
        let schema = directory.set_archived(schema.id, archived, actor.as_deref())?;

        let verb = if archived { "Archived" } else { "Restored" };
        println!("{} {verb} {}", "✓".success(), schema.name);
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Delete {
    /// Schema name or id
    schema: String,

    /// Name recorded in the audit log
    #[arg(long)]
    actor: Option<String>,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(self, directory))]
    fn run(self, mut directory: Directory<Loaded>) -> anyhow::Result<()> {
        let schema = resolve(&directory, &self.schema)?;

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Delete schema '{}'?", schema.name))
                .default(false)
                .interact()?;
            if !confirmed {
                println!("Cancelled");
                std::process::exit(130);
            }
        }

        let actor = super::actor(self.actor.as_deref(), directory.config()).map(str::to_string);
        directory.delete(schema.id, actor.as_deref())?;
        println!("{} Deleted {}", "✓".success(), schema.name);
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct History {
    /// Schema name or id; ids also work for deleted schemas
    schema: String,
}

impl History {
    fn run(self, directory: &Directory<Loaded>) -> anyhow::Result<()> {
        let id = match Uuid::parse_str(&self.schema) {
            Ok(id) => id,
            Err(_) => resolve(directory, &self.schema)?.id,
        };

        let entries = directory.history(id);
        if entries.is_empty() {
            anyhow::bail!("No audit entries for '{}'", self.schema);
        }
        for entry in &entries {
            print_entry(entry);
        }
        Ok(())
    }
}

fn audit(directory: &Directory<Loaded>) {
    for summary in directory.audit_summaries() {
        let state = match summary.archived {
            Some(true) => format!("{:<10}", "archived").warning(),
            Some(false) => format!("{:<10}", "active").success(),
            None => format!("{:<10}", "deleted").dim(),
        };
        print!("{state} ");
        print_entry(&summary.entry);
    }
}

fn print_entry(entry: &AuditEntry) {
    println!(
        "{} {} {:<32} {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        format!("{:<10}", entry.action.to_string()).info(),
        entry.name,
        entry.actor.as_deref().unwrap_or("-").dim()
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn legacy_payload() -> serde_json::Value {
        json!({
            "groupedCriteria": { "Body": ["paint", "rack", "sunroof"] },
            "ruleSets": { "base": { "rules": {
                "rack": { "paint": "req", "sunroof": "incompatible" },
                "sunroof": { "paint": "obligatoire" },
            } } },
        })
    }

    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("legacy.json");
        fs::write(&file, legacy_payload().to_string()).unwrap();
        (tmp, file)
    }

    fn load(tmp: &TempDir) -> Directory<Loaded> {
        Directory::new(tmp.path().to_path_buf()).load_all().unwrap()
    }

    #[test]
    fn save_stores_the_canonical_payload() {
        let (tmp, file) = setup();
        let save = Save {
            name: "Roadster".to_string(),
            file,
            archived: None,
            actor: None,
        };

        save.run(load(&tmp)).unwrap();

        let payload = load(&tmp).find("Roadster").unwrap().payload;
        let rules = &payload["ruleSets"]["base"]["rules"];
        assert_eq!(rules["rack"]["requires"], json!(["paint"]));
        assert_eq!(rules["rack"]["incompatible_with"], json!(["sunroof"]));
        assert_eq!(rules["rack"]["mandatory"], json!([]));
        assert_eq!(rules["sunroof"]["mandatory"], json!(["paint"]));
        assert_eq!(payload["activeRuleset"], json!("base"));
        assert_eq!(payload["optionLabels"]["rack"], json!("rack"));
    }

    #[test]
    fn export_writes_the_canonical_payload() {
        let (tmp, file) = setup();
        let output = tmp.path().join("export.json");
        let export = Export {
            schema: file.display().to_string(),
            output: Some(output.clone()),
        };

        export.run(&load(&tmp)).unwrap();

        let exported: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        let expected = Schema::hydrate(&legacy_payload(), "default").to_payload();
        assert_eq!(exported, expected);
        assert_eq!(
            exported["ruleSets"]["base"]["rules"]["rack"]["requires"],
            json!(["paint"])
        );
    }
}
