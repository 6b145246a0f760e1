//! A filesystem backed schema store.
//!
//! The [`Directory`] keeps everything under a `.cfgr` folder in its root:
//!
//! - `config.toml`, the store [`Config`]
//! - `schemas/<id>.json`, one file per stored schema
//! - `audit.ndjson`, the audit log, one JSON entry per line
//!
//! All reads are served from a [`MemoryStore`] built at load time. Every
//! mutation is applied to a copy of the memory store and written through to
//! disk, audit line first. The copy replaces the loaded store only once the
//! write has succeeded, so a failed write leaves the handle as it was.

use std::{
    ffi::OsStr,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::{debug, instrument, trace};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    domain::Config,
    storage::store::{
        ArchiveFilter, AuditEntry, AuditSummary, MemoryStore, SchemaStore, SchemaSummary,
        StoreError, StoredSchema,
    },
};

const META_DIR: &str = ".cfgr";
const SCHEMA_DIR: &str = "schemas";
const AUDIT_FILE: &str = "audit.ndjson";
const CONFIG_FILE: &str = "config.toml";

/// A directory whose contents have been read into memory.
#[derive(Debug, Clone)]
pub struct Loaded {
    store: MemoryStore,
    config: Config,
}

/// A directory that has not been read yet.
#[derive(Debug, PartialEq, Eq)]
pub struct Unloaded;

/// A filesystem backed store of schemas.
#[derive(Debug)]
pub struct Directory<S> {
    /// The root of the directory schemas are stored in.
    root: PathBuf,
    state: S,
}

impl<S> Directory<S> {
    /// The root of the directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the store configuration lives.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join(CONFIG_FILE)
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    fn schema_dir(&self) -> PathBuf {
        self.meta_dir().join(SCHEMA_DIR)
    }

    fn schema_path(&self, id: Uuid) -> PathBuf {
        self.schema_dir().join(format!("{id}.json"))
    }

    fn audit_path(&self) -> PathBuf {
        self.meta_dir().join(AUDIT_FILE)
    }
}

impl Directory<Unloaded> {
    /// Opens a directory at the given path.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: Unloaded,
        }
    }

    /// Loads the configuration, every stored schema and the audit log.
    ///
    /// A directory that holds no store yet loads as an empty store with the
    /// default configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration, a schema file or the audit log cannot be
    /// read or parsed.
    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    pub fn load_all(self) -> Result<Directory<Loaded>, StoreError> {
        let config = Config::load_or_default(&self.config_path())?;

        let schemas = collect_schema_paths(&self.schema_dir())
            .iter()
            .map(|path| load_schema(path))
            .collect::<Result<Vec<_>, _>>()?;
        let audit = load_audit(&self.audit_path())?;
        debug!(schemas = schemas.len(), audit = audit.len(), "loaded store");

        Ok(Directory {
            root: self.root,
            state: Loaded {
                store: MemoryStore::from_parts(schemas, audit),
                config,
            },
        })
    }
}

impl Directory<Loaded> {
    /// The store configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.state.config
    }

    /// Replaces the store configuration and writes it to disk.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot be written.
    pub fn set_config(&mut self, config: Config) -> Result<(), StoreError> {
        let meta_dir = self.meta_dir();
        fs::create_dir_all(&meta_dir).map_err(|source| StoreError::Io {
            path: meta_dir,
            source,
        })?;
        config.save(&self.config_path())?;
        self.state.config = config;
        Ok(())
    }

    /// Number of stored schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    /// Whether no schema is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.store.is_empty()
    }

    /// Writes the audit entries `store` recorded from position
    /// `audit_start`, then the state of schema `id` in `store`, to disk.
    fn persist(
        &self,
        store: &MemoryStore,
        id: Uuid,
        audit_start: usize,
    ) -> Result<(), StoreError> {
        append_audit(&self.audit_path(), store.audit_since(audit_start))?;
        let path = self.schema_path(id);
        match store.get(id) {
            Ok(schema) => write_schema(&path, &schema),
            Err(_) => remove_file(&path),
        }
    }

    fn write_through<T>(
        &mut self,
        change: impl FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
        id: impl FnOnce(&T) -> Uuid,
    ) -> Result<T, StoreError> {
        let mut staged = self.state.store.clone();
        let audit_start = staged.audit_len();
        let value = change(&mut staged)?;
        self.persist(&staged, id(&value), audit_start)?;
        self.state.store = staged;
        Ok(value)
    }
}

impl SchemaStore for Directory<Loaded> {
    fn save(
        &mut self,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        self.write_through(
            |store| store.save(name, payload, archived, actor),
            |schema| schema.id,
        )
    }

    fn update(
        &mut self,
        id: Uuid,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        self.write_through(
            |store| store.update(id, name, payload, archived, actor),
            |schema| schema.id,
        )
    }

    fn get(&self, id: Uuid) -> Result<StoredSchema, StoreError> {
        self.state.store.get(id)
    }

    fn find(&self, name: &str) -> Option<StoredSchema> {
        self.state.store.find(name)
    }

    fn set_archived(
        &mut self,
        id: Uuid,
        archived: bool,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        self.write_through(
            |store| store.set_archived(id, archived, actor),
            |schema| schema.id,
        )
    }

    fn delete(&mut self, id: Uuid, actor: Option<&str>) -> Result<(), StoreError> {
        self.write_through(|store| store.delete(id, actor), |_| id)
    }

    fn list(&self, filter: ArchiveFilter) -> Vec<SchemaSummary> {
        self.state.store.list(filter)
    }

    fn history(&self, id: Uuid) -> Vec<AuditEntry> {
        self.state.store.history(id)
    }

    fn audit_summaries(&self) -> Vec<AuditSummary> {
        self.state.store.audit_summaries()
    }
}

fn collect_schema_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new("json")))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn load_schema(path: &Path) -> Result<StoredSchema, StoreError> {
    trace!(path = %path.display(), "loading schema");
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn load_audit(path: &Path) -> Result<Vec<AuditEntry>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

fn write_schema(path: &Path, schema: &StoredSchema) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = serde_json::to_string_pretty(schema).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, content).map_err(io_error)
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

fn append_audit(path: &Path, entries: &[AuditEntry]) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut lines = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        lines.push_str(&line);
        lines.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    file.write_all(lines.as_bytes()).map_err(io_error)
}
