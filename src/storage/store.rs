//! Named schema storage with an audit trail.
//!
//! A schema is an opaque JSON payload stored under a unique, human-readable
//! name. Every mutation is recorded in an append-only audit log. Archiving is
//! a soft flag; deleting removes the schema but keeps its payload in the log.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Deref,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use uuid::Uuid;

/// A trimmed, non-empty schema name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaName(NonEmptyString);

impl SchemaName {
    /// Creates a name from `name`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNameError`] if nothing is left after trimming.
    pub fn new(name: &str) -> Result<Self, InvalidNameError> {
        NonEmptyString::new(name.trim().to_string())
            .map(Self)
            .map_err(|_| InvalidNameError(name.to_string()))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether two names refer to the same schema. Names are compared without
    /// regard to case.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.as_str().to_lowercase() == other.as_str().to_lowercase()
    }
}

impl TryFrom<String> for SchemaName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<SchemaName> for String {
    fn from(name: SchemaName) -> Self {
        name.as_str().to_string()
    }
}

impl Deref for SchemaName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A schema name that is empty once trimmed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("schema name must not be empty: {0:?}")]
pub struct InvalidNameError(String);

/// Failure of a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No schema has the given id.
    #[error("schema not found: {0}")]
    NotFound(Uuid),

    /// The name is not a valid schema name.
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),

    /// Another schema already uses the name.
    #[error("schema name already in use: {0}")]
    NameTaken(SchemaName),

    /// Payloads must be JSON objects.
    #[error("schema payload must be a JSON object")]
    InvalidPayload,

    /// A file could not be read or written.
    #[error("failed to access {path}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file did not hold valid JSON.
    #[error("failed to parse {path}")]
    Json {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The store configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::domain::ConfigError),
}

/// A stored schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSchema {
    /// Stable identifier.
    pub id: Uuid,
    /// Unique name.
    pub name: SchemaName,
    /// The schema payload, a JSON object.
    pub payload: Value,
    /// Whether the schema is archived.
    pub archived: bool,
    /// When the schema was created.
    pub created_at: DateTime<Utc>,
    /// When the schema was last written.
    pub updated_at: DateTime<Utc>,
    /// Store-wide write counter at the last write. Orders writes that share a
    /// timestamp.
    pub revision: u64,
}

impl StoredSchema {
    /// The schema without its payload.
    #[must_use]
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            id: self.id,
            name: self.name.clone(),
            archived: self.archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A stored schema without its payload, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSummary {
    /// Stable identifier.
    pub id: Uuid,
    /// Unique name.
    pub name: SchemaName,
    /// Whether the schema is archived.
    pub archived: bool,
    /// When the schema was created.
    pub created_at: DateTime<Utc>,
    /// When the schema was last written.
    pub updated_at: DateTime<Utc>,
}

/// Which schemas to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveFilter {
    /// Every schema.
    #[default]
    All,
    /// Schemas that are not archived.
    Active,
    /// Archived schemas only.
    Archived,
}

impl ArchiveFilter {
    const fn accepts(self, archived: bool) -> bool {
        match self {
            Self::All => true,
            Self::Active => !archived,
            Self::Archived => archived,
        }
    }
}

/// The kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A schema was created.
    Create,
    /// A schema's name, payload or flag was rewritten.
    Update,
    /// A schema was archived.
    Archive,
    /// A schema was restored from the archive.
    Unarchive,
    /// A schema was deleted.
    Delete,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
            Self::Delete => "delete",
        })
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log.
    pub sequence: u64,
    /// The schema changed.
    pub schema_id: Uuid,
    /// The schema's name at the time.
    pub name: String,
    /// What happened.
    pub action: AuditAction,
    /// Who did it, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// When it happened.
    pub created_at: DateTime<Utc>,
    /// Extra data. For deletions, the payload that was removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// The latest audit entry of one schema, with the schema's current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditSummary {
    /// The latest entry.
    pub entry: AuditEntry,
    /// Whether the schema is archived, or `None` if it no longer exists.
    pub archived: Option<bool>,
}

/// Storage for named schemas.
pub trait SchemaStore {
    /// Creates a schema, or updates the one that already has this name.
    ///
    /// `archived = None` keeps the current flag of an existing schema, and
    /// creates new schemas unarchived.
    ///
    /// # Errors
    ///
    /// Fails if the name is blank, the payload is not an object, or the
    /// change cannot be persisted.
    fn save(
        &mut self,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError>;

    /// Rewrites the schema `id`.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not exist, the name is blank or used by
    /// another schema, the payload is not an object, or the change cannot be
    /// persisted.
    fn update(
        &mut self,
        id: Uuid,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError>;

    /// Returns the schema `id`.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not exist.
    fn get(&self, id: Uuid) -> Result<StoredSchema, StoreError>;

    /// Returns the schema called `name`, ignoring case.
    fn find(&self, name: &str) -> Option<StoredSchema>;

    /// Archives or restores the schema `id`.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not exist or the change cannot be persisted.
    fn set_archived(
        &mut self,
        id: Uuid,
        archived: bool,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError>;

    /// Deletes the schema `id`, keeping its payload in the audit log.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not exist or the change cannot be persisted.
    fn delete(&mut self, id: Uuid, actor: Option<&str>) -> Result<(), StoreError>;

    /// Lists schemas, most recently written first.
    fn list(&self, filter: ArchiveFilter) -> Vec<SchemaSummary>;

    /// The audit log of schema `id`, newest first.
    fn history(&self, id: Uuid) -> Vec<AuditEntry>;

    /// The latest audit entry of every schema ever recorded, newest first.
    fn audit_summaries(&self) -> Vec<AuditSummary>;
}

/// An in-memory [`SchemaStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    schemas: BTreeMap<Uuid, StoredSchema>,
    audit: Vec<AuditEntry>,
    revision: u64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously persisted schemas and audit entries.
    pub fn from_parts(
        schemas: impl IntoIterator<Item = StoredSchema>,
        audit: impl IntoIterator<Item = AuditEntry>,
    ) -> Self {
        let schemas: BTreeMap<_, _> = schemas
            .into_iter()
            .map(|schema| (schema.id, schema))
            .collect();
        let mut audit: Vec<_> = audit.into_iter().collect();
        audit.sort_by_key(|entry| entry.sequence);

        let revision = schemas
            .values()
            .map(|schema| schema.revision)
            .chain(audit.iter().map(|entry| entry.sequence))
            .max()
            .unwrap_or_default();

        Self {
            schemas,
            audit,
            revision,
        }
    }

    /// Number of audit entries recorded so far.
    #[must_use]
    pub fn audit_len(&self) -> usize {
        self.audit.len()
    }

    /// Audit entries from position `start` onwards, oldest first.
    #[must_use]
    pub fn audit_since(&self, start: usize) -> &[AuditEntry] {
        self.audit.get(start..).unwrap_or_default()
    }

    /// Number of stored schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    const fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn record(
        &mut self,
        schema_id: Uuid,
        name: &SchemaName,
        action: AuditAction,
        actor: Option<&str>,
        extra: Option<Value>,
    ) {
        let sequence = self.next_revision();
        debug!(%schema_id, %action, "audit");
        self.audit.push(AuditEntry {
            sequence,
            schema_id,
            name: name.to_string(),
            action,
            actor: actor.map(str::to_string),
            created_at: Utc::now(),
            extra,
        });
    }

    fn find_id(&self, name: &SchemaName) -> Option<Uuid> {
        self.schemas
            .values()
            .find(|schema| schema.name.matches(name))
            .map(|schema| schema.id)
    }

    fn create(
        &mut self,
        name: SchemaName,
        payload: Value,
        archived: bool,
        actor: Option<&str>,
    ) -> StoredSchema {
        let now = Utc::now();
        let schema = StoredSchema {
            id: Uuid::new_v4(),
            name,
            payload,
            archived,
            created_at: now,
            updated_at: now,
            revision: self.next_revision(),
        };
        self.record(schema.id, &schema.name, AuditAction::Create, actor, None);
        self.schemas.insert(schema.id, schema.clone());
        schema
    }

    fn rewrite(
        &mut self,
        id: Uuid,
        name: SchemaName,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        if self.find_id(&name).is_some_and(|other| other != id) {
            return Err(StoreError::NameTaken(name));
        }
        let revision = self.next_revision();
        let schema = self.schemas.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        schema.name = name;
        schema.payload = payload;
        schema.archived = archived.unwrap_or(schema.archived);
        schema.updated_at = Utc::now();
        schema.revision = revision;
        let schema = schema.clone();

        self.record(id, &schema.name, AuditAction::Update, actor, None);
        Ok(schema)
    }
}

fn validate(name: &str, payload: &Value) -> Result<SchemaName, StoreError> {
    let name = SchemaName::new(name)?;
    if !payload.is_object() {
        return Err(StoreError::InvalidPayload);
    }
    Ok(name)
}

impl SchemaStore for MemoryStore {
    #[instrument(level = "debug", skip(self, payload))]
    fn save(
        &mut self,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        let name = validate(name, &payload)?;
        match self.find_id(&name) {
            Some(id) => self.rewrite(id, name, payload, archived, actor),
            None => Ok(self.create(name, payload, archived.unwrap_or_default(), actor)),
        }
    }

    #[instrument(level = "debug", skip(self, payload))]
    fn update(
        &mut self,
        id: Uuid,
        name: &str,
        payload: Value,
        archived: Option<bool>,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        let name = validate(name, &payload)?;
        if !self.schemas.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.rewrite(id, name, payload, archived, actor)
    }

    fn get(&self, id: Uuid) -> Result<StoredSchema, StoreError> {
        self.schemas.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn find(&self, name: &str) -> Option<StoredSchema> {
        let name = SchemaName::new(name).ok()?;
        self.find_id(&name).and_then(|id| self.schemas.get(&id).cloned())
    }

    #[instrument(level = "debug", skip(self))]
    fn set_archived(
        &mut self,
        id: Uuid,
        archived: bool,
        actor: Option<&str>,
    ) -> Result<StoredSchema, StoreError> {
        let revision = self.next_revision();
        let schema = self.schemas.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        schema.archived = archived;
        schema.updated_at = Utc::now();
        schema.revision = revision;
        let schema = schema.clone();

        let action = if archived {
            AuditAction::Archive
        } else {
            AuditAction::Unarchive
        };
        self.record(id, &schema.name, action, actor, None);
        Ok(schema)
    }

    #[instrument(level = "debug", skip(self))]
    fn delete(&mut self, id: Uuid, actor: Option<&str>) -> Result<(), StoreError> {
        let schema = self.schemas.remove(&id).ok_or(StoreError::NotFound(id))?;
        let extra = json!({ "payload": schema.payload });
        self.record(id, &schema.name, AuditAction::Delete, actor, Some(extra));
        Ok(())
    }

    fn list(&self, filter: ArchiveFilter) -> Vec<SchemaSummary> {
        let mut schemas: Vec<_> = self
            .schemas
            .values()
            .filter(|schema| filter.accepts(schema.archived))
            .collect();
        schemas.sort_by_key(|schema| Reverse((schema.updated_at, schema.revision)));
        schemas.into_iter().map(StoredSchema::summary).collect()
    }

    fn history(&self, id: Uuid) -> Vec<AuditEntry> {
        self.audit
            .iter()
            .rev()
            .filter(|entry| entry.schema_id == id)
            .cloned()
            .collect()
    }

    fn audit_summaries(&self) -> Vec<AuditSummary> {
        let mut seen = BTreeSet::new();
        self.audit
            .iter()
            .rev()
            .filter(|entry| seen.insert(entry.schema_id))
            .map(|entry| AuditSummary {
                entry: entry.clone(),
                archived: self.schemas.get(&entry.schema_id).map(|schema| schema.archived),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(marker: u32) -> Value {
        json!({ "ruleSets": {}, "marker": marker })
    }

    #[test]
    fn names_are_trimmed_and_must_not_be_blank() {
        assert_eq!(SchemaName::new("  base ").unwrap().as_str(), "base");
        assert!(SchemaName::new("   ").is_err());
    }

    #[test]
    fn names_honour_column_width() {
        let name = SchemaName::new("base").unwrap();
        assert_eq!(format!("[{name:<6}]"), "[base  ]");
    }

    #[test]
    fn save_creates_then_updates_by_name() {
        let mut store = MemoryStore::new();

        let created = store.save("Base", payload(1), None, Some("alice")).unwrap();
        let updated = store.save("base", payload(2), None, Some("bob")).unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(created.id).unwrap().payload, payload(2));

        let actions: Vec<_> = store
            .history(created.id)
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::Update, AuditAction::Create]);
    }

    #[test]
    fn save_without_flag_keeps_archive_state() {
        let mut store = MemoryStore::new();
        let schema = store.save("base", payload(1), Some(true), None).unwrap();

        let saved = store.save("base", payload(2), None, None).unwrap();

        assert!(saved.archived);
        assert!(store.get(schema.id).unwrap().archived);
    }

    #[test]
    fn payload_must_be_an_object() {
        let mut store = MemoryStore::new();
        let error = store.save("base", json!([1, 2]), None, None).unwrap_err();
        assert!(matches!(error, StoreError::InvalidPayload));
    }

    #[test]
    fn update_rejects_a_name_held_by_another_schema() {
        let mut store = MemoryStore::new();
        store.save("first", payload(1), None, None).unwrap();
        let second = store.save("second", payload(2), None, None).unwrap();

        let error = store
            .update(second.id, "FIRST", payload(3), None, None)
            .unwrap_err();

        assert!(matches!(error, StoreError::NameTaken(_)));
    }

    #[test]
    fn update_of_missing_schema_fails() {
        let mut store = MemoryStore::new();
        let error = store
            .update(Uuid::new_v4(), "ghost", payload(1), None, None)
            .unwrap_err();
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[test]
    fn list_filters_and_orders_by_last_write() {
        let mut store = MemoryStore::new();
        let first = store.save("first", payload(1), None, None).unwrap();
        let second = store.save("second", payload(2), None, None).unwrap();
        store.set_archived(second.id, true, None).unwrap();
        store.save("first", payload(3), None, None).unwrap();

        let all: Vec<_> = store
            .list(ArchiveFilter::All)
            .into_iter()
            .map(|summary| summary.id)
            .collect();
        assert_eq!(all, vec![first.id, second.id]);

        let archived = store.list(ArchiveFilter::Archived);
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, second.id);

        let active = store.list(ArchiveFilter::Active);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }

    #[test]
    fn archive_and_restore_are_audited() {
        let mut store = MemoryStore::new();
        let schema = store.save("base", payload(1), None, None).unwrap();

        store.set_archived(schema.id, true, Some("alice")).unwrap();
        store.set_archived(schema.id, false, Some("alice")).unwrap();

        let history = store.history(schema.id);
        assert_eq!(history[0].action, AuditAction::Unarchive);
        assert_eq!(history[1].action, AuditAction::Archive);
        assert_eq!(history[0].actor.as_deref(), Some("alice"));
    }

    #[test]
    fn delete_keeps_payload_in_audit_log() {
        let mut store = MemoryStore::new();
        let schema = store.save("base", payload(7), None, None).unwrap();

        store.delete(schema.id, Some("carol")).unwrap();

        assert!(store.list(ArchiveFilter::All).is_empty());
        assert!(matches!(store.get(schema.id), Err(StoreError::NotFound(_))));

        let latest = &store.history(schema.id)[0];
        assert_eq!(latest.action, AuditAction::Delete);
        assert_eq!(latest.extra, Some(json!({ "payload": payload(7) })));
    }

    #[test]
    fn audit_summaries_hold_latest_entry_per_schema() {
        let mut store = MemoryStore::new();
        let kept = store.save("kept", payload(1), None, None).unwrap();
        let gone = store.save("gone", payload(2), None, None).unwrap();
        store.set_archived(kept.id, true, None).unwrap();
        store.delete(gone.id, None).unwrap();

        let summaries = store.audit_summaries();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].entry.schema_id, gone.id);
        assert_eq!(summaries[0].entry.action, AuditAction::Delete);
        assert_eq!(summaries[0].archived, None);
        assert_eq!(summaries[1].entry.action, AuditAction::Archive);
        assert_eq!(summaries[1].archived, Some(true));
    }

    #[test]
    fn rebuilt_store_continues_the_sequence() {
        let mut store = MemoryStore::new();
        let schema = store.save("base", payload(1), None, None).unwrap();
        let audit = store.audit_since(0).to_vec();

        let mut rebuilt = MemoryStore::from_parts([schema.clone()], audit);
        rebuilt.set_archived(schema.id, true, None).unwrap();

        let history = rebuilt.history(schema.id);
        assert!(history[0].sequence > history[1].sequence);
    }
}
