//! Schema storage.
//!
//! Schemas are JSON payloads. [`payload`] converts between payloads and the
//! rule engine's model, [`store`] holds named schemas with an audit trail, and
//! [`directory`] persists a store to disk.

pub mod directory;
pub mod payload;
pub mod store;

pub use directory::{Directory, Loaded, Unloaded};
pub use payload::{PayloadError, Schema, parse_payload_text};
pub use store::{
    ArchiveFilter, AuditAction, AuditEntry, AuditSummary, InvalidNameError, MemoryStore,
    SchemaName, SchemaStore, SchemaSummary, StoreError, StoredSchema,
};
