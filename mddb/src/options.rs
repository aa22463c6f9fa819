//! Store configuration: the closed option set.

use std::time::Duration;

use mddb_core::config::{Durability, ParseOptions, SqlSchema};
use mddb_core::errors::StorageError;
use rusqlite::Transaction;

use crate::reindex::ReindexStats;

/// Derivation of a relative path or short id from a document id.
pub type DeriveFn = fn(&str) -> String;

/// Hook invoked per put/delete inside the owning SQL transaction.
pub type RowHook = Box<dyn Fn(&Transaction<'_>, &str) -> Result<(), StorageError> + Send + Sync>;

/// Hook invoked after the schema is dropped and recreated, inside the
/// reindex transaction. Auxiliary tables live and die here.
pub type SchemaHook = Box<dyn Fn(&Transaction<'_>) -> Result<(), StorageError> + Send + Sync>;

/// Hook invoked after each bulk-upsert batch during a full reindex.
pub type BulkHook =
    Box<dyn Fn(&Transaction<'_>, &[String]) -> Result<(), StorageError> + Send + Sync>;

/// Hook invoked with the final counts of an incremental reindex.
pub type IncrementalHook =
    Box<dyn Fn(&Transaction<'_>, &ReindexStats) -> Result<(), StorageError> + Send + Sync>;

fn default_rel_path(id: &str) -> String {
    format!("{id}.md")
}

fn default_short_id(id: &str) -> String {
    id.to_string()
}

/// Options for [`crate::Store::open`]. All hooks run inside the SQL
/// transaction of the phase they are named after and must be
/// idempotent: a replayed WAL runs them again.
pub struct StoreOptions {
    /// Index table name; must match `^[a-z_]+$`.
    pub table: String,
    /// User columns and indexes appended after the base layout.
    pub schema: SqlSchema,
    /// Maps id to the relative path of its file.
    pub rel_path_from_id: DeriveFn,
    /// Maps id to its short id.
    pub short_id_from_id: DeriveFn,
    pub parse: ParseOptions,
    pub lock_timeout: Duration,
    pub durability: Durability,
    pub after_put: Option<RowHook>,
    pub after_delete: Option<RowHook>,
    pub after_recreate_schema: Option<SchemaHook>,
    pub after_bulk_index: Option<BulkHook>,
    pub after_incremental_index: Option<IncrementalHook>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table: "documents".to_string(),
            schema: SqlSchema::default(),
            rel_path_from_id: default_rel_path,
            short_id_from_id: default_short_id,
            parse: ParseOptions::default(),
            lock_timeout: Duration::from_secs(10),
            durability: Durability::default(),
            after_put: None,
            after_delete: None,
            after_recreate_schema: None,
            after_bulk_index: None,
            after_incremental_index: None,
        }
    }
}
