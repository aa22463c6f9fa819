//! mddb: an embedded document store whose source of truth is a
//! directory of Markdown files with YAML frontmatter.
//!
//! A SQLite database beside the files is a derived, throwaway index;
//! a footer-validated WAL keeps files and index mutually consistent
//! under crashes and concurrent access. One writer at a time, any
//! number of readers, across threads and processes.
//!
//! ```no_run
//! use mddb::{CancellationToken, Store, StoreOptions};
//! use mddb::{Document, DocumentParts, FrontmatterMap, StoreError};
//!
//! struct Note {
//!     id: String,
//!     title: String,
//!     frontmatter: FrontmatterMap,
//!     body: String,
//! }
//!
//! impl Document for Note {
//!     fn id(&self) -> &str { &self.id }
//!     fn title(&self) -> &str { &self.title }
//!     fn frontmatter(&self) -> &FrontmatterMap { &self.frontmatter }
//!     fn body(&self) -> &str { &self.body }
//!     fn from_parts(parts: DocumentParts) -> Result<Self, StoreError> {
//!         Ok(Note {
//!             id: parts.id,
//!             title: parts.title,
//!             frontmatter: parts.frontmatter,
//!             body: parts.body,
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<(), StoreError> {
//! let store: Store<Note> = Store::open("./notes", StoreOptions::default())?;
//! let token = CancellationToken::new();
//! let mut txn = store.begin(&token)?;
//! txn.create(&Note {
//!     id: "01HZA".into(),
//!     title: "Buy milk".into(),
//!     frontmatter: FrontmatterMap::new(),
//!     body: String::new(),
//! })?;
//! txn.commit(&token)?;
//! # Ok(())
//! # }
//! ```

mod apply;
mod lock;
mod options;
mod reindex;
mod store;
mod txn;
pub mod wal;

pub use options::{BulkHook, DeriveFn, IncrementalHook, RowHook, SchemaHook, StoreOptions};
pub use reindex::ReindexStats;
pub use store::{Store, META_DIR};
pub use txn::Transaction;

pub use mddb_core::cancel::CancellationToken;
pub use mddb_core::config::{Durability, ParseOptions, SqlColumn, SqlIndex, SqlSchema, SqlType};
pub use mddb_core::document::{
    Document, DocumentParts, DocumentSummary, FieldValue, FrontmatterMap, SqlValue,
};
pub use mddb_core::errors::{
    error_code, MddbErrorCode, ScanIssue, StorageError, StoreError, StoreResult,
};
