//! Core types shared by every mddb crate.
//!
//! Holds the document model and its capability trait, the ordered
//! frontmatter map, configuration data, the relative-path guard, the
//! schema fingerprint, cooperative cancellation, and the error tree.

pub mod cancel;
pub mod config;
pub mod document;
pub mod errors;
pub mod fingerprint;
pub mod paths;

pub use cancel::CancellationToken;
pub use config::{Durability, ParseOptions, SqlColumn, SqlIndex, SqlSchema, SqlType};
pub use document::{
    Document, DocumentParts, DocumentSummary, FieldValue, FrontmatterMap, SqlValue,
};
