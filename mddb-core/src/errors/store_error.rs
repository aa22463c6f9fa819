//! The aggregate store error. Subsystem errors compose into this via
//! `From`, and wrapping preserves the chain so callers can classify by
//! code and reach the innermost cause.

use super::error_code::{self, MddbErrorCode};
use super::{LockError, MarshalError, ParseError, PathError, StorageError, WalError};

/// A single file that failed during a reindex scan.
#[derive(Debug, Clone)]
pub struct ScanIssue {
    /// Path relative to the base directory.
    pub path: String,
    pub error: String,
}

/// Errors surfaced by the public store API.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,

    #[error("document not found: {id}")]
    NotFound { id: String },

    #[error("document already exists: {id}")]
    AlreadyExists { id: String },

    #[error("empty document id")]
    EmptyId,

    #[error("doc {id}: empty title")]
    EmptyTitle { id: String },

    #[error("doc {id}: derived path is empty")]
    EmptyPath { id: String },

    #[error("doc {id}: derived short id is empty")]
    EmptyShortId { id: String },

    /// The file at `path` carries a different frontmatter id than the
    /// one it was looked up under.
    #[error("file {path} carries id {actual:?}, expected {expected:?}")]
    IdMismatch {
        expected: String,
        actual: String,
        path: String,
    },

    #[error("invalid filter options: {reason}")]
    InvalidFilterOpts { reason: String },

    #[error("offset {offset} out of bounds (rows: {rows})")]
    OffsetOutOfBounds { offset: usize, rows: usize },

    /// The WAL fsync succeeded but a later phase of the commit did not.
    /// The write is durable and will be rolled forward on the next
    /// read, write, or open.
    #[error("commit incomplete, wal retained for replay: {source}")]
    CommitIncomplete {
        #[source]
        source: Box<StoreError>,
    },

    /// Per-file failures aggregated from a reindex scan.
    #[error("index scan failed for {} file(s)", .issues.len())]
    IndexScan { issues: Vec<ScanIssue> },

    /// Adds document context to an inner error.
    #[error("doc {id} ({path}): {source}")]
    Doc {
        id: String,
        path: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("{op} {path:?}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Wal(#[from] WalError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    /// Wrap with document context. No-op context fields are still
    /// useful to callers, so this is applied even to sentinel errors.
    pub fn with_doc(self, id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Doc {
            id: id.into(),
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// True when the innermost error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        self.error_code() == error_code::NOT_FOUND
    }

    /// True when the innermost error is the closed sentinel.
    pub fn is_closed(&self) -> bool {
        self.error_code() == error_code::CLOSED
    }
}

impl MddbErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => error_code::CLOSED,
            Self::NotFound { .. } => error_code::NOT_FOUND,
            Self::AlreadyExists { .. } => error_code::ALREADY_EXISTS,
            Self::EmptyId => error_code::EMPTY_ID,
            Self::EmptyTitle { .. } => error_code::EMPTY_TITLE,
            Self::EmptyPath { .. } => error_code::EMPTY_PATH,
            Self::EmptyShortId { .. } => error_code::EMPTY_SHORT_ID,
            Self::IdMismatch { .. } => error_code::INVALID_PATH,
            Self::InvalidFilterOpts { .. } => error_code::INVALID_FILTER_OPTS,
            Self::OffsetOutOfBounds { .. } => error_code::OFFSET_OUT_OF_BOUNDS,
            Self::CommitIncomplete { .. } => error_code::COMMIT_INCOMPLETE,
            Self::IndexScan { .. } => error_code::INDEX_SCAN,
            Self::Doc { source, .. } => source.error_code(),
            Self::Io { .. } => error_code::IO,
            Self::Parse(e) => e.error_code(),
            Self::Marshal(e) => e.error_code(),
            Self::Path(e) => e.error_code(),
            Self::Wal(e) => e.error_code(),
            Self::Lock(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
        }
    }
}

/// Convenience alias used across the store crates.
pub type StoreResult<T> = Result<T, StoreError>;
