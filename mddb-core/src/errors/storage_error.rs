//! SQLite layer errors.

use super::error_code::{self, MddbErrorCode};

/// Errors produced by the SQLite index layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite: {message}")]
    Sqlite { message: String },

    #[error("invalid table name {table:?}")]
    InvalidTableName { table: String },
}

impl StorageError {
    /// Wrap a driver error message with the `sqlite:` marker.
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::Sqlite {
            message: message.into(),
        }
    }
}

impl MddbErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => error_code::SQLITE,
            Self::InvalidTableName { .. } => error_code::INVALID_FILTER_OPTS,
        }
    }
}
