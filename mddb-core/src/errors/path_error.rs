//! Relative-path validation errors.

use super::error_code::{self, MddbErrorCode};

/// Errors produced by the path guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("absolute path {path:?}")]
    Absolute { path: String },

    #[error("path {path:?} escapes the base directory")]
    Escapes { path: String },

    #[error("path {path:?} is not in cleaned form")]
    NotCleaned { path: String },

    #[error("path {path:?} does not end in .md")]
    NotMarkdown { path: String },

    #[error("doc {id}: derived path {derived:?} does not match stored path {actual:?}")]
    DerivationMismatch {
        id: String,
        derived: String,
        actual: String,
    },
}

impl MddbErrorCode for PathError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => error_code::EMPTY_PATH,
            _ => error_code::INVALID_PATH,
        }
    }
}
