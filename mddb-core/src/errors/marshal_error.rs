//! Frontmatter marshal errors.

use super::error_code::{self, MddbErrorCode};

/// Errors produced while serialising a frontmatter map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("empty key")]
    EmptyKey,

    #[error("invalid key {key:?}")]
    InvalidKey { key: String },

    #[error("key {key:?} is reserved")]
    ReservedKey { key: String },

    #[error("no value for ordered key {key:?}")]
    MissingOrderedKey { key: String },

    #[error("key {key:?} listed twice in explicit order")]
    DuplicateOrderKey { key: String },

    #[error("empty object for key {key:?}")]
    EmptyObject { key: String },

    #[error("unsupported nested value under key {key:?}")]
    UnsupportedNesting { key: String },
}

impl MddbErrorCode for MarshalError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyKey | Self::InvalidKey { .. } | Self::ReservedKey { .. } => {
                error_code::INVALID_KEY
            }
            Self::MissingOrderedKey { .. } | Self::DuplicateOrderKey { .. } => {
                error_code::INVALID_FILTER_OPTS
            }
            Self::EmptyObject { .. } | Self::UnsupportedNesting { .. } => error_code::INVALID_KEY,
        }
    }
}
