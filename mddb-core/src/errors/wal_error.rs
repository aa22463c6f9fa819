//! WAL codec and replay errors.

use super::error_code::{self, MddbErrorCode};
use super::store_error::StoreError;

/// Errors produced by the WAL codec and its replay driver.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    /// The footer is structurally valid but the body does not match its
    /// checksum, or a checksummed body decodes to invalid records. The
    /// WAL file is left in place for inspection.
    #[error("wal corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("wal replay failed: {source}")]
    Replay {
        #[source]
        source: Box<StoreError>,
    },

    #[error("wal {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl MddbErrorCode for WalError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Corrupt { .. } => error_code::WAL_CORRUPT,
            Self::Replay { .. } => error_code::WAL_REPLAY,
            Self::Io { .. } => error_code::IO,
        }
    }
}
