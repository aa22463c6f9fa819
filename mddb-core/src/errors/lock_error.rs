//! Lock coordinator errors.

use super::error_code::{self, MddbErrorCode};

/// Errors produced while acquiring the in-process or cross-process lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The timeout elapsed or the caller's cancellation token fired
    /// before the lock could be acquired.
    #[error("{op} lock: deadline exceeded")]
    DeadlineExceeded { op: &'static str },

    #[error("{op} lock: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl MddbErrorCode for LockError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DeadlineExceeded { .. } => error_code::DEADLINE_EXCEEDED,
            Self::Io { .. } => error_code::IO,
        }
    }
}
