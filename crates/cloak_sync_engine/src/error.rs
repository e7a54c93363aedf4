//! Error types for the sync engine.

use crate::model::FieldErrors;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while writing to or syncing a store.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local storage or crypto error.
    #[error("core error: {0}")]
    Core(#[from] cloak_core::CoreError),

    /// An action failed model validation.
    #[error("invalid {kind}: {errors:?}")]
    Validation {
        /// Action kind, e.g. `"todo.create"`.
        kind: String,
        /// One entry per object or target id.
        errors: Vec<FieldErrors>,
    },

    /// The remote rejected an append at the wrong index.
    #[error("sequence conflict: expected index {expected}, got {actual}")]
    SequenceConflict {
        /// Index the remote expected (its entry count).
        expected: u64,
        /// Index the client submitted.
        actual: u64,
    },

    /// The remote has no entry at this index.
    #[error("no remote entry at index {index}")]
    NotFound {
        /// Requested index.
        index: u64,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Not connected.
    #[error("not connected to remote")]
    NotConnected,

    /// The remote refused the proof or token.
    #[error("not authorized")]
    Unauthorized,

    /// Decoded an action for a model that was never registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Action encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if calling `sync` again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected | SyncError::SequenceConflict { .. } => true,
            _ => false,
        }
    }

    /// Returns true for a remote ordering conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::SequenceConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_core::CoreError;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Unauthorized.is_retryable());
        assert!(!SyncError::from(CoreError::decryption_failed("tag")).is_retryable());
    }

    #[test]
    fn conflicts() {
        let err = SyncError::SequenceConflict {
            expected: 4,
            actual: 3,
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "sequence conflict: expected index 4, got 3"
        );
        assert!(!SyncError::NotFound { index: 2 }.is_conflict());
    }
}
