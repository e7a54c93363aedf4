//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Append at an index other than the current entry count.
    #[error("sequence conflict: expected index {expected}, got {actual}")]
    SequenceConflict {
        /// Current entry count.
        expected: u64,
        /// Index from client.
        actual: u64,
    },

    /// The stream was never created.
    #[error("stream not found: {stream}/{shard}")]
    StreamNotFound {
        /// Stream id.
        stream: String,
        /// Shard name.
        shard: String,
    },

    /// The stream already exists.
    #[error("stream already exists: {stream}/{shard}")]
    StreamExists {
        /// Stream id.
        stream: String,
        /// Shard name.
        shard: String,
    },

    /// No entry at this index.
    #[error("entry not found at index {index}")]
    EntryNotFound {
        /// Requested index.
        index: u64,
    },

    /// Entry exceeds the configured size limit.
    #[error("entry of {size} bytes exceeds limit of {limit}")]
    EntryTooLarge {
        /// Entry size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Authorization failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::SequenceConflict { .. }
                | ServerError::StreamNotFound { .. }
                | ServerError::StreamExists { .. }
                | ServerError::EntryNotFound { .. }
                | ServerError::EntryTooLarge { .. }
                | ServerError::NotAuthorized(_)
                | ServerError::InvalidRequest(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }
}
