//! Error types for Cloak core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the local log, row store and keyring.
#[derive(Debug, Error)]
pub enum CoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Input rejected by the row store.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// A row with this id already exists.
    #[error("id collision in table {table}: {id}")]
    IdCollision {
        /// Table name.
        table: String,
        /// The colliding id.
        id: String,
    },

    /// An update tried to change a row id.
    #[error("row ids are immutable")]
    IdImmutable,

    /// A shift asked for more entries than the pending partition holds.
    #[error("cannot shift {requested} entries: exceeds size {size}")]
    ShiftExceedsSize {
        /// Number of entries requested.
        requested: u64,
        /// Current pending size.
        size: u64,
    },

    /// Attempted to rewrite an entry of the saved partition.
    #[error("saved entries are immutable")]
    ImmutableHistory,

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption or authentication failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A padded block could not be unframed.
    #[error("invalid padding: {message}")]
    InvalidPadding {
        /// Description of the malformed frame.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid padding error.
    pub fn invalid_padding(message: impl Into<String>) -> Self {
        Self::InvalidPadding {
            message: message.into(),
        }
    }

    /// Returns true for cryptographic failures.
    ///
    /// These must abort the enclosing operation; they never mean "empty".
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            CoreError::EncryptionFailed { .. }
                | CoreError::DecryptionFailed { .. }
                | CoreError::InvalidKeySize { .. }
                | CoreError::KeyDerivationFailed { .. }
        )
    }
}
