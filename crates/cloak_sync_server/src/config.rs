//! Limits and authentication settings for the remote authority.

use std::time::Duration;

/// Settings for a [`SyncServer`](crate::SyncServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted entry in bytes.
    pub max_entry_size: usize,
    /// Reject requests without a valid token.
    pub require_auth: bool,
    /// HMAC key tokens are checked against.
    pub auth_secret: Option<Vec<u8>>,
    /// Token lifetime.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits and no authentication.
    pub fn new() -> Self {
        Self {
            max_entry_size: 1024 * 1024,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the maximum entry size.
    pub fn with_max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Requires tokens signed with `secret`.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_anonymous_access() {
        let config = ServerConfig::default();
        assert_eq!(config.max_entry_size, 1024 * 1024);
        assert!(!config.require_auth);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ServerConfig::new()
            .with_max_entry_size(4096)
            .with_token_expiry(Duration::from_secs(60))
            .with_auth(b"k".to_vec());

        assert_eq!(config.max_entry_size, 4096);
        assert_eq!(config.token_expiry, Duration::from_secs(60));
        assert!(config.require_auth);
        assert_eq!(config.auth_secret.as_deref(), Some(&b"k"[..]));
    }
}
