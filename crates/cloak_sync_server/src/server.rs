//! Main sync server.

use crate::auth::{owner_subject, writer_subject, AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::log::ServerLog;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The remote authority.
///
/// Holds one append-only log per `(stream, shard)` and serves the four
/// requests a client store makes: create a stream, read its entry count,
/// read one entry, and append one entry at an expected index.
///
/// # Example
///
/// ```
/// use cloak_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// server.handle_create(b"", "stream-1", "actions")?;
/// server.handle_put_entry("stream-1", "actions", 0, b"sealed".to_vec(), b"")?;
/// assert_eq!(server.handle_get_index("stream-1", "actions")?, 1);
/// # Ok::<(), cloak_sync_server::ServerError>(())
/// ```
#[derive(Debug)]
pub struct SyncServer {
    config: ServerConfig,
    log: Arc<ServerLog>,
    validator: Option<TokenValidator>,
}

impl SyncServer {
    /// Creates a server with an empty log.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_log(config, Arc::new(ServerLog::new()))
    }

    /// Creates a server over an existing log.
    pub fn with_log(config: ServerConfig, log: Arc<ServerLog>) -> Self {
        let validator = config.auth_secret.clone().map(|secret| {
            TokenValidator::new(AuthConfig::new(secret).with_expiry(config.token_expiry))
        });
        Self {
            config,
            log,
            validator,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the log.
    pub fn log(&self) -> &Arc<ServerLog> {
        &self.log
    }

    fn authorize(&self, token: &[u8], subject: &str) -> ServerResult<()> {
        if !self.config.require_auth {
            return Ok(());
        }
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| ServerError::NotAuthorized("no auth secret configured".into()))?;
        validator.validate_token(token, subject).map_err(|e| {
            warn!(subject, error = %e, "rejected token");
            e
        })
    }

    /// Handles a stream creation request.
    ///
    /// `owner_token` must be valid for [`owner_subject`] when authentication
    /// is required.
    pub fn handle_create(&self, owner_token: &[u8], stream: &str, shard: &str) -> ServerResult<()> {
        check_name(stream)?;
        check_name(shard)?;
        self.authorize(owner_token, &owner_subject(stream))?;
        self.log.create(stream, shard)?;
        info!(stream, shard, "created stream");
        Ok(())
    }

    /// Handles an entry count request.
    pub fn handle_get_index(&self, stream: &str, shard: &str) -> ServerResult<u64> {
        Ok(self.log.index(stream, shard))
    }

    /// Handles an entry request.
    pub fn handle_get_entry(&self, stream: &str, shard: &str, index: u64) -> ServerResult<Vec<u8>> {
        self.log.entry(stream, shard, index)
    }

    /// Handles an append request.
    ///
    /// `token` must be valid for [`writer_subject`] when authentication is
    /// required. Returns the new entry count.
    pub fn handle_put_entry(
        &self,
        stream: &str,
        shard: &str,
        index: u64,
        blob: Vec<u8>,
        token: &[u8],
    ) -> ServerResult<u64> {
        self.authorize(token, &writer_subject(stream, shard))?;
        if blob.len() > self.config.max_entry_size {
            return Err(ServerError::EntryTooLarge {
                size: blob.len(),
                limit: self.config.max_entry_size,
            });
        }
        match self.log.append(stream, shard, index, blob) {
            Ok(count) => {
                debug!(stream, shard, index, "appended entry");
                Ok(count)
            }
            Err(e) => {
                warn!(stream, shard, index, error = %e, "rejected append");
                Err(e)
            }
        }
    }
}

fn check_name(name: &str) -> ServerResult<()> {
    if name.is_empty() {
        return Err(ServerError::InvalidRequest("empty stream or shard name".into()));
    }
    Ok(())
}
