//! Token authentication for the sync server.
//!
//! Tokens are HMAC-SHA256 signatures binding a subject (a stream owner or
//! a stream writer) to an issue time.
//!
//! ## Token Format
//!
//! - 8 bytes: timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 over `subject || timestamp`
//!
//! Total: 40 bytes.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_SIZE: usize = 8;
const SIGNATURE_SIZE: usize = 32;
/// Size of a token in bytes.
pub const TOKEN_SIZE: usize = TIMESTAMP_SIZE + SIGNATURE_SIZE;

/// Subject that may create a stream.
pub fn owner_subject(stream: &str) -> String {
    format!("owner:{stream}")
}

/// Subject that may append to a stream shard.
pub fn writer_subject(stream: &str, shard: &str) -> String {
    format!("{stream}/{shard}")
}

/// Token signing settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC key.
    pub secret: Vec<u8>,
    /// How long a token stays valid after issue.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates settings with a 24 hour token lifetime.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token lifetime.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Issues and checks tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for a subject, stamped with the current time.
    pub fn create_token(&self, subject: &str) -> ServerResult<Vec<u8>> {
        let timestamp = now_millis().to_be_bytes();
        let signature = self.sign(subject, &timestamp)?;

        let mut token = Vec::with_capacity(TOKEN_SIZE);
        token.extend_from_slice(&timestamp);
        token.extend_from_slice(&signature);
        Ok(token)
    }

    /// Validates a token for a subject.
    pub fn validate_token(&self, token: &[u8], subject: &str) -> ServerResult<()> {
        if token.len() != TOKEN_SIZE {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }
        let (timestamp_bytes, signature) = token.split_at(TIMESTAMP_SIZE);

        self.mac(subject, timestamp_bytes)?
            .verify_slice(signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let mut stamp = [0u8; TIMESTAMP_SIZE];
        stamp.copy_from_slice(timestamp_bytes);
        let timestamp = u64::from_be_bytes(stamp);
        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now_millis() > timestamp.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(())
    }

    fn mac(&self, subject: &str, timestamp: &[u8]) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(subject.as_bytes());
        mac.update(timestamp);
        Ok(mac)
    }

    fn sign(&self, subject: &str, timestamp: &[u8]) -> ServerResult<[u8; SIGNATURE_SIZE]> {
        Ok(self.mac(subject, timestamp)?.finalize().into_bytes().into())
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("secret", &"[REDACTED]")
            .field("token_expiry", &self.config.token_expiry)
            .finish()
    }
}
