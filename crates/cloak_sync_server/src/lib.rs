//! # Cloak Sync Server
//!
//! Reference remote authority for Cloak.
//!
//! This crate provides:
//! - Per-stream append-only logs of sealed entries
//! - Sequence-checked appends (the only ordering decision in the system)
//! - Authentication (HMAC-SHA256 tokens)
//!
//! # Architecture
//!
//! The server never sees plaintext. It stores opaque blobs per
//! `(stream, shard)` and accepts an append only at the index equal to the
//! current entry count, so concurrent writers are serialized: the loser is
//! rejected and retries after pulling.
//!
//! # Authentication
//!
//! Authentication is optional:
//!
//! ```rust,ignore
//! use cloak_sync_server::{owner_subject, AuthConfig, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret".to_vec();
//! let config = ServerConfig::default().with_auth(secret.clone());
//!
//! let tokens = TokenValidator::new(AuthConfig::new(secret));
//! let owner = tokens.create_token(&owner_subject("stream-1"))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod log;
mod server;

pub use auth::{owner_subject, writer_subject, AuthConfig, TokenValidator, TOKEN_SIZE};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use log::ServerLog;
pub use server::SyncServer;
