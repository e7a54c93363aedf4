//! # Cloak Core
//!
//! Local storage primitives for Cloak.
//!
//! This crate provides:
//! - A shared SQLite database handle
//! - The dual-partition stream log (pending / saved)
//! - A string-valued row store with additive migrations
//! - An immutable query builder
//! - Keyrings (AES-256-GCM) and block padding
//!
//! ## Key Invariants
//!
//! - Sequence numbers within a partition are contiguous and never reused
//! - Entries only move from pending to saved
//! - Saved entries are never rewritten
//! - Row ids are UUIDs and immutable

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
mod database;
mod error;
mod query;
pub mod stream;
mod table;

pub use crypto::{Keyring, SecretKeyring};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use query::Query;
pub use stream::{LogEntry, Partition, Stream, StreamCache};
pub use table::{is_identifier, Row, Table};
