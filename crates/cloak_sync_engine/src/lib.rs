//! # Cloak Sync Engine
//!
//! Actions, local stores and remote sync for Cloak.
//!
//! This crate provides:
//! - Models and field validation
//! - Create / update actions with exact undo and rebase
//! - The store: sealed log writes, row projection, change notifications
//! - Sync against a remote append-only authority
//!
//! ## Architecture
//!
//! Writes are optimistic. A write becomes an [`Action`], is sealed into the
//! pending partition of the store's log and applied to the rows at once.
//! [`Store::sync`] later reconciles the pending partition with the remote:
//!
//! 1. Undo local history and replay the confirmed part
//! 2. Pull and apply remote entries
//! 3. Rebase pending actions onto the merged rows
//! 4. Push pending entries, one sequence-checked append at a time
//!
//! ## Key Invariants
//!
//! - The remote log alone defines the order of confirmed actions
//! - An entry is shifted to saved only after the remote accepted it
//! - Undo runs newest-first; replay, rebase and push run oldest-first
//! - A pending write always wins over remote changes to the same fields

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod action;
mod changes;
mod config;
mod error;
pub mod model;
mod registry;
mod remote;
mod store;

pub use action::{Action, CreateAction, Priors, UpdateAction};
pub use changes::{ChangeFeed, StreamIndex};
pub use config::StoreConfig;
pub use error::{SyncError, SyncResult};
pub use model::{FieldErrors, Fields, Model, Shape};
pub use registry::Registry;
pub use remote::{MockRemote, RemoteLog};
pub use store::{Store, SyncReport};
