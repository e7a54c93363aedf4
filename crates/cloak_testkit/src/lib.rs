//! # Cloak Testkit
//!
//! Test utilities for Cloak.
//!
//! This crate provides:
//! - Test fixtures: temporary databases, seeded keyrings, filled streams
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cloak_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         let table = Table::open(db.clone(), "notes")?;
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
