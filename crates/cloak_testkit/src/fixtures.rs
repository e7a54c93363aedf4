//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases, keyrings
//! and pre-filled streams.

use cloak_core::{Database, Partition, SecretKeyring, Stream, StreamCache};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    path: Option<PathBuf>,
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.sqlite");
        let db = Database::open(&path).expect("Failed to open file database");
        Self {
            db,
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Opens a second, independent connection to the same file.
    ///
    /// Returns None for in-memory databases.
    pub fn reopen(&self) -> Option<Database> {
        self.path
            .as_ref()
            .map(|p| Database::open(p).expect("Failed to reopen file database"))
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```
/// use cloak_testkit::with_temp_db;
/// use cloak_core::Table;
///
/// with_temp_db(|db| {
///     let table = Table::open(db.clone(), "notes").unwrap();
///     assert!(table.all().unwrap().is_empty());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db
        .path()
        .expect("File database should have a path")
        .to_path_buf();
    f(&test_db.db, &path)
}

/// Returns a keyring derived from a fixed seed.
///
/// Every call with the same `id` yields the same key, which lets separate
/// stores in one test share a stream.
pub fn test_keyring(id: &str) -> SecretKeyring {
    SecretKeyring::from_seed(id, b"cloak-testkit-seed").expect("Failed to derive keyring")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database whose stream holds `saved` and `pending` entries.
    ///
    /// Entry payloads are `"saved-{i}"` and `"pending-{i}"`.
    pub fn populated_stream(saved: usize, pending: usize) -> (TestDatabase, Stream) {
        let test_db = TestDatabase::memory();
        let stream = StreamCache::new(test_db.db.clone())
            .expect("Failed to create stream cache")
            .stream("test-stream", "actions");

        let saved: Vec<String> = (0..saved).map(|i| format!("saved-{i}")).collect();
        let pending: Vec<String> = (0..pending).map(|i| format!("pending-{i}")).collect();
        stream
            .push_all(Partition::Saved, &saved)
            .expect("Failed to push saved entries");
        stream
            .push_all(Partition::Pending, &pending)
            .expect("Failed to push pending entries");

        (test_db, stream)
    }
}
