//! Tables of the registered models.

use crate::error::{SyncError, SyncResult};
use crate::model::Model;
use cloak_core::{is_identifier, CoreError, Database, Table};
use std::collections::HashMap;

/// Maps model kinds to their tables.
///
/// Actions name their model by kind; replaying or rebasing an action looks
/// its table up here.
#[derive(Debug, Clone)]
pub struct Registry {
    db: Database,
    tables: HashMap<String, Table>,
}

impl Registry {
    /// Creates an empty registry over a database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tables: HashMap::new(),
        }
    }

    /// Registers a model, opening its table and adding a column for every
    /// field its shape declares.
    ///
    /// A shape field named `id`, or one that is not a plain identifier, is
    /// rejected before anything is written. Registering the same model twice
    /// is a no-op.
    pub fn register<M: Model>(&mut self) -> SyncResult<()> {
        let keys: Vec<String> = M::shape().keys().map(String::from).collect();
        if let Some(bad) = keys.iter().find(|k| *k == "id" || !is_identifier(k)) {
            return Err(CoreError::validation(format!(
                "model {:?} declares an unusable field name: {bad:?}",
                M::KIND
            ))
            .into());
        }

        let table = match self.tables.get(M::KIND) {
            Some(table) => table.clone(),
            None => Table::open(self.db.clone(), M::KIND)?,
        };
        table.ensure_columns(&keys)?;
        self.tables.insert(M::KIND.to_string(), table);
        Ok(())
    }

    /// Returns the table for a model kind.
    pub fn table(&self, kind: &str) -> SyncResult<&Table> {
        self.tables
            .get(kind)
            .ok_or_else(|| SyncError::UnknownModel(kind.to_string()))
    }

    /// Returns the table for a model.
    pub fn table_of<M: Model>(&self) -> SyncResult<&Table> {
        self.table(M::KIND)
    }

    /// Returns true if the kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.tables.contains_key(kind)
    }
}
