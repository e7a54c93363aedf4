//! Row store backing one model kind.
//!
//! Rows are string maps keyed by a UUID `id`. Columns are added on demand:
//! writing a field the table has not seen yet runs `ALTER TABLE ADD COLUMN`
//! and records the column in the `objects` registry, in the same
//! transaction as the write. [`Table::ensure_columns`] adds declared columns
//! ahead of any write.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::query::{quote, Query};
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

const REGISTRY: &str = "
CREATE TABLE IF NOT EXISTS objects (
    table_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (table_name, kind, name)
);
";

/// A stored row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Row id (a UUID).
    pub id: String,
    /// Field values. Absent and NULL are the same.
    pub fields: BTreeMap<String, String>,
}

impl Row {
    /// Creates a row.
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Returns true if `name` is a plain SQL identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_id(id: &str) -> CoreResult<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| CoreError::validation(format!("id is not a UUID: {id:?}")))
}

fn check_field(name: &str) -> CoreResult<()> {
    if name == "id" {
        return Err(CoreError::validation("field name 'id' is reserved"));
    }
    if !is_identifier(name) {
        return Err(CoreError::validation(format!(
            "field name is not an identifier: {name:?}"
        )));
    }
    Ok(())
}

/// One table of rows.
#[derive(Debug, Clone)]
pub struct Table {
    db: Database,
    name: String,
}

impl Table {
    /// Opens a table, creating it and the registry if needed.
    pub fn open(db: Database, name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(CoreError::validation(format!(
                "table name is not an identifier: {name:?}"
            )));
        }
        db.transaction(|tx| {
            tx.execute_batch(REGISTRY)?;
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY)",
                    quote(&name)
                ),
                [],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO objects (table_name, kind, name) VALUES (?1, 'table', ?1)",
                params![name],
            )?;
            Ok(())
        })?;
        Ok(Self { db, name })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a query over this table.
    pub fn query(&self) -> Query {
        Query::new(&self.name)
    }

    /// Returns the known columns, excluding `id`.
    pub fn columns(&self) -> CoreResult<BTreeSet<String>> {
        self.db.with_conn(|conn| self.known_columns(conn))
    }

    fn known_columns(&self, conn: &Connection) -> CoreResult<BTreeSet<String>> {
        let mut stmt =
            conn.prepare("SELECT name FROM objects WHERE table_name = ?1 AND kind = 'column'")?;
        let names = stmt
            .query_map(params![self.name], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    fn migrate<'a>(
        &self,
        conn: &Connection,
        fields: impl IntoIterator<Item = &'a String>,
    ) -> CoreResult<()> {
        let known = self.known_columns(conn)?;
        let missing: BTreeSet<&String> = fields
            .into_iter()
            .filter(|f| !known.contains(*f))
            .collect();
        for field in missing {
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} TEXT",
                    quote(&self.name),
                    quote(field)
                ),
                [],
            )?;
            conn.execute(
                "INSERT INTO objects (table_name, kind, name) VALUES (?1, 'column', ?2)",
                params![self.name, field],
            )?;
            debug!(table = %self.name, column = %field, "added column");
        }
        Ok(())
    }

    /// Adds any of `fields` the table has no column for yet.
    ///
    /// Names are checked before anything is written. A declared column with
    /// no values reads as absent and sorts as NULL.
    pub fn ensure_columns<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a String>,
    ) -> CoreResult<()> {
        let fields: Vec<&String> = fields.into_iter().collect();
        for field in &fields {
            check_field(field)?;
        }
        self.db.transaction(|tx| self.migrate(tx, fields))
    }

    /// Inserts rows.
    ///
    /// Every id and field name is checked before anything is written; the
    /// migration and the inserts share one transaction.
    pub fn create(&self, rows: &[Row]) -> CoreResult<()> {
        for row in rows {
            check_id(&row.id)?;
            for field in row.fields.keys() {
                check_field(field)?;
            }
        }

        self.db.transaction(|tx| {
            self.migrate(tx, rows.iter().flat_map(|r| r.fields.keys()))?;
            for row in rows {
                let mut columns = vec![quote("id")];
                let mut values = vec![&row.id];
                for (field, value) in &row.fields {
                    columns.push(quote(field));
                    values.push(value);
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote(&self.name),
                    columns.join(", "),
                    placeholders
                );
                match tx.execute(&sql, params_from_iter(values)) {
                    Ok(_) => {}
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        return Err(CoreError::IdCollision {
                            table: self.name.clone(),
                            id: row.id.clone(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }

    /// Sets fields on every row in `ids`.
    ///
    /// Ids that do not exist are skipped.
    pub fn update(&self, ids: &[String], delta: &BTreeMap<String, String>) -> CoreResult<()> {
        if delta.contains_key("id") {
            return Err(CoreError::IdImmutable);
        }
        for field in delta.keys() {
            check_field(field)?;
        }
        if delta.is_empty() || ids.is_empty() {
            return Ok(());
        }

        self.db.transaction(|tx| {
            self.migrate(tx, delta.keys())?;
            let assignments: Vec<String> =
                delta.keys().map(|f| format!("{} = ?", quote(f))).collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                quote(&self.name),
                assignments.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                stmt.execute(params_from_iter(delta.values().chain(std::iter::once(id))))?;
            }
            Ok(())
        })
    }

    /// Clears fields on every row in `ids`.
    ///
    /// Unknown columns are ignored; a column that was never written is
    /// already absent.
    pub fn unset(&self, ids: &[String], fields: &[String]) -> CoreResult<()> {
        if fields.iter().any(|f| f == "id") {
            return Err(CoreError::IdImmutable);
        }
        self.db.transaction(|tx| {
            let known = self.known_columns(tx)?;
            let targets: Vec<String> = fields
                .iter()
                .filter(|f| known.contains(*f))
                .map(|f| format!("{} = NULL", quote(f)))
                .collect();
            if targets.is_empty() {
                return Ok(());
            }
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?1",
                quote(&self.name),
                targets.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                stmt.execute(params![id])?;
            }
            Ok(())
        })
    }

    /// Deletes rows. Missing ids are a no-op.
    pub fn remove(&self, ids: &[String]) -> CoreResult<()> {
        self.db.transaction(|tx| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", quote(&self.name));
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                stmt.execute(params![id])?;
            }
            Ok(())
        })
    }

    /// Looks up one row.
    pub fn get(&self, id: &str) -> CoreResult<Option<Row>> {
        let query = self.query().where_eq("id", id);
        Ok(self.fetch(&query)?.into_iter().next())
    }

    /// Returns every row.
    pub fn all(&self) -> CoreResult<Vec<Row>> {
        self.fetch(&self.query())
    }

    /// Runs a query built for this table.
    pub fn fetch(&self, query: &Query) -> CoreResult<Vec<Row>> {
        if query.table() != self.name {
            return Err(CoreError::validation(format!(
                "query targets {:?}, not {:?}",
                query.table(),
                self.name
            )));
        }
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&query.sql())?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let rows = stmt
                .query_map(params_from_iter(query.params()), |sql_row| {
                    let mut row = Row::default();
                    for (i, name) in names.iter().enumerate() {
                        let value: Option<String> = sql_row.get(i)?;
                        match (name.as_str(), value) {
                            ("id", Some(id)) => row.id = id,
                            (_, Some(value)) => {
                                row.fields.insert(name.clone(), value);
                            }
                            (_, None) => {}
                        }
                    }
                    Ok(row)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
