//! Immutable SQL query builder over one table.
//!
//! Each builder method returns a new query and leaves the receiver
//! untouched, so partially built queries can be shared and extended.
//!
//! ```
//! use cloak_core::Query;
//!
//! let base = Query::new("tasks").where_eq("status", "open");
//! let q = base.order("title");
//! assert_eq!(
//!     q.sql(),
//!     r#"SELECT * FROM "tasks" WHERE ("status" = ?) ORDER BY title"#
//! );
//! assert_eq!(q.params(), ["open"]);
//! ```

/// A `SELECT *` query with conjunctive filters and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    terms: Vec<String>,
    params: Vec<String>,
    orders: Vec<String>,
}

impl Query {
    /// Starts a query over `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            terms: Vec::new(),
            params: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Adds an equality filter on a column.
    pub fn where_eq(&self, field: &str, value: impl Into<String>) -> Self {
        self.where_raw(format!("{} = ?", quote(field)), [value.into()])
    }

    /// Adds a raw SQL term with positional (`?`) parameters.
    pub fn where_raw<I, S>(&self, term: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.terms.push(term.into());
        next.params.extend(params.into_iter().map(Into::into));
        next
    }

    /// Appends an ordering term.
    pub fn order(&self, term: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.orders.push(term.into());
        next
    }

    /// Compiles the query.
    pub fn sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", quote(&self.table));
        if !self.terms.is_empty() {
            let terms: Vec<String> = self.terms.iter().map(|t| format!("({t})")).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&terms.join(" AND "));
        }
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        sql
    }

    /// Returns the bound parameters in placeholder order.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// Quotes an SQL identifier.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
