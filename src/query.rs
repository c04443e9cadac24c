//! Fluent per-table query builder.
//!
//! A [`Query`] accumulates predicates and runs any number of terminal
//! operations against them. Predicates stay in place until
//! [`Query::clear`] is called.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{Connection, Statement};
use tracing::debug;

use crate::error::{Error, Result, RowCount};
use crate::record::{Record, TableStructure};
use crate::session::{self, TransactionState};
use crate::value::Value;

/// Comparison operators accepted in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Text patterns are bound as given on any column; other values are
    /// coerced through the column like every other comparator.
    Like,
}

impl Comparator {
    pub fn sql(self) -> &'static str {
        match self {
            Comparator::Equal => "=",
            Comparator::NotEqual => "!=",
            Comparator::LessThan => "<",
            Comparator::LessThanOrEqual => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanOrEqual => ">=",
            Comparator::Like => " LIKE ",
        }
    }
}

impl FromStr for Comparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "=" | "==" => Comparator::Equal,
            "!=" | "<>" => Comparator::NotEqual,
            "<" => Comparator::LessThan,
            "<=" => Comparator::LessThanOrEqual,
            ">" => Comparator::GreaterThan,
            ">=" => Comparator::GreaterThanOrEqual,
            like if like.eq_ignore_ascii_case("like") => Comparator::Like,
            _ => return Err(Error::Comparator(s.to_string())),
        })
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql().trim())
    }
}

/// Rendered predicate fragments and their bound values, in insertion order.
/// Adding a fragment that is already present replaces its value.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Predicates {
    entries: Vec<(String, Value)>,
}

impl Predicates {
    pub(crate) fn insert(&mut self, fragment: String, value: Value) {
        match self.entries.iter_mut().find(|(f, _)| *f == fragment) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((fragment, value)),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// `""` when empty, otherwise `" WHERE p1 AND p2 ..."`.
    pub(crate) fn where_clause(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let joined = self
            .entries
            .iter()
            .map(|(fragment, _)| fragment.as_str())
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(" WHERE {joined}")
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }
}

/// Prepare `sql` and bind `params` by position. The statement is released
/// when the returned value is dropped.
pub(crate) fn prepare<'c, 'v>(
    conn: &'c Connection,
    sql: &str,
    params: impl IntoIterator<Item = &'v Value>,
) -> Result<Statement<'c>> {
    let mut stmt = conn.prepare(sql).map_err(|e| Error::engine(sql, e))?;
    for (i, value) in params.into_iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, value)
            .map_err(|e| Error::engine(sql, e))?;
    }
    Ok(stmt)
}

/// Query builder bound to one table and one connection.
pub struct Query<'c, R: Record> {
    conn: &'c Connection,
    /// Present when the connection belongs to a [`Session`](crate::Session).
    transaction: Option<&'c Cell<TransactionState>>,
    table: Arc<TableStructure<R>>,
    predicates: Predicates,
}

impl<'c, R: Record> Query<'c, R> {
    pub(crate) fn new(
        conn: &'c Connection,
        transaction: Option<&'c Cell<TransactionState>>,
        table: Arc<TableStructure<R>>,
    ) -> Self {
        Self {
            conn,
            transaction,
            table,
            predicates: Predicates::default(),
        }
    }

    pub fn table(&self) -> &TableStructure<R> {
        &self.table
    }

    /// Number of accumulated predicates.
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.where_cmp(column, Comparator::Equal, value)
    }

    /// Like [`where_cmp`](Self::where_cmp) with the comparator given as text,
    /// e.g. `">="`. Only the operators of [`Comparator`] are accepted.
    pub fn where_op(&mut self, column: &str, comparator: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let comparator = comparator.parse()?;
        self.where_cmp(column, comparator, value)
    }

    /// Add `column <comparator> value`. The value is coerced through the
    /// column's native type before it is stored, except for `LIKE` text
    /// patterns.
    pub fn where_cmp(
        &mut self,
        column: &str,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let descriptor = self.table.require_column(column)?;
        let value = match (comparator, value.into()) {
            (Comparator::Like, pattern @ Value::Text(_)) => pattern,
            (_, value) => descriptor.coerce(value)?,
        };
        self.predicates
            .insert(format!("{column}{}?", comparator.sql()), value);
        Ok(self)
    }

    /// Drop every accumulated predicate.
    pub fn clear(&mut self) -> &mut Self {
        self.predicates.clear();
        self
    }

    pub fn select(&self) -> Result<Vec<R>> {
        self.fetch(None)
    }

    /// The single matching row; `NotUnique` when zero or several rows match.
    pub fn select_unique(&self) -> Result<R> {
        let mut rows = self.fetch(Some(2))?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(self.not_unique(RowCount::None)),
            _ => Err(self.not_unique(RowCount::Many)),
        }
    }

    /// The single matching row, or `None` when zero or several rows match.
    pub fn select_unique_or_none(&self) -> Result<Option<R>> {
        let mut rows = self.fetch(Some(2))?;
        Ok(if rows.len() == 1 { rows.pop() } else { None })
    }

    pub fn count(&self) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS C FROM {}{}",
            self.table.name(),
            self.predicates.where_clause()
        );
        self.run(&sql, self.predicates.values(), |stmt| {
            let mut rows = stmt.raw_query();
            match rows.next().map_err(|e| Error::engine(&sql, e))? {
                Some(row) => row.get::<_, i64>("C").map_err(|e| Error::engine(&sql, e)),
                None => Err(Error::Query {
                    sql: sql.clone(),
                    source: rusqlite::Error::QueryReturnedNoRows,
                }),
            }
        })
    }

    /// Insert `record` as a new row. Predicates are ignored.
    pub fn insert(&self, record: &R) -> Result<()> {
        let columns = self.table.columns();
        let placeholders = vec!["?"; columns.len()].join(",");
        let sql = format!(
            "INSERT INTO {}({}) VALUES({placeholders})",
            self.table.name(),
            self.table.column_list()
        );
        let row = self.table.to_row(record);
        self.run(&sql, &row, |stmt| {
            stmt.raw_execute().map_err(|e| Error::engine(&sql, e))?;
            Ok(())
        })
    }

    /// Write `columns` of `record` (all columns when empty) into every
    /// matching row. Returns the number of rows changed.
    pub fn update(&self, record: &R, columns: &[&str]) -> Result<usize> {
        let targets: Vec<_> = if columns.is_empty() {
            self.table.columns().iter().collect()
        } else {
            columns
                .iter()
                .map(|name| self.table.require_column(name))
                .collect::<Result<_>>()?
        };

        let assignments = targets
            .iter()
            .map(|c| format!("{}=?", c.name()))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "UPDATE {} SET {assignments}{}",
            self.table.name(),
            self.predicates.where_clause()
        );
        let params: Vec<Value> = targets
            .iter()
            .map(|c| c.read(record))
            .chain(self.predicates.values().cloned())
            .collect();
        self.run(&sql, &params, |stmt| {
            stmt.raw_execute().map_err(|e| Error::engine(&sql, e))
        })
    }

    /// Delete every matching row; with no predicates that is the whole table.
    pub fn delete(&self) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {}{}",
            self.table.name(),
            self.predicates.where_clause()
        );
        self.run(&sql, self.predicates.values(), |stmt| {
            stmt.raw_execute().map_err(|e| Error::engine(&sql, e))
        })
    }

    fn fetch(&self, limit: Option<usize>) -> Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {}{}",
            self.table.column_list(),
            self.table.name(),
            self.predicates.where_clause()
        );
        self.run(&sql, self.predicates.values(), |stmt| {
            let mut rows = stmt.raw_query();
            let mut records = Vec::new();
            while let Some(row) = rows.next().map_err(|e| Error::engine(&sql, e))? {
                records.push(self.table.from_row(row)?);
                if limit.is_some_and(|limit| records.len() >= limit) {
                    break;
                }
            }
            Ok(records)
        })
    }

    fn not_unique(&self, found: RowCount) -> Error {
        Error::NotUnique {
            table: self.table.name().to_string(),
            found,
        }
    }

    /// Prepare, bind and hand the statement to `op`. Inside an open
    /// transaction any failure rolls the transaction back.
    fn run<'v, T>(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = &'v Value>,
        op: impl FnOnce(&mut Statement<'_>) -> Result<T>,
    ) -> Result<T> {
        if let Some(state) = self.transaction {
            if state.get() == TransactionState::RolledBack {
                return Err(Error::Session {
                    state: TransactionState::RolledBack,
                    operation: "run statements",
                });
            }
        }
        debug!(table = self.table.name(), sql, "executing statement");
        let result = prepare(self.conn, sql, params).and_then(|mut stmt| op(&mut stmt));
        if let (Err(err), Some(state)) = (&result, self.transaction) {
            if state.get() == TransactionState::Open {
                debug!(error = %err, "statement failed inside transaction");
                session::abort(self.conn, state);
            }
        }
        result
    }
}

impl<R: Record> fmt::Debug for Query<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table.name())
            .field("transactional", &self.transaction.is_some())
            .field("predicates", &self.predicates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparators_are_restricted() {
        assert_eq!(">=".parse::<Comparator>().unwrap(), Comparator::GreaterThanOrEqual);
        assert_eq!("<>".parse::<Comparator>().unwrap(), Comparator::NotEqual);
        assert_eq!("like".parse::<Comparator>().unwrap(), Comparator::Like);
        assert!(matches!(
            " throw ".parse::<Comparator>(),
            Err(Error::Comparator(c)) if c == " throw "
        ));
        assert!("= 1 OR 1".parse::<Comparator>().is_err());
    }

    #[test]
    fn predicates_keep_order_and_replace_duplicates() {
        let mut predicates = Predicates::default();
        assert_eq!(predicates.where_clause(), "");

        predicates.insert("b=?".into(), Value::Integer(1));
        predicates.insert("a>?".into(), Value::Integer(2));
        predicates.insert("b=?".into(), Value::Integer(3));

        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates.where_clause(), " WHERE b=? AND a>?");
        let values: Vec<_> = predicates.values().cloned().collect();
        assert_eq!(values, vec![Value::Integer(3), Value::Integer(2)]);

        predicates.clear();
        assert_eq!(predicates.where_clause(), "");
    }

    #[test]
    fn like_renders_with_spaces() {
        assert_eq!(format!("name{}?", Comparator::Like.sql()), "name LIKE ?");
        assert_eq!(Comparator::Like.to_string(), "LIKE");
    }
}
