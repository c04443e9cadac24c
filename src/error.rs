//! Error types for record persistence.
//!
//! Every failure surfaces as one [`Error`]. Engine failures keep the
//! underlying [`rusqlite::Error`] as their source.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::session::TransactionState;
use crate::value::TypeMismatch;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed record description, or a record type that was never registered.
    #[error("schema error for table `{table}`: {message}")]
    Schema { table: String, message: String },

    #[error("unknown column `{column}` in table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A value could not be converted between its Rust and SQL representation.
    #[error("cannot convert column `{column}`: {mismatch}")]
    Marshal {
        column: String,
        mismatch: TypeMismatch,
    },

    #[error("constraint violated by `{sql}`")]
    Constraint {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("expected exactly one row from `{table}`, found {found}")]
    NotUnique { table: String, found: RowCount },

    #[error("query failed: `{sql}`")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unsupported comparator `{0}`")]
    Comparator(String),

    #[error("session is {state}, cannot {operation}")]
    Session {
        state: TransactionState,
        operation: &'static str,
    },
}

/// How many rows a uniqueness check actually saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    None,
    Many,
}

impl std::fmt::Display for RowCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowCount::None => f.write_str("no rows"),
            RowCount::Many => f.write_str("more than one row"),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    pub(crate) fn connection(message: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn marshal(column: impl Into<String>, mismatch: TypeMismatch) -> Self {
        Self::Marshal {
            column: column.into(),
            mismatch,
        }
    }

    /// Classify an engine failure raised while running `sql`.
    pub(crate) fn engine(sql: &str, source: rusqlite::Error) -> Self {
        let sql = sql.to_string();
        match source.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Constraint { sql, source },
            _ => Self::Query { sql, source },
        }
    }

    /// True when the engine rejected the statement on a constraint.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}
