//! Record persistence over SQLite for plugin-style applications.
//!
//! # Intention
//!
//! - Map application record types to tables without hand-written SQL
//!   for the common operations (select, count, insert, update, delete).
//! - Keep SQLite-specific logic, types, and error handling in one place.
//! - Offer isolated transactional sessions next to the shared
//!   autocommit connection.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - Plugin lifecycle, configuration loading and bundled SQL files are
//!   the hosting application's concern.
//! - No joins, migrations or connection pooling.

pub mod config;
pub mod database;
pub mod error;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;
pub mod session;
pub mod value;

pub use config::{JournalMode, SqliteConfig};
pub use database::{Database, DatabaseBuilder};
pub use error::{Error, Result, RowCount};
pub use query::{Comparator, Query};
pub use record::{ColumnDescriptor, Record, TableBuilder, TableStructure};
pub use registry::SchemaRegistry;
pub use schema::{ColumnConstraint, ColumnDefinition, CreateMode, DataType, TableDefinition};
pub use session::{Session, TransactionState};
pub use value::{ColumnValue, TypeMismatch, Value};
