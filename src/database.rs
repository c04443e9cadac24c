//! The database handle: shared autocommit connection, registered tables,
//! ad-hoc statements and the factory for transactional sessions.

use std::sync::Arc;

use rusqlite::{Connection, Rows, Statement};
use tracing::{debug, info};

use crate::config::SqliteConfig;
use crate::error::{Error, Result};
use crate::query::{prepare, Query};
use crate::record::Record;
use crate::registry::SchemaRegistry;
use crate::schema::TableDefinition;
use crate::session::{Session, TransactionState};
use crate::value::Value;

type Registration = fn(&SchemaRegistry) -> Result<TableDefinition>;

/// Collects the record types whose tables must exist once the database
/// is open.
pub struct DatabaseBuilder {
    config: SqliteConfig,
    tables: Vec<Registration>,
}

impl DatabaseBuilder {
    pub fn table<R: Record>(mut self) -> Self {
        self.tables.push(SchemaRegistry::register::<R>);
        self
    }

    /// Connect and create every declared table. Any failure aborts the open.
    pub fn open(self) -> Result<Database> {
        let db = Database::open(self.config)?;
        for register in self.tables {
            let definition = register(&db.registry)?;
            db.create_table(&definition)?;
        }
        Ok(db)
    }
}

pub struct Database {
    config: SqliteConfig,
    connection: Connection,
    registry: Arc<SchemaRegistry>,
}

impl Database {
    pub fn builder(config: SqliteConfig) -> DatabaseBuilder {
        DatabaseBuilder {
            config,
            tables: Vec::new(),
        }
    }

    /// Connect without registering any table.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let connection = config.connect()?;
        Ok(Self {
            config,
            connection,
            registry: Arc::new(SchemaRegistry::new()),
        })
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Register `R` and create its table.
    pub fn register<R: Record>(&self) -> Result<()> {
        let definition = self.registry.register::<R>()?;
        self.create_table(&definition)
    }

    pub fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        if definition.name.is_empty() || definition.columns.is_empty() {
            return Err(Error::schema(&definition.name, "table definition has no name or no columns"));
        }
        if let Some(pk) = &definition.primary_key {
            if !definition.has_column(pk) {
                return Err(Error::schema(&definition.name, format!("primary key `{pk}` is not a column")));
            }
        }
        let sql = definition.create_table_sql(self.config.create_mode);
        debug!(sql = %sql, "creating table");
        self.connection
            .execute_batch(&sql)
            .map_err(|e| Error::connection(format!("cannot create table {}", definition.name), e))?;
        info!(table = %definition.name, "table ready");
        Ok(())
    }

    /// Substitute `{{key}}` placeholders, then bind `params` by position.
    ///
    /// Replacement text is spliced in verbatim and never escaped: only
    /// pass trusted identifiers through `replacements`.
    pub fn build_statement(
        &self,
        template: &str,
        replacements: &[(&str, &str)],
        params: &[Value],
    ) -> Result<Statement<'_>> {
        self.rendered(template, replacements, params).map(|(_, stmt)| stmt)
    }

    /// Run an ad-hoc statement, returning the number of changed rows.
    pub fn execute(&self, template: &str, replacements: &[(&str, &str)], params: &[Value]) -> Result<usize> {
        let (sql, mut stmt) = self.rendered(template, replacements, params)?;
        stmt.raw_execute().map_err(|e| Error::engine(&sql, e))
    }

    /// Run an ad-hoc query and marshal the rows into `R`.
    pub fn query_as<R: Record>(
        &self,
        template: &str,
        replacements: &[(&str, &str)],
        params: &[Value],
    ) -> Result<Vec<R>> {
        let mut stmt = self.build_statement(template, replacements, params)?;
        self.row_to_objects(stmt.raw_query())
    }

    /// Marshal every remaining row of `rows` into a new `R`. `R` does not
    /// need to be registered; columns are matched by name.
    pub fn row_to_objects<R: Record>(&self, mut rows: Rows<'_>) -> Result<Vec<R>> {
        let structure = self.registry.structure_for::<R>()?;
        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::engine(&format!("rows of {}", structure.name()), e))?
        {
            records.push(structure.from_row(row)?);
        }
        Ok(records)
    }

    fn rendered(
        &self,
        template: &str,
        replacements: &[(&str, &str)],
        params: &[Value],
    ) -> Result<(String, Statement<'_>)> {
        let sql = render_template(template, replacements);
        debug!(sql = %sql, "building statement");
        let stmt = prepare(&self.connection, &sql, params)?;
        Ok((sql, stmt))
    }

    /// A query over the shared connection.
    pub fn query<R: Record>(&self) -> Result<Query<'_, R>> {
        let table = self.registry.registered::<R>()?;
        Ok(Query::new(&self.connection, None, table))
    }

    /// Open a session on a new connection to the same database.
    pub fn begin(&self) -> Result<Session> {
        let conn = self.config.connect()?;
        Session::begin(conn, Arc::clone(&self.registry))
    }

    /// Run `f` in a session, committing when it returns `Ok`. An `Err` or a
    /// panic leaves the session uncommitted, so it is rolled back.
    ///
    /// `f` may commit on its own; the result is then `Ok` as well. A
    /// session that `f` rolled back (explicitly or through a failed
    /// statement) yields `Error::Session` even when `f` returned `Ok`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T>,
    {
        let session = self.begin()?;
        let value = f(&session)?;
        match session.state() {
            TransactionState::Open => session.commit()?,
            TransactionState::Committed => {}
            state @ TransactionState::RolledBack => {
                return Err(Error::Session {
                    state,
                    operation: "commit",
                })
            }
        }
        session.close()?;
        Ok(value)
    }

    /// Close the shared connection. Open sessions are not affected.
    pub fn close(self) -> Result<()> {
        let path = self.config.path().display().to_string();
        self.connection
            .close()
            .map_err(|(_, e)| Error::connection(format!("cannot close {path}"), e))?;
        info!(path = %path, "database closed");
        Ok(())
    }
}

/// Literal `{{key}}` substitution.
pub(crate) fn render_template(template: &str, replacements: &[(&str, &str)]) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |sql, (key, value)| {
            sql.replace(&format!("{{{{{key}}}}}"), value)
        })
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("tables", &self.registry.tables().len())
            .finish_non_exhaustive()
    }
}
