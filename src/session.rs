//! Transactional sessions.
//!
//! A [`Session`] owns a private connection with an open transaction.
//! Its writes stay invisible to other connections until
//! [`Session::commit`]. Dropping a session that was never committed
//! rolls the transaction back and closes the connection.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::query::Query;
use crate::record::Record;
use crate::registry::SchemaRegistry;

/// Lifecycle of a session's transaction. `Open` is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        })
    }
}

/// Roll back an open transaction on `conn` and mark it so. Failures are
/// logged; the transaction is dead either way.
pub(crate) fn abort(conn: &Connection, state: &Cell<TransactionState>) {
    if state.get() != TransactionState::Open {
        return;
    }
    state.set(TransactionState::RolledBack);
    match conn.execute_batch("ROLLBACK") {
        Ok(()) => info!("transaction rolled back"),
        Err(e) => warn!(error = %e, "rollback failed"),
    }
}

pub struct Session {
    conn: Option<Connection>,
    state: Cell<TransactionState>,
    registry: Arc<SchemaRegistry>,
}

impl Session {
    /// Start a transaction on a freshly opened connection.
    pub(crate) fn begin(conn: Connection, registry: Arc<SchemaRegistry>) -> Result<Self> {
        conn.execute_batch("BEGIN")
            .map_err(|e| Error::connection("cannot begin transaction", e))?;
        info!("transaction started");
        Ok(Self {
            conn: Some(conn),
            state: Cell::new(TransactionState::Open),
            registry,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// A query over a registered record type, running on this session's
    /// connection.
    pub fn query<R: Record>(&self) -> Result<Query<'_, R>> {
        self.ensure_not(TransactionState::RolledBack, "start queries")?;
        let table = self.registry.registered::<R>()?;
        Ok(Query::new(self.connection()?, Some(&self.state), table))
    }

    /// Make every write of this session visible. A failed commit rolls
    /// the transaction back. Afterwards the connection runs in
    /// autocommit mode.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open("commit")?;
        let conn = self.connection()?;
        match conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.state.set(TransactionState::Committed);
                info!("transaction committed");
                Ok(())
            }
            Err(e) => {
                abort(conn, &self.state);
                Err(Error::engine("COMMIT", e))
            }
        }
    }

    /// Discard every write of this session.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_open("roll back")?;
        let conn = self.connection()?;
        let result = conn.execute_batch("ROLLBACK");
        self.state.set(TransactionState::RolledBack);
        result.map_err(|e| Error::engine("ROLLBACK", e))?;
        info!("transaction rolled back");
        Ok(())
    }

    /// Roll back if still open, then close the connection, reporting
    /// failures that `Drop` can only log.
    pub fn close(mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => finish(conn, &self.state),
            None => Ok(()),
        }
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| Error::Connection {
            message: "session connection is closed".to_string(),
            source: None,
        })
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.state.get() {
            TransactionState::Open => Ok(()),
            state => Err(Error::Session { state, operation }),
        }
    }

    fn ensure_not(&self, forbidden: TransactionState, operation: &'static str) -> Result<()> {
        if self.state.get() == forbidden {
            return Err(Error::Session {
                state: forbidden,
                operation,
            });
        }
        Ok(())
    }
}

fn finish(conn: Connection, state: &Cell<TransactionState>) -> Result<()> {
    abort(&conn, state);
    conn.close()
        .map_err(|(_, e)| Error::connection("cannot close session connection", e))?;
    info!("session connection closed");
    Ok(())
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = finish(conn, &self.state) {
                warn!(error = %e, "session cleanup failed");
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.get())
            .field("connected", &self.conn.is_some())
            .finish()
    }
}
