//! Connection settings supplied by the hosting application.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::CreateMode;

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Readers are not blocked by an open write transaction.
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite database configuration.
///
/// `db_path` must name a file: every session opens its own connection
/// to it, which an in-memory database cannot share.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    #[serde(default)]
    pub create_mode: CreateMode,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            create_mode: CreateMode::default(),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn with_create_mode(mut self, mode: CreateMode) -> Self {
        self.create_mode = mode;
        self
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    pub fn with_busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open a new autocommit connection with these settings applied.
    pub(crate) fn connect(&self) -> Result<Connection> {
        let path = self.path();
        info!(path = %path.display(), "connecting sqlite database");
        let failed = |source: rusqlite::Error| Error::connection(format!("cannot open {}", path.display()), source);

        let conn = Connection::open_with_flags(path, OpenFlags::default()).map_err(failed)?;
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .map_err(failed)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", self.journal_mode.pragma_value(), |row| {
                row.get(0)
            })
            .map_err(failed)?;
        debug!(path = %path.display(), journal_mode = %mode, "connection ready");
        Ok(conn)
    }
}
