#![allow(dead_code)]

use rust_sqlite_records::{Database, JournalMode, Record, SqliteConfig, TableBuilder};
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TestTable {
    pub id: i64,
    pub string: String,
    pub uuid: Uuid,
    pub uuid_indirect: Uuid,
}

impl TestTable {
    pub fn new(id: i64, string: &str) -> Self {
        Self {
            id,
            string: string.to_string(),
            uuid: Uuid::new_v4(),
            uuid_indirect: Uuid::new_v4(),
        }
    }
}

impl Record for TestTable {
    fn table() -> TableBuilder<Self> {
        TableBuilder::<Self>::new("test1")
            .field("id", |r| &r.id, |r| &mut r.id)
            .field("string", |r| &r.string, |r| &mut r.string)
            .field("uuid", |r| &r.uuid, |r| &mut r.uuid)
            .getter("uuid_indirect", |r: &TestTable| r.uuid_indirect)
            .setter("uuid_indirect", |r: &mut TestTable, v: Uuid| r.uuid_indirect = v)
            .primary_key("id")
    }
}

/// Optional columns and a rowid-assigned key.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Note {
    pub id: Option<i64>,
    pub author: String,
    pub body: Option<String>,
}

impl Record for Note {
    fn table() -> TableBuilder<Self> {
        TableBuilder::<Self>::new("notes")
            .field("id", |n| &n.id, |n| &mut n.id)
            .field("author", |n| &n.author, |n| &mut n.author)
            .field("body", |n| &n.body, |n| &mut n.body)
            .primary_key("id")
    }
}

pub fn config_in(dir: &TempDir) -> SqliteConfig {
    SqliteConfig::new(dir.path().join("testdb.db"))
}

// Helper function to create a temporary file-based database
pub fn create_temp_db() -> anyhow::Result<(Database, TempDir)> {
    let dir = tempfile::tempdir()?;
    let db = open(config_in(&dir))?;
    Ok((db, dir))
}

pub fn create_temp_db_with(mode: JournalMode) -> anyhow::Result<(Database, TempDir)> {
    let dir = tempfile::tempdir()?;
    let db = open(config_in(&dir).with_journal_mode(mode))?;
    Ok((db, dir))
}

pub fn open(config: SqliteConfig) -> anyhow::Result<Database> {
    Ok(Database::builder(config)
        .table::<TestTable>()
        .table::<Note>()
        .open()?)
}
