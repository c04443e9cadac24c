//! Type-erased table definitions and the DDL rendered from them.

use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    /// Declaration order, which is also the column order of generated SQL.
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
}

impl DataType {
    pub fn sql(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
}

impl ColumnConstraint {
    fn sql(self) -> &'static str {
        match self {
            ColumnConstraint::PrimaryKey => "PRIMARY KEY",
            ColumnConstraint::NotNull => "NOT NULL",
            ColumnConstraint::Unique => "UNIQUE",
        }
    }
}

/// Whether an existing table is tolerated when creating tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// `CREATE TABLE IF NOT EXISTS`
    #[default]
    IfNotExists,
    /// `CREATE TABLE`, failing when the table is already there.
    Strict,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Comma separated column list in declaration order.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn create_table_sql(&self, mode: CreateMode) -> String {
        let columns = self
            .columns
            .iter()
            .map(ColumnDefinition::ddl)
            .collect::<Vec<_>>()
            .join(", ");
        let prefix = match mode {
            CreateMode::IfNotExists => "CREATE TABLE IF NOT EXISTS",
            CreateMode::Strict => "CREATE TABLE",
        };
        format!("{prefix} {}({columns})", self.name)
    }
}

impl ColumnDefinition {
    fn ddl(&self) -> String {
        let mut out = format!("{} {}", self.name, self.data_type);
        for constraint in &self.constraints {
            out.push(' ');
            out.push_str(constraint.sql());
        }
        out
    }
}

/// Names are spliced into SQL text, so only plain identifiers are allowed.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
