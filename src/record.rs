//! Record types and their column-descriptor tables.
//!
//! A record type lists its columns once, in [`Record::table`], as a
//! sequence of typed accessors. [`TableBuilder::build`] validates that
//! list and erases the native types into a [`TableStructure`].

use std::any::TypeId;
use std::collections::HashMap;

use rusqlite::Row;

use crate::error::{Error, Result};
use crate::schema::{is_identifier, ColumnConstraint, ColumnDefinition, DataType, TableDefinition};
use crate::value::{normalize, ColumnValue, TypeMismatch, Value};

/// An application type persisted as rows of one table.
///
/// Name the record type on the builder (`TableBuilder::<Self>::new`);
/// the column closures cannot infer it from the return type.
///
/// ```
/// use rust_sqlite_records::{Record, TableBuilder};
///
/// #[derive(Default)]
/// struct Player {
///     id: i64,
///     name: String,
/// }
///
/// impl Record for Player {
///     fn table() -> TableBuilder<Self> {
///         TableBuilder::<Self>::new("players")
///             .field("id", |p| &p.id, |p| &mut p.id)
///             .field("name", |p| &p.name, |p| &mut p.name)
///             .primary_key("id")
///     }
/// }
/// ```
pub trait Record: Default + 'static {
    fn table() -> TableBuilder<Self>;
}

type Reader<R> = Box<dyn Fn(&R) -> Value + Send + Sync>;
type Writer<R> = Box<dyn Fn(&mut R, Value) -> Result<(), TypeMismatch> + Send + Sync>;
type Normalizer = fn(Value) -> Result<Value, TypeMismatch>;

/// One column of a record type: how to read it, write it and coerce
/// predicate values into its stored shape.
pub struct ColumnDescriptor<R> {
    definition: ColumnDefinition,
    read: Reader<R>,
    write: Writer<R>,
    normalize: Normalizer,
}

impl<R> ColumnDescriptor<R> {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn data_type(&self) -> DataType {
        self.definition.data_type
    }

    /// The SQL value for this column of `record`.
    pub fn read(&self, record: &R) -> Value {
        (self.read)(record)
    }

    pub fn write(&self, record: &mut R, value: Value) -> Result<()> {
        (self.write)(record, value).map_err(|mismatch| Error::marshal(self.name(), mismatch))
    }

    /// Coerce an arbitrary value through this column's native type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        (self.normalize)(value).map_err(|mismatch| Error::marshal(self.name(), mismatch))
    }
}

impl<R> std::fmt::Debug for ColumnDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Validated, immutable mapping between a record type and its table.
#[derive(Debug)]
pub struct TableStructure<R> {
    definition: TableDefinition,
    columns: Vec<ColumnDescriptor<R>>,
    index: HashMap<String, usize>,
}

impl<R: Record> TableStructure<R> {
    /// Derive the structure from `R`'s declaration.
    pub fn derive() -> Result<Self> {
        R::table().build()
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn columns(&self) -> &[ColumnDescriptor<R>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor<R>> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Like [`TableStructure::column`], failing with `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> Result<&ColumnDescriptor<R>> {
        self.column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.name().to_string(),
            column: name.to_string(),
        })
    }

    pub fn column_list(&self) -> String {
        self.definition.column_list()
    }

    /// Values of every column of `record`, in declaration order.
    pub fn to_row(&self, record: &R) -> Vec<Value> {
        self.columns.iter().map(|c| c.read(record)).collect()
    }

    /// Build a fresh record from a result row, looking columns up by name.
    pub fn from_row(&self, row: &Row<'_>) -> Result<R> {
        let mut record = R::default();
        for column in &self.columns {
            let raw = row
                .get_ref(column.name())
                .map_err(|e| Error::marshal(column.name(), TypeMismatch::new("column in result", e.to_string())))?;
            let value = Value::from_ref(raw).map_err(|mismatch| Error::marshal(column.name(), mismatch))?;
            column.write(&mut record, value)?;
        }
        Ok(record)
    }
}

struct PendingColumn<R> {
    name: String,
    data_type: DataType,
    nullable: bool,
    native: TypeId,
    read: Option<Reader<R>>,
    write: Option<Writer<R>>,
    normalize: Normalizer,
}

/// Declares the columns of a record type.
///
/// Errors are collected while declaring and reported by [`build`](Self::build).
pub struct TableBuilder<R> {
    name: String,
    pending: Vec<PendingColumn<R>>,
    primary_keys: Vec<String>,
    unique: Vec<String>,
    problems: Vec<String>,
}

impl<R: Record> TableBuilder<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Vec::new(),
            primary_keys: Vec::new(),
            unique: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// A column backed directly by a struct field.
    pub fn field<N, G, M>(mut self, name: &str, get: G, get_mut: M) -> Self
    where
        N: ColumnValue + 'static,
        G: Fn(&R) -> &N + Send + Sync + 'static,
        M: Fn(&mut R) -> &mut N + Send + Sync + 'static,
    {
        if self.position(name).is_some() {
            self.problems.push(format!("column `{name}` declared twice"));
            return self;
        }
        let mut column = Self::pending_column::<N>(name);
        column.read = Some(Box::new(move |record: &R| get(record).to_value()));
        column.write = Some(Box::new(move |record: &mut R, value: Value| {
            *get_mut(record) = N::from_value(value)?;
            Ok(())
        }));
        self.pending.push(column);
        self
    }

    /// The reading half of an accessor-pair column.
    pub fn getter<N, G>(mut self, name: &str, get: G) -> Self
    where
        N: ColumnValue + 'static,
        G: Fn(&R) -> N + Send + Sync + 'static,
    {
        let reader: Reader<R> = Box::new(move |record: &R| get(record).to_value());
        let duplicate = match self.half::<N>(name) {
            Some(column) if column.read.is_none() => {
                column.read = Some(reader);
                false
            }
            Some(_) => true,
            None => false,
        };
        if duplicate {
            self.problems.push(format!("getter for `{name}` declared twice"));
        }
        self
    }

    /// The writing half of an accessor-pair column.
    pub fn setter<N, S>(mut self, name: &str, set: S) -> Self
    where
        N: ColumnValue + 'static,
        S: Fn(&mut R, N) + Send + Sync + 'static,
    {
        let writer: Writer<R> = Box::new(move |record: &mut R, value: Value| {
            set(record, N::from_value(value)?);
            Ok(())
        });
        let duplicate = match self.half::<N>(name) {
            Some(column) if column.write.is_none() => {
                column.write = Some(writer);
                false
            }
            Some(_) => true,
            None => false,
        };
        if duplicate {
            self.problems.push(format!("setter for `{name}` declared twice"));
        }
        self
    }

    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_keys.push(name.to_string());
        self
    }

    pub fn unique(mut self, name: &str) -> Self {
        self.unique.push(name.to_string());
        self
    }

    pub fn build(self) -> Result<TableStructure<R>> {
        let table = self.name;
        if table.is_empty() {
            return Err(Error::schema(std::any::type_name::<R>(), "record type declares no table name"));
        }
        if !is_identifier(&table) {
            return Err(Error::schema(&table, "table name is not a plain identifier"));
        }
        if let Some(problem) = self.problems.into_iter().next() {
            return Err(Error::schema(&table, problem));
        }
        if self.pending.is_empty() {
            return Err(Error::schema(&table, "record type declares no columns"));
        }
        if self.primary_keys.len() > 1 {
            return Err(Error::schema(&table, "more than one primary key declared"));
        }
        let primary_key = self.primary_keys.into_iter().next();

        let mut columns = Vec::with_capacity(self.pending.len());
        let mut index = HashMap::new();
        for column in self.pending {
            if !is_identifier(&column.name) {
                return Err(Error::schema(
                    &table,
                    format!("column name `{}` is not a plain identifier", column.name),
                ));
            }
            let (read, write) = match (column.read, column.write) {
                (Some(read), Some(write)) => (read, write),
                (Some(_), None) => {
                    return Err(Error::schema(&table, format!("column `{}` has a getter but no setter", column.name)))
                }
                (None, _) => {
                    return Err(Error::schema(&table, format!("column `{}` has a setter but no getter", column.name)))
                }
            };

            let mut constraints = Vec::new();
            if primary_key.as_deref() == Some(column.name.as_str()) {
                constraints.push(ColumnConstraint::PrimaryKey);
            } else if !column.nullable {
                constraints.push(ColumnConstraint::NotNull);
            }
            if self.unique.contains(&column.name) {
                constraints.push(ColumnConstraint::Unique);
            }

            index.insert(column.name.clone(), columns.len());
            columns.push(ColumnDescriptor {
                definition: ColumnDefinition {
                    name: column.name,
                    data_type: column.data_type,
                    constraints,
                },
                read,
                write,
                normalize: column.normalize,
            });
        }

        for name in primary_key.iter().chain(self.unique.iter()) {
            if !index.contains_key(name) {
                return Err(Error::schema(&table, format!("constraint on undeclared column `{name}`")));
            }
        }

        Ok(TableStructure {
            definition: TableDefinition {
                name: table,
                columns: columns.iter().map(|c| c.definition.clone()).collect(),
                primary_key,
            },
            columns,
            index,
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.pending.iter().position(|c| c.name == name)
    }

    fn pending_column<N: ColumnValue + 'static>(name: &str) -> PendingColumn<R> {
        PendingColumn {
            name: name.to_string(),
            data_type: N::DATA_TYPE,
            nullable: N::NULLABLE,
            native: TypeId::of::<N>(),
            read: None,
            write: None,
            normalize: normalize::<N>,
        }
    }

    /// The pending accessor-pair column `name`, created on first use.
    /// Returns `None` after recording a problem.
    fn half<N: ColumnValue + 'static>(&mut self, name: &str) -> Option<&mut PendingColumn<R>> {
        let at = match self.position(name) {
            Some(at) => at,
            None => {
                self.pending.push(Self::pending_column::<N>(name));
                self.pending.len() - 1
            }
        };
        if self.pending[at].native != TypeId::of::<N>() {
            self.problems
                .push(format!("getter and setter of `{name}` disagree on the column type"));
            return None;
        }
        Some(&mut self.pending[at])
    }
}
