//! Values exchanged with SQLite and the conversions between them and
//! record fields.

use std::fmt;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use uuid::Uuid;

use crate::schema::DataType;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Short name of the storage class, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Copy a borrowed engine value. Text that is not valid UTF-8 is rejected.
    pub fn from_ref(value: ValueRef<'_>) -> Result<Self, TypeMismatch> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => Value::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| TypeMismatch::new("TEXT", "invalid UTF-8 text"))?,
            ),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// A value did not have the shape a column's native type requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub expected: &'static str,
    pub found: String,
}

impl TypeMismatch {
    pub fn new(expected: &'static str, found: impl Into<String>) -> Self {
        Self {
            expected,
            found: found.into(),
        }
    }

    fn of(expected: &'static str, value: &Value) -> Self {
        Self::new(expected, value.kind())
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for TypeMismatch {}

/// A Rust type that can be stored in a single column.
///
/// `to_value` must be total; `from_value` accepts exactly what
/// `to_value` produces, so the pair round-trips.
pub trait ColumnValue: Sized {
    /// Storage class used when rendering `CREATE TABLE`.
    const DATA_TYPE: DataType;
    /// Whether the column accepts NULL.
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, TypeMismatch>;
}

impl ColumnValue for i64 {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(TypeMismatch::of("INTEGER", &other)),
        }
    }
}

impl ColumnValue for i32 {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Integer(i) => i32::try_from(i)
                .map_err(|_| TypeMismatch::new("32-bit INTEGER", i.to_string())),
            other => Err(TypeMismatch::of("INTEGER", &other)),
        }
    }
}

impl ColumnValue for f64 {
    const DATA_TYPE: DataType = DataType::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    // SQLite hands back whole-number reals as integers when the column
    // affinity allows it.
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => Err(TypeMismatch::of("REAL", &other)),
        }
    }
}

impl ColumnValue for bool {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(i) => Err(TypeMismatch::new("0 or 1", i.to_string())),
            other => Err(TypeMismatch::of("INTEGER", &other)),
        }
    }
}

impl ColumnValue for String {
    const DATA_TYPE: DataType = DataType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(TypeMismatch::of("TEXT", &other)),
        }
    }
}

impl ColumnValue for Vec<u8> {
    const DATA_TYPE: DataType = DataType::Blob;

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(TypeMismatch::of("BLOB", &other)),
        }
    }
}

/// UUIDs are stored as their canonical hyphenated text.
impl ColumnValue for Uuid {
    const DATA_TYPE: DataType = DataType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Text(s) => Uuid::parse_str(&s).map_err(|_| TypeMismatch::new("UUID text", s)),
            other => Err(TypeMismatch::of("TEXT", &other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Store a `Display + FromStr` type (typically a field-less enum) as TEXT.
///
/// ```ignore
/// text_value!(Rank);
/// ```
#[macro_export]
macro_rules! text_value {
    ($ty:ty) => {
        impl $crate::ColumnValue for $ty {
            const DATA_TYPE: $crate::DataType = $crate::DataType::Text;

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Text(self.to_string())
            }

            fn from_value(value: $crate::Value) -> Result<Self, $crate::TypeMismatch> {
                match value {
                    $crate::Value::Text(s) => s
                        .parse::<$ty>()
                        .map_err(|_| $crate::TypeMismatch::new(stringify!($ty), s)),
                    other => Err($crate::TypeMismatch::new("TEXT", other.kind())),
                }
            }
        }

        impl From<$ty> for $crate::Value {
            fn from(value: $ty) -> Self {
                $crate::ColumnValue::to_value(&value)
            }
        }
    };
}

macro_rules! value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    value.to_value()
                }
            }
        )*
    };
}

value_from!(i64, i32, f64, bool, String, Vec<u8>, Uuid);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Re-shape `value` the way a column of type `N` stores it.
pub(crate) fn normalize<N: ColumnValue>(value: Value) -> Result<Value, TypeMismatch> {
    N::from_value(value).map(|native| native.to_value())
}
