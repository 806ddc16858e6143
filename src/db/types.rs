//! Value and result types for rowbridge.
//!
//! `RawValue`/`RawResultSet` are what a driver hands back; `Value`/`ResultSet`
//! are what crosses the wire after coercion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A transport-safe value.
///
/// Serialized untagged, so rows travel as plain JSON arrays of
/// strings, numbers and nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text value.
    String(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as text, whatever representation it arrived in.
    ///
    /// The agent may send the same logical field as `"1610"` or `1610`
    /// depending on column metadata, so consumers read string fields
    /// through this instead of matching on `Value::String`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.trim_end().to_string()),
        }
    }

    /// Returns the value as an integer if it is one or parses as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a float if it is numeric or parses as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Normalized grouping key: `1`, `1.0` and `"1"` all map to `"1"`.
    ///
    /// Text is only trimmed, never reparsed, so CHAR keys such as `"042"`
    /// and `"42"` stay distinct.
    pub fn key(&self) -> Option<String> {
        match self {
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some((*f as i64).to_string()),
            Value::String(s) => Some(s.trim().to_string()),
            other => other.as_text(),
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// A row of coerced values.
pub type Row = Vec<Value>;

/// Rows returned to the caller, in the wire shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultSet {
    /// Column names in result order.
    pub columns: Vec<String>,

    /// Result rows as arrays.
    pub rows: Vec<Row>,

    /// Number of rows returned.
    pub row_count: usize,
}

impl ResultSet {
    /// Creates a result set, deriving `row_count` from the rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds a column by name, case-insensitively.
    ///
    /// `c.customer_id` matches a result column named `customer_id`, since
    /// drivers usually drop the alias from result metadata.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.rsplit('.').next().unwrap_or(name);
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .or_else(|| {
                self.columns.iter().position(|c| {
                    c.rsplit('.')
                        .next()
                        .is_some_and(|tail| tail.eq_ignore_ascii_case(wanted))
                })
            })
    }

    /// Returns the value of `column` in `row`, if both exist.
    pub fn value<'a>(&'a self, row: &'a Row, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|i| row.get(i))
    }
}

/// Metadata about a column in a driver result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Declared column type as reported by the driver (may be empty).
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// True when the declared type is numeric.
    pub fn is_numeric(&self) -> bool {
        let t = self.data_type.to_uppercase();
        ["INT", "NUM", "DEC", "REAL", "FLOA", "DOUB", "MONEY", "CURRENCY"]
            .iter()
            .any(|needle| t.contains(needle))
    }

    /// True when the declared type is a date type.
    pub fn is_date(&self) -> bool {
        let t = self.data_type.to_uppercase();
        t.contains("DATE") && !t.contains("TIME")
    }
}

/// A value exactly as the driver produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Driver output before coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of raw values.
    pub rows: Vec<Vec<RawValue>>,
}

impl RawResultSet {
    /// Creates a raw result set with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Vec<RawValue>>) -> Self {
        Self { columns, rows }
    }
}
