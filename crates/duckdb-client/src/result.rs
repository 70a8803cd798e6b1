//! Materialized query results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// A single column value read from DuckDB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// BOOLEAN.
    Bool(bool),
    /// Any integral type that fits into 64 bits.
    Int(i64),
    /// FLOAT, DOUBLE, and integers too wide for `i64`.
    Float(f64),
    /// VARCHAR and types rendered as text.
    Text(String),
    /// BLOB.
    Blob(Vec<u8>),
}

impl Value {
    /// Whether the value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Floating point view of the value.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Text view of the value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is numeric (integral or floating point).
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column index.
    pub index: usize,
}

/// A row from a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    /// Column names of this row.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Get the number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (column name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Outcome of executing one statement.
///
/// Engine errors are carried here instead of being raised, so callers can
/// tell a failed statement apart from a failure to reach the engine at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    columns: Vec<Column>,
    rows: Vec<Row>,
    error: Option<String>,
}

impl QueryResult {
    pub(crate) fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            error: None,
        }
    }

    /// Build a failed result carrying the engine's error message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// An empty successful result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the statement succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Error message reported by the engine, if the statement failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Materialized rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the result, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows returned.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value in the first column of the first row.
    #[must_use]
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }

    /// Convert a failed result into [`ClientError::Query`].
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(message) => Err(ClientError::Query(message)),
            None => Ok(self),
        }
    }
}
