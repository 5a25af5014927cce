//! Row keys identifying one row inside an association

use std::fmt;

use crate::types::Value;

/// Identity of one association row: table plus ordered column names and values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    table: String,
    column_names: Vec<String>,
    column_values: Vec<Value>,
}

impl RowKey {
    /// Create a row key; names and values are paired by position
    pub fn new<T, I, S>(table: T, column_names: I, column_values: Vec<Value>) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            column_names: column_names.into_iter().map(Into::into).collect(),
            column_values,
        }
    }

    /// Association table the row belongs to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row key column names
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Row key column values
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Value of one row key column
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.column_values.get(i))
    }

    /// Iterate over `(column, value)` pairs
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({}", self.table)?;
        for (column, value) in self.columns() {
            write!(f, ", {}={}", column, value)?;
        }
        write!(f, ")")
    }
}
