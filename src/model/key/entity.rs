//! Entity keys and their metadata

use std::fmt;
use std::sync::Arc;

use crate::core::{Error, Result};
use crate::types::Value;

/// Table and ordered key column names of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKeyMetadata {
    table: String,
    column_names: Vec<String>,
}

impl EntityKeyMetadata {
    /// Create metadata for `table` keyed by `column_names`, in order
    pub fn new<T, I, S>(table: T, column_names: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            column_names: column_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Table (or collection, or cache) the entity is stored in
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Key column names, in key order
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether `column` is part of the key
    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

/// Identity of one stored entity
///
/// A key is immutable once built; value `i` belongs to column `i` of the
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    metadata: Arc<EntityKeyMetadata>,
    column_values: Vec<Value>,
}

impl EntityKey {
    /// Create a key, rejecting a value count that differs from the metadata
    pub fn new(metadata: Arc<EntityKeyMetadata>, column_values: Vec<Value>) -> Result<Self> {
        if metadata.column_names.len() != column_values.len() {
            return Err(Error::invalid_key(format!(
                "{} expects {} key values, got {}",
                metadata.table,
                metadata.column_names.len(),
                column_values.len()
            )));
        }
        Ok(Self {
            metadata,
            column_values,
        })
    }

    /// Key metadata shared by every key of the entity type
    pub fn metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.metadata
    }

    /// Table the entity is stored in
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    /// Key column names, in key order
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    /// Key column values, aligned with `column_names`
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Value of one key column
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Iterate over `(column, value)` pairs in key order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.metadata
            .column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}", self.metadata.table)?;
        for (column, value) in self.columns() {
            write!(f, ", {}={}", column, value)?;
        }
        write!(f, ")")
    }
}
