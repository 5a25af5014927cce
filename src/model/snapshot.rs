//! Read-only views of stored state supplied by dialects
//!
//! A snapshot is whatever the datastore returned when a tuple or association
//! was loaded. The change-tracking overlays in [`crate::model::tuple`] and
//! [`crate::model::association`] read through it and never write to it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::model::key::RowKey;
use crate::model::Tuple;
use crate::types::Value;

/// Column to value view of one stored entity or row
pub trait TupleSnapshot: fmt::Debug + Send + Sync {
    /// Value of `column`, `None` when the column is absent
    fn get(&self, column: &str) -> Option<Value>;

    /// Whether no columns are present
    fn is_empty(&self) -> bool;

    /// Names of the present columns
    fn column_names(&self) -> Vec<String>;
}

/// Row key to row view of one stored association
pub trait AssociationSnapshot: fmt::Debug + Send + Sync {
    /// Row stored under `key`
    fn get(&self, key: &RowKey) -> Option<Tuple>;

    /// Whether a row is stored under `key`
    fn contains_key(&self, key: &RowKey) -> bool;

    /// Number of stored rows
    fn size(&self) -> usize;

    /// Keys of the stored rows
    fn row_keys(&self) -> Vec<RowKey>;

    /// Whether no rows are stored
    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Snapshot of a tuple that has no stored state
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyTupleSnapshot;

static EMPTY_TUPLE_SNAPSHOT: Lazy<Arc<dyn TupleSnapshot>> =
    Lazy::new(|| Arc::new(EmptyTupleSnapshot));

impl EmptyTupleSnapshot {
    /// Process-wide shared instance
    pub fn shared() -> Arc<dyn TupleSnapshot> {
        Arc::clone(&EMPTY_TUPLE_SNAPSHOT)
    }
}

impl TupleSnapshot for EmptyTupleSnapshot {
    fn get(&self, _column: &str) -> Option<Value> {
        None
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn column_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Snapshot of an association that has no stored rows
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyAssociationSnapshot;

static EMPTY_ASSOCIATION_SNAPSHOT: Lazy<Arc<dyn AssociationSnapshot>> =
    Lazy::new(|| Arc::new(EmptyAssociationSnapshot));

impl EmptyAssociationSnapshot {
    /// Process-wide shared instance
    pub fn shared() -> Arc<dyn AssociationSnapshot> {
        Arc::clone(&EMPTY_ASSOCIATION_SNAPSHOT)
    }
}

impl AssociationSnapshot for EmptyAssociationSnapshot {
    fn get(&self, _key: &RowKey) -> Option<Tuple> {
        None
    }

    fn contains_key(&self, _key: &RowKey) -> bool {
        false
    }

    fn size(&self) -> usize {
        0
    }

    fn row_keys(&self) -> Vec<RowKey> {
        Vec::new()
    }
}

/// Tuple snapshot over an owned, insertion-ordered column map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapTupleSnapshot {
    columns: IndexMap<String, Value>,
}

impl MapTupleSnapshot {
    /// Wrap a column map
    pub fn new(columns: IndexMap<String, Value>) -> Self {
        Self { columns }
    }

    /// Stored columns
    pub fn columns(&self) -> &IndexMap<String, Value> {
        &self.columns
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MapTupleSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl TupleSnapshot for MapTupleSnapshot {
    fn get(&self, column: &str) -> Option<Value> {
        self.columns.get(column).cloned()
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}

/// Association snapshot over an owned, insertion-ordered row map
#[derive(Debug, Clone, Default)]
pub struct MapAssociationSnapshot {
    rows: IndexMap<RowKey, Tuple>,
}

impl MapAssociationSnapshot {
    /// Wrap a row map
    pub fn new(rows: IndexMap<RowKey, Tuple>) -> Self {
        Self { rows }
    }
}

impl FromIterator<(RowKey, Tuple)> for MapAssociationSnapshot {
    fn from_iter<I: IntoIterator<Item = (RowKey, Tuple)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl AssociationSnapshot for MapAssociationSnapshot {
    fn get(&self, key: &RowKey) -> Option<Tuple> {
        self.rows.get(key).cloned()
    }

    fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    fn size(&self) -> usize {
        self.rows.len()
    }

    fn row_keys(&self) -> Vec<RowKey> {
        self.rows.keys().cloned().collect()
    }
}
