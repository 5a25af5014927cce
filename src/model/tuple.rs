//! Change-tracking overlay for one entity or association row
//!
//! A [`Tuple`] pairs the snapshot a dialect loaded with the mutations the
//! engine made since. Reads see the mutations first and fall back to the
//! snapshot. Writes never touch the snapshot; [`Tuple::operations`] yields
//! exactly the diff that a dialect has to apply.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::model::snapshot::{EmptyTupleSnapshot, TupleSnapshot};
use crate::types::Value;

/// Whether the stored state behind a tuple is known to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    /// Nothing is stored yet; applying the tuple creates it
    Insert,
    /// The tuple was loaded from the datastore
    Update,
    /// Unknown origin
    #[default]
    Unknown,
}

/// Kind of a [`TupleOperation`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TupleOperationType {
    /// Column set to a value
    Put,
    /// Column explicitly set to null
    PutNull,
    /// Column removed
    Remove,
}

/// A single pending column mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TupleOperation {
    /// Set `column` to `value`
    Put {
        /// Column name
        column: String,
        /// New value
        value: Value,
    },
    /// Set `column` to null
    PutNull {
        /// Column name
        column: String,
    },
    /// Remove `column`
    Remove {
        /// Column name
        column: String,
    },
}

impl TupleOperation {
    /// Column the operation applies to
    pub fn column(&self) -> &str {
        match self {
            TupleOperation::Put { column, .. }
            | TupleOperation::PutNull { column }
            | TupleOperation::Remove { column } => column,
        }
    }

    /// Value written by a `Put`
    pub fn value(&self) -> Option<&Value> {
        match self {
            TupleOperation::Put { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Operation kind
    pub fn kind(&self) -> TupleOperationType {
        match self {
            TupleOperation::Put { .. } => TupleOperationType::Put,
            TupleOperation::PutNull { .. } => TupleOperationType::PutNull,
            TupleOperation::Remove { .. } => TupleOperationType::Remove,
        }
    }
}

/// Snapshot plus pending column mutations
///
/// At most one operation is kept per column; a later write replaces the
/// earlier one but keeps the position of the column's first touch. The
/// overlay map is only allocated on the first mutation.
#[derive(Debug, Clone)]
pub struct Tuple {
    snapshot: Arc<dyn TupleSnapshot>,
    snapshot_type: SnapshotType,
    current_state: Option<IndexMap<String, TupleOperation>>,
}

impl Default for Tuple {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuple {
    /// Tuple over the shared empty snapshot, of unknown origin
    pub fn new() -> Self {
        Self::with_snapshot(EmptyTupleSnapshot::shared(), SnapshotType::Unknown)
    }

    /// Tuple over a dialect supplied snapshot
    pub fn with_snapshot(snapshot: Arc<dyn TupleSnapshot>, snapshot_type: SnapshotType) -> Self {
        Self {
            snapshot,
            snapshot_type,
            current_state: None,
        }
    }

    /// Current value of `column`
    ///
    /// A column removed or set to null reads as `None` whatever the snapshot
    /// holds.
    pub fn get(&self, column: &str) -> Option<Value> {
        match self.current_state.as_ref().and_then(|state| state.get(column)) {
            Some(TupleOperation::Put { value, .. }) => Some(value.clone()),
            Some(TupleOperation::PutNull { .. }) | Some(TupleOperation::Remove { .. }) => None,
            None => self.snapshot.get(column),
        }
    }

    /// Set `column`; `None` records an explicit null
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Option<Value>>) {
        let column = column.into();
        let operation = match value.into() {
            Some(value) => TupleOperation::Put {
                column: column.clone(),
                value,
            },
            None => TupleOperation::PutNull { column: column.clone() },
        };
        self.state_mut().insert(column, operation);
    }

    /// Set `column` to null
    pub fn put_null(&mut self, column: impl Into<String>) {
        self.put(column, None);
    }

    /// Remove `column`
    pub fn remove(&mut self, column: impl Into<String>) {
        let column = column.into();
        let operation = TupleOperation::Remove { column: column.clone() };
        self.state_mut().insert(column, operation);
    }

    fn state_mut(&mut self) -> &mut IndexMap<String, TupleOperation> {
        self.current_state.get_or_insert_with(IndexMap::new)
    }

    /// Pending operations in order of each column's first mutation
    pub fn operations(&self) -> Vec<&TupleOperation> {
        match &self.current_state {
            Some(state) => state.values().collect(),
            None => Vec::new(),
        }
    }

    /// Whether any mutation was made
    pub fn has_operations(&self) -> bool {
        self.current_state.as_ref().is_some_and(|state| !state.is_empty())
    }

    /// Snapshot columns plus put columns, minus removed columns
    ///
    /// Columns set to null are included.
    pub fn column_names(&self) -> IndexSet<String> {
        let mut names: IndexSet<String> = self.snapshot.column_names().into_iter().collect();
        if let Some(state) = &self.current_state {
            for operation in state.values() {
                match operation {
                    TupleOperation::Put { column, .. } | TupleOperation::PutNull { column } => {
                        names.insert(column.clone());
                    }
                    TupleOperation::Remove { column } => {
                        names.shift_remove(column);
                    }
                }
            }
        }
        names
    }

    /// Snapshot this tuple was built over
    pub fn snapshot(&self) -> &Arc<dyn TupleSnapshot> {
        &self.snapshot
    }

    /// Origin of the snapshot
    pub fn snapshot_type(&self) -> SnapshotType {
        self.snapshot_type
    }

    /// Record the origin of the snapshot, e.g. after the tuple was stored
    pub fn set_snapshot_type(&mut self, snapshot_type: SnapshotType) {
        self.snapshot_type = snapshot_type;
    }

    /// Whether no column currently holds a value
    pub fn is_empty(&self) -> bool {
        self.column_names().iter().all(|column| self.get(column).is_none())
    }

    /// Materialize every column that currently holds a value
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.column_names()
            .into_iter()
            .filter_map(|column| self.get(&column).map(|value| (column, value)))
            .collect()
    }
}
