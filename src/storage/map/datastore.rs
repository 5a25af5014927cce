//! Concurrent in-memory datastore backing the map dialect
//!
//! Entities, associations and id counters live in separate `DashMap`s.
//! Every read copies the stored state out under the entry lock, so callers
//! never hold a shard lock past the call.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::core::{Error, Result};
use crate::dialect::insert::id_tuple;
use crate::model::key::{AssociationKey, EntityKey, EntityKeyMetadata, IdSourceKey, RowKey};
use crate::model::{AssociationOperation, SnapshotType, Tuple, TupleOperation};
use crate::types::Value;

/// Stored columns of one entity or association row
pub type StoredTuple = IndexMap<String, Value>;

/// Stored rows of one association
pub type StoredAssociation = IndexMap<RowKey, StoredTuple>;

/// In-memory datastore shared by every map dialect built over it
#[derive(Debug, Default)]
pub struct MapDatastore {
    entities: DashMap<EntityKey, StoredTuple>,
    associations: DashMap<AssociationKey, StoredAssociation>,
    sequences: DashMap<IdSourceKey, AtomicI64>,
    open_cursors: Arc<AtomicUsize>,
}

/// Registers one open query cursor for as long as it is alive
#[derive(Debug)]
pub struct CursorGuard {
    open_cursors: Arc<AtomicUsize>,
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::AcqRel);
    }
}

fn apply_tuple_operations(stored: &mut StoredTuple, tuple: &Tuple) {
    for operation in tuple.operations() {
        match operation {
            TupleOperation::Put { column, value } => {
                stored.insert(column.clone(), value.clone());
            }
            TupleOperation::PutNull { column } | TupleOperation::Remove { column } => {
                stored.shift_remove(column);
            }
        }
    }
}

fn columns_match(stored: &StoredTuple, expected: &[(String, Option<Value>)]) -> bool {
    expected
        .iter()
        .all(|(column, value)| stored.get(column) == value.as_ref())
}

impl MapDatastore {
    /// Empty datastore
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the columns stored for `key`
    pub fn entity(&self, key: &EntityKey) -> Option<StoredTuple> {
        self.entities.get(key).map(|entry| entry.value().clone())
    }

    /// Whether an entity is stored under `key`
    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Number of stored entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Apply a tuple diff to the entity stored under `key`, creating it if needed
    ///
    /// With `reject_duplicates` set, an `Insert` tuple whose key is already
    /// stored is refused unless applying it would leave the stored columns
    /// unchanged, so replaying the same insert succeeds. The check and the
    /// write happen under the same entry lock.
    pub fn apply_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        reject_duplicates: bool,
    ) -> Result<()> {
        match self.entities.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let mut next = entry.get().clone();
                apply_tuple_operations(&mut next, tuple);
                if next == *entry.get() {
                    return Ok(());
                }
                if reject_duplicates && tuple.snapshot_type() == SnapshotType::Insert {
                    return Err(Error::tuple_already_exists(
                        key.metadata().clone(),
                        id_tuple(key),
                    ));
                }
                *entry.get_mut() = next;
            }
            Entry::Vacant(entry) => {
                let mut stored = StoredTuple::new();
                apply_tuple_operations(&mut stored, tuple);
                entry.insert(stored);
            }
        }
        Ok(())
    }

    /// Apply a tuple diff only if the stored entity still matches `expected`
    ///
    /// Every column of `expected` must hold the same value in the stored
    /// entity; `None` requires the column to be absent. Returns whether the
    /// diff was applied.
    pub fn apply_tuple_if_matches(
        &self,
        key: &EntityKey,
        expected: &[(String, Option<Value>)],
        tuple: &Tuple,
    ) -> bool {
        match self.entities.get_mut(key) {
            Some(mut entry) if columns_match(entry.value(), expected) => {
                apply_tuple_operations(entry.value_mut(), tuple);
                true
            }
            _ => false,
        }
    }

    /// Remove the entity under `key` only if it still matches `expected`
    pub fn remove_entity_if_matches(
        &self,
        key: &EntityKey,
        expected: &[(String, Option<Value>)],
    ) -> bool {
        self.entities
            .remove_if(key, |_, stored| columns_match(stored, expected))
            .is_some()
    }

    /// Remove the entity stored under `key`, returning whether one was stored
    pub fn remove_entity(&self, key: &EntityKey) -> bool {
        self.entities.remove(key).is_some()
    }

    /// Copies of every entity of the given type
    pub fn entities_of(&self, metadata: &EntityKeyMetadata) -> Vec<(EntityKey, StoredTuple)> {
        self.entities
            .iter()
            .filter(|entry| entry.key().metadata().as_ref() == metadata)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Copies of every entity stored in `table`
    pub fn entities_in_table(&self, table: &str) -> Vec<(EntityKey, StoredTuple)> {
        self.entities
            .iter()
            .filter(|entry| entry.key().table() == table)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Overwrite or remove columns of a stored entity; `None` removes the column
    ///
    /// Returns whether the entity was stored.
    pub fn update_entity(&self, key: &EntityKey, columns: &[(String, Option<Value>)]) -> bool {
        match self.entities.get_mut(key) {
            Some(mut entry) => {
                for (column, value) in columns {
                    match value {
                        Some(value) => {
                            entry.insert(column.clone(), value.clone());
                        }
                        None => {
                            entry.shift_remove(column);
                        }
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Copy of the rows stored for `key`
    pub fn association(&self, key: &AssociationKey) -> Option<StoredAssociation> {
        self.associations.get(key).map(|entry| entry.value().clone())
    }

    /// Number of stored associations
    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    /// Apply association operations to the rows stored under `key`
    pub fn apply_association(&self, key: &AssociationKey, operations: &[AssociationOperation]) {
        let mut rows = self
            .associations
            .entry(key.clone())
            .or_insert_with(StoredAssociation::new);
        for operation in operations {
            match operation {
                AssociationOperation::Clear => rows.clear(),
                AssociationOperation::Put { key, tuple } => {
                    rows.insert(key.clone(), tuple.to_map());
                }
                AssociationOperation::PutNull { key } | AssociationOperation::Remove { key } => {
                    rows.shift_remove(key);
                }
            }
        }
    }

    /// Remove the association stored under `key`, returning whether one was stored
    pub fn remove_association(&self, key: &AssociationKey) -> bool {
        self.associations.remove(key).is_some()
    }

    /// Next value of the counter under `key`
    ///
    /// The counter is created holding `initial_value`, which the creating call
    /// returns. Creation happens under the shard entry lock, so exactly one
    /// concurrent caller creates it and every other caller advances it.
    pub fn next_value(&self, key: &IdSourceKey, increment: i64, initial_value: i64) -> i64 {
        if let Some(counter) = self.sequences.get(key) {
            return counter.fetch_add(increment, Ordering::AcqRel) + increment;
        }
        match self.sequences.entry(key.clone()) {
            Entry::Occupied(entry) => {
                entry.get().fetch_add(increment, Ordering::AcqRel) + increment
            }
            Entry::Vacant(entry) => {
                debug!("Creating id source {} at {}", key, initial_value);
                entry.insert(AtomicI64::new(initial_value));
                initial_value
            }
        }
    }

    /// Register an open cursor until the returned guard is dropped
    pub fn open_cursor(&self) -> CursorGuard {
        self.open_cursors.fetch_add(1, Ordering::AcqRel);
        CursorGuard {
            open_cursors: Arc::clone(&self.open_cursors),
        }
    }

    /// Number of query cursors not yet closed
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Drop all stored state
    pub fn clear(&self) {
        self.entities.clear();
        self.associations.clear();
        self.sequences.clear();
        debug!("Cleared map datastore");
    }
}
