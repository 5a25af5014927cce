//! Change-tracking overlay for the rows of one association

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::model::key::RowKey;
use crate::model::snapshot::{AssociationSnapshot, EmptyAssociationSnapshot};
use crate::model::Tuple;

/// A single pending row mutation
#[derive(Debug, Clone)]
pub enum AssociationOperation {
    /// Store `tuple` under `key`
    Put {
        /// Row key
        key: RowKey,
        /// Row contents
        tuple: Tuple,
    },
    /// Record an explicit null row under `key`
    PutNull {
        /// Row key
        key: RowKey,
    },
    /// Remove the row under `key`
    Remove {
        /// Row key
        key: RowKey,
    },
    /// Remove every stored row before applying the other operations
    Clear,
}

impl AssociationOperation {
    /// Row key the operation applies to, `None` for `Clear`
    pub fn key(&self) -> Option<&RowKey> {
        match self {
            AssociationOperation::Put { key, .. }
            | AssociationOperation::PutNull { key }
            | AssociationOperation::Remove { key } => Some(key),
            AssociationOperation::Clear => None,
        }
    }
}

/// Snapshot plus pending row mutations
#[derive(Debug, Clone)]
pub struct Association {
    snapshot: Arc<dyn AssociationSnapshot>,
    current_state: Option<IndexMap<RowKey, AssociationOperation>>,
    cleared: bool,
}

impl Default for Association {
    fn default() -> Self {
        Self::new()
    }
}

impl Association {
    /// Association over the shared empty snapshot
    pub fn new() -> Self {
        Self::with_snapshot(EmptyAssociationSnapshot::shared())
    }

    /// Association over a dialect supplied snapshot
    pub fn with_snapshot(snapshot: Arc<dyn AssociationSnapshot>) -> Self {
        Self {
            snapshot,
            current_state: None,
            cleared: false,
        }
    }

    /// Current row under `key`
    pub fn get(&self, key: &RowKey) -> Option<Tuple> {
        match self.current_state.as_ref().and_then(|state| state.get(key)) {
            Some(AssociationOperation::Put { tuple, .. }) => Some(tuple.clone()),
            Some(_) => None,
            None if self.cleared => None,
            None => self.snapshot.get(key),
        }
    }

    /// Store a row; `None` records an explicit null row
    pub fn put(&mut self, key: RowKey, tuple: Option<Tuple>) {
        let operation = match tuple {
            Some(tuple) => AssociationOperation::Put { key: key.clone(), tuple },
            None => AssociationOperation::PutNull { key: key.clone() },
        };
        self.state_mut().insert(key, operation);
    }

    /// Remove the row under `key`
    pub fn remove(&mut self, key: RowKey) {
        let operation = AssociationOperation::Remove { key: key.clone() };
        self.state_mut().insert(key, operation);
    }

    /// Drop every row, stored and pending
    pub fn clear(&mut self) {
        self.cleared = true;
        self.current_state = None;
    }

    fn state_mut(&mut self) -> &mut IndexMap<RowKey, AssociationOperation> {
        self.current_state.get_or_insert_with(IndexMap::new)
    }

    fn in_effective_snapshot(&self, key: &RowKey) -> bool {
        !self.cleared && self.snapshot.contains_key(key)
    }

    fn effective_snapshot_size(&self) -> usize {
        if self.cleared {
            0
        } else {
            self.snapshot.size()
        }
    }

    /// Number of rows currently present, without materializing the key set
    pub fn size(&self) -> usize {
        let mut size = self.effective_snapshot_size();
        if let Some(state) = &self.current_state {
            for (key, operation) in state {
                match operation {
                    AssociationOperation::Put { .. } | AssociationOperation::PutNull { .. } => {
                        if !self.in_effective_snapshot(key) {
                            size += 1;
                        }
                    }
                    AssociationOperation::Remove { .. } => {
                        if self.in_effective_snapshot(key) {
                            size -= 1;
                        }
                    }
                    AssociationOperation::Clear => {}
                }
            }
        }
        size
    }

    /// Whether no rows are present
    pub fn is_empty(&self) -> bool {
        let snapshot_size = self.effective_snapshot_size();
        let overlay_size = self.current_state.as_ref().map_or(0, IndexMap::len);
        if snapshot_size == 0 && overlay_size == 0 {
            return true;
        }
        // each overlay entry hides at most one snapshot row
        if snapshot_size > overlay_size {
            return false;
        }
        self.size() == 0
    }

    /// Keys of the rows currently present
    pub fn keys(&self) -> IndexSet<RowKey> {
        let mut keys: IndexSet<RowKey> = if self.cleared {
            IndexSet::new()
        } else {
            self.snapshot.row_keys().into_iter().collect()
        };
        if let Some(state) = &self.current_state {
            for (key, operation) in state {
                match operation {
                    AssociationOperation::Put { .. } | AssociationOperation::PutNull { .. } => {
                        keys.insert(key.clone());
                    }
                    AssociationOperation::Remove { .. } => {
                        keys.shift_remove(key);
                    }
                    AssociationOperation::Clear => {}
                }
            }
        }
        keys
    }

    /// Pending operations, `Clear` first when the association was cleared
    pub fn operations(&self) -> Vec<AssociationOperation> {
        let mut operations = Vec::with_capacity(
            usize::from(self.cleared) + self.current_state.as_ref().map_or(0, IndexMap::len),
        );
        if self.cleared {
            operations.push(AssociationOperation::Clear);
        }
        if let Some(state) = &self.current_state {
            operations.extend(state.values().cloned());
        }
        operations
    }

    /// Whether any mutation was made
    pub fn has_operations(&self) -> bool {
        self.cleared || self.current_state.as_ref().is_some_and(|state| !state.is_empty())
    }

    /// Snapshot this association was built over
    pub fn snapshot(&self) -> &Arc<dyn AssociationSnapshot> {
        &self.snapshot
    }

    /// Whether `clear` was called
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::MapAssociationSnapshot;
    use crate::types::Value;

    fn row(id: i64) -> RowKey {
        RowKey::new(
            "Person_Address",
            ["person_id", "address_id"],
            vec![Value::Int(1), Value::Int(id)],
        )
    }

    fn row_tuple(id: i64) -> Tuple {
        let mut tuple = Tuple::new();
        tuple.put("address_id", Value::Int(id));
        tuple
    }

    fn loaded(ids: &[i64]) -> Association {
        let snapshot: MapAssociationSnapshot =
            ids.iter().map(|&id| (row(id), row_tuple(id))).collect();
        Association::with_snapshot(Arc::new(snapshot))
    }

    #[test]
    fn test_reads_fall_back_to_snapshot() {
        let association = loaded(&[1, 2]);

        assert_eq!(association.size(), 2);
        assert!(!association.is_empty());
        assert!(association.get(&row(1)).is_some());
        assert!(association.get(&row(3)).is_none());
        assert!(association.operations().is_empty());
    }

    #[test]
    fn test_clear_then_put_yields_only_new_key() {
        let mut association = loaded(&[1, 2, 3]);
        association.clear();
        association.put(row(9), Some(row_tuple(9)));

        assert_eq!(association.size(), 1);
        let keys: Vec<_> = association.keys().into_iter().collect();
        assert_eq!(keys, vec![row(9)]);
        assert!(association.get(&row(1)).is_none());
        assert!(association.get(&row(9)).is_some());
    }

    #[test]
    fn test_clear_is_emitted_first() {
        let mut association = loaded(&[1]);
        association.put(row(5), Some(row_tuple(5)));
        association.clear();
        association.put(row(6), Some(row_tuple(6)));
        association.remove(row(7));

        let operations = association.operations();
        assert_eq!(operations.len(), 3);
        assert!(matches!(operations[0], AssociationOperation::Clear));
        assert_eq!(operations[1].key(), Some(&row(6)));
        assert!(matches!(operations[2], AssociationOperation::Remove { .. }));
        assert!(association.is_cleared());
    }

    #[test]
    fn test_put_none_records_a_single_put_null() {
        let mut association = Association::new();
        association.put(row(1), None);

        let operations = association.operations();
        assert_eq!(operations.len(), 1);
        assert!(matches!(operations[0], AssociationOperation::PutNull { .. }));
        assert!(association.get(&row(1)).is_none());
        assert_eq!(association.size(), 1);
    }

    #[test]
    fn test_size_counts_overlay_against_snapshot() {
        let mut association = loaded(&[1, 2]);
        association.put(row(1), Some(row_tuple(10)));
        association.put(row(3), Some(row_tuple(3)));
        association.remove(row(2));
        association.remove(row(4));

        assert_eq!(association.size(), 2);
        assert_eq!(association.keys().len(), association.size());
    }

    #[test]
    fn test_is_empty_when_every_row_removed() {
        let mut association = loaded(&[1, 2]);
        association.remove(row(1));
        assert!(!association.is_empty());

        association.remove(row(2));
        assert!(association.is_empty());
        assert!(Association::new().is_empty());
    }

    #[test]
    fn test_is_empty_counts_when_overlay_covers_snapshot() {
        // overlay no smaller than the snapshot forces a full count
        let mut replaced = loaded(&[1]);
        replaced.put(row(1), Some(row_tuple(10)));
        assert!(!replaced.is_empty());

        let mut swapped = loaded(&[1, 2]);
        swapped.remove(row(1));
        swapped.put(row(3), Some(row_tuple(3)));
        assert!(!swapped.is_empty());

        let mut drained = loaded(&[1, 2]);
        drained.remove(row(1));
        drained.remove(row(2));
        drained.remove(row(3));
        assert!(drained.is_empty());

        let mut refilled = loaded(&[1, 2]);
        refilled.clear();
        assert!(refilled.is_empty());
        refilled.put(row(1), Some(row_tuple(1)));
        assert!(!refilled.is_empty());
    }

    #[test]
    fn test_mutations_leave_snapshot_untouched() {
        let mut association = loaded(&[1, 2]);
        let before = Arc::clone(association.snapshot());

        association.remove(row(1));
        association.clear();
        association.put(row(3), None);

        assert!(Arc::ptr_eq(&before, association.snapshot()));
        assert_eq!(before.size(), 2);
        assert!(before.contains_key(&row(1)));
        assert!(!before.contains_key(&row(3)));
    }
}
