//! Grid dialect over the in-memory map datastore

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::{Error, Result};
use crate::dialect::context::{
    AssociationContext, AssociationTypeContext, TupleContext, TupleTypeContext,
};
use crate::dialect::facets::{
    BatchableGridDialect, IdentityColumnAwareGridDialect, MultigetGridDialect,
    OptimisticLockingAwareGridDialect, QueryableGridDialect, SessionFactoryHandle,
    SessionFactoryLifecycleAwareDialect,
};
use crate::dialect::insert::DuplicateInsertPreventionStrategy;
use crate::dialect::query::{BackendQuery, ClosableIterator, QueryParameters};
use crate::dialect::queue::{OperationsQueue, QueuedOperation};
use crate::dialect::{GridDialect, ModelConsumer};
use crate::model::key::{
    AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, IdSourceKey,
    IdSourceKeyMetadata, NextValueRequest,
};
use crate::model::snapshot::{MapAssociationSnapshot, MapTupleSnapshot};
use crate::model::{Association, SnapshotType, Tuple};
use crate::types::Value;

use super::datastore::{CursorGuard, MapDatastore, StoredTuple};
use super::query::{matches, MapQuery, MapUpdate};

/// Id source table holding one identity counter per entity table
pub const IDENTITY_SOURCE_TABLE: &str = "gridbridge_identities";

fn loaded_tuple(stored: StoredTuple) -> Tuple {
    Tuple::with_snapshot(Arc::new(MapTupleSnapshot::new(stored)), SnapshotType::Update)
}

fn lock_columns(old_lock_state: &Tuple) -> Vec<(String, Option<Value>)> {
    old_lock_state
        .column_names()
        .into_iter()
        .map(|column| {
            let value = old_lock_state.get(&column);
            (column, value)
        })
        .collect()
}

/// Dialect storing tuples and associations in a [`MapDatastore`]
///
/// Exposes every facet. Native queries are JSON, see [`super::query`].
#[derive(Debug)]
pub struct MapDialect {
    datastore: Arc<MapDatastore>,
    duplicate_insert_strategy: DuplicateInsertPreventionStrategy,
    session_factories: Mutex<Vec<SessionFactoryHandle>>,
}

impl MapDialect {
    /// Dialect over `datastore`
    pub fn new(
        datastore: Arc<MapDatastore>,
        duplicate_insert_strategy: DuplicateInsertPreventionStrategy,
    ) -> Self {
        Self {
            datastore,
            duplicate_insert_strategy,
            session_factories: Mutex::new(Vec::new()),
        }
    }

    /// The backing datastore
    pub fn datastore(&self) -> &Arc<MapDatastore> {
        &self.datastore
    }

    /// Session factories this dialect was notified of, in notification order
    pub fn session_factories(&self) -> Vec<SessionFactoryHandle> {
        self.session_factories.lock().clone()
    }

    fn map_query<'a>(&self, query: &'a BackendQuery) -> Result<&'a MapQuery> {
        query
            .query::<MapQuery>()
            .ok_or_else(|| Error::invalid_query("query was not parsed by the map dialect"))
    }

    fn matching(
        &self,
        query: &MapQuery,
        parameters: &QueryParameters,
    ) -> Result<Vec<(EntityKey, StoredTuple)>> {
        let filter = query.resolve_filter(parameters)?;
        let mut rows: Vec<_> = self
            .datastore
            .entities_in_table(&query.table)
            .into_iter()
            .filter(|(key, stored)| matches(key, stored, &filter))
            .collect();
        // DashMap iteration order is arbitrary; paging needs a stable order
        rows.sort_by_cached_key(|(key, _)| key.to_string());
        Ok(rows)
    }
}

impl GridDialect for MapDialect {
    fn get_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<Option<Tuple>> {
        Ok(self.datastore.entity(key).map(loaded_tuple))
    }

    fn create_tuple(&self, _key: &EntityKey, _context: &TupleContext) -> Tuple {
        Tuple::with_snapshot(Arc::new(MapTupleSnapshot::default()), SnapshotType::Insert)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        _context: &TupleContext,
    ) -> Result<()> {
        let reject_duplicates =
            self.duplicate_insert_strategy == DuplicateInsertPreventionStrategy::Native;
        self.datastore.apply_tuple(key, tuple, reject_duplicates)
    }

    fn remove_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<()> {
        if !self.datastore.remove_entity(key) {
            debug!("Removing {} which is not stored", key);
        }
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Option<Association>> {
        Ok(self.datastore.association(key).map(|rows| {
            let snapshot: MapAssociationSnapshot = rows
                .into_iter()
                .map(|(row_key, stored)| (row_key, loaded_tuple(stored)))
                .collect();
            Association::with_snapshot(Arc::new(snapshot))
        }))
    }

    fn create_association(
        &self,
        _key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Association {
        Association::new()
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        _context: &AssociationContext,
    ) -> Result<()> {
        self.datastore.apply_association(key, &association.operations());
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<()> {
        if !self.datastore.remove_association(key) {
            debug!("Removing {} which is not stored", key);
        }
        Ok(())
    }

    fn is_stored_in_entity_structure(
        &self,
        _metadata: &AssociationKeyMetadata,
        _context: &AssociationTypeContext,
    ) -> bool {
        false
    }

    fn next_value(&self, request: &NextValueRequest) -> Result<i64> {
        Ok(self
            .datastore
            .next_value(request.key(), request.increment(), request.initial_value()))
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        _context: &TupleTypeContext,
        metadata: &[Arc<EntityKeyMetadata>],
    ) -> Result<()> {
        for entity_metadata in metadata {
            for (_, stored) in self.datastore.entities_of(entity_metadata) {
                consumer.consume(loaded_tuple(stored));
            }
        }
        Ok(())
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.duplicate_insert_strategy
    }

    fn as_multiget(&self) -> Option<&dyn MultigetGridDialect> {
        Some(self)
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        Some(self)
    }

    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        Some(self)
    }

    fn as_lifecycle_aware(&self) -> Option<&dyn SessionFactoryLifecycleAwareDialect> {
        Some(self)
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        Some(self)
    }

    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        Some(self)
    }
}

impl MultigetGridDialect for MapDialect {
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        _context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>> {
        Ok(keys
            .iter()
            .map(|key| self.datastore.entity(key).map(loaded_tuple))
            .collect())
    }
}

impl BatchableGridDialect for MapDialect {
    fn execute_batch(&self, queue: &OperationsQueue) -> Result<()> {
        let operations = queue.drain()?;
        debug!("Applying batch of {} operations", operations.len());
        for operation in operations {
            match operation {
                QueuedOperation::InsertOrUpdateTuple {
                    key,
                    tuple,
                    context,
                } => self.insert_or_update_tuple(&key, &tuple, &context)?,
                QueuedOperation::RemoveTuple { key, context } => {
                    self.remove_tuple(&key, &context)?
                }
                QueuedOperation::InsertOrUpdateAssociation {
                    key,
                    association,
                    context,
                } => self.insert_or_update_association(&key, &association, &context)?,
                QueuedOperation::RemoveAssociation { key, context } => {
                    self.remove_association(&key, &context)?
                }
            }
        }
        Ok(())
    }
}

impl OptimisticLockingAwareGridDialect for MapDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        _context: &TupleContext,
    ) -> Result<bool> {
        let applied = self
            .datastore
            .apply_tuple_if_matches(key, &lock_columns(old_lock_state), tuple);
        if !applied {
            debug!("Optimistic lock on {} failed, entity changed or removed", key);
        }
        Ok(applied)
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        _context: &TupleContext,
    ) -> Result<bool> {
        let removed = self
            .datastore
            .remove_entity_if_matches(key, &lock_columns(old_lock_state));
        if !removed {
            debug!("Optimistic lock on {} failed, entity changed or removed", key);
        }
        Ok(removed)
    }
}

impl IdentityColumnAwareGridDialect for MapDialect {
    fn create_identity_tuple(
        &self,
        _metadata: &EntityKeyMetadata,
        _context: &TupleContext,
    ) -> Tuple {
        Tuple::with_snapshot(Arc::new(MapTupleSnapshot::default()), SnapshotType::Insert)
    }

    fn insert_identity_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        _context: &TupleContext,
    ) -> Result<EntityKey> {
        let [id_column] = metadata.column_names() else {
            return Err(Error::invalid_key(format!(
                "identity columns need a single key column, {} has {}",
                metadata.table(),
                metadata.column_names().len()
            )));
        };
        let source = IdSourceKey::for_table(
            IdSourceKeyMetadata::for_table(IDENTITY_SOURCE_TABLE, "table_name", "next_id"),
            metadata.table(),
        );
        let id = self.datastore.next_value(&source, 1, 1);
        tuple.put(id_column.clone(), Value::Int(id));

        let key = EntityKey::new(Arc::clone(metadata), vec![Value::Int(id)])?;
        self.datastore.apply_tuple(&key, tuple, true)?;
        debug!("Inserted {} under generated id {}", metadata.table(), id);
        Ok(key)
    }
}

/// Materialized query results registered as an open cursor
#[derive(Debug)]
pub struct MapCursor {
    rows: std::vec::IntoIter<Tuple>,
    guard: Option<CursorGuard>,
}

impl Iterator for MapCursor {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.guard.as_ref()?;
        self.rows.next().map(Ok)
    }
}

impl ClosableIterator for MapCursor {
    fn close(&mut self) {
        self.guard = None;
        self.rows = Vec::new().into_iter();
    }
}

impl QueryableGridDialect for MapDialect {
    fn parse_native_query(&self, native_query: &str) -> Result<BackendQuery> {
        Ok(BackendQuery::new(MapQuery::parse(native_query)?, None))
    }

    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        _context: &TupleContext,
    ) -> Result<Box<dyn ClosableIterator>> {
        let query = self.map_query(query)?;
        if query.is_update() {
            return Err(Error::invalid_query("update queries must be run as updates"));
        }
        let rows: Vec<Tuple> = self
            .matching(query, parameters)?
            .into_iter()
            .skip(parameters.first_row().unwrap_or(0))
            .take(parameters.max_rows().unwrap_or(usize::MAX))
            .map(|(_, stored)| loaded_tuple(stored))
            .collect();
        Ok(Box::new(MapCursor {
            rows: rows.into_iter(),
            guard: Some(self.datastore.open_cursor()),
        }))
    }

    fn execute_backend_update_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        _context: &TupleContext,
    ) -> Result<usize> {
        let query = self.map_query(query)?;
        let update = query.resolve_update(parameters)?;
        let mut affected = 0;
        for (key, _) in self.matching(query, parameters)? {
            let applied = match &update {
                MapUpdate::Delete => self.datastore.remove_entity(&key),
                MapUpdate::Set(columns) => self.datastore.update_entity(&key, columns),
            };
            if applied {
                affected += 1;
            }
        }
        debug!("Update query on {} affected {} entities", query.table, affected);
        Ok(affected)
    }
}

impl SessionFactoryLifecycleAwareDialect for MapDialect {
    fn session_factory_created(&self, session_factory: &SessionFactoryHandle) {
        debug!("Map dialect bound to session factory {}", session_factory.name());
        self.session_factories.lock().push(session_factory.clone());
    }
}
