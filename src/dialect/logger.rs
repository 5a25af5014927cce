//! Trace logging decorator

use std::sync::Arc;

use tracing::{trace, Level};

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
use crate::dialect::queue::OperationsQueue;
use crate::dialect::{GridDialect, ModelConsumer};
use crate::model::key::{
    AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, NextValueRequest,
};
use crate::model::{Association, Tuple};
use crate::types::{GridType, ValueKind};

/// Forwards every call to the wrapped dialect, emitting a trace event first
///
/// Exposes exactly the facets of the wrapped dialect.
#[derive(Debug)]
pub struct LoggingGridDialect {
    inner: Arc<dyn GridDialect>,
}

impl LoggingGridDialect {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn GridDialect>) -> Self {
        Self { inner }
    }

    /// Whether wrapping is worth it: only when trace events are recorded
    pub fn activation_needed() -> bool {
        tracing::enabled!(Level::TRACE)
    }

    /// The wrapped dialect
    pub fn inner(&self) -> &Arc<dyn GridDialect> {
        &self.inner
    }
}

impl GridDialect for LoggingGridDialect {
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Option<Tuple>> {
        trace!("Reading tuple with key {} and context {:?}", key, context);
        self.inner.get_tuple(key, context)
    }

    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Tuple {
        trace!("Building tuple with key {} (does not access the datastore)", key);
        self.inner.create_tuple(key, context)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<()> {
        if tuple.snapshot().is_empty() {
            trace!("Creating tuple with key {} in datastore", key);
        } else {
            trace!("Updating tuple with key {} in datastore", key);
        }
        self.inner.insert_or_update_tuple(key, tuple, context)
    }

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<()> {
        trace!("Removing tuple with key {} from datastore", key);
        self.inner.remove_tuple(key, context)
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>> {
        trace!("Reading association with key {} and context {:?}", key, context);
        self.inner.get_association(key, context)
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Association {
        trace!("Building association with key {} (does not access the datastore)", key);
        self.inner.create_association(key, context)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<()> {
        if association.snapshot().size() == 0 {
            trace!("Creating association with key {} in datastore", key);
        } else {
            trace!("Updating association with key {} in datastore", key);
        }
        self.inner.insert_or_update_association(key, association, context)
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<()> {
        trace!("Removing association with key {} from datastore", key);
        self.inner.remove_association(key, context)
    }

    fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        trace!(
            "Determining whether association {} is stored in an entity structure",
            metadata.table()
        );
        self.inner.is_stored_in_entity_structure(metadata, context)
    }

    fn next_value(&self, request: &NextValueRequest) -> Result<i64> {
        trace!("Extracting next value from key {}", request.key());
        self.inner.next_value(request)
    }

    fn supports_sequences(&self) -> bool {
        self.inner.supports_sequences()
    }

    fn override_type(&self, kind: ValueKind) -> Option<Arc<dyn GridType>> {
        self.inner.override_type(kind)
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        context: &TupleTypeContext,
        metadata: &[Arc<EntityKeyMetadata>],
    ) -> Result<()> {
        trace!("Visiting tuples of {} entity types", metadata.len());
        self.inner.for_each_tuple(consumer, context, metadata)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.inner.duplicate_insert_prevention_strategy(metadata)
    }

    fn uses_navigational_information_for_inverse_side_of_associations(&self) -> bool {
        self.inner.uses_navigational_information_for_inverse_side_of_associations()
    }

    fn as_multiget(&self) -> Option<&dyn MultigetGridDialect> {
        self.inner.as_multiget().map(|_| self as &dyn MultigetGridDialect)
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        self.inner.as_batchable().map(|_| self as &dyn BatchableGridDialect)
    }

    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.inner.as_queryable().map(|_| self as &dyn QueryableGridDialect)
    }

    fn as_lifecycle_aware(&self) -> Option<&dyn SessionFactoryLifecycleAwareDialect> {
        self.inner
            .as_lifecycle_aware()
            .map(|_| self as &dyn SessionFactoryLifecycleAwareDialect)
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.inner
            .as_optimistic_locking_aware()
            .map(|_| self as &dyn OptimisticLockingAwareGridDialect)
    }

    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        self.inner
            .as_identity_column_aware()
            .map(|_| self as &dyn IdentityColumnAwareGridDialect)
    }
}

// Facet impls are only reachable through the `as_*` accessors above, which
// return `None` whenever the wrapped dialect lacks the facet.

impl MultigetGridDialect for LoggingGridDialect {
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>> {
        trace!("Reading {} tuples in one call", keys.len());
        match self.inner.as_multiget() {
            Some(multiget) => multiget.get_tuples(keys, context),
            None => keys.iter().map(|key| self.inner.get_tuple(key, context)).collect(),
        }
    }
}

impl BatchableGridDialect for LoggingGridDialect {
    fn execute_batch(&self, queue: &OperationsQueue) -> Result<()> {
        trace!("Executing batch of {} operations", queue.len());
        match self.inner.as_batchable() {
            Some(batchable) => batchable.execute_batch(queue),
            None => Ok(()),
        }
    }
}

impl QueryableGridDialect for LoggingGridDialect {
    fn parse_native_query(&self, native_query: &str) -> Result<BackendQuery> {
        trace!("Parsing native query: {}", native_query);
        match self.inner.as_queryable() {
            Some(queryable) => queryable.parse_native_query(native_query),
            None => Err(Error::invalid_query("dialect does not support native queries")),
        }
    }

    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        context: &TupleContext,
    ) -> Result<Box<dyn ClosableIterator>> {
        trace!("Executing native backend query: {:?}", query);
        match self.inner.as_queryable() {
            Some(queryable) => queryable.execute_backend_query(query, parameters, context),
            None => Err(Error::invalid_query("dialect does not support native queries")),
        }
    }

    fn execute_backend_update_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        context: &TupleContext,
    ) -> Result<usize> {
        trace!("Executing native backend update query: {:?}", query);
        match self.inner.as_queryable() {
            Some(queryable) => queryable.execute_backend_update_query(query, parameters, context),
            None => Err(Error::invalid_query("dialect does not support native queries")),
        }
    }
}

impl SessionFactoryLifecycleAwareDialect for LoggingGridDialect {
    fn session_factory_created(&self, session_factory: &SessionFactoryHandle) {
        trace!("Session factory {} created", session_factory.name());
        if let Some(aware) = self.inner.as_lifecycle_aware() {
            aware.session_factory_created(session_factory);
        }
    }
}

impl OptimisticLockingAwareGridDialect for LoggingGridDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool> {
        trace!("Updating tuple with key {} under optimistic lock", key);
        match self.inner.as_optimistic_locking_aware() {
            Some(locking) => {
                locking.update_tuple_with_optimistic_lock(key, old_lock_state, tuple, context)
            }
            None => Err(Error::dialect("dialect does not support optimistic locking")),
        }
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool> {
        trace!("Removing tuple with key {} under optimistic lock", key);
        match self.inner.as_optimistic_locking_aware() {
            Some(locking) => {
                locking.remove_tuple_with_optimistic_lock(key, old_lock_state, context)
            }
            None => Err(Error::dialect("dialect does not support optimistic locking")),
        }
    }
}

impl IdentityColumnAwareGridDialect for LoggingGridDialect {
    fn create_identity_tuple(&self, metadata: &EntityKeyMetadata, context: &TupleContext) -> Tuple {
        trace!(
            "Building tuple for {} with generated id (does not access the datastore)",
            metadata.table()
        );
        match self.inner.as_identity_column_aware() {
            Some(identity) => identity.create_identity_tuple(metadata, context),
            None => Tuple::new(),
        }
    }

    fn insert_identity_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<EntityKey> {
        trace!("Inserting tuple into {} with generated id", metadata.table());
        match self.inner.as_identity_column_aware() {
            Some(identity) => identity.insert_identity_tuple(metadata, tuple, context),
            None => Err(Error::dialect("dialect does not generate identity columns")),
        }
    }
}
