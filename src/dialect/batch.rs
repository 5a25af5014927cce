//! Batching decorator

use std::sync::Arc;

use tracing::{trace, warn};

use crate::core::Result;
use crate::dialect::context::{
    AssociationContext, AssociationTypeContext, OperationContext, TupleContext, TupleTypeContext,
};
use crate::dialect::facets::{
    BatchableGridDialect, IdentityColumnAwareGridDialect, MultigetGridDialect,
    OptimisticLockingAwareGridDialect, QueryableGridDialect, SessionFactoryLifecycleAwareDialect,
};
use crate::dialect::insert::DuplicateInsertPreventionStrategy;
use crate::dialect::queue::{OperationsQueue, QueuedOperation};
use crate::dialect::{GridDialect, ModelConsumer};
use crate::model::key::{
    AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, NextValueRequest,
};
use crate::model::{Association, Tuple};
use crate::types::{GridType, ValueKind};

/// Defers writes into the unit of work's queue while it is open
///
/// Writes whose context carries no queue, or a closed one, go straight to
/// the wrapped dialect. Reads always do, as do optimistic lock and identity
/// writes, which need the stored state at call time.
#[derive(Debug)]
pub struct BatchingGridDialect {
    inner: Arc<dyn GridDialect>,
}

impl BatchingGridDialect {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn GridDialect>) -> Self {
        Self { inner }
    }

    /// The wrapped dialect
    pub fn inner(&self) -> &Arc<dyn GridDialect> {
        &self.inner
    }

    fn open_queue<C: OperationContext>(context: &C) -> Option<&OperationsQueue> {
        context.operations_queue().filter(|queue| !queue.is_closed())
    }

    fn apply(&self, operation: QueuedOperation) -> Result<()> {
        match operation {
            QueuedOperation::InsertOrUpdateTuple {
                key,
                tuple,
                context,
            } => self.inner.insert_or_update_tuple(&key, &tuple, &context),
            QueuedOperation::RemoveTuple { key, context } => {
                self.inner.remove_tuple(&key, &context)
            }
            QueuedOperation::InsertOrUpdateAssociation {
                key,
                association,
                context,
            } => self
                .inner
                .insert_or_update_association(&key, &association, &context),
            QueuedOperation::RemoveAssociation { key, context } => {
                self.inner.remove_association(&key, &context)
            }
        }
    }
}

impl GridDialect for BatchingGridDialect {
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Option<Tuple>> {
        self.inner.get_tuple(key, context)
    }

    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Tuple {
        self.inner.create_tuple(key, context)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<()> {
        match Self::open_queue(context) {
            Some(queue) => queue.add(QueuedOperation::InsertOrUpdateTuple {
                key: key.clone(),
                tuple: tuple.clone(),
                context: context.clone(),
            }),
            None => self.inner.insert_or_update_tuple(key, tuple, context),
        }
    }

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<()> {
        match Self::open_queue(context) {
            Some(queue) => queue.add(QueuedOperation::RemoveTuple {
                key: key.clone(),
                context: context.clone(),
            }),
            None => self.inner.remove_tuple(key, context),
        }
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>> {
        self.inner.get_association(key, context)
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Association {
        self.inner.create_association(key, context)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<()> {
        match Self::open_queue(context) {
            Some(queue) => queue.add(QueuedOperation::InsertOrUpdateAssociation {
                key: key.clone(),
                association: association.clone(),
                context: context.clone(),
            }),
            None => self.inner.insert_or_update_association(key, association, context),
        }
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<()> {
        match Self::open_queue(context) {
            Some(queue) => queue.add(QueuedOperation::RemoveAssociation {
                key: key.clone(),
                context: context.clone(),
            }),
            None => self.inner.remove_association(key, context),
        }
    }

    fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        self.inner.is_stored_in_entity_structure(metadata, context)
    }

    fn next_value(&self, request: &NextValueRequest) -> Result<i64> {
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
        self.inner.as_multiget()
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        Some(self)
    }

    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.inner.as_queryable()
    }

    fn as_lifecycle_aware(&self) -> Option<&dyn SessionFactoryLifecycleAwareDialect> {
        self.inner.as_lifecycle_aware()
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.inner.as_optimistic_locking_aware()
    }

    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        self.inner.as_identity_column_aware()
    }
}

impl BatchableGridDialect for BatchingGridDialect {
    fn execute_batch(&self, queue: &OperationsQueue) -> Result<()> {
        trace!("Executing batch of {} operations", queue.len());
        let result = match self.inner.as_batchable() {
            Some(batchable) => batchable.execute_batch(queue),
            None => queue
                .drain()?
                .into_iter()
                .try_for_each(|operation| self.apply(operation)),
        };
        if let Err(err) = &result {
            if let Some(duplicate) = err.as_tuple_already_exists() {
                warn!("Batch flush rejected: {}", duplicate);
            }
        }
        result
    }
}
