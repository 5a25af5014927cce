//! Compensation decorator
//!
//! [`CompensatingGridDialect`] records every write that reached the wrapped
//! dialect during one flush cycle. When a write fails, the registered
//! [`ErrorHandler`] sees the failed operation together with the operations
//! applied before it, and decides whether the error propagates. Datastores
//! without transactions use this history to undo a partially applied flush.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::{Error, Result};
use crate::dialect::context::{
    AssociationContext, AssociationTypeContext, TupleContext, TupleTypeContext,
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

/// One dialect call as seen by an [`ErrorHandler`]
#[derive(Debug, Clone)]
pub enum GridDialectOperation {
    /// `GridDialect::create_tuple`
    CreateTupleWithKey {
        /// Entity key
        key: EntityKey,
    },
    /// `GridDialect::insert_or_update_tuple`
    InsertOrUpdateTuple {
        /// Entity key
        key: EntityKey,
        /// Tuple whose operations were applied
        tuple: Tuple,
    },
    /// `GridDialect::remove_tuple`
    RemoveTuple {
        /// Entity key
        key: EntityKey,
    },
    /// `GridDialect::create_association`
    CreateAssociationWithKey {
        /// Association key
        key: AssociationKey,
    },
    /// `GridDialect::insert_or_update_association`
    InsertOrUpdateAssociation {
        /// Association key
        key: AssociationKey,
        /// Association whose operations were applied
        association: Association,
    },
    /// `GridDialect::remove_association`
    RemoveAssociation {
        /// Association key
        key: AssociationKey,
    },
    /// `IdentityColumnAwareGridDialect::create_identity_tuple`
    CreateTuple {
        /// Entity type
        metadata: Arc<EntityKeyMetadata>,
    },
    /// `IdentityColumnAwareGridDialect::insert_identity_tuple`
    InsertTuple {
        /// Entity type
        metadata: Arc<EntityKeyMetadata>,
        /// Inserted tuple, holding the generated id once applied
        tuple: Tuple,
    },
    /// `OptimisticLockingAwareGridDialect::update_tuple_with_optimistic_lock`
    UpdateTupleWithOptimisticLock {
        /// Entity key
        key: EntityKey,
        /// Lock columns as loaded
        old_lock_state: Tuple,
        /// Tuple whose operations were applied
        tuple: Tuple,
    },
    /// `OptimisticLockingAwareGridDialect::remove_tuple_with_optimistic_lock`
    RemoveTupleWithOptimisticLock {
        /// Entity key
        key: EntityKey,
        /// Lock columns as loaded
        old_lock_state: Tuple,
    },
    /// `BatchableGridDialect::execute_batch`
    ExecuteBatch {
        /// The queued writes, in enqueue order
        operations: Vec<GridDialectOperation>,
    },
}

impl GridDialectOperation {
    /// Name of the dialect call
    pub fn name(&self) -> &'static str {
        match self {
            GridDialectOperation::CreateTupleWithKey { .. } => "create_tuple_with_key",
            GridDialectOperation::InsertOrUpdateTuple { .. } => "insert_or_update_tuple",
            GridDialectOperation::RemoveTuple { .. } => "remove_tuple",
            GridDialectOperation::CreateAssociationWithKey { .. } => "create_association_with_key",
            GridDialectOperation::InsertOrUpdateAssociation { .. } => {
                "insert_or_update_association"
            }
            GridDialectOperation::RemoveAssociation { .. } => "remove_association",
            GridDialectOperation::CreateTuple { .. } => "create_tuple",
            GridDialectOperation::InsertTuple { .. } => "insert_tuple",
            GridDialectOperation::UpdateTupleWithOptimisticLock { .. } => {
                "update_tuple_with_optimistic_lock"
            }
            GridDialectOperation::RemoveTupleWithOptimisticLock { .. } => {
                "remove_tuple_with_optimistic_lock"
            }
            GridDialectOperation::ExecuteBatch { .. } => "execute_batch",
        }
    }
}

impl From<&QueuedOperation> for GridDialectOperation {
    fn from(operation: &QueuedOperation) -> Self {
        match operation {
            QueuedOperation::InsertOrUpdateTuple { key, tuple, .. } => {
                GridDialectOperation::InsertOrUpdateTuple {
                    key: key.clone(),
                    tuple: tuple.clone(),
                }
            }
            QueuedOperation::RemoveTuple { key, .. } => {
                GridDialectOperation::RemoveTuple { key: key.clone() }
            }
            QueuedOperation::InsertOrUpdateAssociation { key, association, .. } => {
                GridDialectOperation::InsertOrUpdateAssociation {
                    key: key.clone(),
                    association: association.clone(),
                }
            }
            QueuedOperation::RemoveAssociation { key, .. } => {
                GridDialectOperation::RemoveAssociation { key: key.clone() }
            }
        }
    }
}

/// What happens to a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandlingStrategy {
    /// Propagate the error to the caller
    #[default]
    Abort,
    /// Swallow the error and carry on with the flush
    Continue,
}

/// A failed operation and the history leading up to it
#[derive(Debug)]
pub struct FailedOperationContext<'a> {
    failed_operation: &'a GridDialectOperation,
    error: &'a Error,
    applied_operations: &'a [GridDialectOperation],
}

impl<'a> FailedOperationContext<'a> {
    /// The operation that failed
    pub fn failed_operation(&self) -> &'a GridDialectOperation {
        self.failed_operation
    }

    /// The error it failed with
    pub fn error(&self) -> &'a Error {
        self.error
    }

    /// Operations applied earlier in this flush cycle, in call order
    pub fn applied_operations(&self) -> &'a [GridDialectOperation] {
        self.applied_operations
    }
}

/// Decides how a failed dialect call is handled
pub trait ErrorHandler: Send + Sync {
    /// Called once per failed operation, before the error propagates
    fn on_failed_operation(&self, context: &FailedOperationContext<'_>) -> ErrorHandlingStrategy;
}

impl<F> ErrorHandler for F
where
    F: Fn(&FailedOperationContext<'_>) -> ErrorHandlingStrategy + Send + Sync,
{
    fn on_failed_operation(&self, context: &FailedOperationContext<'_>) -> ErrorHandlingStrategy {
        self(context)
    }
}

/// Handler that aborts on every failure
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortingErrorHandler;

impl ErrorHandler for AbortingErrorHandler {
    fn on_failed_operation(&self, _context: &FailedOperationContext<'_>) -> ErrorHandlingStrategy {
        ErrorHandlingStrategy::Abort
    }
}

/// Records applied writes and consults an [`ErrorHandler`] on failures
///
/// Reads, queries and id generation are forwarded without being recorded.
/// The batching, optimistic locking and identity column facets are exposed
/// when the wrapped dialect has them; the other facets are the wrapped
/// dialect's own.
pub struct CompensatingGridDialect {
    inner: Arc<dyn GridDialect>,
    error_handler: Arc<dyn ErrorHandler>,
    applied: Mutex<Vec<GridDialectOperation>>,
}

impl CompensatingGridDialect {
    /// Wrap `inner`, reporting failures to `error_handler`
    pub fn new(inner: Arc<dyn GridDialect>, error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            inner,
            error_handler,
            applied: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped dialect
    pub fn inner(&self) -> &Arc<dyn GridDialect> {
        &self.inner
    }

    /// Operations applied in the current flush cycle, in call order
    pub fn applied_operations(&self) -> Vec<GridDialectOperation> {
        self.applied.lock().clone()
    }

    /// Take the recorded operations and start a new flush cycle
    pub fn take_applied_operations(&self) -> Vec<GridDialectOperation> {
        std::mem::take(&mut *self.applied.lock())
    }

    fn applied(&self, operation: GridDialectOperation) {
        self.applied.lock().push(operation);
    }

    /// Ask the handler about a failure; `Ok(())` means carry on
    fn failed(&self, operation: &GridDialectOperation, error: Error) -> Result<()> {
        // the handler may call back into this dialect
        let applied = self.applied.lock().clone();
        let context = FailedOperationContext {
            failed_operation: operation,
            error: &error,
            applied_operations: &applied,
        };
        match self.error_handler.on_failed_operation(&context) {
            ErrorHandlingStrategy::Abort => {
                debug!(
                    "Aborting after failed {} with {} applied operations",
                    operation.name(),
                    applied.len()
                );
                Err(error)
            }
            ErrorHandlingStrategy::Continue => {
                warn!("Continuing after failed {}: {}", operation.name(), error);
                Ok(())
            }
        }
    }

    fn record(&self, operation: GridDialectOperation, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.applied(operation);
                Ok(())
            }
            Err(err) => self.failed(&operation, err),
        }
    }
}

impl fmt::Debug for CompensatingGridDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensatingGridDialect")
            .field("inner", &self.inner)
            .field("applied", &self.applied.lock().len())
            .finish()
    }
}

impl GridDialect for CompensatingGridDialect {
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Option<Tuple>> {
        self.inner.get_tuple(key, context)
    }

    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Tuple {
        let tuple = self.inner.create_tuple(key, context);
        self.applied(GridDialectOperation::CreateTupleWithKey { key: key.clone() });
        tuple
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<()> {
        let result = self.inner.insert_or_update_tuple(key, tuple, context);
        self.record(
            GridDialectOperation::InsertOrUpdateTuple {
                key: key.clone(),
                tuple: tuple.clone(),
            },
            result,
        )
    }

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<()> {
        let result = self.inner.remove_tuple(key, context);
        self.record(GridDialectOperation::RemoveTuple { key: key.clone() }, result)
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
        let association = self.inner.create_association(key, context);
        self.applied(GridDialectOperation::CreateAssociationWithKey { key: key.clone() });
        association
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<()> {
        let result = self
            .inner
            .insert_or_update_association(key, association, context);
        self.record(
            GridDialectOperation::InsertOrUpdateAssociation {
                key: key.clone(),
                association: association.clone(),
            },
            result,
        )
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<()> {
        let result = self.inner.remove_association(key, context);
        self.record(GridDialectOperation::RemoveAssociation { key: key.clone() }, result)
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
        self.inner.as_batchable().map(|_| self as &dyn BatchableGridDialect)
    }

    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.inner.as_queryable()
    }

    fn as_lifecycle_aware(&self) -> Option<&dyn SessionFactoryLifecycleAwareDialect> {
        self.inner.as_lifecycle_aware()
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

impl BatchableGridDialect for CompensatingGridDialect {
    fn execute_batch(&self, queue: &OperationsQueue) -> Result<()> {
        let operations = queue
            .pending_operations()
            .iter()
            .map(GridDialectOperation::from)
            .collect();
        let result = match self.inner.as_batchable() {
            Some(batchable) => batchable.execute_batch(queue),
            None => Ok(()),
        };
        self.record(GridDialectOperation::ExecuteBatch { operations }, result)
    }
}

impl OptimisticLockingAwareGridDialect for CompensatingGridDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool> {
        let Some(locking) = self.inner.as_optimistic_locking_aware() else {
            return Err(Error::dialect("dialect does not support optimistic locking"));
        };
        let operation = GridDialectOperation::UpdateTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
            tuple: tuple.clone(),
        };
        match locking.update_tuple_with_optimistic_lock(key, old_lock_state, tuple, context) {
            Ok(true) => {
                self.applied(operation);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => self.failed(&operation, err).map(|()| false),
        }
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool> {
        let Some(locking) = self.inner.as_optimistic_locking_aware() else {
            return Err(Error::dialect("dialect does not support optimistic locking"));
        };
        let operation = GridDialectOperation::RemoveTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
        };
        match locking.remove_tuple_with_optimistic_lock(key, old_lock_state, context) {
            Ok(true) => {
                self.applied(operation);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => self.failed(&operation, err).map(|()| false),
        }
    }
}

impl IdentityColumnAwareGridDialect for CompensatingGridDialect {
    fn create_identity_tuple(&self, metadata: &EntityKeyMetadata, context: &TupleContext) -> Tuple {
        let tuple = match self.inner.as_identity_column_aware() {
            Some(identity) => identity.create_identity_tuple(metadata, context),
            None => Tuple::new(),
        };
        self.applied(GridDialectOperation::CreateTuple {
            metadata: Arc::new(metadata.clone()),
        });
        tuple
    }

    /// A failed identity insert has no key to return, so its error
    /// propagates even when the handler continues.
    fn insert_identity_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<EntityKey> {
        let Some(identity) = self.inner.as_identity_column_aware() else {
            return Err(Error::dialect("dialect does not generate identity columns"));
        };
        match identity.insert_identity_tuple(metadata, tuple, context) {
            Ok(key) => {
                self.applied(GridDialectOperation::InsertTuple {
                    metadata: Arc::clone(metadata),
                    tuple: tuple.clone(),
                });
                Ok(key)
            }
            Err(err) => {
                let message = err.to_string();
                let operation = GridDialectOperation::InsertTuple {
                    metadata: Arc::clone(metadata),
                    tuple: tuple.clone(),
                };
                self.failed(&operation, err)?;
                Err(Error::dialect(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::batch::BatchingGridDialect;
    use crate::dialect::capabilities::DialectCapabilities;
    use crate::storage::map::{MapDatastore, MapDialect};
    use crate::types::Value;

    /// Remembers what it was shown and answers with a fixed strategy
    #[derive(Default)]
    struct RecordingHandler {
        strategy: ErrorHandlingStrategy,
        seen: Mutex<Vec<(&'static str, Vec<&'static str>, bool)>>,
    }

    impl RecordingHandler {
        fn answering(strategy: ErrorHandlingStrategy) -> Arc<Self> {
            Arc::new(Self {
                strategy,
                ..Self::default()
            })
        }
    }

    impl ErrorHandler for RecordingHandler {
        fn on_failed_operation(
            &self,
            context: &FailedOperationContext<'_>,
        ) -> ErrorHandlingStrategy {
            let applied = context.applied_operations().iter().map(|op| op.name()).collect();
            self.seen.lock().push((
                context.failed_operation().name(),
                applied,
                context.error().is_duplicate_key(),
            ));
            self.strategy
        }
    }

    fn person(id: i64) -> EntityKey {
        let metadata = Arc::new(EntityKeyMetadata::new("Person", ["id"]));
        EntityKey::new(metadata, vec![Value::Int(id)]).unwrap()
    }

    fn compensating(
        handler: Arc<dyn ErrorHandler>,
    ) -> (Arc<MapDatastore>, CompensatingGridDialect) {
        let datastore = Arc::new(MapDatastore::new());
        let map = MapDialect::new(datastore.clone(), DuplicateInsertPreventionStrategy::Native);
        let batching = BatchingGridDialect::new(Arc::new(map));
        (datastore, CompensatingGridDialect::new(Arc::new(batching), handler))
    }

    fn insert_person(dialect: &CompensatingGridDialect, id: i64, name: &str) -> Result<()> {
        let context = TupleContext::default();
        let mut tuple = dialect.create_tuple(&person(id), &context);
        tuple.put("name", Value::from(name));
        dialect.insert_or_update_tuple(&person(id), &tuple, &context)
    }

    fn names(operations: &[GridDialectOperation]) -> Vec<&'static str> {
        operations.iter().map(GridDialectOperation::name).collect()
    }

    #[test]
    fn test_records_applied_writes_in_call_order() {
        let (datastore, dialect) = compensating(Arc::new(AbortingErrorHandler));
        insert_person(&dialect, 1, "Ada").unwrap();
        dialect.remove_tuple(&person(1), &TupleContext::default()).unwrap();

        assert!(!datastore.contains_entity(&person(1)));
        assert_eq!(
            names(&dialect.applied_operations()),
            vec!["create_tuple_with_key", "insert_or_update_tuple", "remove_tuple"]
        );
        assert_eq!(dialect.take_applied_operations().len(), 3);
        assert!(dialect.applied_operations().is_empty());
    }

    #[test]
    fn test_abort_propagates_failure_with_history() {
        let handler = RecordingHandler::answering(ErrorHandlingStrategy::Abort);
        let (datastore, dialect) = compensating(handler.clone());
        insert_person(&dialect, 1, "Ada").unwrap();

        let err = insert_person(&dialect, 1, "Imposter").unwrap_err();
        assert!(err.is_duplicate_key());

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "insert_or_update_tuple");
        assert_eq!(
            seen[0].1,
            vec!["create_tuple_with_key", "insert_or_update_tuple", "create_tuple_with_key"]
        );
        assert!(seen[0].2);
        assert_eq!(dialect.applied_operations().len(), 3);
        assert_eq!(
            datastore.entity(&person(1)).unwrap().get("name"),
            Some(&Value::from("Ada"))
        );
    }

    #[test]
    fn test_continue_swallows_failure() {
        let handler = RecordingHandler::answering(ErrorHandlingStrategy::Continue);
        let (datastore, dialect) = compensating(handler.clone());
        insert_person(&dialect, 1, "Ada").unwrap();

        insert_person(&dialect, 1, "Imposter").unwrap();
        assert_eq!(handler.seen.lock().len(), 1);
        assert_eq!(
            datastore.entity(&person(1)).unwrap().get("name"),
            Some(&Value::from("Ada"))
        );
        let applied = dialect.applied_operations();
        assert_eq!(
            applied.last().map(GridDialectOperation::name),
            Some("create_tuple_with_key")
        );
    }

    #[test]
    fn test_batch_recorded_as_one_operation() {
        let (datastore, dialect) = compensating(Arc::new(AbortingErrorHandler));
        let queue = OperationsQueue::new();
        let context = TupleContext::default().with_operations_queue(queue.clone());

        let mut tuple = Tuple::new();
        tuple.put("name", Value::from("Ada"));
        dialect.insert_or_update_tuple(&person(1), &tuple, &context).unwrap();
        dialect.insert_or_update_tuple(&person(2), &tuple, &context).unwrap();
        assert_eq!(datastore.entity_count(), 0);

        dialect.as_batchable().unwrap().execute_batch(&queue).unwrap();
        assert_eq!(datastore.entity_count(), 2);

        let applied = dialect.take_applied_operations();
        match applied.last() {
            Some(GridDialectOperation::ExecuteBatch { operations }) => {
                assert_eq!(
                    names(operations),
                    vec!["insert_or_update_tuple", "insert_or_update_tuple"]
                );
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_only_successful_locked_writes_are_recorded() {
        let (_datastore, dialect) = compensating(Arc::new(AbortingErrorHandler));
        let context = TupleContext::default();
        let mut version = Tuple::new();
        version.put("version", Value::Int(1));
        let mut stored = dialect.create_tuple(&person(1), &context);
        stored.put("version", Value::Int(1));
        dialect.insert_or_update_tuple(&person(1), &stored, &context).unwrap();
        dialect.take_applied_operations();

        let mut bump = Tuple::new();
        bump.put("version", Value::Int(2));
        let locking = dialect.as_optimistic_locking_aware().unwrap();
        assert!(locking
            .update_tuple_with_optimistic_lock(&person(1), &version, &bump, &context)
            .unwrap());
        assert!(!locking
            .remove_tuple_with_optimistic_lock(&person(1), &version, &context)
            .unwrap());

        assert_eq!(
            names(&dialect.applied_operations()),
            vec!["update_tuple_with_optimistic_lock"]
        );
    }

    #[test]
    fn test_exposes_facets_of_wrapped_dialect() {
        let (datastore, dialect) = compensating(Arc::new(AbortingErrorHandler));
        let map = MapDialect::new(datastore, DuplicateInsertPreventionStrategy::Native);
        assert_eq!(
            DialectCapabilities::resolve(&dialect).facets(),
            DialectCapabilities::resolve(&map).facets()
        );
    }
}
