//! Optional dialect capabilities
//!
//! A dialect advertises a facet by returning itself from the matching
//! `GridDialect::as_*` accessor. Callers resolve facets once through
//! [`crate::dialect::capabilities::DialectCapabilities`].

use std::sync::Arc;

use uuid::Uuid;

use crate::core::Result;
use crate::dialect::context::TupleContext;
use crate::dialect::query::{BackendQuery, ClosableIterator, QueryParameters};
use crate::dialect::queue::OperationsQueue;
use crate::model::key::{EntityKey, EntityKeyMetadata};
use crate::model::Tuple;

/// Loads several tuples in one round trip
pub trait MultigetGridDialect: Send + Sync {
    /// One entry per key, in key order; `None` for keys that are not stored
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>>;
}

/// Writes guarded by the version columns the engine read earlier
///
/// `old_lock_state` holds the lock columns as they were loaded. A write only
/// happens when every one of them still holds that value in the datastore,
/// checked atomically with the write. `Ok(false)` reports a concurrent
/// modification, not an error.
pub trait OptimisticLockingAwareGridDialect: Send + Sync {
    /// Apply `tuple`'s operations if the stored lock columns are unchanged
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool>;

    /// Remove the entity if the stored lock columns are unchanged
    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool>;
}

/// Lets the datastore generate entity ids on insert
pub trait IdentityColumnAwareGridDialect: Send + Sync {
    /// Build a transient tuple for an entity whose id is not known yet
    fn create_identity_tuple(&self, metadata: &EntityKeyMetadata, context: &TupleContext) -> Tuple;

    /// Insert `tuple` under a freshly generated id
    ///
    /// The id is written into the tuple's key column and the key it was
    /// stored under is returned.
    fn insert_identity_tuple(
        &self,
        metadata: &Arc<EntityKeyMetadata>,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<EntityKey>;
}

/// Applies a unit of work's queued writes together
pub trait BatchableGridDialect: Send + Sync {
    /// Drain `queue` and apply every operation in enqueue order
    fn execute_batch(&self, queue: &OperationsQueue) -> Result<()>;
}

/// Executes queries in the datastore's native language
pub trait QueryableGridDialect: Send + Sync {
    /// Parse a native query once, for repeated execution
    fn parse_native_query(&self, native_query: &str) -> Result<BackendQuery>;

    /// Execute a read query
    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        context: &TupleContext,
    ) -> Result<Box<dyn ClosableIterator>>;

    /// Execute a write query, returning the number of affected entities
    fn execute_backend_update_query(
        &self,
        query: &BackendQuery,
        parameters: &QueryParameters,
        context: &TupleContext,
    ) -> Result<usize>;
}

/// Handle describing the session factory that finished bootstrapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFactoryHandle {
    id: Uuid,
    name: String,
}

impl SessionFactoryHandle {
    /// Handle for a factory called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Unique id of the factory
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the factory
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Notified once the session factory is fully built
pub trait SessionFactoryLifecycleAwareDialect: Send + Sync {
    /// Called exactly once after bootstrap
    fn session_factory_created(&self, session_factory: &SessionFactoryHandle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::capabilities::{DialectCapabilities, Facet, ResolvedDialect};
    use crate::dialect::context::{AssociationContext, AssociationTypeContext, TupleTypeContext};
    use crate::dialect::{GridDialect, ModelConsumer};
    use crate::model::key::{AssociationKey, AssociationKeyMetadata, NextValueRequest};
    use crate::model::Association;
    use crate::types::Value;

    /// Dialect implementing only the required protocol
    #[derive(Debug)]
    struct BareDialect;

    impl GridDialect for BareDialect {
        fn get_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<Option<Tuple>> {
            Ok(key.column_value("id").map(|id| {
                let mut tuple = Tuple::new();
                tuple.put("id", id.clone());
                tuple
            }))
        }

        fn create_tuple(&self, _key: &EntityKey, _context: &TupleContext) -> Tuple {
            Tuple::new()
        }

        fn insert_or_update_tuple(
            &self,
            _key: &EntityKey,
            _tuple: &Tuple,
            _context: &TupleContext,
        ) -> Result<()> {
            Ok(())
        }

        fn remove_tuple(&self, _key: &EntityKey, _context: &TupleContext) -> Result<()> {
            Ok(())
        }

        fn get_association(
            &self,
            _key: &AssociationKey,
            _context: &AssociationContext,
        ) -> Result<Option<Association>> {
            Ok(None)
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
            _key: &AssociationKey,
            _association: &Association,
            _context: &AssociationContext,
        ) -> Result<()> {
            Ok(())
        }

        fn remove_association(
            &self,
            _key: &AssociationKey,
            _context: &AssociationContext,
        ) -> Result<()> {
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
            Ok(request.initial_value())
        }

        fn for_each_tuple(
            &self,
            _consumer: &mut dyn ModelConsumer,
            _context: &TupleTypeContext,
            _metadata: &[Arc<EntityKeyMetadata>],
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_session_factory_handles_are_unique() {
        let first = SessionFactoryHandle::new("orders");
        let second = SessionFactoryHandle::new("orders");

        assert_eq!(first.name(), "orders");
        assert_ne!(first.id(), second.id());
        assert_ne!(first, second);
        assert_eq!(first.clone(), first);
    }

    #[test]
    fn test_bare_dialect_exposes_no_facet() {
        let dialect = BareDialect;
        assert!(dialect.as_multiget().is_none());
        assert!(dialect.as_batchable().is_none());
        assert!(dialect.as_queryable().is_none());
        assert!(dialect.as_lifecycle_aware().is_none());
        assert!(dialect.as_optimistic_locking_aware().is_none());
        assert!(dialect.as_identity_column_aware().is_none());

        let capabilities = DialectCapabilities::resolve(&dialect);
        assert!(capabilities.facets().is_empty());
        assert!(!capabilities.supports_sequences());
        assert!(Facet::ALL.iter().all(|facet| !capabilities.has(*facet)));
    }

    #[test]
    fn test_resolved_bare_dialect_falls_back_to_single_gets() {
        let resolved = ResolvedDialect::new(Arc::new(BareDialect));
        let metadata = Arc::new(EntityKeyMetadata::new("Person", ["id"]));
        let keys: Vec<_> = (1..=3)
            .map(|id| EntityKey::new(Arc::clone(&metadata), vec![Value::Int(id)]).unwrap())
            .collect();

        let tuples = resolved.get_tuples(&keys, &TupleContext::default()).unwrap();
        let ids: Vec<_> = tuples
            .iter()
            .map(|tuple| tuple.as_ref().and_then(|tuple| tuple.get("id")))
            .collect();
        assert_eq!(ids, vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]);
        assert!(!resolved.bootstrap(&SessionFactoryHandle::new("orders")));
    }
}
