//! The grid dialect protocol
//!
//! This module defines the contract every datastore adapter implements. The
//! engine reads state into [`Tuple`]s and [`Association`]s through a dialect,
//! mutates them, and hands them back so the dialect can apply their diff.
//!
//! Optional capabilities are separate traits in [`facets`], exposed through
//! the `as_*` accessors of [`GridDialect`]. Decorators in [`logger`],
//! [`batch`] and [`compensation`] wrap any dialect without it knowing.

use std::fmt;
use std::sync::Arc;

use crate::core::Result;
use crate::model::key::{
    AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, NextValueRequest,
};
use crate::model::{Association, Tuple};
use crate::types::{GridType, ValueKind};

pub mod batch;
pub mod capabilities;
pub mod compensation;
pub mod context;
pub mod facets;
pub mod insert;
pub mod logger;
pub mod options;
pub mod query;
pub mod queue;

pub use batch::BatchingGridDialect;
pub use capabilities::{DialectCapabilities, Facet, ResolvedDialect};
pub use compensation::{
    AbortingErrorHandler, CompensatingGridDialect, ErrorHandler, ErrorHandlingStrategy,
    FailedOperationContext, GridDialectOperation,
};
pub use context::{
    AssociationContext, AssociationTypeContext, OperationContext, TransactionContext, TupleContext,
    TupleTypeContext,
};
pub use facets::{
    BatchableGridDialect, IdentityColumnAwareGridDialect, MultigetGridDialect,
    OptimisticLockingAwareGridDialect, QueryableGridDialect, SessionFactoryHandle,
    SessionFactoryLifecycleAwareDialect,
};
pub use insert::{insert_tuple, DuplicateInsertPreventionStrategy};
pub use logger::LoggingGridDialect;
pub use options::{DatastoreOption, OptionsContext};
pub use query::{BackendQuery, ClosableIterator, QueryParameters};
pub use queue::{OperationsQueue, PendingWrite, QueuedOperation};

/// Receives the tuples visited by `GridDialect::for_each_tuple`
pub trait ModelConsumer {
    /// Accept one tuple
    fn consume(&mut self, tuple: Tuple);
}

impl<F: FnMut(Tuple)> ModelConsumer for F {
    fn consume(&mut self, tuple: Tuple) {
        self(tuple)
    }
}

/// Contract between the engine and one datastore
///
/// Absent entities and associations are reported as `Ok(None)`, never as
/// errors. Every write method receives the same instance the engine mutated
/// and applies exactly the diff returned by its `operations()`.
pub trait GridDialect: fmt::Debug + Send + Sync {
    /// Load the tuple stored under `key`
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Option<Tuple>>;

    /// Build a transient tuple for a new entity, without any I/O
    ///
    /// The returned tuple has snapshot type `Insert`.
    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Tuple;

    /// Apply the tuple's operations under `key`
    ///
    /// Re-applying the same diff leaves the datastore unchanged.
    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<()>;

    /// Remove the entity stored under `key`; a no-op when nothing is stored
    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<()>;

    /// Load the association stored under `key`
    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>>;

    /// Build a transient, empty association without any I/O
    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Association;

    /// Apply the association's operations under `key`
    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<()>;

    /// Remove the association stored under `key`; a no-op when nothing is stored
    fn remove_association(&self, key: &AssociationKey, context: &AssociationContext) -> Result<()>;

    /// Whether the association rows live inside the owning entity
    fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool;

    /// Next value of an id source
    ///
    /// The first call for a source returns the request's initial value,
    /// every later call the previous value plus the increment. Concurrent
    /// callers never observe the same value twice.
    fn next_value(&self, request: &NextValueRequest) -> Result<i64>;

    /// Whether `next_value` is backed by native sequences
    fn supports_sequences(&self) -> bool {
        false
    }

    /// Codec replacing the engine's default for values of `kind`
    fn override_type(&self, _kind: ValueKind) -> Option<Arc<dyn GridType>> {
        None
    }

    /// Visit every stored tuple of the given entity types once
    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        context: &TupleTypeContext,
        metadata: &[Arc<EntityKeyMetadata>],
    ) -> Result<()>;

    /// How duplicate inserts of the entity type are detected
    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::LookUp
    }

    /// Whether the inverse side of associations is maintained from
    /// navigational information rather than stored separately
    fn uses_navigational_information_for_inverse_side_of_associations(&self) -> bool {
        false
    }

    /// Multi-get facet
    fn as_multiget(&self) -> Option<&dyn MultigetGridDialect> {
        None
    }

    /// Batching facet
    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        None
    }

    /// Native query facet
    fn as_queryable(&self) -> Option<&dyn QueryableGridDialect> {
        None
    }

    /// Session factory lifecycle facet
    fn as_lifecycle_aware(&self) -> Option<&dyn SessionFactoryLifecycleAwareDialect> {
        None
    }

    /// Optimistic locking facet
    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        None
    }

    /// Datastore generated id facet
    fn as_identity_column_aware(&self) -> Option<&dyn IdentityColumnAwareGridDialect> {
        None
    }
}
