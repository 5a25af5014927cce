//! Context objects handed to every dialect call
//!
//! Type contexts describe an entity type or association and are built once
//! per type. Operation contexts add what belongs to one unit of work: the
//! transaction and the batch queue.

use std::sync::Arc;

use uuid::Uuid;

use crate::dialect::options::OptionsContext;
use crate::dialect::queue::OperationsQueue;
use crate::model::key::AssociatedEntitiesMetadata;
use crate::model::Tuple;
use crate::types::Value;

/// Identifier of the transaction an operation runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionContext {
    id: Uuid,
}

impl TransactionContext {
    /// Context of a new transaction
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Context of an existing transaction
    pub fn with_id(id: Uuid) -> Self {
        Self { id }
    }

    /// Transaction identifier
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Static information about one entity type
#[derive(Debug, Clone)]
pub struct TupleTypeContext {
    selectable_columns: Vec<String>,
    associated_entities: Arc<AssociatedEntitiesMetadata>,
    options: Arc<OptionsContext>,
    discriminator_column: Option<String>,
    discriminator_value: Option<Value>,
}

impl Default for TupleTypeContext {
    fn default() -> Self {
        Self {
            selectable_columns: Vec::new(),
            associated_entities: AssociatedEntitiesMetadata::empty(),
            options: OptionsContext::empty(),
            discriminator_column: None,
            discriminator_value: None,
        }
    }
}

impl TupleTypeContext {
    /// Context with the given selectable columns and nothing else
    pub fn new<I, S>(selectable_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectable_columns: selectable_columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the referenced entity metadata
    pub fn with_associated_entities(mut self, metadata: Arc<AssociatedEntitiesMetadata>) -> Self {
        self.associated_entities = metadata;
        self
    }

    /// Set the options
    pub fn with_options(mut self, options: Arc<OptionsContext>) -> Self {
        self.options = options;
        self
    }

    /// Set the discriminator of a type stored in a shared table
    pub fn with_discriminator(
        mut self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.discriminator_column = Some(column.into());
        self.discriminator_value = Some(value.into());
        self
    }

    /// Columns the engine reads for this type
    pub fn selectable_columns(&self) -> &[String] {
        &self.selectable_columns
    }

    /// Entities referenced from columns of this type
    pub fn associated_entities(&self) -> &Arc<AssociatedEntitiesMetadata> {
        &self.associated_entities
    }

    /// Options effective for this type
    pub fn options(&self) -> &Arc<OptionsContext> {
        &self.options
    }

    /// Discriminator column, if several types share the table
    pub fn discriminator_column(&self) -> Option<&str> {
        self.discriminator_column.as_deref()
    }

    /// Discriminator value of this type
    pub fn discriminator_value(&self) -> Option<&Value> {
        self.discriminator_value.as_ref()
    }
}

/// Static information about one association
#[derive(Debug, Clone)]
pub struct AssociationTypeContext {
    options: Arc<OptionsContext>,
    owner_entity_options: Arc<OptionsContext>,
    role_on_main_side: Option<String>,
    owner_type_context: Option<Arc<TupleTypeContext>>,
}

impl Default for AssociationTypeContext {
    fn default() -> Self {
        Self {
            options: OptionsContext::empty(),
            owner_entity_options: OptionsContext::empty(),
            role_on_main_side: None,
            owner_type_context: None,
        }
    }
}

impl AssociationTypeContext {
    /// Context with no options and no owner information
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the association options
    pub fn with_options(mut self, options: Arc<OptionsContext>) -> Self {
        self.options = options;
        self
    }

    /// Set the options of the owning entity type
    pub fn with_owner_entity_options(mut self, options: Arc<OptionsContext>) -> Self {
        self.owner_entity_options = options;
        self
    }

    /// Set the role of the association on its main side
    pub fn with_role_on_main_side(mut self, role: impl Into<String>) -> Self {
        self.role_on_main_side = Some(role.into());
        self
    }

    /// Set the type context of the owning entity
    pub fn with_owner_type_context(mut self, context: Arc<TupleTypeContext>) -> Self {
        self.owner_type_context = Some(context);
        self
    }

    /// Options effective for the association
    pub fn options(&self) -> &Arc<OptionsContext> {
        &self.options
    }

    /// Options effective for the owning entity
    pub fn owner_entity_options(&self) -> &Arc<OptionsContext> {
        &self.owner_entity_options
    }

    /// Role on the main side, for inverse associations
    pub fn role_on_main_side(&self) -> Option<&str> {
        self.role_on_main_side.as_deref()
    }

    /// Type context of the owning entity
    pub fn owner_type_context(&self) -> Option<&Arc<TupleTypeContext>> {
        self.owner_type_context.as_ref()
    }
}

/// Accessors shared by the tuple and association operation contexts
pub trait OperationContext {
    /// Transaction the operation runs in
    fn transaction_context(&self) -> Option<&TransactionContext>;

    /// Batch queue of the unit of work, if batching is active
    fn operations_queue(&self) -> Option<&OperationsQueue>;
}

/// Context of one tuple operation
#[derive(Debug, Clone, Default)]
pub struct TupleContext {
    type_context: Arc<TupleTypeContext>,
    transaction_context: Option<TransactionContext>,
    operations_queue: Option<OperationsQueue>,
}

impl TupleContext {
    /// Context for an operation on a tuple of the given type
    pub fn new(type_context: Arc<TupleTypeContext>) -> Self {
        Self {
            type_context,
            transaction_context: None,
            operations_queue: None,
        }
    }

    /// Attach a transaction
    pub fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction_context = Some(transaction);
        self
    }

    /// Attach a batch queue
    pub fn with_operations_queue(mut self, queue: OperationsQueue) -> Self {
        self.operations_queue = Some(queue);
        self
    }

    /// Copy of this context without the batch queue
    pub fn without_operations_queue(&self) -> Self {
        Self {
            operations_queue: None,
            ..self.clone()
        }
    }

    /// Type context
    pub fn type_context(&self) -> &Arc<TupleTypeContext> {
        &self.type_context
    }

    /// Columns the engine reads for this type
    pub fn selectable_columns(&self) -> &[String] {
        self.type_context.selectable_columns()
    }
}

impl OperationContext for TupleContext {
    fn transaction_context(&self) -> Option<&TransactionContext> {
        self.transaction_context.as_ref()
    }

    fn operations_queue(&self) -> Option<&OperationsQueue> {
        self.operations_queue.as_ref()
    }
}

/// Context of one association operation
#[derive(Debug, Clone, Default)]
pub struct AssociationContext {
    type_context: Arc<AssociationTypeContext>,
    entity_tuple: Option<Tuple>,
    transaction_context: Option<TransactionContext>,
    operations_queue: Option<OperationsQueue>,
}

impl AssociationContext {
    /// Context for an operation on an association of the given type
    pub fn new(type_context: Arc<AssociationTypeContext>) -> Self {
        Self {
            type_context,
            entity_tuple: None,
            transaction_context: None,
            operations_queue: None,
        }
    }

    /// Attach the tuple of the owning entity
    pub fn with_entity_tuple(mut self, tuple: Tuple) -> Self {
        self.entity_tuple = Some(tuple);
        self
    }

    /// Attach a transaction
    pub fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction_context = Some(transaction);
        self
    }

    /// Attach a batch queue
    pub fn with_operations_queue(mut self, queue: OperationsQueue) -> Self {
        self.operations_queue = Some(queue);
        self
    }

    /// Copy of this context without the batch queue
    pub fn without_operations_queue(&self) -> Self {
        Self {
            operations_queue: None,
            ..self.clone()
        }
    }

    /// Type context
    pub fn type_context(&self) -> &Arc<AssociationTypeContext> {
        &self.type_context
    }

    /// Tuple of the owning entity, for dialects storing associations in it
    pub fn entity_tuple(&self) -> Option<&Tuple> {
        self.entity_tuple.as_ref()
    }
}

impl OperationContext for AssociationContext {
    fn transaction_context(&self) -> Option<&TransactionContext> {
        self.transaction_context.as_ref()
    }

    fn operations_queue(&self) -> Option<&OperationsQueue> {
        self.operations_queue.as_ref()
    }
}
