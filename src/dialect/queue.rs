//! Deferred write queue for one unit of work

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Error, Result};
use crate::dialect::context::{AssociationContext, TupleContext};
use crate::model::key::{AssociationKey, EntityKey};
use crate::model::{Association, Tuple};

/// A write deferred until the queue is flushed
///
/// Every variant owns its payload and context, so the engine may keep
/// mutating its own instances after enqueueing.
#[derive(Debug, Clone)]
pub enum QueuedOperation {
    /// Apply a tuple diff
    InsertOrUpdateTuple {
        /// Entity key
        key: EntityKey,
        /// Tuple whose operations are applied
        tuple: Tuple,
        /// Context of the original call, without the queue
        context: TupleContext,
    },
    /// Remove an entity
    RemoveTuple {
        /// Entity key
        key: EntityKey,
        /// Context of the original call, without the queue
        context: TupleContext,
    },
    /// Apply an association diff
    InsertOrUpdateAssociation {
        /// Association key
        key: AssociationKey,
        /// Association whose operations are applied
        association: Association,
        /// Context of the original call, without the queue
        context: AssociationContext,
    },
    /// Remove an association
    RemoveAssociation {
        /// Association key
        key: AssociationKey,
        /// Context of the original call, without the queue
        context: AssociationContext,
    },
}

impl QueuedOperation {
    // a queued context must not hold its own queue
    fn detach_queue(self) -> Self {
        match self {
            QueuedOperation::InsertOrUpdateTuple {
                key,
                tuple,
                context,
            } => QueuedOperation::InsertOrUpdateTuple {
                key,
                tuple,
                context: context.without_operations_queue(),
            },
            QueuedOperation::RemoveTuple { key, context } => QueuedOperation::RemoveTuple {
                key,
                context: context.without_operations_queue(),
            },
            QueuedOperation::InsertOrUpdateAssociation {
                key,
                association,
                context,
            } => QueuedOperation::InsertOrUpdateAssociation {
                key,
                association,
                context: context.without_operations_queue(),
            },
            QueuedOperation::RemoveAssociation { key, context } => {
                QueuedOperation::RemoveAssociation {
                    key,
                    context: context.without_operations_queue(),
                }
            }
        }
    }
}

/// Last queued write for one entity key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWrite {
    /// The entity is written when the queue is flushed
    Write,
    /// The entity is removed when the queue is flushed
    Remove,
}

#[derive(Debug, Default)]
struct QueueState {
    operations: Vec<QueuedOperation>,
    entity_keys: HashMap<EntityKey, PendingWrite>,
    closed: bool,
}

/// Cloneable handle to the queue of one unit of work
///
/// All clones share the same queue. The queue is drained exactly once, in
/// enqueue order, and rejects work afterwards.
#[derive(Clone, Default)]
pub struct OperationsQueue {
    state: Arc<Mutex<QueueState>>,
}

impl OperationsQueue {
    /// Open, empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that rejects every operation
    pub fn closed() -> Self {
        let queue = Self::new();
        queue.close();
        queue
    }

    /// Enqueue an operation
    pub fn add(&self, operation: QueuedOperation) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::QueueClosed);
        }
        match &operation {
            QueuedOperation::InsertOrUpdateTuple { key, .. } => {
                state.entity_keys.insert(key.clone(), PendingWrite::Write);
            }
            QueuedOperation::RemoveTuple { key, .. } => {
                state.entity_keys.insert(key.clone(), PendingWrite::Remove);
            }
            _ => {}
        }
        state.operations.push(operation.detach_queue());
        Ok(())
    }

    /// Whether a write for `key` is pending
    pub fn contains_entity_key(&self, key: &EntityKey) -> bool {
        self.pending_write(key) == Some(PendingWrite::Write)
    }

    /// Last write queued for `key`, if any
    pub fn pending_write(&self, key: &EntityKey) -> Option<PendingWrite> {
        self.state.lock().entity_keys.get(key).copied()
    }

    /// Copies of the pending operations in enqueue order, leaving them queued
    pub fn pending_operations(&self) -> Vec<QueuedOperation> {
        self.state.lock().operations.clone()
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    /// Whether no operation is pending
    pub fn is_empty(&self) -> bool {
        self.state.lock().operations.is_empty()
    }

    /// Whether the queue rejects new work
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Take every pending operation in enqueue order and close the queue
    pub fn drain(&self) -> Result<Vec<QueuedOperation>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::QueueClosed);
        }
        state.closed = true;
        state.entity_keys.clear();
        Ok(std::mem::take(&mut state.operations))
    }

    /// Reject further work, discarding nothing
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl fmt::Debug for OperationsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => f
                .debug_struct("OperationsQueue")
                .field("len", &state.operations.len())
                .field("closed", &state.closed)
                .finish(),
            None => f.write_str("OperationsQueue { <locked> }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::key::EntityKeyMetadata;
    use crate::types::Value;

    fn key(id: i64) -> EntityKey {
        let metadata = Arc::new(EntityKeyMetadata::new("Person", ["id"]));
        EntityKey::new(metadata, vec![Value::Int(id)]).unwrap()
    }

    fn insert(id: i64) -> QueuedOperation {
        QueuedOperation::InsertOrUpdateTuple {
            key: key(id),
            tuple: Tuple::new(),
            context: TupleContext::default(),
        }
    }

    #[test]
    fn test_drain_returns_enqueue_order_once() {
        let queue = OperationsQueue::new();
        queue.add(insert(1)).unwrap();
        queue
            .add(QueuedOperation::RemoveTuple {
                key: key(2),
                context: TupleContext::default(),
            })
            .unwrap();
        queue.add(insert(3)).unwrap();
        assert_eq!(queue.len(), 3);

        let drained = queue.drain().unwrap();
        let ids: Vec<_> = drained
            .iter()
            .map(|op| match op {
                QueuedOperation::InsertOrUpdateTuple { key, .. }
                | QueuedOperation::RemoveTuple { key, .. } => key.column_values()[0].clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert!(matches!(queue.drain(), Err(Error::QueueClosed)));
        assert!(matches!(queue.add(insert(4)), Err(Error::QueueClosed)));
    }

    #[test]
    fn test_tracks_pending_entity_keys() {
        let queue = OperationsQueue::new();
        queue.add(insert(1)).unwrap();
        assert!(queue.contains_entity_key(&key(1)));
        assert!(!queue.contains_entity_key(&key(2)));

        queue
            .add(QueuedOperation::RemoveTuple {
                key: key(1),
                context: TupleContext::default(),
            })
            .unwrap();
        assert!(!queue.contains_entity_key(&key(1)));
        assert_eq!(queue.pending_write(&key(1)), Some(PendingWrite::Remove));
        assert_eq!(queue.pending_write(&key(2)), None);

        queue.add(insert(1)).unwrap();
        assert_eq!(queue.pending_write(&key(1)), Some(PendingWrite::Write));
    }

    #[test]
    fn test_clones_share_state_and_context_queue_is_detached() {
        let queue = OperationsQueue::new();
        let handle = queue.clone();
        handle
            .add(QueuedOperation::InsertOrUpdateTuple {
                key: key(1),
                tuple: Tuple::new(),
                context: TupleContext::default().with_operations_queue(queue.clone()),
            })
            .unwrap();

        assert_eq!(queue.len(), 1);
        match &queue.drain().unwrap()[0] {
            QueuedOperation::InsertOrUpdateTuple { context, .. } => {
                use crate::dialect::context::OperationContext;
                assert!(context.operations_queue().is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_closed_queue_rejects_work() {
        let queue = OperationsQueue::closed();
        assert!(queue.is_closed());
        assert!(matches!(queue.add(insert(1)), Err(Error::QueueClosed)));
    }
}
