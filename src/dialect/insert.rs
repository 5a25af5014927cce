//! Duplicate insert prevention

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Error, Result};
use crate::dialect::context::{OperationContext, TupleContext};
use crate::dialect::queue::PendingWrite;
use crate::dialect::GridDialect;
use crate::model::key::EntityKey;
use crate::model::Tuple;

/// How a dialect detects the insert of an entity that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateInsertPreventionStrategy {
    /// The engine looks the key up before inserting
    #[default]
    LookUp,
    /// The datastore rejects the insert itself
    Native,
}

/// Tuple holding only the key columns of `key`, used as duplicate id
pub fn id_tuple(key: &EntityKey) -> Tuple {
    let mut tuple = Tuple::new();
    for (column, value) in key.columns() {
        tuple.put(column, value.clone());
    }
    tuple
}

/// Insert a new entity, failing with `Error::TupleAlreadyExists` if it exists
///
/// Under `LookUp` the last write queued for the key in the context's batch
/// queue decides: a queued write is a duplicate and a queued remove frees the
/// key. Without a queued write the entity exists when the dialect can load
/// it. Under `Native` the dialect reports duplicates from
/// `insert_or_update_tuple`.
pub fn insert_tuple(
    dialect: &dyn GridDialect,
    key: &EntityKey,
    tuple: &Tuple,
    context: &TupleContext,
) -> Result<()> {
    match dialect.duplicate_insert_prevention_strategy(key.metadata()) {
        DuplicateInsertPreventionStrategy::LookUp => {
            let pending = context
                .operations_queue()
                .and_then(|queue| queue.pending_write(key));
            let exists = match pending {
                Some(PendingWrite::Write) => true,
                Some(PendingWrite::Remove) => false,
                None => dialect.get_tuple(key, context)?.is_some(),
            };
            if exists {
                debug!("Rejecting duplicate insert of {}", key);
                return Err(Error::tuple_already_exists(
                    key.metadata().clone(),
                    id_tuple(key),
                ));
            }
            dialect.insert_or_update_tuple(key, tuple, context)
        }
        DuplicateInsertPreventionStrategy::Native => {
            dialect.insert_or_update_tuple(key, tuple, context)
        }
    }
}
