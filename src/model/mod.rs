//! Tuple and association model shared by the engine and every dialect

pub mod key;
pub mod snapshot;
pub mod tuple;
pub mod association;

pub use association::{Association, AssociationOperation};
pub use snapshot::{AssociationSnapshot, TupleSnapshot};
pub use tuple::{SnapshotType, Tuple, TupleOperation, TupleOperationType};
