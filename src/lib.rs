//! GridBridge - Change-Tracking Entity Persistence for NoSQL Datastores
//!
//! GridBridge sits between an object mapper and a key/value, document or
//! graph store. The mapper reads and writes [`Tuple`]s and [`Association`]s:
//! immutable datastore snapshots overlaid with recorded changes. A backend
//! implements the [`GridDialect`] protocol to apply those changes, and opts
//! into batching, multi-get, native queries, bootstrap notification,
//! optimistic locking and identity columns through optional facets.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod types;

// Entity model and dialect protocol
pub mod model;
pub mod dialect;

// Datastore backends
pub mod storage;

// Re-export commonly used items for convenience
pub use crate::core::{Config, Error, Result};
pub use crate::dialect::{GridDialect, ResolvedDialect};
pub use crate::model::key::{AssociationKey, EntityKey, RowKey};
pub use crate::model::{Association, Tuple};
pub use crate::types::Value;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
