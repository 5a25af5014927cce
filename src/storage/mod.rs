//! Datastore providers
//!
//! A provider owns the connection to one datastore and hands out the grid
//! dialect speaking to it. The crate ships the in-memory [`map`] provider;
//! [`factory`] builds the configured one.

use std::fmt::Debug;
use std::sync::Arc;

use crate::core::Result;
use crate::dialect::GridDialect;

pub mod factory;
pub mod map;

pub use factory::create_provider;
pub use map::{MapDatastore, MapDatastoreProvider, MapDialect};

/// Lifecycle of a datastore and the dialect bound to it
pub trait DatastoreProvider: Debug + Send + Sync {
    /// Provider name, as used in configuration
    fn name(&self) -> &str;

    /// Acquire the datastore; calling it again on a started provider is a no-op
    fn start(&self) -> Result<()>;

    /// Release the datastore and everything stored in it
    fn stop(&self) -> Result<()>;

    /// Dialect speaking to this provider's datastore
    fn dialect(&self) -> Arc<dyn GridDialect>;
}
