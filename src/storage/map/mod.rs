//! In-memory map datastore
//!
//! [`MapDatastore`] keeps entities, associations and id sources in
//! concurrent maps. [`MapDialect`] implements the full dialect protocol over
//! it, every facet included.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::Result;
use crate::dialect::insert::DuplicateInsertPreventionStrategy;
use crate::dialect::GridDialect;

use super::DatastoreProvider;

pub mod datastore;
pub mod dialect;
pub mod query;


pub use datastore::{CursorGuard, MapDatastore, StoredAssociation, StoredTuple};
pub use dialect::{MapCursor, MapDialect};
pub use query::{MapQuery, MapUpdate};

/// Provider of the in-memory map datastore
#[derive(Debug)]
pub struct MapDatastoreProvider {
    datastore: Arc<MapDatastore>,
    dialect: Arc<MapDialect>,
    started: AtomicBool,
}

impl MapDatastoreProvider {
    /// Provider over an empty datastore
    pub fn new(duplicate_insert_strategy: DuplicateInsertPreventionStrategy) -> Self {
        let datastore = Arc::new(MapDatastore::new());
        let dialect = Arc::new(MapDialect::new(Arc::clone(&datastore), duplicate_insert_strategy));
        Self {
            datastore,
            dialect,
            started: AtomicBool::new(false),
        }
    }

    /// The backing datastore
    pub fn datastore(&self) -> &Arc<MapDatastore> {
        &self.datastore
    }

    /// Whether [`DatastoreProvider::start`] ran since the last stop
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl DatastoreProvider for MapDatastoreProvider {
    fn name(&self) -> &str {
        "map"
    }

    fn start(&self) -> Result<()> {
        if !self.started.swap(true, Ordering::AcqRel) {
            debug!("Started map datastore");
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        self.datastore.clear();
        debug!("Stopped map datastore");
        Ok(())
    }

    fn dialect(&self) -> Arc<dyn GridDialect> {
        self.dialect.clone()
    }
}
