//! Facet resolution and the resolved dialect handle

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::core::Result;
use crate::dialect::context::TupleContext;
use crate::dialect::facets::SessionFactoryHandle;
use crate::dialect::GridDialect;
use crate::model::key::EntityKey;
use crate::model::Tuple;

/// Optional dialect capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// `MultigetGridDialect`
    Multiget,
    /// `BatchableGridDialect`
    Batchable,
    /// `QueryableGridDialect`
    Queryable,
    /// `SessionFactoryLifecycleAwareDialect`
    LifecycleAware,
    /// `OptimisticLockingAwareGridDialect`
    OptimisticLocking,
    /// `IdentityColumnAwareGridDialect`
    IdentityColumn,
}

impl Facet {
    /// Every facet, in declaration order
    pub const ALL: [Facet; 6] = [
        Facet::Multiget,
        Facet::Batchable,
        Facet::Queryable,
        Facet::LifecycleAware,
        Facet::OptimisticLocking,
        Facet::IdentityColumn,
    ];
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Facet::Multiget => "multiget",
            Facet::Batchable => "batchable",
            Facet::Queryable => "queryable",
            Facet::LifecycleAware => "lifecycle_aware",
            Facet::OptimisticLocking => "optimistic_locking",
            Facet::IdentityColumn => "identity_column",
        };
        f.write_str(name)
    }
}

/// Facets a dialect exposes, resolved once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DialectCapabilities {
    multiget: bool,
    batchable: bool,
    queryable: bool,
    lifecycle_aware: bool,
    optimistic_locking: bool,
    identity_column: bool,
    supports_sequences: bool,
}

impl DialectCapabilities {
    /// Query every facet accessor of `dialect` once
    pub fn resolve(dialect: &dyn GridDialect) -> Self {
        Self {
            multiget: dialect.as_multiget().is_some(),
            batchable: dialect.as_batchable().is_some(),
            queryable: dialect.as_queryable().is_some(),
            lifecycle_aware: dialect.as_lifecycle_aware().is_some(),
            optimistic_locking: dialect.as_optimistic_locking_aware().is_some(),
            identity_column: dialect.as_identity_column_aware().is_some(),
            supports_sequences: dialect.supports_sequences(),
        }
    }

    /// Whether the facet is exposed
    pub fn has(&self, facet: Facet) -> bool {
        match facet {
            Facet::Multiget => self.multiget,
            Facet::Batchable => self.batchable,
            Facet::Queryable => self.queryable,
            Facet::LifecycleAware => self.lifecycle_aware,
            Facet::OptimisticLocking => self.optimistic_locking,
            Facet::IdentityColumn => self.identity_column,
        }
    }

    /// Exposed facets, in declaration order
    pub fn facets(&self) -> Vec<Facet> {
        Facet::ALL.into_iter().filter(|facet| self.has(*facet)).collect()
    }

    /// Whether the dialect backs `next_value` with native sequences
    pub fn supports_sequences(&self) -> bool {
        self.supports_sequences
    }
}

/// A dialect together with its resolved capabilities
///
/// Dereferences to the dialect itself.
pub struct ResolvedDialect {
    dialect: Arc<dyn GridDialect>,
    capabilities: DialectCapabilities,
    bootstrapped: AtomicBool,
}

impl ResolvedDialect {
    /// Resolve the capabilities of `dialect`
    pub fn new(dialect: Arc<dyn GridDialect>) -> Self {
        let capabilities = DialectCapabilities::resolve(dialect.as_ref());
        debug!("Resolved dialect capabilities: {:?}", capabilities);
        Self {
            dialect,
            capabilities,
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// The wrapped dialect
    pub fn dialect(&self) -> &Arc<dyn GridDialect> {
        &self.dialect
    }

    /// Resolved capabilities
    pub fn capabilities(&self) -> &DialectCapabilities {
        &self.capabilities
    }

    /// Whether the dialect exposes `facet`
    pub fn has_facet(&self, facet: Facet) -> bool {
        self.capabilities.has(facet)
    }

    /// Load several tuples, one round trip when the dialect supports multi-get
    ///
    /// The result has one entry per key, in key order.
    pub fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>> {
        if self.capabilities.multiget {
            if let Some(multiget) = self.dialect.as_multiget() {
                return multiget.get_tuples(keys, context);
            }
        }
        keys.iter().map(|key| self.dialect.get_tuple(key, context)).collect()
    }

    /// Notify a lifecycle aware dialect that bootstrap finished
    ///
    /// Only the first call notifies; returns whether this call did.
    pub fn bootstrap(&self, session_factory: &SessionFactoryHandle) -> bool {
        if self.bootstrapped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(aware) = self.dialect.as_lifecycle_aware() {
            debug!("Notifying dialect of session factory {}", session_factory.name());
            aware.session_factory_created(session_factory);
            return true;
        }
        false
    }
}

impl Deref for ResolvedDialect {
    type Target = dyn GridDialect;

    fn deref(&self) -> &Self::Target {
        self.dialect.as_ref()
    }
}

impl fmt::Debug for ResolvedDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDialect")
            .field("dialect", &self.dialect)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
