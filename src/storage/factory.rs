//! Provider factory for creating datastore providers based on configuration

use std::sync::Arc;

use tracing::info;

use crate::core::config::{Config, DatastoreConfig, ProviderKind};
use crate::core::Result;
use crate::dialect::{BatchingGridDialect, GridDialect, LoggingGridDialect, ResolvedDialect};
use crate::storage::map::MapDatastoreProvider;
use crate::storage::DatastoreProvider;

/// Provider shared between the caller and the dialect bound to it
pub type SharedProvider = Arc<dyn DatastoreProvider>;

/// Wrap a provider's dialect with the decorators the configuration asks for
///
/// Batching wraps the raw dialect, logging wraps the result, so traced calls
/// show what the unit of work submitted rather than what reached the store.
pub fn decorate_dialect(
    dialect: Arc<dyn GridDialect>,
    config: &DatastoreConfig,
) -> Arc<dyn GridDialect> {
    let dialect: Arc<dyn GridDialect> = if config.batching {
        Arc::new(BatchingGridDialect::new(dialect))
    } else {
        dialect
    };

    if config.trace_dialect_calls || LoggingGridDialect::activation_needed() {
        Arc::new(LoggingGridDialect::new(dialect))
    } else {
        dialect
    }
}

/// Create and start the configured provider, returning it with its resolved dialect
pub fn create_provider(config: &Config) -> Result<(SharedProvider, ResolvedDialect)> {
    let provider: SharedProvider = match config.datastore.provider {
        ProviderKind::Map => Arc::new(MapDatastoreProvider::new(
            config.datastore.duplicate_insert_strategy,
        )),
    };
    provider.start()?;

    let resolved = ResolvedDialect::new(decorate_dialect(provider.dialect(), &config.datastore));
    info!(
        "Datastore provider {} ready with facets {:?}",
        provider.name(),
        resolved.capabilities().facets()
    );

    Ok((provider, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::insert::DuplicateInsertPreventionStrategy;
    use crate::dialect::Facet;
    use crate::model::key::{EntityKey, EntityKeyMetadata};
    use crate::model::Tuple;
    use crate::types::Value;

    #[test]
    fn test_map_provider_creation() {
        let config = Config::default();

        let (provider, resolved) = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "map");
        assert!(resolved.supports_sequences());
        for facet in Facet::ALL {
            assert!(resolved.has_facet(facet), "missing {}", facet);
        }
    }

    #[test]
    fn test_duplicate_strategy_reaches_dialect() {
        let mut config = Config::default();
        config.datastore.duplicate_insert_strategy = DuplicateInsertPreventionStrategy::Native;
        config.datastore.batching = false;

        let (_, resolved) = create_provider(&config).unwrap();
        let metadata = EntityKeyMetadata::new("Person", ["id"]);
        assert_eq!(
            resolved.duplicate_insert_prevention_strategy(&metadata),
            DuplicateInsertPreventionStrategy::Native
        );
    }

    #[test]
    fn test_decorators_follow_config() {
        let provider = MapDatastoreProvider::new(DuplicateInsertPreventionStrategy::LookUp);

        let mut config = DatastoreConfig::default();
        config.batching = true;
        config.trace_dialect_calls = true;
        let decorated = decorate_dialect(provider.dialect(), &config);
        assert!(format!("{:?}", decorated).starts_with("LoggingGridDialect"));

        config.trace_dialect_calls = false;
        if !LoggingGridDialect::activation_needed() {
            let decorated = decorate_dialect(provider.dialect(), &config);
            assert!(format!("{:?}", decorated).starts_with("BatchingGridDialect"));
        }
    }

    #[test]
    fn test_stop_clears_datastore() {
        let provider = MapDatastoreProvider::new(DuplicateInsertPreventionStrategy::LookUp);
        provider.start().unwrap();
        assert!(provider.is_started());

        let metadata = Arc::new(EntityKeyMetadata::new("Person", ["id"]));
        let key = EntityKey::new(metadata, vec![Value::Int(1)]).unwrap();
        let mut tuple = Tuple::new();
        tuple.put("name", Value::from("Ada"));
        provider.datastore().apply_tuple(&key, &tuple, false).unwrap();
        assert_eq!(provider.datastore().entity_count(), 1);

        provider.stop().unwrap();
        assert!(!provider.is_started());
        assert_eq!(provider.datastore().entity_count(), 0);
    }
}
