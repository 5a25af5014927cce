//! Native query plumbing shared by queryable dialects

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::core::Result;
use crate::model::key::EntityKeyMetadata;
use crate::model::Tuple;
use crate::types::Value;

/// A query in the datastore's own representation, as produced by
/// `QueryableGridDialect::parse_native_query`
#[derive(Clone)]
pub struct BackendQuery {
    query: Arc<dyn Any + Send + Sync>,
    description: String,
    single_entity_metadata: Option<Arc<EntityKeyMetadata>>,
}

impl BackendQuery {
    /// Wrap a parsed query
    pub fn new<Q>(query: Q, single_entity_metadata: Option<Arc<EntityKeyMetadata>>) -> Self
    where
        Q: Any + fmt::Debug + Send + Sync,
    {
        Self {
            description: format!("{:?}", query),
            query: Arc::new(query),
            single_entity_metadata,
        }
    }

    /// The parsed query, if it has type `Q`
    pub fn query<Q: Any>(&self) -> Option<&Q> {
        self.query.downcast_ref::<Q>()
    }

    /// Entity type returned when the query selects a single entity type
    pub fn single_entity_metadata(&self) -> Option<&Arc<EntityKeyMetadata>> {
        self.single_entity_metadata.as_ref()
    }
}

impl fmt::Debug for BackendQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendQuery")
            .field("query", &self.description)
            .field("single_entity_metadata", &self.single_entity_metadata)
            .finish()
    }
}

/// Named parameters and row selection of one query execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    named: IndexMap<String, Option<Value>>,
    first_row: Option<usize>,
    max_rows: Option<usize>,
}

impl QueryParameters {
    /// No parameters, no row limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named parameter; `None` binds null
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<Option<Value>>,
    ) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Skip the first `first_row` results
    pub fn with_first_row(mut self, first_row: usize) -> Self {
        self.first_row = Some(first_row);
        self
    }

    /// Return at most `max_rows` results
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Value bound to `name`: `None` when unbound, `Some(None)` when bound to null
    pub fn parameter(&self, name: &str) -> Option<Option<&Value>> {
        self.named.get(name).map(Option::as_ref)
    }

    /// Every bound parameter
    pub fn named_parameters(&self) -> &IndexMap<String, Option<Value>> {
        &self.named
    }

    /// Number of leading results to skip
    pub fn first_row(&self) -> Option<usize> {
        self.first_row
    }

    /// Maximum number of results
    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }
}

/// Query results that hold backend resources until closed
///
/// Implementations release their resources on `close` and on drop, whether
/// or not the iterator was fully consumed. Closing twice is a no-op.
pub trait ClosableIterator: Iterator<Item = Result<Tuple>> + Send {
    /// Release the backend resources; later calls to `next` return `None`
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TableScan(&'static str);

    #[test]
    fn test_parameter_distinguishes_null_from_unbound() {
        let parameters = QueryParameters::new()
            .with_parameter("age", Value::Int(36))
            .with_parameter("nickname", None);

        assert_eq!(parameters.parameter("age"), Some(Some(&Value::Int(36))));
        assert_eq!(parameters.parameter("nickname"), Some(None));
        assert_eq!(parameters.parameter("name"), None);
        let names: Vec<_> = parameters.named_parameters().keys().cloned().collect();
        assert_eq!(names, vec!["age".to_string(), "nickname".to_string()]);
    }

    #[test]
    fn test_rebinding_replaces_value() {
        let parameters = QueryParameters::new()
            .with_parameter("age", Value::Int(36))
            .with_parameter("age", Value::Int(37));

        assert_eq!(parameters.parameter("age"), Some(Some(&Value::Int(37))));
        assert_eq!(parameters.named_parameters().len(), 1);
    }

    #[test]
    fn test_row_limits_default_to_unbounded() {
        let parameters = QueryParameters::new();
        assert_eq!(parameters.first_row(), None);
        assert_eq!(parameters.max_rows(), None);

        let paged = parameters.with_first_row(0).with_max_rows(0);
        assert_eq!(paged.first_row(), Some(0));
        assert_eq!(paged.max_rows(), Some(0));
    }

    #[test]
    fn test_backend_query_downcasts_to_parsed_type() {
        let metadata = Arc::new(EntityKeyMetadata::new("Person", ["id"]));
        let query = BackendQuery::new(TableScan("Person"), Some(Arc::clone(&metadata)));

        assert_eq!(query.query::<TableScan>().map(|scan| scan.0), Some("Person"));
        assert!(query.query::<String>().is_none());
        assert_eq!(query.single_entity_metadata(), Some(&metadata));
        assert!(format!("{:?}", query).contains("TableScan"));
    }
}
