//! JSON native queries of the map dialect
//!
//! A read query names a table and an equality filter:
//!
//! ```json
//! {"table": "Person", "where": {"name": ":name", "age": 36}}
//! ```
//!
//! A string starting with `:` references a named parameter. A filter on a
//! null value matches entities without that column. Update queries add
//! either `"set": {...}` or `"delete": true`.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::core::{Error, Result};
use crate::dialect::query::QueryParameters;
use crate::model::key::EntityKey;
use crate::types::Value;

use super::datastore::StoredTuple;

/// Parsed native query
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapQuery {
    /// Table the query applies to
    pub table: String,

    /// Equality filter, column to literal or `:parameter`
    #[serde(default, rename = "where")]
    pub filter: IndexMap<String, serde_json::Value>,

    /// Columns to overwrite, for update queries
    #[serde(default)]
    pub set: IndexMap<String, serde_json::Value>,

    /// Whether matching entities are deleted, for update queries
    #[serde(default)]
    pub delete: bool,
}

/// What an update query does to each matching entity
#[derive(Debug, Clone, PartialEq)]
pub enum MapUpdate {
    /// Overwrite columns; `None` removes the column
    Set(Vec<(String, Option<Value>)>),
    /// Remove the entity
    Delete,
}

impl MapQuery {
    /// Parse a JSON native query
    pub fn parse(native_query: &str) -> Result<Self> {
        let query: MapQuery = serde_json::from_str(native_query)
            .map_err(|e| Error::invalid_query(format!("{}: {}", native_query, e)))?;
        if query.delete && !query.set.is_empty() {
            return Err(Error::invalid_query("a query cannot both set columns and delete"));
        }
        if query.table.is_empty() {
            return Err(Error::invalid_query("a query must name a table"));
        }
        Ok(query)
    }

    /// Whether the query modifies data
    pub fn is_update(&self) -> bool {
        self.delete || !self.set.is_empty()
    }

    /// Filter with parameters substituted
    pub fn resolve_filter(
        &self,
        parameters: &QueryParameters,
    ) -> Result<Vec<(String, Option<Value>)>> {
        resolve_all(&self.filter, parameters)
    }

    /// Update action with parameters substituted
    pub fn resolve_update(&self, parameters: &QueryParameters) -> Result<MapUpdate> {
        if self.delete {
            return Ok(MapUpdate::Delete);
        }
        if self.set.is_empty() {
            return Err(Error::invalid_query(format!(
                "query on {} has neither \"set\" nor \"delete\"",
                self.table
            )));
        }
        Ok(MapUpdate::Set(resolve_all(&self.set, parameters)?))
    }
}

fn resolve_all(
    columns: &IndexMap<String, serde_json::Value>,
    parameters: &QueryParameters,
) -> Result<Vec<(String, Option<Value>)>> {
    columns
        .iter()
        .map(|(column, literal)| Ok((column.clone(), resolve(literal, parameters)?)))
        .collect()
}

fn resolve(literal: &serde_json::Value, parameters: &QueryParameters) -> Result<Option<Value>> {
    if let Some(name) = literal.as_str().and_then(|s| s.strip_prefix(':')) {
        return match parameters.parameter(name) {
            Some(value) => Ok(value.cloned()),
            None => Err(Error::invalid_query(format!("parameter :{} is not bound", name))),
        };
    }
    if literal.is_object() {
        return Err(Error::invalid_query(format!("unsupported literal {}", literal)));
    }
    Ok(Value::from_json(literal))
}

/// Whether an entity satisfies every condition of a resolved filter
///
/// Key columns are matched against the key, other columns against the
/// stored tuple.
pub fn matches(key: &EntityKey, stored: &StoredTuple, filter: &[(String, Option<Value>)]) -> bool {
    filter.iter().all(|(column, expected)| {
        let actual = key.column_value(column).or_else(|| stored.get(column));
        actual == expected.as_ref()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_and_update_queries() {
        let read = MapQuery::parse(r#"{"table": "Person", "where": {"name": ":name"}}"#).unwrap();
        assert_eq!(read.table, "Person");
        assert!(!read.is_update());

        let update =
            MapQuery::parse(r#"{"table": "Person", "where": {}, "set": {"age": 37}}"#).unwrap();
        assert!(update.is_update());
        assert_eq!(
            update.resolve_update(&QueryParameters::new()).unwrap(),
            MapUpdate::Set(vec![("age".to_string(), Some(Value::Int(37)))])
        );
    }

    #[test]
    fn test_rejects_malformed_queries() {
        assert!(matches!(MapQuery::parse("not json"), Err(Error::InvalidQuery(_))));
        assert!(matches!(
            MapQuery::parse(r#"{"table": "Person", "set": {"a": 1}, "delete": true}"#),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            MapQuery::parse(r#"{"table": "Person", "order": "name"}"#),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_parameters_resolve_and_must_be_bound() {
        let query =
            MapQuery::parse(r#"{"table": "Person", "where": {"name": ":name", "nick": null}}"#)
                .unwrap();

        let bound = QueryParameters::new().with_parameter("name", Value::from("Ada"));
        assert_eq!(
            query.resolve_filter(&bound).unwrap(),
            vec![
                ("name".to_string(), Some(Value::from("Ada"))),
                ("nick".to_string(), None)
            ]
        );
        assert!(matches!(
            query.resolve_filter(&QueryParameters::new()),
            Err(Error::InvalidQuery(_))
        ));
    }
}
