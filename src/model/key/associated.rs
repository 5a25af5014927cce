//! Metadata about entities referenced from association or entity columns

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::EntityKeyMetadata;

/// Maps the association key columns of a row to the key of the entity it
/// points at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociatedEntityKeyMetadata {
    association_key_columns: Vec<String>,
    entity_key_metadata: Arc<EntityKeyMetadata>,
}

impl AssociatedEntityKeyMetadata {
    /// Create the mapping; column `i` corresponds to target key column `i`
    pub fn new<I, S>(
        association_key_columns: I,
        entity_key_metadata: Arc<EntityKeyMetadata>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            association_key_columns: association_key_columns.into_iter().map(Into::into).collect(),
            entity_key_metadata,
        }
    }

    /// Columns of the association row holding the target key
    pub fn association_key_columns(&self) -> &[String] {
        &self.association_key_columns
    }

    /// Key metadata of the target entity
    pub fn entity_key_metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.entity_key_metadata
    }

    /// Whether `column` holds part of the target key
    pub fn is_key_column(&self, column: &str) -> bool {
        self.association_key_columns.iter().any(|c| c == column)
    }

    /// Target key column stored in association column `column`
    pub fn corresponding_entity_key_column(&self, column: &str) -> Option<&str> {
        self.association_key_columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.entity_key_metadata.column_names().get(i))
            .map(String::as_str)
    }
}

/// One registration: a column group, the entity it references and the role
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    key_metadata: AssociatedEntityKeyMetadata,
    role: String,
}

static EMPTY: Lazy<Arc<AssociatedEntitiesMetadata>> =
    Lazy::new(|| Arc::new(AssociatedEntitiesMetadata { registrations: Vec::new() }));

/// Entities referenced from the columns of an entity type, by column group
///
/// Lookups scan registrations in the order they were added and stop at the
/// first group that contains the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedEntitiesMetadata {
    registrations: Vec<Registration>,
}

impl AssociatedEntitiesMetadata {
    /// Start building a set of registrations
    pub fn builder() -> AssociatedEntitiesMetadataBuilder {
        AssociatedEntitiesMetadataBuilder::default()
    }

    /// Shared instance with no registrations
    pub fn empty() -> Arc<AssociatedEntitiesMetadata> {
        Arc::clone(&EMPTY)
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn registration(&self, column: &str) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.key_metadata.is_key_column(column))
    }

    /// Mapping of the group containing `column`
    pub fn associated_entity_key_metadata(
        &self,
        column: &str,
    ) -> Option<&AssociatedEntityKeyMetadata> {
        self.registration(column).map(|r| &r.key_metadata)
    }

    /// Key metadata of the entity referenced through `column`
    pub fn target_entity_key_metadata(&self, column: &str) -> Option<&Arc<EntityKeyMetadata>> {
        self.registration(column).map(|r| r.key_metadata.entity_key_metadata())
    }

    /// Target key column that `column` stores
    pub fn corresponding_entity_key_column(&self, column: &str) -> Option<&str> {
        self.registration(column)
            .and_then(|r| r.key_metadata.corresponding_entity_key_column(column))
    }

    /// Role of the association the group containing `column` belongs to
    pub fn role(&self, column: &str) -> Option<&str> {
        self.registration(column).map(|r| r.role.as_str())
    }
}

/// Builder for [`AssociatedEntitiesMetadata`]
#[derive(Debug, Default)]
pub struct AssociatedEntitiesMetadataBuilder {
    registrations: Vec<Registration>,
}

impl AssociatedEntitiesMetadataBuilder {
    /// Register a column group referencing `target` through association `role`
    pub fn add<I, S>(
        mut self,
        columns: I,
        target: Arc<EntityKeyMetadata>,
        role: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registrations.push(Registration {
            key_metadata: AssociatedEntityKeyMetadata::new(columns, target),
            role: role.into(),
        });
        self
    }

    /// Freeze the registrations
    pub fn build(self) -> Arc<AssociatedEntitiesMetadata> {
        if self.registrations.is_empty() {
            return AssociatedEntitiesMetadata::empty();
        }
        Arc::new(AssociatedEntitiesMetadata {
            registrations: self.registrations,
        })
    }
}
