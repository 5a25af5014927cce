//! Association keys and their metadata

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AssociatedEntityKeyMetadata, EntityKey};
use crate::core::{Error, Result};
use crate::types::Value;

/// Where association rows live relative to their owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Rows reference other entities
    Association,
    /// Rows are embedded values or embeddables
    EmbeddedCollection,
}

/// Collection semantics of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationType {
    /// Unordered, no duplicates
    Set,
    /// Unordered, duplicates allowed
    Bag,
    /// Ordered by an index column
    List,
    /// Keyed by a map key column
    Map,
    /// Single valued
    OneToOne,
}

/// Describes one association table
///
/// Identity is the table plus the owner key column names; every other field
/// is descriptive and ignored by `==` and `Hash`.
#[derive(Debug, Clone)]
pub struct AssociationKeyMetadata {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    inverse: bool,
    associated_entity_key_metadata: Option<AssociatedEntityKeyMetadata>,
    collection_role: String,
    association_kind: AssociationKind,
    association_type: AssociationType,
    one_to_one: bool,
}

impl AssociationKeyMetadata {
    /// Start building metadata for `table` keyed by the owner columns
    pub fn builder<T, I, S>(table: T, column_names: I) -> AssociationKeyMetadataBuilder
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AssociationKeyMetadataBuilder {
            table: table.into(),
            column_names: column_names.into_iter().map(Into::into).collect(),
            row_key_column_names: Vec::new(),
            row_key_index_column_names: Vec::new(),
            inverse: false,
            associated_entity_key_metadata: None,
            collection_role: String::new(),
            association_kind: AssociationKind::Association,
            association_type: AssociationType::Bag,
            one_to_one: false,
        }
    }

    /// Association table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Owner key column names
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Columns identifying a row within the association
    pub fn row_key_column_names(&self) -> &[String] {
        &self.row_key_column_names
    }

    /// List index or map key columns, empty for sets and bags
    pub fn row_key_index_column_names(&self) -> &[String] {
        &self.row_key_index_column_names
    }

    /// Whether this is the inverse side of a bidirectional association
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// Mapping from row columns to the referenced entity key
    pub fn associated_entity_key_metadata(&self) -> Option<&AssociatedEntityKeyMetadata> {
        self.associated_entity_key_metadata.as_ref()
    }

    /// Role of the association on the owning entity
    pub fn collection_role(&self) -> &str {
        &self.collection_role
    }

    /// Whether rows reference entities or embed values
    pub fn association_kind(&self) -> AssociationKind {
        self.association_kind
    }

    /// Collection semantics
    pub fn association_type(&self) -> AssociationType {
        self.association_type
    }

    /// Whether the association is single valued
    pub fn is_one_to_one(&self) -> bool {
        self.one_to_one
    }

    /// Whether `column` is one of the owner key columns
    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Candidates that are not owner key columns, in candidate order
    ///
    /// Owner key columns are implied by the association key and need not be
    /// stored in every row.
    pub fn columns_without_key_columns<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|c| !self.is_key_column(c))
            .map(str::to_string)
            .collect()
    }

    /// The only row key column that is not an owner key column
    ///
    /// `None` when there are zero or several such columns; in the latter case
    /// rows must be stored as structures rather than single values.
    pub fn single_row_key_column_not_contained_in_association_key(&self) -> Option<&str> {
        let mut found = None;
        for column in &self.row_key_column_names {
            if !self.is_key_column(column) {
                if found.is_some() {
                    return None;
                }
                found = Some(column.as_str());
            }
        }
        found
    }
}

impl PartialEq for AssociationKeyMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column_names == other.column_names
    }
}

impl Eq for AssociationKeyMetadata {}

impl Hash for AssociationKeyMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column_names.hash(state);
    }
}

/// Builder for [`AssociationKeyMetadata`]
#[derive(Debug, Clone)]
pub struct AssociationKeyMetadataBuilder {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    inverse: bool,
    associated_entity_key_metadata: Option<AssociatedEntityKeyMetadata>,
    collection_role: String,
    association_kind: AssociationKind,
    association_type: AssociationType,
    one_to_one: bool,
}

impl AssociationKeyMetadataBuilder {
    /// Set the row key columns
    pub fn row_key_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the list index or map key columns
    pub fn row_key_index_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_index_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the inverse side
    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    /// Set the referenced entity mapping
    pub fn associated_entity_key_metadata(mut self, metadata: AssociatedEntityKeyMetadata) -> Self {
        self.associated_entity_key_metadata = Some(metadata);
        self
    }

    /// Set the collection role
    pub fn collection_role(mut self, role: impl Into<String>) -> Self {
        self.collection_role = role.into();
        self
    }

    /// Set the association kind
    pub fn association_kind(mut self, kind: AssociationKind) -> Self {
        self.association_kind = kind;
        self
    }

    /// Set the collection semantics
    pub fn association_type(mut self, association_type: AssociationType) -> Self {
        self.association_type = association_type;
        self
    }

    /// Mark a single valued association
    pub fn one_to_one(mut self, one_to_one: bool) -> Self {
        self.one_to_one = one_to_one;
        self
    }

    /// Freeze the metadata
    pub fn build(self) -> Arc<AssociationKeyMetadata> {
        Arc::new(AssociationKeyMetadata {
            table: self.table,
            column_names: self.column_names,
            row_key_column_names: self.row_key_column_names,
            row_key_index_column_names: self.row_key_index_column_names,
            inverse: self.inverse,
            associated_entity_key_metadata: self.associated_entity_key_metadata,
            collection_role: self.collection_role,
            association_kind: self.association_kind,
            association_type: self.association_type,
            one_to_one: self.one_to_one,
        })
    }
}

/// Identity of one association: metadata, owner key values and the owner
///
/// The owning entity key travels with the association key so dialects that
/// store associations inside the owner can find it, but it takes no part in
/// equality or hashing.
#[derive(Debug, Clone)]
pub struct AssociationKey {
    metadata: Arc<AssociationKeyMetadata>,
    column_values: Vec<Value>,
    entity_key: EntityKey,
}

impl AssociationKey {
    /// Create a key, rejecting a value count that differs from the metadata
    pub fn new(
        metadata: Arc<AssociationKeyMetadata>,
        column_values: Vec<Value>,
        entity_key: EntityKey,
    ) -> Result<Self> {
        if metadata.column_names.len() != column_values.len() {
            return Err(Error::invalid_key(format!(
                "{} expects {} association key values, got {}",
                metadata.table,
                metadata.column_names.len(),
                column_values.len()
            )));
        }
        Ok(Self {
            metadata,
            column_values,
            entity_key,
        })
    }

    /// Association metadata
    pub fn metadata(&self) -> &Arc<AssociationKeyMetadata> {
        &self.metadata
    }

    /// Association table
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    /// Owner key column names
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    /// Owner key column values
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Value of one owner key column
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Key of the entity owning the association
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }
}

impl PartialEq for AssociationKey {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.column_values == other.column_values
    }
}

impl Eq for AssociationKey {}

impl Hash for AssociationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metadata.hash(state);
        self.column_values.hash(state);
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssociationKey({}", self.metadata.table)?;
        for (column, value) in self.metadata.column_names.iter().zip(&self.column_values) {
            write!(f, ", {}={}", column, value)?;
        }
        write!(f, ")")
    }
}
