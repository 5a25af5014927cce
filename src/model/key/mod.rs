//! Key model
//!
//! Keys identify stored entities, associations, association rows and id
//! generator counters. Every key pairs a shared metadata object with the
//! concrete column values, and compares structurally.

/// Entity keys
pub mod entity;
/// Association keys and association metadata
pub mod association;
/// Association row keys
pub mod row;
/// Id generator sources
pub mod id_source;
/// Referenced entity metadata
pub mod associated;

pub use associated::{
    AssociatedEntitiesMetadata, AssociatedEntitiesMetadataBuilder, AssociatedEntityKeyMetadata,
};
pub use association::{
    AssociationKey, AssociationKeyMetadata, AssociationKeyMetadataBuilder, AssociationKind,
    AssociationType,
};
pub use entity::{EntityKey, EntityKeyMetadata};
pub use id_source::{IdSourceKey, IdSourceKeyMetadata, IdSourceType, NextValueRequest};
pub use row::RowKey;

#[cfg(test)]
mod tests;
