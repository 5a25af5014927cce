use std::collections::HashSet;
use std::sync::Arc;

use super::*;
use crate::core::Error;
use crate::types::Value;

fn person() -> Arc<EntityKeyMetadata> {
    Arc::new(EntityKeyMetadata::new("Person", ["id"]))
}

#[test]
fn test_entity_key_rejects_value_count_mismatch() {
    let result = EntityKey::new(person(), vec![Value::Int(1), Value::Int(2)]);
    assert!(matches!(result, Err(Error::InvalidKey(_))));

    let result = EntityKey::new(person(), vec![]);
    assert!(matches!(result, Err(Error::InvalidKey(_))));
}

#[test]
fn test_entity_key_structural_equality() {
    let a = EntityKey::new(person(), vec![Value::Int(1)]).unwrap();
    let b = EntityKey::new(person(), vec![Value::Int(1)]).unwrap();
    let c = EntityKey::new(person(), vec![Value::Int(2)]).unwrap();
    let dogs = Arc::new(EntityKeyMetadata::new("Dog", ["id"]));
    let other_table = EntityKey::new(dogs, vec![Value::Int(1)]).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, other_table);

    let set: HashSet<_> = [a, b, c].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn test_entity_key_column_lookup() {
    let meta = Arc::new(EntityKeyMetadata::new("Order", ["customer", "number"]));
    let key = EntityKey::new(meta.clone(), vec![Value::from("alice"), Value::Int(7)]).unwrap();

    assert!(meta.is_key_column("number"));
    assert!(!meta.is_key_column("total"));
    assert_eq!(key.column_value("number"), Some(&Value::Int(7)));
    assert_eq!(key.column_value("total"), None);
    assert_eq!(key.to_string(), "EntityKey(Order, customer=alice, number=7)");
}

#[test]
fn test_association_key_ignores_owner_in_equality() {
    let meta = AssociationKeyMetadata::builder("Person_Address", ["person_id"])
        .row_key_column_names(["person_id", "address_id"])
        .build();
    let owner_a = EntityKey::new(person(), vec![Value::Int(1)]).unwrap();
    let owner_b = EntityKey::new(person(), vec![Value::Int(99)]).unwrap();

    let a = AssociationKey::new(meta.clone(), vec![Value::Int(1)], owner_a).unwrap();
    let b = AssociationKey::new(meta.clone(), vec![Value::Int(1)], owner_b).unwrap();

    assert_eq!(a, b);
    let set: HashSet<_> = [a, b].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn test_association_key_metadata_identity() {
    let a = AssociationKeyMetadata::builder("Person_Address", ["person_id"])
        .collection_role("addresses")
        .inverse(false)
        .build();
    let b = AssociationKeyMetadata::builder("Person_Address", ["person_id"])
        .collection_role("residents")
        .inverse(true)
        .build();
    let c = AssociationKeyMetadata::builder("Person_Address", ["address_id"]).build();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_association_key_metadata_column_helpers() {
    let meta = AssociationKeyMetadata::builder("Person_Address", ["person_id"])
        .row_key_column_names(["person_id", "address_id"])
        .build();

    assert!(meta.is_key_column("person_id"));
    assert_eq!(
        meta.columns_without_key_columns(["person_id", "address_id", "since"]),
        vec!["address_id".to_string(), "since".to_string()]
    );
    assert_eq!(meta.single_row_key_column_not_contained_in_association_key(), Some("address_id"));

    let composite = AssociationKeyMetadata::builder("Person_Phone", ["person_id"])
        .row_key_column_names(["person_id", "area", "number"])
        .build();
    assert_eq!(composite.single_row_key_column_not_contained_in_association_key(), None);

    let degenerate = AssociationKeyMetadata::builder("Solo", ["id"])
        .row_key_column_names(["id"])
        .build();
    assert_eq!(degenerate.single_row_key_column_not_contained_in_association_key(), None);
}

#[test]
fn test_associated_entities_metadata_composite_group() {
    let address = Arc::new(EntityKeyMetadata::new("Address", ["street", "city"]));
    let meta = AssociatedEntitiesMetadata::builder()
        .add(["addr_street", "addr_city"], address.clone(), "address")
        .build();

    assert!(!meta.is_empty());
    for column in ["addr_street", "addr_city"] {
        assert_eq!(meta.target_entity_key_metadata(column), Some(&address));
        assert_eq!(meta.role(column), Some("address"));
    }
    assert_eq!(meta.corresponding_entity_key_column("addr_street"), Some("street"));
    assert_eq!(meta.corresponding_entity_key_column("addr_city"), Some("city"));
    assert_eq!(meta.corresponding_entity_key_column("name"), None);
    assert_eq!(meta.target_entity_key_metadata("name"), None);
    assert_eq!(meta.role("name"), None);
}

#[test]
fn test_associated_entities_metadata_first_group_wins() {
    let first = Arc::new(EntityKeyMetadata::new("First", ["id"]));
    let second = Arc::new(EntityKeyMetadata::new("Second", ["id"]));
    let meta = AssociatedEntitiesMetadata::builder()
        .add(["ref"], first.clone(), "first")
        .add(["ref"], second, "second")
        .build();

    assert_eq!(meta.target_entity_key_metadata("ref"), Some(&first));
    assert_eq!(meta.role("ref"), Some("first"));
}

#[test]
fn test_empty_associated_entities_metadata_is_shared() {
    let a = AssociatedEntitiesMetadata::empty();
    let b = AssociatedEntitiesMetadata::builder().build();

    assert!(a.is_empty());
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_id_source_keys() {
    let table = IdSourceKeyMetadata::for_table("hibernate_sequences", "sequence_name", "next_val");
    let a = IdSourceKey::for_table(table.clone(), "Person");
    let b = IdSourceKey::for_table(table.clone(), "Person");
    let c = IdSourceKey::for_table(table, "Dog");
    let seq = IdSourceKey::for_sequence(IdSourceKeyMetadata::for_sequence("person_seq"));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.metadata().source_type(), IdSourceType::Table);
    assert_eq!(a.metadata().value_column_name(), Some("next_val"));
    assert_eq!(seq.metadata().source_type(), IdSourceType::Sequence);
    assert_eq!(seq.segment(), None);
    assert_eq!(seq.table(), "person_seq");

    let request = NextValueRequest::new(seq, 5, 1);
    assert_eq!(request.increment(), 5);
    assert_eq!(request.initial_value(), 1);
}

#[test]
fn test_corresponding_entity_key_column_maps_by_position() {
    let country = Arc::new(EntityKeyMetadata::new("Country", ["id.countryCode", "id.sequenceNo"]));
    let meta = AssociatedEntitiesMetadata::builder()
        .add(["address_id.countryCode", "address_id.sequenceNo"], country, "country")
        .build();

    assert_eq!(
        meta.corresponding_entity_key_column("address_id.sequenceNo"),
        Some("id.sequenceNo")
    );
    assert_eq!(
        meta.corresponding_entity_key_column("address_id.countryCode"),
        Some("id.countryCode")
    );
}
