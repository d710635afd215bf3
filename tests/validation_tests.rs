use relmap::core::{ScalarType, SchemaError};
use relmap::descriptor::{DescriptorRegistry, FieldDescriptor, TypeDescriptor, TypeRef};
use relmap::dialect::GenericDialect;
use relmap::schema::generate_schema;

fn base_registry() -> DescriptorRegistry {
    let mut registry = DescriptorRegistry::new();
    registry
        .register(
            TypeDescriptor::value("Money")
                .field(FieldDescriptor::scalar("amount", ScalarType::Double))
                .field(FieldDescriptor::scalar("currency", ScalarType::String)),
        )
        .unwrap();
    registry
        .register(TypeDescriptor::aggregate("Invoice", "id", ScalarType::Uuid))
        .unwrap();
    registry
}

fn aggregate_with(field: FieldDescriptor) -> (DescriptorRegistry, &'static str) {
    let mut registry = base_registry();
    registry
        .register(TypeDescriptor::aggregate("Report", "id", ScalarType::Uuid).field(field))
        .unwrap();
    (registry, "Report")
}

#[test]
fn test_rejects_list_of_lists() {
    let (registry, name) = aggregate_with(FieldDescriptor::new(
        "matrix",
        TypeRef::list(TypeRef::list(TypeRef::Scalar(ScalarType::Int))),
    ));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::NestedCollection { .. }));
    assert!(err.to_string().contains("matrix"));
}

#[test]
fn test_rejects_untyped_list() {
    let (registry, name) = aggregate_with(FieldDescriptor::new(
        "anything",
        TypeRef::list(TypeRef::Untyped),
    ));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::UntypedElement { .. }));
    assert!(err.to_string().contains("anything"));
}

#[test]
fn test_rejects_value_typed_map_key() {
    let (registry, name) = aggregate_with(FieldDescriptor::new(
        "totals_by_price",
        TypeRef::map(TypeRef::named("Money"), TypeRef::Scalar(ScalarType::Int)),
    ));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::NonPrimitiveMapKey { .. }));
    assert!(err.to_string().contains("totals_by_price"));
    assert!(err.to_string().contains("Money"));
}

#[test]
fn test_rejects_set_of_aggregate_roots() {
    let (registry, name) = aggregate_with(FieldDescriptor::new(
        "invoices",
        TypeRef::set(TypeRef::named("Invoice")),
    ));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::RootInCollection { .. }));
    assert!(err.to_string().contains("invoices"));
    assert!(err.to_string().contains("reference it by id"));
}

#[test]
fn test_rejects_embedded_aggregate_root_field() {
    let (registry, name) =
        aggregate_with(FieldDescriptor::new("invoice", TypeRef::named("Invoice")));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::RootEmbedded { .. }));
}

#[test]
fn test_rejects_unregistered_type() {
    let (registry, name) =
        aggregate_with(FieldDescriptor::new("mystery", TypeRef::named("Mystery")));
    let err = generate_schema(&registry, name, &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownType { .. }));
    assert!(err.to_string().contains("Mystery"));
}

#[test]
fn test_rejects_self_owning_entity() {
    let mut registry = DescriptorRegistry::new();
    registry
        .register(
            TypeDescriptor::entity("Folder", "id", ScalarType::Uuid)
                .field(FieldDescriptor::new("parent", TypeRef::named("Folder")).nullable()),
        )
        .unwrap();
    registry
        .register(
            TypeDescriptor::aggregate("Drive", "id", ScalarType::Uuid)
                .field(FieldDescriptor::new("root", TypeRef::named("Folder"))),
        )
        .unwrap();

    let err = generate_schema(&registry, "Drive", &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::RecursiveType { .. }));
    assert!(err.to_string().contains("Folder"));
}

#[test]
fn test_rejects_collection_inside_value() {
    let mut registry = DescriptorRegistry::new();
    registry
        .register(TypeDescriptor::value("Labels").field(FieldDescriptor::new(
            "entries",
            TypeRef::list(TypeRef::Scalar(ScalarType::String)),
        )))
        .unwrap();
    registry
        .register(
            TypeDescriptor::aggregate("Asset", "id", ScalarType::Uuid)
                .field(FieldDescriptor::new("labels", TypeRef::named("Labels"))),
        )
        .unwrap();

    let err = generate_schema(&registry, "Asset", &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::CollectionInsideValue { .. }));
    assert!(err.to_string().contains("entries"));
}

#[test]
fn test_rejects_entity_inside_value() {
    let mut registry = DescriptorRegistry::new();
    registry
        .register(TypeDescriptor::entity("Attachment", "id", ScalarType::Uuid))
        .unwrap();
    registry
        .register(
            TypeDescriptor::value("Summary")
                .field(FieldDescriptor::new("primary", TypeRef::named("Attachment"))),
        )
        .unwrap();
    registry
        .register(
            TypeDescriptor::aggregate("Ticket", "id", ScalarType::Uuid)
                .field(FieldDescriptor::new("summary", TypeRef::named("Summary"))),
        )
        .unwrap();

    let err = generate_schema(&registry, "Ticket", &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::EntityInsideValue { .. }));
}

#[test]
fn test_rejects_unknown_aggregate() {
    let registry = base_registry();
    let err = generate_schema(&registry, "Nothing", &GenericDialect::new()).unwrap_err();
    assert!(matches!(err, SchemaError::NotAnAggregate { .. }));
}
