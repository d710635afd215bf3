//! Collection classification.
//!
//! Validates a collection-shaped field and decides how its junction table
//! will look: list/set/map, element representation, and the map key type.
//! Every unsupported shape is rejected here, before any SQL exists.

use serde::{Deserialize, Serialize};

use crate::core::{ScalarType, SchemaError, SchemaResult};
use crate::descriptor::{DescriptorRegistry, FieldDescriptor, TypeMarker, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Primitive(ScalarType),
    Value(String),
    Entity(String),
}

impl ElementKind {
    pub fn type_name(&self) -> String {
        match self {
            Self::Primitive(scalar) => scalar.name().to_string(),
            Self::Value(name) | Self::Entity(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub kind: CollectionKind,
    pub element_kind: ElementKind,
    /// Present for maps only; always a primitive scalar.
    pub key_type: Option<ScalarType>,
}

/// Classifies a collection-typed field, in rejection order: nested
/// collection, untyped element/key, non-primitive map key, aggregate root
/// element, unregistered element type.
pub fn classify_collection(
    registry: &DescriptorRegistry,
    field: &FieldDescriptor,
) -> SchemaResult<CollectionDescriptor> {
    let (kind, element, key) = match &field.type_ref {
        TypeRef::List(element) => (CollectionKind::List, element.as_ref(), None),
        TypeRef::Set(element) => (CollectionKind::Set, element.as_ref(), None),
        TypeRef::Map(key, value) => (CollectionKind::Map, value.as_ref(), Some(key.as_ref())),
        other => {
            return Err(SchemaError::NotACollection {
                field: field.name.clone(),
                declared: other.display_name(),
            });
        }
    };

    if element.is_collection() {
        return Err(SchemaError::NestedCollection {
            field: field.name.clone(),
            declared: field.type_ref.display_name(),
        });
    }

    if matches!(element, TypeRef::Untyped) {
        return Err(SchemaError::UntypedElement {
            field: field.name.clone(),
            declared: field.type_ref.display_name(),
        });
    }

    let key_type = match key {
        None => None,
        Some(TypeRef::Scalar(scalar)) => Some(*scalar),
        Some(TypeRef::Untyped) => {
            return Err(SchemaError::UntypedElement {
                field: field.name.clone(),
                declared: field.type_ref.display_name(),
            });
        }
        Some(other) => {
            return Err(SchemaError::NonPrimitiveMapKey {
                field: field.name.clone(),
                key_type: other.display_name(),
            });
        }
    };

    let element_kind = element_kind_of(registry, field, element)?;

    Ok(CollectionDescriptor {
        kind,
        element_kind,
        key_type,
    })
}

pub(crate) fn element_kind_of(
    registry: &DescriptorRegistry,
    field: &FieldDescriptor,
    element: &TypeRef,
) -> SchemaResult<ElementKind> {
    match element {
        TypeRef::Scalar(scalar) => Ok(ElementKind::Primitive(*scalar)),
        TypeRef::Named(name) => match registry.marker_of(name) {
            Some(TypeMarker::Value) => Ok(ElementKind::Value(name.clone())),
            Some(TypeMarker::Entity) => Ok(ElementKind::Entity(name.clone())),
            Some(TypeMarker::AggregateRoot) => Err(SchemaError::RootInCollection {
                field: field.name.clone(),
                element: name.clone(),
            }),
            None => Err(SchemaError::UnknownType {
                field: field.name.clone(),
                type_name: name.clone(),
            }),
        },
        _ => Err(SchemaError::NestedCollection {
            field: field.name.clone(),
            declared: field.type_ref.display_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;

    fn registry() -> DescriptorRegistry {
        let mut registry = DescriptorRegistry::new();
        registry.register(TypeDescriptor::value("Money")).unwrap();
        registry
            .register(TypeDescriptor::entity("OrderItem", "id", ScalarType::Uuid))
            .unwrap();
        registry
            .register(TypeDescriptor::aggregate("Order", "id", ScalarType::Uuid))
            .unwrap();
        registry
    }

    #[test]
    fn test_classifies_primitive_list() {
        let field = FieldDescriptor::new("tags", TypeRef::list(TypeRef::Scalar(ScalarType::String)));
        let descriptor = classify_collection(&registry(), &field).unwrap();
        assert_eq!(descriptor.kind, CollectionKind::List);
        assert_eq!(
            descriptor.element_kind,
            ElementKind::Primitive(ScalarType::String)
        );
        assert_eq!(descriptor.key_type, None);
    }

    #[test]
    fn test_classifies_map_of_values() {
        let field = FieldDescriptor::new(
            "prices",
            TypeRef::map(TypeRef::Scalar(ScalarType::String), TypeRef::named("Money")),
        );
        let descriptor = classify_collection(&registry(), &field).unwrap();
        assert_eq!(descriptor.kind, CollectionKind::Map);
        assert_eq!(descriptor.element_kind, ElementKind::Value("Money".into()));
        assert_eq!(descriptor.key_type, Some(ScalarType::String));
    }

    #[test]
    fn test_rejects_nested_collection() {
        let field = FieldDescriptor::new(
            "matrix",
            TypeRef::list(TypeRef::list(TypeRef::Scalar(ScalarType::Int))),
        );
        let err = classify_collection(&registry(), &field).unwrap_err();
        assert!(matches!(err, SchemaError::NestedCollection { .. }));
        assert!(err.to_string().contains("matrix"));
    }

    #[test]
    fn test_rejects_untyped_element() {
        let field = FieldDescriptor::new("anything", TypeRef::list(TypeRef::Untyped));
        let err = classify_collection(&registry(), &field).unwrap_err();
        assert!(matches!(err, SchemaError::UntypedElement { .. }));
    }

    #[test]
    fn test_rejects_value_map_key() {
        let field = FieldDescriptor::new(
            "totals",
            TypeRef::map(TypeRef::named("Money"), TypeRef::Scalar(ScalarType::Int)),
        );
        let err = classify_collection(&registry(), &field).unwrap_err();
        assert!(matches!(err, SchemaError::NonPrimitiveMapKey { .. }));
        assert!(err.to_string().contains("totals"));
    }

    #[test]
    fn test_rejects_root_in_collection() {
        let field = FieldDescriptor::new("orders", TypeRef::set(TypeRef::named("Order")));
        let err = classify_collection(&registry(), &field).unwrap_err();
        assert!(matches!(err, SchemaError::RootInCollection { .. }));
    }
}
