//! Type-graph descriptors.
//!
//! A descriptor is built once per domain type at startup and consumed
//! read-only by the analyzer and the schema generator. Registration is the
//! explicit counterpart of whatever discovery mechanism an application uses
//! (codegen, reflection, hand-written setup); the engine only ever depends on
//! the descriptor shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{ScalarType, SchemaError, SchemaResult};

/// Reference to the declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Scalar(ScalarType),
    /// A registered value or entity type, resolved by name at analysis time.
    Named(String),
    List(Box<TypeRef>),
    Set(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// An "any"/dynamic placeholder. Always rejected during analysis.
    Untyped,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(element: TypeRef) -> Self {
        Self::List(Box::new(element))
    }

    pub fn set(element: TypeRef) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_) | Self::Map(_, _))
    }

    /// Human-readable rendering used in error messages.
    pub fn display_name(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.name().to_string(),
            Self::Named(name) => name.clone(),
            Self::List(element) => format!("List<{}>", element.display_name()),
            Self::Set(element) => format!("Set<{}>", element.display_name()),
            Self::Map(key, value) => {
                format!("Map<{}, {}>", key.display_name(), value.display_name())
            }
            Self::Untyped => "dynamic".to_string(),
        }
    }
}

/// Capability tag decided once when a descriptor is built.
///
/// Replaces "walk the supertype chain" checks: a type is a value, an owned
/// entity, or an aggregate root because its descriptor says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeMarker {
    Value,
    Entity,
    AggregateRoot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_ref: TypeRef,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            nullable: false,
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, TypeRef::Scalar(scalar))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Descriptor for one domain type: its marker, identity (entities and roots
/// only) and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub marker: TypeMarker,
    pub identity: Option<FieldDescriptor>,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn aggregate(
        name: impl Into<String>,
        id_field: impl Into<String>,
        id_type: ScalarType,
    ) -> Self {
        Self {
            name: name.into(),
            marker: TypeMarker::AggregateRoot,
            identity: Some(FieldDescriptor::scalar(id_field, id_type)),
            fields: Vec::new(),
        }
    }

    pub fn entity(
        name: impl Into<String>,
        id_field: impl Into<String>,
        id_type: ScalarType,
    ) -> Self {
        Self {
            name: name.into(),
            marker: TypeMarker::Entity,
            identity: Some(FieldDescriptor::scalar(id_field, id_type)),
            fields: Vec::new(),
        }
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marker: TypeMarker::Value,
            identity: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

/// Registry of all descriptors known to an application.
///
/// Built at startup, immutable afterwards. Kept as a sorted map so dumps and
/// iteration are deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorRegistry {
    types: BTreeMap<String, TypeDescriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, validating its identity declaration.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> SchemaResult<()> {
        match descriptor.marker {
            TypeMarker::Value => {
                if descriptor.identity.is_some() {
                    return Err(SchemaError::ValueWithIdentity {
                        type_name: descriptor.name.clone(),
                    });
                }
            }
            TypeMarker::Entity | TypeMarker::AggregateRoot => match &descriptor.identity {
                None => {
                    return Err(SchemaError::MissingIdentity {
                        type_name: descriptor.name.clone(),
                    });
                }
                Some(identity) => {
                    if !matches!(identity.type_ref, TypeRef::Scalar(_)) {
                        return Err(SchemaError::IdentityNotScalar {
                            type_name: descriptor.name.clone(),
                            declared: identity.type_ref.display_name(),
                        });
                    }
                }
            },
        }

        if self.types.contains_key(&descriptor.name) {
            return Err(SchemaError::DuplicateType {
                type_name: descriptor.name.clone(),
            });
        }

        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn marker_of(&self, name: &str) -> Option<TypeMarker> {
        self.types.get(name).map(|descriptor| descriptor.marker)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_value_with_identity() {
        let mut registry = DescriptorRegistry::new();
        let mut descriptor = TypeDescriptor::value("Money");
        descriptor.identity = Some(FieldDescriptor::scalar("id", ScalarType::Uuid));

        let err = registry.register(descriptor).unwrap_err();
        assert!(matches!(err, SchemaError::ValueWithIdentity { .. }));
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = DescriptorRegistry::new();
        registry
            .register(TypeDescriptor::value("Money"))
            .unwrap();
        let err = registry
            .register(TypeDescriptor::value("Money"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType { .. }));
    }

    #[test]
    fn test_register_requires_entity_identity() {
        let mut registry = DescriptorRegistry::new();
        let mut descriptor = TypeDescriptor::entity("Item", "id", ScalarType::Uuid);
        descriptor.identity = None;

        let err = registry.register(descriptor).unwrap_err();
        assert!(matches!(err, SchemaError::MissingIdentity { .. }));
    }

    #[test]
    fn test_type_ref_display() {
        let ty = TypeRef::map(
            TypeRef::Scalar(ScalarType::String),
            TypeRef::list(TypeRef::named("Money")),
        );
        assert_eq!(ty.display_name(), "Map<string, List<Money>>");
    }
}
