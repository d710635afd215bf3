//! Relationship analysis.
//!
//! Walks the type graph from an aggregate root and builds the ownership
//! tree consumed by schema generation and by cascading reads/writes. Domain
//! aggregates are trees by construction; a type reachable from itself is a
//! configuration error, not something to detect lazily at runtime.

pub mod collections;

pub use collections::{CollectionDescriptor, CollectionKind, ElementKind, classify_collection};

use crate::core::{ScalarType, SchemaError, SchemaResult};
use crate::descriptor::{DescriptorRegistry, TypeDescriptor, TypeMarker, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveField {
    pub name: String,
    pub scalar: ScalarType,
    pub nullable: bool,
}

/// An embedded value type, recursively expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub type_name: String,
    pub primitives: Vec<PrimitiveField>,
    pub values: Vec<ValueField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueField {
    pub name: String,
    pub nullable: bool,
    pub node: ValueNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityField {
    pub name: String,
    pub nullable: bool,
    pub node: EntityNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionField {
    pub name: String,
    pub descriptor: CollectionDescriptor,
    /// Expanded element shape when the element is a value type.
    pub value_element: Option<ValueNode>,
    /// Analyzed element entity when the element is an entity type.
    pub entity_element: Option<Box<EntityNode>>,
}

/// One entity in the ownership tree: the aggregate root or an owned entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub type_name: String,
    pub is_root: bool,
    pub identity: PrimitiveField,
    pub primitives: Vec<PrimitiveField>,
    pub values: Vec<ValueField>,
    pub entities: Vec<EntityField>,
    pub collections: Vec<CollectionField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipTree {
    pub root: EntityNode,
}

/// Analyzes an aggregate root into its ownership tree.
pub fn analyze(registry: &DescriptorRegistry, aggregate: &str) -> SchemaResult<OwnershipTree> {
    let descriptor = registry
        .get(aggregate)
        .filter(|descriptor| descriptor.marker == TypeMarker::AggregateRoot)
        .ok_or_else(|| SchemaError::NotAnAggregate {
            type_name: aggregate.to_string(),
        })?;

    let mut analyzer = Analyzer {
        registry,
        visiting: Vec::new(),
    };
    let root = analyzer.entity_node(descriptor, true)?;
    Ok(OwnershipTree { root })
}

struct Analyzer<'a> {
    registry: &'a DescriptorRegistry,
    visiting: Vec<String>,
}

impl<'a> Analyzer<'a> {
    fn entity_node(&mut self, descriptor: &TypeDescriptor, is_root: bool) -> SchemaResult<EntityNode> {
        if self.visiting.iter().any(|name| name == &descriptor.name) {
            return Err(SchemaError::RecursiveType {
                type_name: descriptor.name.clone(),
            });
        }

        self.visiting.push(descriptor.name.clone());
        let node = self.entity_node_inner(descriptor, is_root);
        self.visiting.pop();
        node
    }

    fn entity_node_inner(
        &mut self,
        descriptor: &TypeDescriptor,
        is_root: bool,
    ) -> SchemaResult<EntityNode> {
        let identity = match &descriptor.identity {
            Some(field) => match &field.type_ref {
                TypeRef::Scalar(scalar) => PrimitiveField {
                    name: field.name.clone(),
                    scalar: *scalar,
                    nullable: false,
                },
                other => {
                    return Err(SchemaError::IdentityNotScalar {
                        type_name: descriptor.name.clone(),
                        declared: other.display_name(),
                    });
                }
            },
            None => {
                return Err(SchemaError::MissingIdentity {
                    type_name: descriptor.name.clone(),
                });
            }
        };

        let mut node = EntityNode {
            type_name: descriptor.name.clone(),
            is_root,
            identity,
            primitives: Vec::new(),
            values: Vec::new(),
            entities: Vec::new(),
            collections: Vec::new(),
        };

        for field in &descriptor.fields {
            match &field.type_ref {
                TypeRef::Scalar(scalar) => node.primitives.push(PrimitiveField {
                    name: field.name.clone(),
                    scalar: *scalar,
                    nullable: field.nullable,
                }),
                TypeRef::Untyped => {
                    return Err(SchemaError::UntypedElement {
                        field: field.name.clone(),
                        declared: field.type_ref.display_name(),
                    });
                }
                TypeRef::Named(name) => match self.registry.marker_of(name) {
                    Some(TypeMarker::Value) => {
                        let value_node = self.value_node(&field.name, name)?;
                        node.values.push(ValueField {
                            name: field.name.clone(),
                            nullable: field.nullable,
                            node: value_node,
                        });
                    }
                    Some(TypeMarker::Entity) => {
                        let child = self.lookup(&field.name, name)?;
                        let child_node = self.entity_node(child, false)?;
                        node.entities.push(EntityField {
                            name: field.name.clone(),
                            nullable: field.nullable,
                            node: child_node,
                        });
                    }
                    Some(TypeMarker::AggregateRoot) => {
                        return Err(SchemaError::RootEmbedded {
                            field: field.name.clone(),
                            target: name.clone(),
                        });
                    }
                    None => {
                        return Err(SchemaError::UnknownType {
                            field: field.name.clone(),
                            type_name: name.clone(),
                        });
                    }
                },
                TypeRef::List(_) | TypeRef::Set(_) | TypeRef::Map(_, _) => {
                    let descriptor = classify_collection(self.registry, field)?;
                    let value_element = match &descriptor.element_kind {
                        ElementKind::Value(name) => Some(self.value_node(&field.name, name)?),
                        _ => None,
                    };
                    let entity_element = match &descriptor.element_kind {
                        ElementKind::Entity(name) => {
                            let element = self.lookup(&field.name, name)?;
                            Some(Box::new(self.entity_node(element, false)?))
                        }
                        _ => None,
                    };
                    node.collections.push(CollectionField {
                        name: field.name.clone(),
                        descriptor,
                        value_element,
                        entity_element,
                    });
                }
            }
        }

        Ok(node)
    }

    fn value_node(&mut self, field_name: &str, type_name: &str) -> SchemaResult<ValueNode> {
        if self.visiting.iter().any(|name| name == type_name) {
            return Err(SchemaError::RecursiveType {
                type_name: type_name.to_string(),
            });
        }

        self.visiting.push(type_name.to_string());
        let node = self.value_node_inner(field_name, type_name);
        self.visiting.pop();
        node
    }

    fn value_node_inner(&mut self, field_name: &str, type_name: &str) -> SchemaResult<ValueNode> {
        let descriptor = self.lookup(field_name, type_name)?;

        let mut primitives = Vec::new();
        let mut values = Vec::new();

        for field in &descriptor.fields {
            match &field.type_ref {
                TypeRef::Scalar(scalar) => primitives.push(PrimitiveField {
                    name: field.name.clone(),
                    scalar: *scalar,
                    nullable: field.nullable,
                }),
                TypeRef::Untyped => {
                    return Err(SchemaError::UntypedElement {
                        field: field.name.clone(),
                        declared: field.type_ref.display_name(),
                    });
                }
                TypeRef::List(_) | TypeRef::Set(_) | TypeRef::Map(_, _) => {
                    return Err(SchemaError::CollectionInsideValue {
                        field: field.name.clone(),
                        type_name: descriptor.name.clone(),
                    });
                }
                TypeRef::Named(name) => match self.registry.marker_of(name) {
                    Some(TypeMarker::Value) => {
                        let inner = self.value_node(&field.name, name)?;
                        values.push(ValueField {
                            name: field.name.clone(),
                            nullable: field.nullable,
                            node: inner,
                        });
                    }
                    Some(TypeMarker::Entity) => {
                        return Err(SchemaError::EntityInsideValue {
                            field: field.name.clone(),
                            type_name: descriptor.name.clone(),
                        });
                    }
                    Some(TypeMarker::AggregateRoot) => {
                        return Err(SchemaError::RootEmbedded {
                            field: field.name.clone(),
                            target: name.clone(),
                        });
                    }
                    None => {
                        return Err(SchemaError::UnknownType {
                            field: field.name.clone(),
                            type_name: name.clone(),
                        });
                    }
                },
            }
        }

        Ok(ValueNode {
            type_name: descriptor.name.clone(),
            primitives,
            values,
        })
    }

    fn lookup(&self, field_name: &str, type_name: &str) -> SchemaResult<&'a TypeDescriptor> {
        self.registry
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                field: field_name.to_string(),
                type_name: type_name.to_string(),
            })
    }
}
