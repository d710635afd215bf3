//! Schema generation.
//!
//! Turns an ownership tree into table definitions: one table for the root,
//! one per owned entity, one junction table per primitive/value collection
//! field. Entity-element collections collapse onto the element entity's own
//! table, which then carries the parent key and any ordering/key column.

use std::collections::BTreeSet;

use crate::analyzer::{
    CollectionDescriptor, CollectionField, CollectionKind, ElementKind, EntityNode, OwnershipTree,
    ValueNode, analyze,
};
use crate::core::{ScalarType, SchemaError, SchemaResult};
use crate::descriptor::DescriptorRegistry;
use crate::dialect::Dialect;
use crate::mapper::join_prefix;

use super::type_mapper::column_type;
use super::{
    ColumnDefinition, ForeignKeyDefinition, MAP_KEY_COLUMN, OnDeleteAction, POSITION_COLUMN,
    TableDefinition, VALUE_COLUMN, junction_table_name, parent_fk_column, table_name_for,
};

/// Analyzes an aggregate and generates its full table set in one call.
pub fn generate_schema(
    registry: &DescriptorRegistry,
    aggregate: &str,
    dialect: &dyn Dialect,
) -> SchemaResult<Vec<TableDefinition>> {
    let tree = analyze(registry, aggregate)?;
    SchemaGenerator::new(dialect).generate(&tree)
}

pub struct SchemaGenerator<'a> {
    dialect: &'a dyn Dialect,
}

struct ParentLink<'p> {
    table: &'p str,
    id_column: &'p str,
    id_scalar: ScalarType,
    /// Present when the entity is a collection element; adds the ordering or
    /// key column to the element table.
    collection: Option<&'p CollectionDescriptor>,
}

impl<'a> SchemaGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn generate(&self, tree: &OwnershipTree) -> SchemaResult<Vec<TableDefinition>> {
        let mut tables = Vec::new();
        self.entity_tables(&tree.root, None, &mut tables)?;

        let mut seen = BTreeSet::new();
        for table in &tables {
            if !seen.insert(table.table_name.clone()) {
                return Err(SchemaError::DuplicateTable {
                    table: table.table_name.clone(),
                });
            }
        }

        Ok(tables)
    }

    fn entity_tables(
        &self,
        node: &EntityNode,
        parent: Option<ParentLink<'_>>,
        out: &mut Vec<TableDefinition>,
    ) -> SchemaResult<()> {
        let table_name = table_name_for(&node.type_name);
        let mut columns = Vec::new();
        let mut foreign_keys = Vec::new();

        columns.push(
            ColumnDefinition::new(
                node.identity.name.clone(),
                column_type(self.dialect, node.identity.scalar),
                node.identity.scalar,
            )
            .primary_key(),
        );

        if let Some(parent) = &parent {
            let fk_column = parent_fk_column(parent.table);
            columns.push(
                ColumnDefinition::new(
                    fk_column.clone(),
                    column_type(self.dialect, parent.id_scalar),
                    parent.id_scalar,
                )
                .foreign_key(),
            );
            foreign_keys.push(ForeignKeyDefinition {
                column_name: fk_column,
                referenced_table: parent.table.to_string(),
                referenced_column: parent.id_column.to_string(),
                on_delete: OnDeleteAction::Cascade,
            });

            if let Some(descriptor) = parent.collection {
                self.push_collection_key_columns(descriptor, &mut columns);
            }
        }

        for primitive in &node.primitives {
            let mut column = ColumnDefinition::new(
                primitive.name.clone(),
                column_type(self.dialect, primitive.scalar),
                primitive.scalar,
            );
            column.nullable = primitive.nullable;
            columns.push(column);
        }

        for value_field in &node.values {
            self.value_columns(
                &value_field.name,
                &value_field.node,
                value_field.nullable,
                &mut columns,
            );
        }

        out.push(TableDefinition {
            table_name: table_name.clone(),
            source_type_name: node.type_name.clone(),
            columns,
            foreign_keys,
            is_root: node.is_root,
        });

        for child in &node.entities {
            self.entity_tables(
                &child.node,
                Some(ParentLink {
                    table: &table_name,
                    id_column: &node.identity.name,
                    id_scalar: node.identity.scalar,
                    collection: None,
                }),
                out,
            )?;
        }

        for collection in &node.collections {
            self.collection_tables(node, &table_name, collection, out)?;
        }

        Ok(())
    }

    fn collection_tables(
        &self,
        parent: &EntityNode,
        parent_table: &str,
        collection: &CollectionField,
        out: &mut Vec<TableDefinition>,
    ) -> SchemaResult<()> {
        match &collection.descriptor.element_kind {
            ElementKind::Entity(_) => {
                let element = collection.entity_element.as_deref().ok_or_else(|| {
                    SchemaError::UnknownType {
                        field: collection.name.clone(),
                        type_name: collection.descriptor.element_kind.type_name(),
                    }
                })?;
                self.entity_tables(
                    element,
                    Some(ParentLink {
                        table: parent_table,
                        id_column: &parent.identity.name,
                        id_scalar: parent.identity.scalar,
                        collection: Some(&collection.descriptor),
                    }),
                    out,
                )
            }
            ElementKind::Primitive(scalar) => {
                let mut table = self.junction_skeleton(parent, parent_table, collection);
                let mut column = ColumnDefinition::new(
                    VALUE_COLUMN,
                    column_type(self.dialect, *scalar),
                    *scalar,
                );
                column.nullable = false;
                table.columns.push(column);
                out.push(table);
                Ok(())
            }
            ElementKind::Value(_) => {
                let element = collection.value_element.as_ref().ok_or_else(|| {
                    SchemaError::UnknownType {
                        field: collection.name.clone(),
                        type_name: collection.descriptor.element_kind.type_name(),
                    }
                })?;
                let mut table = self.junction_skeleton(parent, parent_table, collection);
                self.value_columns("", element, false, &mut table.columns);
                out.push(table);
                Ok(())
            }
        }
    }

    /// Junction table carrying the parent key plus any ordering/key column;
    /// junction tables have no primary key of their own.
    fn junction_skeleton(
        &self,
        parent: &EntityNode,
        parent_table: &str,
        collection: &CollectionField,
    ) -> TableDefinition {
        let fk_column = parent_fk_column(parent_table);
        let mut columns = vec![
            ColumnDefinition::new(
                fk_column.clone(),
                column_type(self.dialect, parent.identity.scalar),
                parent.identity.scalar,
            )
            .foreign_key(),
        ];
        self.push_collection_key_columns(&collection.descriptor, &mut columns);

        TableDefinition {
            table_name: junction_table_name(parent_table, &collection.name),
            source_type_name: parent.type_name.clone(),
            columns,
            foreign_keys: vec![ForeignKeyDefinition {
                column_name: fk_column,
                referenced_table: parent_table.to_string(),
                referenced_column: parent.identity.name.clone(),
                on_delete: OnDeleteAction::Cascade,
            }],
            is_root: false,
        }
    }

    fn push_collection_key_columns(
        &self,
        descriptor: &CollectionDescriptor,
        columns: &mut Vec<ColumnDefinition>,
    ) {
        match descriptor.kind {
            CollectionKind::List => {
                columns.push(ColumnDefinition::new(
                    POSITION_COLUMN,
                    column_type(self.dialect, ScalarType::Int),
                    ScalarType::Int,
                ));
            }
            CollectionKind::Map => {
                let key = descriptor.key_type.unwrap_or(ScalarType::String);
                columns.push(ColumnDefinition::new(
                    MAP_KEY_COLUMN,
                    column_type(self.dialect, key),
                    key,
                ));
            }
            CollectionKind::Set => {}
        }
    }

    fn value_columns(
        &self,
        prefix: &str,
        node: &ValueNode,
        force_nullable: bool,
        columns: &mut Vec<ColumnDefinition>,
    ) {
        for primitive in &node.primitives {
            let mut column = ColumnDefinition::new(
                join_prefix(prefix, &primitive.name),
                column_type(self.dialect, primitive.scalar),
                primitive.scalar,
            );
            // an absent value leaves every column it contributes NULL
            column.nullable = force_nullable || primitive.nullable;
            columns.push(column);
        }
        for value_field in &node.values {
            self.value_columns(
                &join_prefix(prefix, &value_field.name),
                &value_field.node,
                force_nullable || value_field.nullable,
                columns,
            );
        }
    }
}
