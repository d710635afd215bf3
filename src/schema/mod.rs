//! Relational schema model.
//!
//! Table, column and foreign-key definitions produced by the generator and
//! consumed by the join builder and the persistence orchestrator.

pub mod generator;
pub mod type_mapper;

pub use generator::{SchemaGenerator, generate_schema};
pub use type_mapper::{column_type, is_nullable_name, scalar_from_name, strip_nullable_name};

use serde::{Deserialize, Serialize};

use crate::core::ScalarType;

/// Ordering column added to list junction/element tables.
pub const POSITION_COLUMN: &str = "position";
/// Key column added to map junction/element tables.
pub const MAP_KEY_COLUMN: &str = "map_key";
/// Element column of primitive-element junction tables.
pub const VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDeleteAction {
    Cascade,
    Restrict,
    SetNull,
}

impl OnDeleteAction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub logical_type: ScalarType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, logical_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            logical_type,
            nullable: false,
            is_primary_key: false,
            is_foreign_key: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn foreign_key(mut self) -> Self {
        self.is_foreign_key = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: OnDeleteAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table_name: String,
    pub source_type_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    pub is_root: bool,
}

impl TableDefinition {
    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.is_primary_key)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// Derives the table name for a domain type: `OrderItem` becomes
/// `order_item`. Non-alphanumeric characters become underscores.
pub fn table_name_for(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    let mut prev_lower = false;
    for ch in type_name.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
                prev_lower = false;
            } else {
                out.push(ch);
                prev_lower = true;
            }
        } else {
            out.push('_');
            prev_lower = false;
        }
    }
    out
}

/// Name of the foreign-key column pointing back at a parent table.
pub fn parent_fk_column(parent_table: &str) -> String {
    format!("{}_id", parent_table)
}

/// Name of the junction table reifying a collection field.
pub fn junction_table_name(parent_table: &str, field_name: &str) -> String {
    format!("{}_{}_items", parent_table, field_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for("Order"), "order");
        assert_eq!(table_name_for("OrderItem"), "order_item");
        assert_eq!(table_name_for("HTTPServer"), "httpserver");
        assert_eq!(table_name_for("user profile"), "user_profile");
    }

    #[test]
    fn test_junction_and_fk_names() {
        assert_eq!(parent_fk_column("order"), "order_id");
        assert_eq!(junction_table_name("order", "tags"), "order_tags_items");
    }
}
