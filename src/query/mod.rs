//! Join planning.
//!
//! Builds the join list used to reconstruct an aggregate's non-collection
//! portion in one round trip: the root table plus one join per owned-entity
//! table, depth-first. Collection tables are deliberately excluded — their
//! cardinality would duplicate root columns — and are loaded with separate
//! keyed queries instead.

use serde::{Deserialize, Serialize};

use crate::analyzer::{EntityNode, OwnershipTree};
use crate::schema::{parent_fk_column, table_name_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Left,
    Inner,
}

impl JoinType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Inner => "INNER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    pub table: String,
    pub on_condition: String,
    pub join_type: JoinType,
}

/// One joined owned-entity table, with enough context to put its decoded
/// row back into the aggregate map.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEntry {
    /// Field path from the aggregate root to this entity.
    pub field_path: Vec<String>,
    pub table_name: String,
    pub nullable: bool,
    pub node: EntityNode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinPlan {
    pub clauses: Vec<JoinClause>,
    pub entries: Vec<JoinEntry>,
}

/// Plans the joined select for an ownership tree. Optional entities join
/// LEFT so their absence does not eliminate the root row; required entities
/// join INNER. An entity under an optional parent is optional too.
pub fn plan_joins(tree: &OwnershipTree) -> JoinPlan {
    let mut plan = JoinPlan::default();
    let root_table = table_name_for(&tree.root.type_name);
    let mut path = Vec::new();
    collect(
        &tree.root,
        &root_table,
        &tree.root.identity.name,
        &mut path,
        false,
        &mut plan,
    );
    plan
}

fn collect(
    node: &EntityNode,
    table: &str,
    id_column: &str,
    path: &mut Vec<String>,
    inherited_nullable: bool,
    plan: &mut JoinPlan,
) {
    for child in &node.entities {
        let child_table = table_name_for(&child.node.type_name);
        let nullable = inherited_nullable || child.nullable;
        let join_type = if nullable {
            JoinType::Left
        } else {
            JoinType::Inner
        };

        plan.clauses.push(JoinClause {
            table: child_table.clone(),
            on_condition: format!(
                "{}.{} = {}.{}",
                table,
                id_column,
                child_table,
                parent_fk_column(table)
            ),
            join_type,
        });

        path.push(child.name.clone());
        plan.entries.push(JoinEntry {
            field_path: path.clone(),
            table_name: child_table.clone(),
            nullable,
            node: child.node.clone(),
        });

        collect(
            &child.node,
            &child_table,
            &child.node.identity.name,
            path,
            nullable,
            plan,
        );
        path.pop();
    }
}
