//! Persistence orchestration.
//!
//! [`AggregateStore`] sequences the per-table reads, writes and deletes for
//! one aggregate type inside a single transaction per logical operation.
//! Schema analysis and generation happen once in the constructor; every
//! operation afterwards only walks the prepared tree, tables and join plan.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_recursion::async_recursion;
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{Level, event, info_span};

use crate::analyzer::{
    CollectionField, CollectionKind, ElementKind, EntityNode, OwnershipTree, analyze,
};
use crate::connection::{Connection, DriverError};
use crate::core::{SchemaResult, StoreError, StoreResult};
use crate::descriptor::DescriptorRegistry;
use crate::dialect::{Dialect, DriverErrorKind};
use crate::mapper::JsonMap;
use crate::mapper::convert::{json_to_value, value_to_json};
use crate::mapper::rows::{
    collection_from_rows, collection_rows, decode_entity_row, entity_row, map_key_to_json,
};
use crate::query::{JoinPlan, plan_joins};
use crate::schema::generator::SchemaGenerator;
use crate::schema::{
    MAP_KEY_COLUMN, POSITION_COLUMN, TableDefinition, junction_table_name, parent_fk_column,
    table_name_for,
};

/// Converts an aggregate to and from its map representation.
///
/// The default implementation round-trips through `serde_json`; applications
/// with their own serialization subsystem plug it in here.
pub trait Serializer<T>: Send + Sync {
    fn to_map(&self, aggregate: &T) -> StoreResult<JsonMap>;
    fn from_map(&self, map: JsonMap) -> StoreResult<T>;
}

pub struct SerdeSerializer;

impl<T> Serializer<T> for SerdeSerializer
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn to_map(&self, aggregate: &T) -> StoreResult<JsonMap> {
        match serde_json::to_value(aggregate)
            .map_err(|err| StoreError::Serialization(err.to_string()))?
        {
            JsonValue::Object(map) => Ok(map),
            other => Err(StoreError::Serialization(format!(
                "aggregate must serialize to an object, got {}",
                other
            ))),
        }
    }

    fn from_map(&self, map: JsonMap) -> StoreResult<T> {
        serde_json::from_value(JsonValue::Object(map))
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }
}

/// Nested-transaction depth. The frame that moves the counter off zero owns
/// the transaction; inner frames join it and never commit or roll back.
struct TransactionDepth(AtomicU32);

impl TransactionDepth {
    const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Returns whether the calling frame owns the transaction.
    fn enter(&self) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst) == 0
    }

    fn exit(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AggregateStore<T> {
    tree: OwnershipTree,
    tables: Vec<TableDefinition>,
    join_plan: JoinPlan,
    root_table_name: String,
    dialect: Arc<dyn Dialect>,
    connection: Arc<dyn Connection>,
    serializer: Arc<dyn Serializer<T>>,
    depth: TransactionDepth,
}

impl<T> AggregateStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        registry: &DescriptorRegistry,
        aggregate: &str,
        dialect: Arc<dyn Dialect>,
        connection: Arc<dyn Connection>,
    ) -> SchemaResult<Self> {
        Self::with_serializer(registry, aggregate, dialect, connection, Arc::new(SerdeSerializer))
    }
}

impl<T> AggregateStore<T> {
    pub fn with_serializer(
        registry: &DescriptorRegistry,
        aggregate: &str,
        dialect: Arc<dyn Dialect>,
        connection: Arc<dyn Connection>,
        serializer: Arc<dyn Serializer<T>>,
    ) -> SchemaResult<Self> {
        let tree = analyze(registry, aggregate)?;
        let tables = SchemaGenerator::new(dialect.as_ref()).generate(&tree)?;
        let join_plan = plan_joins(&tree);
        let root_table_name = table_name_for(&tree.root.type_name);

        Ok(Self {
            tree,
            tables,
            join_plan,
            root_table_name,
            dialect,
            connection,
            serializer,
            depth: TransactionDepth::new(),
        })
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn join_plan(&self) -> &JoinPlan {
        &self.join_plan
    }

    /// The DDL statements `create_tables` executes, for inspection/tooling.
    pub fn create_table_statements(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|table| self.dialect.create_table_if_not_exists(table))
            .collect()
    }

    /// Idempotently creates every table of the aggregate. Safe to call
    /// repeatedly; the DDL is `IF NOT EXISTS`, never drop/recreate.
    pub async fn create_tables(&self) -> StoreResult<()> {
        let span = info_span!("store.create_tables", aggregate = %self.tree.root.type_name);
        let _enter = span.enter();

        for table in &self.tables {
            let ddl = self.dialect.create_table_if_not_exists(table);
            self.connection
                .execute(&ddl, &[])
                .await
                .map_err(|err| self.map_driver_error(err))?;
        }
        event!(Level::DEBUG, tables = self.tables.len(), "schema ensured");
        Ok(())
    }

    /// Writes the whole aggregate: root row upsert, one upsert per present
    /// owned entity, and delete-then-reinsert for every collection field —
    /// all inside one transaction. Joining an outer transaction defers the
    /// commit to its owner. An optional owned entity that became absent is
    /// not deleted here; owned rows disappear when the aggregate does.
    pub async fn save(&self, aggregate: &T) -> StoreResult<()> {
        let map = self.serializer.to_map(aggregate)?;
        let span = info_span!("store.save", aggregate = %self.tree.root.type_name);
        let _enter = span.enter();

        let owner = self.depth.enter();
        if owner {
            if let Err(err) = self.connection.begin().await {
                self.depth.exit();
                return Err(self.map_driver_error(err));
            }
        }

        let root_table = self.root_table_name.clone();
        let result = self
            .save_entity(&self.tree.root, &root_table, &map, &JsonMap::new())
            .await;
        self.depth.exit();

        match result {
            Ok(()) => {
                if owner {
                    if let Err(err) = self.connection.commit().await {
                        let mapped = self.map_driver_error(err);
                        if let Err(rollback_err) = self.connection.rollback().await {
                            warn!("rollback after failed commit also failed: {}", rollback_err);
                        }
                        return Err(mapped);
                    }
                }
                event!(Level::DEBUG, "aggregate saved");
                Ok(())
            }
            Err(err) => {
                if owner {
                    if let Err(rollback_err) = self.connection.rollback().await {
                        warn!("rollback after failed save also failed: {}", rollback_err);
                    }
                }
                Err(err)
            }
        }
    }

    /// Loads one aggregate: a single joined select for the root and its
    /// owned-entity chain, then one keyed select per collection field,
    /// merged in memory.
    pub async fn get_by_id<I: Serialize>(&self, id: I) -> StoreResult<T> {
        let id_json =
            serde_json::to_value(id).map_err(|err| StoreError::Serialization(err.to_string()))?;
        let span = info_span!("store.get", aggregate = %self.tree.root.type_name);
        let _enter = span.enter();

        let root_table = self.table(&self.root_table_name)?;
        let sql = self.joined_select_sql(root_table);
        let id_param = json_to_value(
            self.dialect.as_ref(),
            self.tree.root.identity.scalar,
            &id_json,
        )?;
        let result = self
            .connection
            .query(&sql, &[id_param])
            .await
            .map_err(|err| self.map_driver_error(err))?;

        let Some(row) = result.rows.first() else {
            return Err(StoreError::NotFound(display_id(&id_json)));
        };

        let mut offset = 0usize;
        let root_row = self.decode_slice(root_table, row, &mut offset)?;
        let mut aggregate = decode_entity_row(&self.tree.root, &root_row);

        for entry in &self.join_plan.entries {
            let entry_table = self.table(&entry.table_name)?;
            let child_row = self.decode_slice(entry_table, row, &mut offset)?;
            let child_value = match child_row.get(&entry.node.identity.name) {
                None | Some(JsonValue::Null) => JsonValue::Null,
                _ => JsonValue::Object(decode_entity_row(&entry.node, &child_row)),
            };
            insert_at_path(&mut aggregate, &entry.field_path, child_value);
        }

        let root_table_name = self.root_table_name.clone();
        self.hydrate_collections(&self.tree.root, &root_table_name, &mut aggregate)
            .await?;
        event!(Level::DEBUG, "aggregate loaded");
        self.serializer.from_map(aggregate)
    }

    /// Deletes the root row by id and lets `ON DELETE CASCADE` remove every
    /// owned-entity and junction row.
    pub async fn delete_by_id<I: Serialize>(&self, id: I) -> StoreResult<()> {
        let id_json =
            serde_json::to_value(id).map_err(|err| StoreError::Serialization(err.to_string()))?;
        let span = info_span!("store.delete", aggregate = %self.tree.root.type_name);
        let _enter = span.enter();

        let sql = self
            .dialect
            .delete_by_column(&self.root_table_name, &self.tree.root.identity.name);
        let id_param = json_to_value(
            self.dialect.as_ref(),
            self.tree.root.identity.scalar,
            &id_json,
        )?;
        let affected = self
            .connection
            .execute(&sql, &[id_param])
            .await
            .map_err(|err| self.map_driver_error(err))?;

        if affected == 0 {
            return Err(StoreError::NotFound(display_id(&id_json)));
        }
        event!(Level::DEBUG, "aggregate deleted");
        Ok(())
    }

    /// Keyed existence probe without reconstructing the aggregate.
    pub async fn exists<I: Serialize>(&self, id: I) -> StoreResult<bool> {
        let id_json =
            serde_json::to_value(id).map_err(|err| StoreError::Serialization(err.to_string()))?;
        let sql = self.dialect.select_by_column(
            &self.root_table_name,
            &self.tree.root.identity.name,
            None,
        );
        let id_param = json_to_value(
            self.dialect.as_ref(),
            self.tree.root.identity.scalar,
            &id_json,
        )?;
        let result = self
            .connection
            .query(&sql, &[id_param])
            .await
            .map_err(|err| self.map_driver_error(err))?;
        Ok(!result.is_empty())
    }

    /// Runs `op` inside one transaction. Store operations invoked by `op`
    /// join it instead of opening their own; commit and rollback stay with
    /// this frame.
    pub async fn with_transaction<F, Fut, R>(&self, op: F) -> StoreResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<R>>,
    {
        let owner = self.depth.enter();
        if owner {
            if let Err(err) = self.connection.begin().await {
                self.depth.exit();
                return Err(self.map_driver_error(err));
            }
        }

        let result = op().await;
        self.depth.exit();

        match result {
            Ok(value) => {
                if owner {
                    if let Err(err) = self.connection.commit().await {
                        let mapped = self.map_driver_error(err);
                        if let Err(rollback_err) = self.connection.rollback().await {
                            warn!("rollback after failed commit also failed: {}", rollback_err);
                        }
                        return Err(mapped);
                    }
                }
                Ok(value)
            }
            Err(err) => {
                if owner {
                    if let Err(rollback_err) = self.connection.rollback().await {
                        warn!("rollback after failed transaction also failed: {}", rollback_err);
                    }
                }
                Err(err)
            }
        }
    }

    #[async_recursion]
    async fn save_entity(
        &self,
        node: &EntityNode,
        table_name: &str,
        entity: &JsonMap,
        extra: &JsonMap,
    ) -> StoreResult<()> {
        let id = entity
            .get(&node.identity.name)
            .cloned()
            .unwrap_or(JsonValue::Null);
        if id.is_null() {
            return Err(StoreError::Serialization(format!(
                "entity '{}' is missing its identity field '{}'",
                node.type_name, node.identity.name
            )));
        }

        let table = self.table(table_name)?;
        let mut row = entity_row(node, entity);
        for (column, cell) in extra {
            row.insert(column.clone(), cell.clone());
        }
        self.upsert_row(table, &row).await?;

        for child in &node.entities {
            if let Some(JsonValue::Object(child_map)) = entity.get(&child.name) {
                let child_table = table_name_for(&child.node.type_name);
                let mut fk = JsonMap::new();
                fk.insert(parent_fk_column(table_name), id.clone());
                self.save_entity(&child.node, &child_table, child_map, &fk)
                    .await?;
            }
        }

        for field in &node.collections {
            let items = entity.get(&field.name).cloned().unwrap_or(JsonValue::Null);
            self.replace_collection(table_name, field, &id, &items)
                .await?;
        }

        Ok(())
    }

    /// Replace-all semantics per collection field: every row keyed by this
    /// parent is deleted, then the current elements are reinserted.
    #[async_recursion]
    async fn replace_collection(
        &self,
        parent_table: &str,
        field: &CollectionField,
        parent_id: &JsonValue,
        items: &JsonValue,
    ) -> StoreResult<()> {
        let fk_column = parent_fk_column(parent_table);
        let target_table = collection_table_name(parent_table, field);
        let table = self.table(&target_table)?;

        let fk_logical = table
            .column(&fk_column)
            .ok_or_else(|| {
                StoreError::Serialization(format!(
                    "table '{}' is missing its parent key column '{}'",
                    target_table, fk_column
                ))
            })?
            .logical_type;
        let parent_param = json_to_value(self.dialect.as_ref(), fk_logical, parent_id)?;

        let delete_sql = self.dialect.delete_by_column(&target_table, &fk_column);
        self.connection
            .execute(&delete_sql, &[parent_param])
            .await
            .map_err(|err| self.map_driver_error(err))?;

        if let Some(element_node) = field.entity_element.as_deref() {
            // entity elements go through the entity path so their own
            // children are written too
            match (field.descriptor.kind, items) {
                (_, JsonValue::Null) => Ok(()),
                (CollectionKind::List, JsonValue::Array(elements))
                | (CollectionKind::Set, JsonValue::Array(elements)) => {
                    for (index, element) in elements.iter().enumerate() {
                        let JsonValue::Object(element_map) = element else {
                            return Err(element_not_object(&field.name));
                        };
                        let mut extra = JsonMap::new();
                        extra.insert(fk_column.clone(), parent_id.clone());
                        if field.descriptor.kind == CollectionKind::List {
                            extra.insert(
                                POSITION_COLUMN.to_string(),
                                JsonValue::from(index as i64),
                            );
                        }
                        self.save_entity(element_node, &target_table, element_map, &extra)
                            .await?;
                    }
                    Ok(())
                }
                (CollectionKind::Map, JsonValue::Object(entries)) => {
                    let key_type = field
                        .descriptor
                        .key_type
                        .unwrap_or(crate::core::ScalarType::String);
                    for (key, element) in entries {
                        let JsonValue::Object(element_map) = element else {
                            return Err(element_not_object(&field.name));
                        };
                        let mut extra = JsonMap::new();
                        extra.insert(fk_column.clone(), parent_id.clone());
                        extra.insert(
                            MAP_KEY_COLUMN.to_string(),
                            map_key_to_json(&field.name, key, key_type)?,
                        );
                        self.save_entity(element_node, &target_table, element_map, &extra)
                            .await?;
                    }
                    Ok(())
                }
                (_, other) => Err(StoreError::Serialization(format!(
                    "collection field '{}' has an unexpected serialized shape: {}",
                    field.name, other
                ))),
            }
        } else {
            let rows = collection_rows(field, &fk_column, parent_id, items)?;
            for row in &rows {
                self.upsert_row(table, row).await?;
            }
            Ok(())
        }
    }

    #[async_recursion]
    async fn hydrate_collections(
        &self,
        node: &EntityNode,
        table_name: &str,
        entity: &mut JsonMap,
    ) -> StoreResult<()> {
        for child in &node.entities {
            let child_table = table_name_for(&child.node.type_name);
            if let Some(JsonValue::Object(child_map)) = entity.get_mut(&child.name) {
                self.hydrate_collections(&child.node, &child_table, child_map)
                    .await?;
            }
        }

        let id = entity
            .get(&node.identity.name)
            .cloned()
            .unwrap_or(JsonValue::Null);
        for field in &node.collections {
            let value = self.load_collection(table_name, field, &id).await?;
            entity.insert(field.name.clone(), value);
        }
        Ok(())
    }

    async fn load_collection(
        &self,
        parent_table: &str,
        field: &CollectionField,
        parent_id: &JsonValue,
    ) -> StoreResult<JsonValue> {
        let fk_column = parent_fk_column(parent_table);
        let target_table = collection_table_name(parent_table, field);
        let table = self.table(&target_table)?;

        let order_by = match field.descriptor.kind {
            CollectionKind::List => Some(POSITION_COLUMN),
            CollectionKind::Set | CollectionKind::Map => None,
        };
        let sql = self
            .dialect
            .select_by_column(&target_table, &fk_column, order_by);

        let fk_logical = table
            .column(&fk_column)
            .ok_or_else(|| {
                StoreError::Serialization(format!(
                    "table '{}' is missing its parent key column '{}'",
                    target_table, fk_column
                ))
            })?
            .logical_type;
        let parent_param = json_to_value(self.dialect.as_ref(), fk_logical, parent_id)?;

        let result = self
            .connection
            .query(&sql, &[parent_param])
            .await
            .map_err(|err| self.map_driver_error(err))?;

        let mut rows = Vec::with_capacity(result.rows.len());
        for raw in &result.rows {
            let mut offset = 0usize;
            rows.push(self.decode_slice(table, raw, &mut offset)?);
        }

        let mut value = collection_from_rows(field, &rows)?;

        if let Some(element_node) = field.entity_element.as_deref() {
            let element_table = table_name_for(&element_node.type_name);
            match &mut value {
                JsonValue::Array(elements) => {
                    for element in elements {
                        if let JsonValue::Object(map) = element {
                            self.hydrate_element(element_node, &element_table, map).await?;
                        }
                    }
                }
                JsonValue::Object(entries) => {
                    for (_key, element) in entries.iter_mut() {
                        if let JsonValue::Object(map) = element {
                            self.hydrate_element(element_node, &element_table, map).await?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(value)
    }

    /// Loads the parts of a collection-element entity that the joined select
    /// cannot cover: its own single-valued owned entities, then its
    /// collections.
    #[async_recursion]
    async fn hydrate_element(
        &self,
        node: &EntityNode,
        table_name: &str,
        entity: &mut JsonMap,
    ) -> StoreResult<()> {
        let id = entity
            .get(&node.identity.name)
            .cloned()
            .unwrap_or(JsonValue::Null);

        for child in &node.entities {
            let child_table = table_name_for(&child.node.type_name);
            let table = self.table(&child_table)?;
            let fk_column = parent_fk_column(table_name);
            let fk_logical = table
                .column(&fk_column)
                .ok_or_else(|| {
                    StoreError::Serialization(format!(
                        "table '{}' is missing its parent key column '{}'",
                        child_table, fk_column
                    ))
                })?
                .logical_type;
            let sql = self.dialect.select_by_column(&child_table, &fk_column, None);
            let param = json_to_value(self.dialect.as_ref(), fk_logical, &id)?;
            let result = self
                .connection
                .query(&sql, &[param])
                .await
                .map_err(|err| self.map_driver_error(err))?;

            let value = match result.rows.first() {
                None => JsonValue::Null,
                Some(raw) => {
                    let mut offset = 0usize;
                    let row_map = self.decode_slice(table, raw, &mut offset)?;
                    let mut child_map = decode_entity_row(&child.node, &row_map);
                    self.hydrate_element(&child.node, &child_table, &mut child_map)
                        .await?;
                    JsonValue::Object(child_map)
                }
            };
            entity.insert(child.name.clone(), value);
        }

        for field in &node.collections {
            let value = self.load_collection(table_name, field, &id).await?;
            entity.insert(field.name.clone(), value);
        }
        Ok(())
    }

    async fn upsert_row(&self, table: &TableDefinition, row: &JsonMap) -> StoreResult<()> {
        let columns = table.column_names();
        let sql = self.dialect.insert_or_replace(&table.table_name, &columns);
        let params = self.bind_row(table, row)?;
        self.connection
            .execute(&sql, &params)
            .await
            .map_err(|err| self.map_driver_error(err))?;
        Ok(())
    }

    fn bind_row(&self, table: &TableDefinition, row: &JsonMap) -> StoreResult<Vec<crate::core::Value>> {
        table
            .columns
            .iter()
            .map(|column| {
                let cell = row.get(&column.name).unwrap_or(&JsonValue::Null);
                json_to_value(self.dialect.as_ref(), column.logical_type, cell)
            })
            .collect()
    }

    fn decode_slice(
        &self,
        table: &TableDefinition,
        row: &[crate::core::Value],
        offset: &mut usize,
    ) -> StoreResult<JsonMap> {
        let end = *offset + table.columns.len();
        let slice = row.get(*offset..end).ok_or_else(|| {
            StoreError::Serialization(format!(
                "row is shorter than the joined column set of table '{}'",
                table.table_name
            ))
        })?;
        *offset = end;

        let mut map = JsonMap::new();
        for (column, cell) in table.columns.iter().zip(slice) {
            map.insert(
                column.name.clone(),
                value_to_json(self.dialect.as_ref(), column.logical_type, cell)?,
            );
        }
        Ok(map)
    }

    fn joined_select_sql(&self, root: &TableDefinition) -> String {
        let select = self.dialect.select_with_joins(root, &self.join_plan.clauses);
        format!(
            "{} WHERE {}.{} = {}",
            select,
            root.table_name,
            self.tree.root.identity.name,
            self.dialect.placeholder(1)
        )
    }

    fn table(&self, name: &str) -> StoreResult<&TableDefinition> {
        self.tables
            .iter()
            .find(|table| table.table_name == name)
            .ok_or_else(|| {
                StoreError::Serialization(format!("no generated table named '{}'", name))
            })
    }

    fn map_driver_error(&self, error: DriverError) -> StoreError {
        match self.dialect.classify_driver_error(&error) {
            DriverErrorKind::Duplicate => StoreError::Duplicate(error.message),
            DriverErrorKind::Connection => StoreError::Connection(error.message),
            DriverErrorKind::Timeout => StoreError::Timeout(error.message),
            DriverErrorKind::Unknown => StoreError::Unknown { source: error },
        }
    }
}

fn collection_table_name(parent_table: &str, field: &CollectionField) -> String {
    match &field.descriptor.element_kind {
        ElementKind::Entity(name) => table_name_for(name),
        _ => junction_table_name(parent_table, &field.name),
    }
}

fn insert_at_path(map: &mut JsonMap, path: &[String], value: JsonValue) {
    match path {
        [] => {}
        [leaf] => {
            map.insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.clone())
                .or_insert_with(|| JsonValue::Object(JsonMap::new()));
            if let JsonValue::Object(inner) = entry {
                insert_at_path(inner, rest, value);
            }
            // a Null parent (absent optional entity) swallows its children
        }
    }
}

fn element_not_object(field: &str) -> StoreError {
    StoreError::Serialization(format!(
        "element of collection field '{}' must serialize to an object",
        field
    ))
}

fn display_id(id: &JsonValue) -> String {
    match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
