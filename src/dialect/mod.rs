//! Pluggable per-backend SQL dialects.
//!
//! A dialect owns three concerns: column type names for the logical scalars,
//! encoding/decoding of uuid and datetime values, and rendering of the SQL
//! statement shapes the engine needs. Default ANSI-flavoured renderings are
//! provided so most dialects only override type names and error detection.

pub mod generic;

pub use generic::{ErrorRules, GenericDialect};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::connection::DriverError;
use crate::core::{StoreError, StoreResult, Value};
use crate::query::JoinClause;
use crate::schema::TableDefinition;

/// Classification of an opaque driver failure, fed into the runtime error
/// taxonomy by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Duplicate,
    Connection,
    Timeout,
    Unknown,
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn uuid_column_type(&self) -> String;
    fn text_column_type(&self) -> String;
    fn integer_column_type(&self) -> String;
    fn real_column_type(&self) -> String;
    fn boolean_column_type(&self) -> String;
    fn date_time_column_type(&self) -> String;

    /// How uuid values cross the wire. The default keeps the native variant;
    /// dialects may encode to text or a 16-byte blob instead.
    fn encode_uuid(&self, value: Uuid) -> Value {
        Value::Uuid(value)
    }

    fn decode_uuid(&self, value: &Value) -> StoreResult<Uuid> {
        match value {
            Value::Uuid(uuid) => Ok(*uuid),
            Value::Text(text) => Uuid::parse_str(text).map_err(|err| {
                StoreError::Serialization(format!("invalid uuid '{}': {}", text, err))
            }),
            Value::Bytes(bytes) => Uuid::from_slice(bytes).map_err(|err| {
                StoreError::Serialization(format!("invalid uuid bytes: {}", err))
            }),
            other => Err(StoreError::Serialization(format!(
                "cannot decode uuid from {}",
                other.type_name()
            ))),
        }
    }

    /// How datetime values cross the wire. The default keeps the native
    /// variant; dialects may encode to RFC 3339 text or an epoch integer.
    fn encode_date_time(&self, value: DateTime<Utc>) -> Value {
        Value::Timestamp(value)
    }

    fn decode_date_time(&self, value: &Value) -> StoreResult<DateTime<Utc>> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| {
                    StoreError::Serialization(format!("invalid datetime '{}': {}", text, err))
                }),
            Value::Integer(seconds) => Utc
                .timestamp_opt(*seconds, 0)
                .single()
                .ok_or_else(|| {
                    StoreError::Serialization(format!("invalid epoch timestamp {}", seconds))
                }),
            other => Err(StoreError::Serialization(format!(
                "cannot decode datetime from {}",
                other.type_name()
            ))),
        }
    }

    /// Statement parameter placeholder. `index` is 1-based for dialects with
    /// numbered placeholders.
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    /// Renders idempotent DDL for one table: one line per column, then one
    /// line per foreign key. Re-running the statement is a no-op.
    fn create_table_if_not_exists(&self, table: &TableDefinition) -> String {
        let mut lines = Vec::with_capacity(table.columns.len() + table.foreign_keys.len());
        for column in &table.columns {
            let mut line = format!("{} {}", column.name, column.sql_type);
            if column.is_primary_key {
                line.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                line.push_str(" NOT NULL");
            }
            lines.push(line);
        }
        for fk in &table.foreign_keys {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
                fk.column_name,
                fk.referenced_table,
                fk.referenced_column,
                fk.on_delete.as_sql()
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table.table_name,
            lines.join(", ")
        )
    }

    /// Upsert template for one row, with one placeholder per column.
    fn insert_or_replace(&self, table: &str, columns: &[String]) -> String {
        let placeholders = (1..=columns.len())
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        )
    }

    /// Joined select over the root and its owned-entity tables.
    fn select_with_joins(&self, root: &TableDefinition, joins: &[JoinClause]) -> String {
        let mut sql = format!("SELECT * FROM {}", root.table_name);
        for join in joins {
            sql.push_str(&format!(
                " {} JOIN {} ON {}",
                join.join_type.as_sql(),
                join.table,
                join.on_condition
            ));
        }
        sql
    }

    /// Keyed select used for junction/element table loads.
    fn select_by_column(&self, table: &str, key_column: &str, order_by: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            table,
            key_column,
            self.placeholder(1)
        );
        if let Some(column) = order_by {
            sql.push_str(&format!(" ORDER BY {} ASC", column));
        }
        sql
    }

    /// Keyed delete used for root deletes and junction replacement.
    fn delete_by_column(&self, table: &str, key_column: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            table,
            key_column,
            self.placeholder(1)
        )
    }

    /// Maps an opaque driver failure onto the runtime taxonomy.
    fn classify_driver_error(&self, error: &DriverError) -> DriverErrorKind;
}
