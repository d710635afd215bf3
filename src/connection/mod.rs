//! Connection abstraction.
//!
//! Backend drivers implement [`Connection`]; the engine treats its calls as
//! opaque and potentially slow, issues a bounded sequence of them per
//! operation, and never spawns tasks of its own. Failures cross this
//! boundary as [`DriverError`] and are classified by the dialect's rules.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::Value;

/// Opaque failure from a backend driver. `code` carries the vendor error
/// code when the driver has one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Rows returned by a query, positionally.
///
/// Rows stay positional rather than keyed because a joined `SELECT *`
/// legitimately repeats column names across tables; the orchestrator decodes
/// positionally against the table definitions it generated itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait Connection: Send + Sync {
    async fn open(&self) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;

    fn is_open(&self) -> bool;

    /// Executes a statement and returns the affected-row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64>;

    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<QueryResult>;

    async fn begin(&self) -> DriverResult<()>;

    async fn commit(&self) -> DriverResult<()>;

    async fn rollback(&self) -> DriverResult<()>;
}
