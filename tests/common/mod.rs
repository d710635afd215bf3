//! Test double for the connection boundary: records every call and replays
//! scripted results, so orchestration sequencing and failure handling can be
//! asserted without a real database.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use relmap::connection::{Connection, DriverError, DriverResult, QueryResult};
use relmap::core::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin,
    Commit,
    Rollback,
    Execute { sql: String, params: Vec<Value> },
    Query { sql: String, params: Vec<Value> },
}

#[derive(Default)]
pub struct RecordingConnection {
    calls: Mutex<Vec<Call>>,
    query_script: Mutex<VecDeque<DriverResult<QueryResult>>>,
    execute_script: Mutex<VecDeque<DriverResult<u64>>>,
    open: AtomicBool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        let connection = Self::default();
        connection.open.store(true, Ordering::SeqCst);
        connection
    }

    pub fn push_query_result(&self, result: QueryResult) {
        self.query_script.lock().unwrap().push_back(Ok(result));
    }

    pub fn push_query_error(&self, error: DriverError) {
        self.query_script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_execute_result(&self, affected: u64) {
        self.execute_script.lock().unwrap().push_back(Ok(affected));
    }

    pub fn push_execute_error(&self, error: DriverError) {
        self.execute_script.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn queried_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Query { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn open(&self) -> DriverResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        self.calls.lock().unwrap().push(Call::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.execute_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(1))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<QueryResult> {
        self.calls.lock().unwrap().push(Call::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.query_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::empty()))
    }

    async fn begin(&self) -> DriverResult<()> {
        self.calls.lock().unwrap().push(Call::Begin);
        Ok(())
    }

    async fn commit(&self) -> DriverResult<()> {
        self.calls.lock().unwrap().push(Call::Commit);
        Ok(())
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.calls.lock().unwrap().push(Call::Rollback);
        Ok(())
    }
}
