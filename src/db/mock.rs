//! Mock database client for testing.
//!
//! Records every statement it receives and answers with canned results, so
//! execution order and failure handling can be checked without a database.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Value};
use crate::error::{QsqlError, Result};

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    executed: Mutex<Vec<String>>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    closed: Mutex<bool>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes any statement containing `fragment` fail.
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on.push(fragment.into());
        self
    }

    /// Makes every statement take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Statements received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|closed| *closed).unwrap_or(false)
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fragment) = self.fail_on.iter().find(|f| sql.contains(f.as_str())) {
            return Err(QsqlError::query(format!("mock failure on '{fragment}'")));
        }

        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            let columns = vec![ColumnInfo::new("result", "TEXT")];
            let rows = vec![vec![Value::String(format!("Mock result for: {sql}"))]];
            Ok(QueryResult::with_data(columns, rows).with_execution_time(Duration::from_millis(1)))
        } else {
            Ok(QueryResult::new()
                .with_rows_affected(1)
                .with_execution_time(Duration::from_millis(1)))
        }
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        Ok(())
    }
}
