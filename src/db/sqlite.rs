//! SQLite database client implementation.
//!
//! Opens a single connection to a database file (created on first use) or
//! to a private in-memory database.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection, Either, Executor, Row as SqlxRow, TypeInfo,
    ValueRef,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{QsqlError, Result};

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Mutex<Option<SqliteConnection>>,
}

impl SqliteClient {
    /// Opens `locator`, which is a file path, `sqlite:` URL or `:memory:`.
    pub async fn connect(locator: &str) -> Result<Self> {
        let options = connect_options(locator)?;
        let conn = options
            .connect()
            .await
            .map_err(|e| QsqlError::connection(format!("Cannot open SQLite database '{locator}': {e}")))?;

        debug!(locator, "opened SQLite database");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

fn connect_options(locator: &str) -> Result<SqliteConnectOptions> {
    let path = locator
        .strip_prefix("sqlite://")
        .or_else(|| locator.strip_prefix("sqlite:"))
        .unwrap_or(locator);

    let options = if path == ":memory:" || path.is_empty() {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| QsqlError::connection(e.to_string()))?
    } else {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
    };

    Ok(options.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS)))
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| QsqlError::connection("connection is closed"))?;

        let mut columns: Option<Vec<ColumnInfo>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut rows_affected = 0;

        {
            let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| QsqlError::query(format_query_error(e)))?
            {
                match item {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => {
                        if columns.is_none() {
                            columns = Some(column_info(&row));
                        }
                        rows.push(convert_row(&row));
                    }
                }
            }
        }

        // No rows means no column list from the stream; ask the statement.
        let columns = match columns {
            Some(columns) => columns,
            None => describe_columns(conn, sql).await,
        };

        Ok(QueryResult::with_data(columns, rows)
            .with_rows_affected(rows_affected)
            .with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.close()
                .await
                .map_err(|e| QsqlError::connection(e.to_string()))?;
        }
        Ok(())
    }
}

/// Column metadata of a statement that returned no rows.
///
/// Best effort: multi-statement text and statements without a result set
/// yield no columns.
async fn describe_columns(conn: &mut SqliteConnection, sql: &str) -> Vec<ColumnInfo> {
    match (&mut *conn).describe(sql).await {
        Ok(describe) => describe
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect(),
        Err(e) => {
            debug!(error = %e, "no column metadata for statement");
            Vec::new()
        }
    }
}

fn column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Converts one value using its storage class.
///
/// SQLite typing is per value, not per column, so the declared column type
/// is not consulted.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    let value = match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => row.try_get::<i64, _>(index).map(Value::Int),
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),
        "REAL" | "FLOAT" | "DOUBLE" => row.try_get::<f64, _>(index).map(Value::Float),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::String),
    };

    value.unwrap_or(Value::Null)
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}
