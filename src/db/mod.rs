//! Database abstraction layer for QuickSQL.
//!
//! Provides a trait-based interface for database operations, allowing
//! different database backends to be used interchangeably. Every query file
//! gets its own client; a client owns exactly one connection.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{QsqlError, Result};
use crate::file::InputSpec;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string for headers and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from an explicit kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Infers the backend from a bare locator string.
    pub fn infer(locator: &str) -> Option<Self> {
        let locator = locator.trim().to_lowercase();
        if locator.starts_with("postgres://") || locator.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if locator == ":memory:"
            || locator.starts_with("sqlite:")
            || [".db", ".sqlite", ".sqlite3"]
                .iter()
                .any(|ext| locator.ends_with(ext))
        {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

/// Opens a client for the given input spec.
///
/// This is the central factory function for database connections. Failing to
/// connect within `timeout` is reported as a connection error.
pub async fn connect(input: &InputSpec, timeout: Duration) -> Result<Box<dyn DatabaseClient>> {
    let backend = input.backend().ok_or_else(|| {
        QsqlError::connection(format!(
            "backend '{}' is not supported (expected sqlite or postgres)",
            input.kind
        ))
    })?;

    debug!(input = %input.display_string(), "opening connection");

    let connecting = async {
        let client: Box<dyn DatabaseClient> = match backend {
            DatabaseBackend::Sqlite => Box::new(SqliteClient::connect(&input.locator).await?),
            DatabaseBackend::Postgres => Box::new(PostgresClient::connect(&input.locator).await?),
        };
        Ok::<_, QsqlError>(client)
    };

    tokio::time::timeout(timeout, connecting)
        .await
        .map_err(|_| {
            QsqlError::connection(format!(
                "connecting to {} timed out after {}s",
                input.display_string(),
                timeout.as_secs()
            ))
        })?
}

/// Trait defining the interface for database clients.
///
/// Statements on one client run strictly one at a time, so effects of an
/// earlier statement are visible to the next.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Returns which backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Executes SQL text and returns any rows it produced.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
