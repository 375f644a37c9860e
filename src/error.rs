//! Error types for QuickSQL.
//!
//! Every failure the engine can report is a `QsqlError` variant. Each variant
//! knows whether it ends processing of the whole file or only of one query.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for QuickSQL operations.
#[derive(Error, Debug)]
pub enum QsqlError {
    /// The metadata header of a file could not be parsed.
    #[error("Header error in {}: {message} (near `{fragment}`)", file.display())]
    HeaderParse {
        file: PathBuf,
        fragment: String,
        message: String,
    },

    /// Two named blocks in one file share a name.
    #[error("Duplicate query name '{name}' in {}", file.display())]
    DuplicateQueryName { file: PathBuf, name: String },

    /// A named block has no SQL after comments and whitespace are removed.
    #[error("Query '{query}' in {} has no SQL text", file.display())]
    EmptyQuery { file: PathBuf, query: String },

    /// A placeholder names a variable that is not bound.
    #[error("Unbound variable '{variable}' in query '{query}' of {}", file.display())]
    UnboundVariable {
        file: PathBuf,
        query: String,
        variable: String,
    },

    /// The database rejected a statement (syntax error, missing table, etc.)
    #[error("Query error: {0}")]
    QueryExecution(String),

    /// The data source could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A result artifact could not be written.
    #[error("Output error: {0}")]
    OutputWrite(String),

    /// A blocking operation exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors (invalid config file, bad CLI values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading a query file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How far an error reaches inside the file that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// Remaining queries of the file cannot run.
    File,
    /// Only the query that raised it is affected.
    Query,
}

impl QsqlError {
    /// Creates a query execution error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryExecution(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an output write error with the given message.
    pub fn output(msg: impl Into<String>) -> Self {
        Self::OutputWrite(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::HeaderParse { .. } => "Header Parse Error",
            Self::DuplicateQueryName { .. } => "Duplicate Query Name",
            Self::EmptyQuery { .. } => "Empty Query",
            Self::UnboundVariable { .. } => "Unbound Variable",
            Self::QueryExecution(_) => "Query Error",
            Self::Connection(_) => "Connection Error",
            Self::OutputWrite(_) => "Output Error",
            Self::Timeout(_) => "Timeout",
            Self::Config(_) => "Configuration Error",
            Self::Io { .. } => "I/O Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns whether this error ends the file or only the current query.
    ///
    /// Timeouts are query-scoped here; a connect timeout is reported as a
    /// `Connection` error by the connector instead.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::UnboundVariable { .. }
            | Self::QueryExecution(_)
            | Self::OutputWrite(_)
            | Self::Timeout(_) => ErrorScope::Query,
            _ => ErrorScope::File,
        }
    }
}

/// Result type alias using QsqlError.
pub type Result<T> = std::result::Result<T, QsqlError>;
