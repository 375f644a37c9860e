//! Result artifacts.
//!
//! A sink turns one query's result set into a file under the output
//! directory. Writes go to a temporary file in the same directory which is
//! then renamed into place, so a reader never sees a half-written artifact.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::db::QueryResult;
use crate::error::{QsqlError, Result};

/// Artifact file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    /// Returns the sink writing this format.
    pub fn sink(self) -> Box<dyn ResultSink> {
        match self {
            Self::Csv => Box::new(CsvSink),
            Self::Json => Box::new(JsonSink),
        }
    }
}

/// Destination for materialized query results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &'static str;

    /// Encodes a result set.
    fn encode(&self, query_name: &str, result: &QueryResult) -> Result<Vec<u8>>;

    /// Writes `result` to `<dir>/<query_name>.<ext>` and returns the path.
    ///
    /// The filesystem work runs on the blocking pool so a slow disk does not
    /// stall other files of the batch.
    async fn write(&self, dir: &Path, query_name: &str, result: &QueryResult) -> Result<PathBuf> {
        let bytes = self.encode(query_name, result)?;
        let path = artifact_path(dir, query_name, self.extension());
        let len = bytes.len();

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| QsqlError::internal(format!("Artifact writer failed: {e}")))??;

        debug!(path = %path.display(), bytes = len, "wrote artifact");
        Ok(path)
    }
}

/// Path of the artifact for `query_name`.
pub fn artifact_path(dir: &Path, query_name: &str, extension: &str) -> PathBuf {
    dir.join(format!("{query_name}.{extension}"))
}

/// Writes `bytes` to `path` via a temporary sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir).map_err(|e| {
        QsqlError::output(format!("Failed to create directory {}: {}", dir.display(), e))
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        QsqlError::output(format!(
            "Failed to create temporary file in {}: {}",
            dir.display(),
            e
        ))
    })?;

    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| {
            QsqlError::output(format!(
                "Failed to write {}: {}",
                tmp.path().display(),
                e
            ))
        })?;

    tmp.persist(path).map_err(|e| {
        QsqlError::output(format!("Failed to move artifact to {}: {}", path.display(), e.error))
    })?;

    Ok(())
}

/// Comma-separated values with a header row. NULL is an empty field.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

#[async_trait]
impl ResultSink for CsvSink {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn encode(&self, _query_name: &str, result: &QueryResult) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        if result.has_result_set() {
            writer
                .write_record(result.column_names())
                .map_err(|e| QsqlError::output(format!("Failed to encode CSV header: {e}")))?;
        }
        for row in &result.rows {
            writer
                .write_record(row.iter().map(|v| v.to_csv_field()))
                .map_err(|e| QsqlError::output(format!("Failed to encode CSV row: {e}")))?;
        }

        writer
            .into_inner()
            .map_err(|e| QsqlError::output(format!("Failed to flush CSV: {e}")))
    }
}

/// A JSON document with column metadata and rows as arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

#[async_trait]
impl ResultSink for JsonSink {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, query_name: &str, result: &QueryResult) -> Result<Vec<u8>> {
        let document = json!({
            "query": query_name,
            "columns": result.columns,
            "rows": result.rows,
            "row_count": result.row_count,
            "rows_affected": result.rows_affected,
        });
        let mut bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| QsqlError::output(format!("Failed to encode JSON: {e}")))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
