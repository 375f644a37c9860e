//! Batch orchestration.
//!
//! Expands the command-line paths into a sorted set of query files, runs each
//! file through parse → connect → execute with its own connection, and
//! collects a per-file, per-query report. A failure in one file never stops
//! the others.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{self, DatabaseClient};
use crate::error::{QsqlError, Result};
use crate::file::{InputSpec, QueryFile};
use crate::output::OutputFormat;
use crate::query::{ExecutionResult, QueryExecutor, QueryOutcome, SkipReason};

/// Expands files, directories and glob patterns into a sorted, de-duplicated
/// list of query files.
///
/// Directories contribute their `*.sql` children (not recursive). Plain paths
/// are kept even if they do not exist so the report can name them.
pub fn discover<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for input in inputs {
        let input = input.as_ref();
        if is_glob(input) {
            let entries = glob::glob(input)
                .map_err(|e| QsqlError::config(format!("Invalid glob pattern '{input}': {e}")))?;
            let mut matched = false;
            for entry in entries {
                match entry {
                    Ok(path) if path.is_file() => {
                        matched = true;
                        found.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(pattern = input, error = %e, "unreadable glob match"),
                }
            }
            if !matched {
                warn!(pattern = input, "glob matched no files");
            }
            continue;
        }

        let path = PathBuf::from(input);
        if path.is_dir() {
            let entries = std::fs::read_dir(&path).map_err(|e| QsqlError::io(&path, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| QsqlError::io(&path, e))?;
                let child = entry.path();
                if child.is_file() && child.extension().is_some_and(|ext| ext == "sql") {
                    found.insert(child);
                }
            }
        } else {
            found.insert(path);
        }
    }

    Ok(found.into_iter().collect())
}

fn is_glob(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Settings shared by every file of a batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub query_timeout: Duration,
    pub connect_timeout: Duration,
    pub jobs: usize,
    pub format: OutputFormat,
    /// Data source for files without an `input` header.
    pub default_input: InputSpec,
    /// Artifact directory for files without an `output_dir` header.
    pub default_output: Option<PathBuf>,
}

impl BatchOptions {
    /// Derives batch options from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            query_timeout: config.execution.query_timeout(),
            connect_timeout: config.execution.connect_timeout(),
            jobs: config.execution.jobs(),
            format: config.output.format,
            default_input: config.input.spec()?,
            default_output: config.output.dir.clone(),
        })
    }

    /// Data source for `file`, relative paths resolved against its directory.
    pub fn input_for(&self, file: &QueryFile) -> InputSpec {
        file.resolved_input()
            .unwrap_or_else(|| self.default_input.clone())
    }

    /// Artifact directory for `file`, if results should be persisted.
    pub fn output_for(&self, file: &QueryFile) -> Option<PathBuf> {
        file.resolved_output()
            .map(|output| output.dir)
            .or_else(|| self.default_output.clone())
    }

    /// Builds the executor for `file` on `client`.
    pub fn executor<'a>(
        &self,
        client: &'a dyn DatabaseClient,
        file: &QueryFile,
        cancel: &CancellationToken,
    ) -> QueryExecutor<'a> {
        let executor =
            QueryExecutor::new(client, self.query_timeout).with_cancellation(cancel.clone());
        match self.output_for(file) {
            Some(dir) => executor.with_artifacts(dir, self.format.sink()),
            None => executor,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        let execution = crate::config::ExecutionConfig::default();
        Self {
            query_timeout: execution.query_timeout(),
            connect_timeout: execution.connect_timeout(),
            jobs: execution.jobs(),
            format: OutputFormat::default(),
            default_input: InputSpec::new("sqlite", ":memory:"),
            default_output: None,
        }
    }
}

/// Runs query files and aggregates their outcomes.
pub struct BatchRunner {
    options: BatchOptions,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// Creates a runner.
    pub fn new(options: BatchOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    /// Processes every file. Up to `jobs` files run at once; the report keeps
    /// the input order.
    pub async fn run(&self, paths: Vec<PathBuf>) -> BatchReport {
        let start = Instant::now();
        info!(files = paths.len(), jobs = self.options.jobs, "starting batch");

        let files = stream::iter(paths)
            .map(|path| self.run_file(path))
            .buffered(self.options.jobs)
            .collect::<Vec<_>>()
            .await;

        let report = BatchReport {
            files,
            elapsed: start.elapsed(),
        };
        info!(
            files = report.files.len(),
            failed = report.failed_files(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch finished"
        );
        report
    }

    /// Processes one file from parse to connection teardown.
    pub async fn run_file(&self, path: PathBuf) -> FileReport {
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            debug!(file = %path.display(), "not started, run cancelled");
            return FileReport::new(path, FileStatus::Cancelled, start);
        }

        let file = match QueryFile::read(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "file rejected");
                return FileReport::new(path, FileStatus::Failed, start).with_error(&e);
            }
        };

        let input = self.options.input_for(&file);
        debug!(file = %path.display(), input = %input.display_string(), blocks = file.blocks.len(), "parsed");

        let client = match db::connect(&input, self.options.connect_timeout).await {
            Ok(client) => client,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "connection failed");
                let skipped = file
                    .blocks
                    .iter()
                    .map(|block| ExecutionResult::skipped(block, SkipReason::ConnectionFailed, None))
                    .collect();
                return FileReport::new(path, FileStatus::Failed, start)
                    .with_input(&input)
                    .with_error(&e)
                    .with_queries(skipped);
            }
        };

        let results = self
            .options
            .executor(client.as_ref(), &file, &self.cancel)
            .execute_all(&file)
            .await;

        if let Err(e) = client.close().await {
            warn!(file = %path.display(), error = %e, "error closing connection");
        }

        let status = FileStatus::from_results(&results);
        let report = FileReport::new(path, status, start)
            .with_input(&input)
            .with_queries(results);
        info!(
            file = %report.path.display(),
            status = ?report.status,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "file finished"
        );
        report
    }
}

/// Overall state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ok,
    Failed,
    Cancelled,
}

impl FileStatus {
    /// Status of a file whose blocks produced `results`.
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        if results.iter().any(ExecutionResult::is_cancelled) {
            Self::Cancelled
        } else if results.iter().any(ExecutionResult::is_failure) {
            Self::Failed
        } else {
            Self::Ok
        }
    }
}

/// A file-fatal error with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub category: &'static str,
    pub message: String,
}

/// Outcome of one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub queries: Vec<ExecutionResult>,
}

impl FileReport {
    pub(crate) fn new(path: PathBuf, status: FileStatus, start: Instant) -> Self {
        Self {
            path,
            input: None,
            status,
            error: None,
            elapsed: start.elapsed(),
            queries: Vec::new(),
        }
    }

    pub(crate) fn with_input(mut self, input: &InputSpec) -> Self {
        self.input = Some(input.display_string());
        self
    }

    pub(crate) fn with_error(mut self, error: &QsqlError) -> Self {
        self.error = Some(FileError {
            category: error.category(),
            message: error.to_string(),
        });
        self
    }

    pub(crate) fn with_queries(mut self, queries: Vec<ExecutionResult>) -> Self {
        self.queries = queries;
        self
    }

    /// True if anything in this file counts against the exit status.
    pub fn is_failure(&self) -> bool {
        self.status != FileStatus::Ok
    }

    /// Looks up a query outcome by block name.
    pub fn query(&self, name: &str) -> Option<&ExecutionResult> {
        self.queries.iter().find(|q| q.name == name)
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl BatchReport {
    /// True if any file or query failed, was fatally skipped or cancelled.
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileReport::is_failure)
    }

    /// Number of files that did not finish cleanly.
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.is_failure()).count()
    }

    /// Looks up a file report by path.
    pub fn file(&self, path: &Path) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Query counts across all files.
    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for query in self.files.iter().flat_map(|f| &f.queries) {
            match &query.outcome {
                QueryOutcome::Succeeded { artifact_error, .. } => {
                    totals.succeeded += 1;
                    if artifact_error.is_some() {
                        totals.artifact_errors += 1;
                    }
                }
                QueryOutcome::Failed { .. } => totals.failed += 1,
                QueryOutcome::Skipped { .. } => totals.skipped += 1,
            }
        }
        totals
    }
}

/// Aggregate query counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub artifact_errors: usize,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
