//! Query execution for one file.
//!
//! Runs a file's blocks strictly in order on the file's single connection,
//! records one outcome per block and routes result sets to the artifact
//! sink when the file declares an output directory.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{Effect, StatementClassifier, StatementType};
use crate::db::{DatabaseClient, QueryResult};
use crate::error::{ErrorScope, QsqlError};
use crate::file::{QueryBlock, QueryFile};
use crate::output::ResultSink;
use crate::template;

/// Executes the blocks of one file against one client.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
    classifier: StatementClassifier,
    query_timeout: Duration,
    artifacts: Option<ArtifactTarget>,
    cancel: CancellationToken,
}

/// Where successful result sets are written.
pub struct ArtifactTarget {
    pub dir: PathBuf,
    pub sink: Box<dyn ResultSink>,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor that keeps results in memory.
    pub fn new(db: &'a dyn DatabaseClient, query_timeout: Duration) -> Self {
        Self {
            db,
            classifier: StatementClassifier::new(db.backend()),
            query_timeout,
            artifacts: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Writes successful result sets as artifacts under `dir`.
    pub fn with_artifacts(mut self, dir: impl Into<PathBuf>, sink: Box<dyn ResultSink>) -> Self {
        self.artifacts = Some(ArtifactTarget {
            dir: dir.into(),
            sink,
        });
        self
    }

    /// Stops starting new queries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Executes every block of `file` in file order.
    pub async fn execute_all(&self, file: &QueryFile) -> Vec<ExecutionResult> {
        self.execute_blocks(file, &file.blocks).await
    }

    /// Executes `blocks` in the given order, resolving placeholders with the
    /// bindings of `file`.
    ///
    /// After a fatal failure (a schema change, or a lost connection) the
    /// remaining blocks are skipped instead of run.
    pub async fn execute_blocks(
        &self,
        file: &QueryFile,
        blocks: &[QueryBlock],
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(blocks.len());
        let mut fatal: Option<String> = None;

        for block in blocks {
            if let Some(cause) = &fatal {
                results.push(ExecutionResult::skipped(
                    block,
                    SkipReason::PriorFatal,
                    Some(cause.clone()),
                ));
                continue;
            }
            if self.cancel.is_cancelled() {
                results.push(ExecutionResult::skipped(block, SkipReason::Cancelled, None));
                continue;
            }

            let result = self.execute_block(file, block).await;
            if result.is_fatal() {
                warn!(
                    file = %file.source.display(),
                    query = %block.name,
                    "fatal failure, skipping remaining queries"
                );
                fatal = Some(block.name.clone());
            }
            results.push(result);
        }

        results
    }

    /// Resolves and executes a single block.
    pub async fn execute_block(&self, file: &QueryFile, block: &QueryBlock) -> ExecutionResult {
        if !block.options.auto_run {
            debug!(file = %file.source.display(), query = %block.name, "auto_run disabled");
            return ExecutionResult::skipped(block, SkipReason::Disabled, None);
        }

        let start = Instant::now();

        let sql = match template::resolve(&block.sql, &file.vars, &file.source, &block.name) {
            Ok(sql) => sql,
            Err(e) => {
                warn!(file = %file.source.display(), query = %block.name, error = %e, "query not resolved");
                return ExecutionResult::failed(block, &e, Effect::ReadOnly, start.elapsed());
            }
        };

        let classification = self.classifier.classify(&sql);
        debug!(
            file = %file.source.display(),
            query = %block.name,
            statement = %classification.statement_type,
            "executing"
        );

        let executed = tokio::time::timeout(self.query_timeout, self.db.execute_query(&sql))
            .await
            .unwrap_or_else(|_| {
                Err(QsqlError::timeout(format!(
                    "query '{}' exceeded {}s",
                    block.name,
                    self.query_timeout.as_secs()
                )))
            });

        let result = match executed {
            Ok(result) => result,
            Err(e) => {
                let elapsed = start.elapsed();
                warn!(
                    file = %file.source.display(),
                    query = %block.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "query failed"
                );
                return ExecutionResult::failed(block, &e, classification.effect, elapsed);
            }
        };

        let (artifact, artifact_error) = match &self.artifacts {
            Some(target) if result.has_result_set() || classification.effect == Effect::ReadOnly => {
                match target.sink.write(&target.dir, &block.name, &result).await {
                    Ok(path) => (Some(path), None),
                    Err(e) => {
                        warn!(query = %block.name, error = %e, "artifact not written");
                        (None, Some(e.to_string()))
                    }
                }
            }
            _ => (None, None),
        };

        let elapsed = start.elapsed();
        info!(
            file = %file.source.display(),
            query = %block.name,
            elapsed_ms = elapsed.as_millis() as u64,
            rows = result.row_count,
            "query succeeded"
        );

        ExecutionResult {
            name: block.name.clone(),
            line: block.line,
            elapsed,
            outcome: QueryOutcome::Succeeded {
                statement_type: classification.statement_type,
                row_count: result.row_count,
                rows_affected: result.rows_affected,
                result: if self.artifacts.is_none() {
                    Some(result)
                } else {
                    None
                },
                artifact,
                artifact_error,
            },
        }
    }
}

/// Outcome of one block.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub name: String,
    /// One-based line of the block marker.
    pub line: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

impl ExecutionResult {
    /// Creates a skipped result for `block`.
    pub fn skipped(block: &QueryBlock, reason: SkipReason, cause: Option<String>) -> Self {
        Self {
            name: block.name.clone(),
            line: block.line,
            elapsed: Duration::ZERO,
            outcome: QueryOutcome::Skipped { reason, cause },
        }
    }

    fn failed(block: &QueryBlock, error: &QsqlError, effect: Effect, elapsed: Duration) -> Self {
        Self {
            name: block.name.clone(),
            line: block.line,
            elapsed,
            outcome: QueryOutcome::Failed {
                category: error.category(),
                error: error.to_string(),
                effect,
                scope: error.scope(),
            },
        }
    }

    /// True if this block counts against the exit status.
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            QueryOutcome::Succeeded { artifact_error, .. } => artifact_error.is_some(),
            QueryOutcome::Failed { .. } => true,
            QueryOutcome::Skipped { reason, .. } => *reason != SkipReason::Disabled,
        }
    }

    /// True if this failure prevents later blocks of the file from running:
    /// a failed schema change, or an error that took the connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            &self.outcome,
            QueryOutcome::Failed { effect, scope, .. }
                if effect.is_schema_mutating() || *scope == ErrorScope::File
        )
    }

    /// True if the block was skipped because the run was interrupted.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            &self.outcome,
            QueryOutcome::Skipped {
                reason: SkipReason::Cancelled,
                ..
            }
        )
    }

    /// In-memory result set, when artifacts are not being written.
    pub fn result_set(&self) -> Option<&QueryResult> {
        match &self.outcome {
            QueryOutcome::Succeeded { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Short status label.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            QueryOutcome::Succeeded {
                artifact_error: Some(_),
                ..
            } => "ok (artifact failed)",
            QueryOutcome::Succeeded { .. } => "ok",
            QueryOutcome::Failed { .. } => "failed",
            QueryOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// What happened to a block.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Succeeded {
        statement_type: StatementType,
        row_count: usize,
        rows_affected: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact_error: Option<String>,
        #[serde(skip)]
        result: Option<QueryResult>,
    },
    Failed {
        category: &'static str,
        error: String,
        effect: Effect,
        scope: ErrorScope,
    },
    Skipped {
        reason: SkipReason,
        /// Name of the block whose failure caused the skip.
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

/// Why a block was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The block sets `auto_run: false`.
    Disabled,
    /// An earlier schema-mutating statement failed.
    PriorFatal,
    /// The file's data source could not be opened.
    ConnectionFailed,
    /// The run was interrupted.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::PriorFatal => write!(f, "skipped due to prior fatal error"),
            Self::ConnectionFailed => write!(f, "connection failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
