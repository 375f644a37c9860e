//! End-to-end tests for QuickSQL.
//!
//! Query files are written to temporary directories and run against
//! in-memory or temp-file SQLite. PostgreSQL tests are skipped unless
//! DATABASE_URL is set.

pub mod batch_test;
pub mod execution_test;
pub mod output_test;
pub mod postgres_test;

use std::path::{Path, PathBuf};

use quicksql::batch::{BatchOptions, BatchReport, BatchRunner};
use tokio_util::sync::CancellationToken;

/// Writes `content` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Runs `paths` with default options.
pub async fn run_batch(paths: Vec<PathBuf>) -> BatchReport {
    run_batch_with(BatchOptions::default(), paths).await
}

pub async fn run_batch_with(options: BatchOptions, paths: Vec<PathBuf>) -> BatchReport {
    BatchRunner::new(options, CancellationToken::new())
        .run(paths)
        .await
}
