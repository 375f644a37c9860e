//! Watch mode.
//!
//! Runs one query file, then polls its modification time. After each save
//! the file is re-parsed and only the blocks whose resolved SQL changed (or
//! that are new, or that failed last time) are executed again, on the same
//! connection. The connection is re-opened only when the data source changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{BatchOptions, FileReport, FileStatus};
use crate::db::{self, DatabaseClient};
use crate::file::{InputSpec, QueryBlock, QueryFile};
use crate::query::{ExecutionResult, SkipReason};
use crate::template;

/// What identifies a block's content for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    /// Resolved SQL, or the raw text when resolution fails.
    sql: String,
    auto_run: bool,
}

impl Fingerprint {
    fn of(file: &QueryFile, block: &QueryBlock) -> Self {
        let sql = template::resolve(&block.sql, &file.vars, &file.source, &block.name)
            .unwrap_or_else(|_| block.sql.clone());
        Self {
            sql,
            auto_run: block.options.auto_run,
        }
    }
}

/// Blocks that last ran cleanly, keyed by name.
#[derive(Debug, Default)]
pub struct Baseline {
    blocks: BTreeMap<String, Fingerprint>,
}

/// Difference between a baseline and a re-parsed file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BlockChanges {
    /// Blocks to execute, in file order.
    pub changed: Vec<QueryBlock>,
    /// Names present before but gone now.
    pub removed: Vec<String>,
}

impl BlockChanges {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl Baseline {
    /// Compares `file` against what last ran.
    pub fn diff(&self, file: &QueryFile) -> BlockChanges {
        let changed = file
            .blocks
            .iter()
            .filter(|block| self.blocks.get(&block.name) != Some(&Fingerprint::of(file, block)))
            .cloned()
            .collect();
        let removed = self
            .blocks
            .keys()
            .filter(|name| file.block(name).is_none())
            .cloned()
            .collect();
        BlockChanges { changed, removed }
    }

    /// Records `file` as current, forgetting blocks whose last run failed so
    /// the next save retries them.
    pub fn update(&mut self, file: &QueryFile, results: &[ExecutionResult]) {
        self.blocks.retain(|name, _| file.block(name).is_some());
        for block in &file.blocks {
            self.blocks
                .insert(block.name.clone(), Fingerprint::of(file, block));
        }
        for result in results.iter().filter(|r| r.is_failure()) {
            self.blocks.remove(&result.name);
        }
    }

    /// Forgets everything, so the next diff runs every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

/// Result of one watch cycle.
#[derive(Debug)]
pub struct WatchCycle {
    /// Outcomes of the blocks that were executed.
    pub report: FileReport,
    /// Blocks that disappeared from the file.
    pub removed: Vec<String>,
}

/// Re-executes changed blocks of one file as it is edited.
pub struct Watcher {
    path: PathBuf,
    options: BatchOptions,
    poll_interval: Duration,
    cancel: CancellationToken,
    baseline: Baseline,
    connection: Option<(InputSpec, Box<dyn DatabaseClient>)>,
}

impl Watcher {
    pub fn new(
        path: impl Into<PathBuf>,
        options: BatchOptions,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            path: path.into(),
            options,
            poll_interval,
            cancel,
            baseline: Baseline::default(),
            connection: None,
        }
    }

    /// Runs until cancelled, handing every cycle to `on_cycle`.
    pub async fn run<F: FnMut(WatchCycle)>(mut self, mut on_cycle: F) {
        info!(file = %self.path.display(), interval_ms = self.poll_interval.as_millis() as u64, "watching");

        let mut last_modified = modified(&self.path).await;
        on_cycle(self.cycle().await);

        loop {
            if !self.pause().await {
                break;
            }
            let current = modified(&self.path).await;
            if current.is_none() || current == last_modified {
                continue;
            }

            // Debounce: let editors finish writing before reading.
            if !self.pause().await {
                break;
            }
            last_modified = modified(&self.path).await;
            debug!(file = %self.path.display(), "change detected");
            on_cycle(self.cycle().await);
        }

        self.disconnect().await;
        info!(file = %self.path.display(), "watch stopped");
    }

    /// Sleeps one poll interval. Returns false once cancelled.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }

    /// Re-reads the file and executes what changed.
    pub async fn cycle(&mut self) -> WatchCycle {
        let start = Instant::now();

        let file = match QueryFile::read(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "file rejected");
                return WatchCycle {
                    report: FileReport::new(self.path.clone(), FileStatus::Failed, start)
                        .with_error(&e),
                    removed: Vec::new(),
                };
            }
        };

        let input = self.options.input_for(&file);
        if let Err(e) = self.ensure_connected(&input).await {
            warn!(file = %self.path.display(), error = %e, "connection failed");
            let skipped = file
                .blocks
                .iter()
                .map(|block| ExecutionResult::skipped(block, SkipReason::ConnectionFailed, None))
                .collect();
            return WatchCycle {
                report: FileReport::new(self.path.clone(), FileStatus::Failed, start)
                    .with_input(&input)
                    .with_error(&e)
                    .with_queries(skipped),
                removed: Vec::new(),
            };
        }

        let changes = self.baseline.diff(&file);
        for name in &changes.removed {
            info!(file = %self.path.display(), query = %name, "block removed");
        }

        let results = match &self.connection {
            Some((_, client)) if !changes.changed.is_empty() => {
                self.options
                    .executor(client.as_ref(), &file, &self.cancel)
                    .execute_blocks(&file, &changes.changed)
                    .await
            }
            _ => Vec::new(),
        };
        self.baseline.update(&file, &results);

        let status = FileStatus::from_results(&results);
        WatchCycle {
            report: FileReport::new(self.path.clone(), status, start)
                .with_input(&input)
                .with_queries(results),
            removed: changes.removed,
        }
    }

    /// Opens a connection for `input` unless one is already open for it.
    async fn ensure_connected(&mut self, input: &InputSpec) -> crate::error::Result<()> {
        if matches!(&self.connection, Some((current, _)) if current == input) {
            return Ok(());
        }

        self.disconnect().await;
        // A new data source has none of the previous effects.
        self.baseline.clear();

        let client = db::connect(input, self.options.connect_timeout).await?;
        info!(file = %self.path.display(), input = %input.display_string(), "connected");
        self.connection = Some((input.clone(), client));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some((input, client)) = self.connection.take() {
            if let Err(e) = client.close().await {
                warn!(input = %input.display_string(), error = %e, "error closing connection");
            }
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
}
