//! Configuration management for QuickSQL.
//!
//! Handles loading configuration from a TOML file. Every section is
//! optional; command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QsqlError, Result};
use crate::file::InputSpec;
use crate::output::OutputFormat;

/// Main configuration structure for QuickSQL.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Timeouts and parallelism.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Artifact settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Data source for files that declare none.
    #[serde(default)]
    pub input: InputConfig,

    /// Watch mode settings.
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Per-query timeout in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How many files run at the same time.
    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
}

fn default_query_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_parallel_files() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_parallel_files: default_max_parallel_files(),
        }
    }
}

impl ExecutionConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parallel file limit, never below one.
    pub fn jobs(&self) -> usize {
        self.max_parallel_files.max(1)
    }
}

/// Artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    /// Artifact format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Output directory for files that declare none. Without it, results
    /// stay in memory and are printed.
    pub dir: Option<PathBuf>,
}

/// Default data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    /// Locator used when a file has no `input` header.
    #[serde(default = "default_input")]
    pub default: String,
}

fn default_input() -> String {
    ":memory:".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default: default_input(),
        }
    }
}

impl InputConfig {
    /// Returns the default input as a spec.
    pub fn spec(&self) -> Result<InputSpec> {
        InputSpec::infer(&self.default).ok_or_else(|| {
            QsqlError::config(format!(
                "Cannot infer a backend for default input '{}'",
                self.default
            ))
        })
    }
}

/// Watch mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Delay between modification checks in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quicksql")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QsqlError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            QsqlError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.execution.query_timeout_secs == 0 {
            return Err(QsqlError::config("query_timeout_secs must be at least 1"));
        }
        if self.execution.connect_timeout_secs == 0 {
            return Err(QsqlError::config("connect_timeout_secs must be at least 1"));
        }
        self.input.spec()?;
        Ok(())
    }
}
