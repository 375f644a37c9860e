//! Command-line argument parsing for QuickSQL.
//!
//! Uses clap derive. Flags given here override the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::report::ReportFormat;

/// Runs templated SQL query files against their data sources.
#[derive(Parser, Debug)]
#[command(name = "qsql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Query files, directories or glob patterns
    #[arg(value_name = "PATHS", required_unless_present = "watch")]
    pub paths: Vec<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Artifact format
    #[arg(short = 'f', long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Artifact directory for files without an output_dir header
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Data source for files without an input header
    #[arg(short = 'i', long, value_name = "LOCATOR", env = "QSQL_INPUT")]
    pub input: Option<String>,

    /// Number of files to run in parallel
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-query timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub query_timeout: Option<u64>,

    /// Report format
    #[arg(long, value_enum, value_name = "FORMAT", default_value = "text")]
    pub report: ReportFormat,

    /// Do not print in-memory result tables
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Re-run changed blocks of FILE whenever it is saved
    #[arg(short, long, value_name = "FILE", conflicts_with = "paths")]
    pub watch: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of a loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = Some(dir.clone());
        }
        if let Some(input) = &self.input {
            config.input.default = input.clone();
        }
        if let Some(jobs) = self.jobs {
            config.execution.max_parallel_files = jobs;
        }
        if let Some(secs) = self.query_timeout {
            config.execution.query_timeout_secs = secs;
        }
    }

    /// Whether result tables should be printed with the text report.
    pub fn show_results(&self) -> bool {
        !self.quiet
    }
}
