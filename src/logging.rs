//! Logging configuration for QuickSQL.
//!
//! Reports and result tables own stdout, so logs go to stderr or, when
//! requested, to a file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Builds the filter from `RUST_LOG`, falling back to the `-v` count.
fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)))
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // sqlx logs every statement at info.
    format!("{level},sqlx=warn")
}

/// Initializes logging to stderr.
pub fn init_stderr_logging(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, truncating it.
///
/// Falls back to stderr if the file cannot be created.
pub fn init_file_logging(path: &Path, verbosity: u8) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging(verbosity);
            return;
        }
    }

    let log_file = match File::create(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            init_stderr_logging(verbosity);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Default log file location for watch sessions.
///
/// Uses the XDG state directory on Linux (`~/.local/state/quicksql/qsql.log`),
/// or falls back to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("quicksql").join("qsql.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("quicksql").join("qsql.log");
    }

    std::env::temp_dir().join("qsql.log")
}
