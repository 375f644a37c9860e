//! QuickSQL - templated SQL query files executed in batch.
//!
//! This library exposes the core modules for the `qsql` binary and for
//! integration tests.

pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod output;
pub mod query;
pub mod report;
pub mod template;
pub mod watch;
