//! Query execution for QuickSQL.
//!
//! This module isolates per-file SQL execution, outcome tracking, and
//! artifact routing from the batch orchestrator.

pub mod executor;

pub use executor::{ArtifactTarget, ExecutionResult, QueryExecutor, QueryOutcome, SkipReason};
