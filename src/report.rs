//! Report rendering.
//!
//! Turns a [`BatchReport`] into human-readable text or JSON for stdout, and
//! renders in-memory result sets as plain tables.

use std::fmt::Write as _;

use serde_json::json;

use crate::batch::{BatchReport, FileReport, FileStatus};
use crate::db::QueryResult;
use crate::error::{QsqlError, Result};
use crate::query::{ExecutionResult, QueryOutcome};

/// Rows printed per in-memory result set before eliding the rest.
pub const MAX_DISPLAY_ROWS: usize = 50;

/// Widest a table cell is allowed to grow.
const MAX_CELL_WIDTH: usize = 40;

/// Report output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Renders the report in `format`.
pub fn render(report: &BatchReport, format: ReportFormat, show_results: bool) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(report, show_results)),
        ReportFormat::Json => render_json(report),
    }
}

/// Renders the report as text, optionally with result tables.
pub fn render_text(report: &BatchReport, show_results: bool) -> String {
    let mut out = String::new();

    for file in &report.files {
        render_file(&mut out, file, show_results);
        out.push('\n');
    }

    let totals = report.totals();
    let _ = writeln!(
        out,
        "{} file(s), {} failed; queries: {} ok, {} failed, {} skipped{} ({} ms)",
        report.files.len(),
        report.failed_files(),
        totals.succeeded,
        totals.failed,
        totals.skipped,
        if totals.artifact_errors > 0 {
            format!(", {} artifact error(s)", totals.artifact_errors)
        } else {
            String::new()
        },
        report.elapsed.as_millis()
    );
    out
}

fn render_file(out: &mut String, file: &FileReport, show_results: bool) {
    let status = match file.status {
        FileStatus::Ok => "ok",
        FileStatus::Failed => "FAILED",
        FileStatus::Cancelled => "CANCELLED",
    };
    let _ = write!(out, "{} [{}]", file.path.display(), status);
    if let Some(input) = &file.input {
        let _ = write!(out, " {input}");
    }
    let _ = writeln!(out, " ({} ms)", file.elapsed.as_millis());

    if let Some(error) = &file.error {
        let _ = writeln!(out, "  {}: {}", error.category, error.message);
    }

    let name_width = file.queries.iter().map(|q| q.name.len()).max().unwrap_or(0);
    for query in &file.queries {
        let _ = writeln!(out, "  {}", query_line(query, name_width));
        if show_results {
            if let Some(result) = query.result_set().filter(|r| r.has_result_set()) {
                for line in render_table(result, MAX_DISPLAY_ROWS).lines() {
                    let _ = writeln!(out, "      {line}");
                }
            }
        }
    }
}

/// One report line for a query, e.g. `second_query  ok  1 row(s)  3 ms`.
pub fn query_line(query: &ExecutionResult, name_width: usize) -> String {
    let detail = match &query.outcome {
        QueryOutcome::Succeeded {
            row_count,
            rows_affected,
            artifact,
            artifact_error,
            ..
        } => {
            let mut detail = if *row_count == 0 && *rows_affected > 0 {
                format!("{rows_affected} row(s) affected")
            } else {
                format!("{row_count} row(s)")
            };
            if let Some(path) = artifact {
                let _ = write!(detail, " -> {}", path.display());
            }
            if let Some(error) = artifact_error {
                let _ = write!(detail, "; {error}");
            }
            detail
        }
        QueryOutcome::Failed {
            category, error, ..
        } => format!("{category}: {error}"),
        QueryOutcome::Skipped { reason, cause } => match cause {
            Some(cause) => format!("({reason}: '{cause}')"),
            None => format!("({reason})"),
        },
    };

    format!(
        "{:<name_width$}  {:<7}  {}  [line {}, {} ms]",
        query.name,
        query.status(),
        detail,
        query.line,
        query.elapsed.as_millis(),
    )
}

/// Renders a result set as an aligned text table.
pub fn render_table(result: &QueryResult, max_rows: usize) -> String {
    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(|v| truncate(&v.to_display_string())).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let _ = writeln!(out, "{}", line(&headers[..]));
    let _ = writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &rows {
        let _ = writeln!(out, "{}", line(&row[..]));
    }
    if result.rows.len() > max_rows {
        let _ = writeln!(out, "... ({} more row(s))", result.rows.len() - max_rows);
    }
    out
}

fn truncate(cell: &str) -> String {
    let cell = cell.replace('\n', " ");
    if cell.chars().count() <= MAX_CELL_WIDTH {
        cell
    } else {
        let kept: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{kept}...")
    }
}

/// Renders the report as a JSON document.
pub fn render_json(report: &BatchReport) -> Result<String> {
    let document = json!({
        "success": !report.has_failures(),
        "totals": report.totals(),
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "files": report.files,
    });
    serde_json::to_string_pretty(&document)
        .map_err(|e| QsqlError::internal(format!("Failed to encode report: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StatementType;
    use crate::db::{ColumnInfo, Value};
    use crate::query::SkipReason;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;

    fn succeeded(name: &str, result: QueryResult) -> ExecutionResult {
        ExecutionResult {
            name: name.to_string(),
            line: 2,
            elapsed: Duration::from_millis(3),
            outcome: QueryOutcome::Succeeded {
                statement_type: StatementType::Select,
                row_count: result.row_count,
                rows_affected: 0,
                artifact: None,
                artifact_error: None,
                result: Some(result),
            },
        }
    }

    fn sample_report() -> BatchReport {
        let result = QueryResult::with_data(
            vec![ColumnInfo::new("name", "TEXT"), ColumnInfo::new("age", "INTEGER")],
            vec![vec![Value::from("Alice"), Value::Int(25)]],
        );
        BatchReport {
            files: vec![FileReport {
                path: PathBuf::from("jobs/example.sql"),
                input: Some("sqlite: :memory:".to_string()),
                status: FileStatus::Failed,
                error: None,
                elapsed: Duration::from_millis(12),
                queries: vec![
                    succeeded("second_query", result),
                    ExecutionResult {
                        name: "bad".to_string(),
                        line: 7,
                        elapsed: Duration::from_millis(1),
                        outcome: QueryOutcome::Failed {
                            category: "Query Error",
                            error: "Query error: ERROR: no such column: nope".to_string(),
                            effect: crate::classify::Effect::ReadOnly,
                            scope: crate::error::ErrorScope::Query,
                        },
                    },
                    ExecutionResult {
                        name: "off".to_string(),
                        line: 9,
                        elapsed: Duration::ZERO,
                        outcome: QueryOutcome::Skipped {
                            reason: SkipReason::Disabled,
                            cause: None,
                        },
                    },
                ],
            }],
            elapsed: Duration::from_millis(15),
        }
    }

    #[test]
    fn test_render_table() {
        let result = QueryResult::with_data(
            vec![ColumnInfo::new("name", "TEXT"), ColumnInfo::new("age", "INTEGER")],
            vec![
                vec![Value::from("Alice"), Value::Int(25)],
                vec![Value::from("Bob"), Value::Null],
            ],
        );
        assert_eq!(
            render_table(&result, 10),
            "name  | age\n------+-----\nAlice | 25\nBob   | NULL\n"
        );
    }

    #[test]
    fn test_render_table_elides_rows() {
        let result = QueryResult::with_data(
            vec![ColumnInfo::new("n", "INTEGER")],
            (0..5).map(|i| vec![Value::Int(i)]).collect(),
        );
        let table = render_table(&result, 2);
        assert!(table.ends_with("... (3 more row(s))\n"));
    }

    #[test]
    fn test_truncate_long_cells() {
        let long = "x".repeat(100);
        assert_eq!(truncate(&long).chars().count(), MAX_CELL_WIDTH);
        assert_eq!(truncate("a\nb"), "a b");
    }

    #[test]
    fn test_render_text_lists_every_query() {
        let text = render_text(&sample_report(), false);

        assert!(text.contains("jobs/example.sql [FAILED] sqlite: :memory: (12 ms)"));
        assert!(text.contains("second_query  ok       1 row(s)  [line 2, 3 ms]"));
        assert!(text.contains("Query Error: Query error: ERROR: no such column: nope"));
        assert!(text.contains("(disabled)"));
        assert!(text.contains("1 file(s), 1 failed; queries: 1 ok, 1 failed, 1 skipped (15 ms)"));
        assert!(!text.contains("Alice"));
    }

    #[test]
    fn test_render_text_with_results() {
        let text = render_text(&sample_report(), true);
        assert!(text.contains("      Alice | 25"));
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&sample_report()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["totals"]["failed"], 1);
        let queries = &parsed["files"][0]["queries"];
        assert_eq!(queries[0]["status"], "succeeded");
        assert_eq!(queries[0]["statement_type"], "SELECT");
        assert_eq!(queries[1]["error"], "Query error: ERROR: no such column: nope");
        assert_eq!(queries[2]["reason"], "disabled");
        assert_eq!(parsed["files"][0]["status"], "failed");
    }
}
