//! Result artifacts.

use pretty_assertions::assert_eq;
use quicksql::batch::BatchOptions;
use quicksql::output::OutputFormat;
use quicksql::query::QueryOutcome;
use tempfile::tempdir;

use super::{run_batch, run_batch_with, write_file};

#[tokio::test]
async fn test_header_output_dir_is_created_and_filled() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "export.sql",
        "/*
output_dir: out/nested
*/
-- name: make
CREATE TABLE t (x INTEGER, label TEXT);
-- name: fill
INSERT INTO t VALUES (1, 'one'), (2, NULL);
-- name: dump
SELECT x, label FROM t ORDER BY x;
",
    );

    let report = run_batch(vec![path]).await;
    assert!(!report.has_failures());

    let out = dir.path().join("out/nested");
    assert_eq!(
        std::fs::read_to_string(out.join("dump.csv")).unwrap(),
        "x,label\n1,one\n2,\n"
    );
    // Statements without a result set produce no artifact.
    assert!(!out.join("make.csv").exists());
    assert!(!out.join("fill.csv").exists());

    let file = &report.files[0];
    match &file.query("dump").unwrap().outcome {
        QueryOutcome::Succeeded { artifact, result, .. } => {
            assert_eq!(artifact.as_deref(), Some(out.join("dump.csv").as_path()));
            assert!(result.is_none());
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_default_output_dir_with_json_format() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("artifacts");
    let path = write_file(dir.path(), "q.sql", "-- name: numbers\nSELECT 1 AS n UNION ALL SELECT 2;\n");

    let options = BatchOptions {
        format: OutputFormat::Json,
        default_output: Some(out.clone()),
        ..BatchOptions::default()
    };
    let report = run_batch_with(options, vec![path]).await;
    assert!(!report.has_failures());

    let text = std::fs::read_to_string(out.join("numbers.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["query"], "numbers");
    assert_eq!(parsed["row_count"], 2);
    assert_eq!(parsed["rows"], serde_json::json!([[1], [2]]));
}

#[tokio::test]
async fn test_unwritable_output_dir_fails_the_run_but_not_the_query() {
    let dir = tempdir().unwrap();
    // A regular file where the output directory should be.
    let blocker = write_file(dir.path(), "blocked", "");
    let path = write_file(
        dir.path(),
        "q.sql",
        "/*\noutput_dir: blocked\n*/\n-- name: one\nSELECT 1 AS n;\n-- name: two\nSELECT 2 AS n;\n",
    );

    let report = run_batch(vec![path]).await;
    let file = &report.files[0];

    assert!(blocker.is_file());
    assert!(report.has_failures());
    assert_eq!(report.totals().succeeded, 2);
    assert_eq!(report.totals().artifact_errors, 2);
    assert_eq!(file.query("two").unwrap().status(), "ok (artifact failed)");
    assert_eq!(file.queries.len(), 2);
}

#[tokio::test]
async fn test_empty_select_writes_header_only() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "empty.sql",
        "/*
output_dir: out
*/
-- name: make
CREATE TABLE user (name TEXT, age INTEGER);
-- name: seniors
SELECT name, age FROM user WHERE age > 100;
",
    );

    let report = run_batch(vec![path]).await;
    assert!(!report.has_failures());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out/seniors.csv")).unwrap(),
        "name,age\n"
    );
}

#[tokio::test]
async fn test_empty_select_json_lists_columns() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("artifacts");
    let path = write_file(
        dir.path(),
        "empty.sql",
        "-- name: make\nCREATE TABLE user (name TEXT, age INTEGER);\n\
         -- name: seniors\nSELECT name, age FROM user WHERE age > 100;\n",
    );

    let options = BatchOptions {
        format: OutputFormat::Json,
        default_output: Some(out.clone()),
        ..BatchOptions::default()
    };
    let report = run_batch_with(options, vec![path]).await;
    assert!(!report.has_failures());

    let text = std::fs::read_to_string(out.join("seniors.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["columns"][0]["name"], "name");
    assert_eq!(parsed["columns"][1]["name"], "age");
    assert_eq!(parsed["row_count"], 0);
    assert_eq!(parsed["rows"], serde_json::json!([]));
}
