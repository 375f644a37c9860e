//! Batch orchestration across several files.

use pretty_assertions::assert_eq;
use quicksql::batch::{self, FileStatus};
use quicksql::query::{QueryOutcome, SkipReason};
use quicksql::report::{self, ReportFormat};
use tempfile::tempdir;

use super::{run_batch, write_file};

const GOOD: &str = "-- name: make\nCREATE TABLE t (x INTEGER);\n-- name: read\nSELECT COUNT(*) AS n FROM t;\n";

#[tokio::test]
async fn test_bad_connection_in_one_file_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "1_first.sql", GOOD);
    write_file(
        dir.path(),
        "2_second.sql",
        "/*\ninput.duckdb: warehouse.duckdb\n*/\n-- name: never\nSELECT 1;\n",
    );
    write_file(dir.path(), "3_third.sql", GOOD);

    let paths = batch::discover(&[dir.path().to_string_lossy()]).unwrap();
    assert_eq!(paths.len(), 3);

    let report = run_batch(paths).await;
    let statuses: Vec<FileStatus> = report.files.iter().map(|f| f.status).collect();

    assert_eq!(
        statuses,
        vec![FileStatus::Ok, FileStatus::Failed, FileStatus::Ok]
    );
    assert!(report.has_failures());
    assert_eq!(report.failed_files(), 1);

    let second = &report.files[1];
    assert_eq!(second.error.as_ref().unwrap().category, "Connection Error");
    match &second.query("never").unwrap().outcome {
        QueryOutcome::Skipped { reason, .. } => assert_eq!(*reason, SkipReason::ConnectionFailed),
        other => panic!("expected skip, got {other:?}"),
    }
}

#[tokio::test]
async fn test_files_do_not_share_in_memory_state() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.sql", "-- name: make\nCREATE TABLE shared (x INTEGER);\n");
    let b = write_file(dir.path(), "b.sql", "-- name: read\nSELECT * FROM shared;\n");

    let report = run_batch(vec![a, b]).await;

    assert_eq!(report.files[0].status, FileStatus::Ok);
    assert_eq!(report.files[1].status, FileStatus::Failed);
}

#[tokio::test]
async fn test_report_keeps_lexical_order_with_parallel_files() {
    let dir = tempdir().unwrap();
    for name in ["c.sql", "a.sql", "b.sql"] {
        write_file(dir.path(), name, GOOD);
    }
    let pattern = format!("{}/*.sql", dir.path().display());
    let paths = batch::discover(&[pattern]).unwrap();

    let report = run_batch(paths).await;
    let names: Vec<String> = report
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names, vec!["a.sql", "b.sql", "c.sql"]);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_json_report_describes_every_query() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "mixed.sql",
        "-- name: good\nSELECT 1 AS one;\n-- name: bad\nSELECT * FROM nowhere;\n",
    );

    let report = run_batch(vec![path]).await;
    let json = report::render(&report, ReportFormat::Json, false).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["success"], false);
    assert_eq!(parsed["totals"]["succeeded"], 1);
    assert_eq!(parsed["totals"]["failed"], 1);
    let queries = parsed["files"][0]["queries"].as_array().unwrap();
    assert_eq!(queries[0]["name"], "good");
    assert_eq!(queries[0]["row_count"], 1);
    assert_eq!(queries[1]["status"], "failed");
    assert!(queries[1]["error"].as_str().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_bare_and_explicit_duckdb_inputs_fail_alike() {
    let dir = tempdir().unwrap();
    let bare = write_file(
        dir.path(),
        "bare.sql",
        "/*\ninput: test.ddb\n*/\n-- name: q\nSELECT 1;\n",
    );
    let explicit = write_file(
        dir.path(),
        "explicit.sql",
        "/*\ninput:\n  duckdb: test.ddb\n*/\n-- name: q\nSELECT 1;\n",
    );

    let report = run_batch(vec![bare, explicit]).await;

    for file in &report.files {
        assert_eq!(file.status, FileStatus::Failed);
        assert_eq!(file.error.as_ref().unwrap().category, "Connection Error");
        assert_eq!(file.queries.len(), 1);
    }
}
