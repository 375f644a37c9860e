//! Per-file execution: ordering, failure isolation and templating.

use pretty_assertions::assert_eq;
use quicksql::batch::FileStatus;
use quicksql::db::{DatabaseClient, SqliteClient, Value};
use quicksql::query::{QueryOutcome, SkipReason};
use tempfile::tempdir;

use super::{run_batch, write_file};

#[tokio::test]
async fn test_later_query_sees_table_created_earlier() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "ordering.sql",
        "/*
input.sqlite: ordering.db
*/
-- name: query_1
CREATE TABLE user (name TEXT, age INTEGER);

-- name: seed
INSERT INTO user VALUES ('Alice', 25), ('Bob', 31);

-- name: query_2
SELECT name FROM user ORDER BY name;
",
    );

    let report = run_batch(vec![path.clone()]).await;
    let file = report.file(&path).unwrap();

    assert_eq!(file.status, FileStatus::Ok);
    assert!(!report.has_failures());
    let rows = &file.query("query_2").unwrap().result_set().unwrap().rows;
    assert_eq!(
        rows,
        &vec![vec![Value::from("Alice")], vec![Value::from("Bob")]]
    );
    assert!(dir.path().join("ordering.db").exists());
}

#[tokio::test]
async fn test_one_failing_query_does_not_stop_the_other() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "isolation.sql",
        "-- name: setup
CREATE TABLE t (x INTEGER);
-- name: broken
SELECT missing_column FROM t;
-- name: fine
SELECT COUNT(*) AS n FROM t;
",
    );

    let report = run_batch(vec![path]).await;
    let totals = report.totals();

    assert_eq!(totals.failed, 1);
    assert_eq!(totals.succeeded, 2);
    assert_eq!(totals.skipped, 0);
    assert!(report.has_failures());

    let file = &report.files[0];
    match &file.query("broken").unwrap().outcome {
        QueryOutcome::Failed { category, error, .. } => {
            assert_eq!(*category, "Query Error");
            assert!(error.contains("missing_column"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_schema_change_skips_remaining_queries() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "fatal.sql",
        "-- name: create
CREATE TABLE t (x INTEGER);
-- name: create_again
CREATE TABLE t (x INTEGER);
-- name: after
SELECT 1;
",
    );

    let report = run_batch(vec![path]).await;
    let file = &report.files[0];

    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.query("create").unwrap().status(), "ok");
    assert_eq!(file.query("create_again").unwrap().status(), "failed");
    match &file.query("after").unwrap().outcome {
        QueryOutcome::Skipped { reason, cause } => {
            assert_eq!(*reason, SkipReason::PriorFatal);
            assert_eq!(cause.as_deref(), Some("create_again"));
        }
        other => panic!("expected skip, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unbound_variable_names_file_query_and_variable() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "vars.sql",
        "/*
vars:
  bound: 1
*/
-- name: ok
SELECT {{ bound }} AS v;
-- name: unbound
SELECT {{ nowhere }} AS v;
",
    );

    let report = run_batch(vec![path]).await;
    let file = &report.files[0];

    assert_eq!(file.query("ok").unwrap().status(), "ok");
    match &file.query("unbound").unwrap().outcome {
        QueryOutcome::Failed { category, error, .. } => {
            assert_eq!(*category, "Unbound Variable");
            assert!(error.contains("vars.sql"));
            assert!(error.contains("unbound"));
            assert!(error.contains("nowhere"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_names_reject_the_whole_file() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "dupes.sql",
        "-- name: q\nSELECT 1;\n-- name: Q2\nSELECT 2;\n-- name: q\nSELECT 3;\n",
    );

    let report = run_batch(vec![path]).await;
    let file = &report.files[0];

    assert_eq!(file.status, FileStatus::Failed);
    assert!(file.queries.is_empty());
    assert_eq!(file.error.as_ref().unwrap().category, "Duplicate Query Name");
}

#[tokio::test]
async fn test_disabled_block_is_reported_but_not_run() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "disabled.sql",
        "-- name: make
CREATE TABLE t (x INTEGER);
-- name: wipe
-- auto_run: false
DROP TABLE t;
-- name: still_there
SELECT COUNT(*) AS n FROM t;
",
    );

    let report = run_batch(vec![path]).await;
    let file = &report.files[0];

    assert_eq!(file.status, FileStatus::Ok);
    assert!(!report.has_failures());
    assert_eq!(file.query("wipe").unwrap().status(), "skipped");
    assert_eq!(file.query("still_there").unwrap().status(), "ok");
}

#[tokio::test]
async fn test_example_file_against_existing_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("app.db");

    let client = SqliteClient::connect(db_path.to_str().unwrap()).await.unwrap();
    client
        .execute_query(
            "CREATE TABLE user (name TEXT, age INTEGER);
             INSERT INTO user VALUES ('Alice', 25), ('Bob', 31);",
        )
        .await
        .unwrap();
    client.close().await.unwrap();

    let path = write_file(
        dir.path(),
        "example.sql",
        "/*
input.sqlite: app.db
output_dir: ./data
vars:
  my_var_1: Alice
  my_var_2: 25
  my_table: !ident user
*/

-- Name: first_query
SELECT * FROM user;

-- Name: second_query
SELECT *
FROM user
WHERE name = {{ my_var_1 }};

-- Name: third_query
SELECT *
FROM user
WHERE age = {{ my_var_2 }};

-- Name: fourth_query
SELECT
  name
FROM {{ my_table }};
",
    );

    let report = run_batch(vec![path]).await;
    assert!(!report.has_failures(), "{report:?}");

    let data = dir.path().join("data");
    let read = |name: &str| std::fs::read_to_string(data.join(format!("{name}.csv"))).unwrap();
    assert_eq!(read("first_query"), "name,age\nAlice,25\nBob,31\n");
    assert_eq!(read("second_query"), "name,age\nAlice,25\n");
    assert_eq!(read("third_query"), "name,age\nAlice,25\n");
    assert_eq!(read("fourth_query"), "name\nAlice\nBob\n");
}

#[tokio::test]
async fn test_empty_select_keeps_its_columns_in_memory() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "empty.sql",
        "-- name: make
CREATE TABLE user (name TEXT, age INTEGER);
-- name: seniors
SELECT name, age FROM user WHERE age > 100;
",
    );

    let report = run_batch(vec![path]).await;
    let result = report.files[0].query("seniors").unwrap().result_set().unwrap();

    assert_eq!(result.column_names(), vec!["name", "age"]);
    assert_eq!(result.row_count, 0);
}
