//! Named block scanner.
//!
//! A block starts at a `-- name: <identifier>` comment line and runs until the
//! next such line or end of file. Comment lines of the form `-- key: value`
//! directly under the marker are block options.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{QsqlError, Result};

use super::{BlockOptions, QueryBlock};

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*--\s*(?i:name)\s*:\s*([A-Za-z_][A-Za-z0-9_\-]*)")
            .expect("marker regex is valid")
    })
}

fn option_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*--\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(\S+)").expect("option regex is valid")
    })
}

fn block_comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment regex is valid"))
}

/// Returns the block name if `line` is a marker line.
pub fn marker_name(line: &str) -> Option<&str> {
    marker_pattern()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Splits `body` into named blocks in file order.
///
/// `first_line` is the zero-based line number of `body` within the file,
/// so block line numbers refer to the original file.
pub fn split(file: &Path, body: &str, first_line: usize) -> Result<Vec<QueryBlock>> {
    let lines: Vec<&str> = body.lines().collect();

    let markers: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| marker_name(line).map(|name| (idx, name)))
        .collect();

    if let Some((first, _)) = markers.first() {
        if has_sql(&lines[..*first].join("\n")) {
            warn!(
                file = %file.display(),
                "ignoring SQL before the first named block"
            );
        }
    } else if has_sql(body) {
        warn!(file = %file.display(), "file has SQL but no named blocks");
    }

    let mut seen = HashSet::new();
    let mut blocks = Vec::with_capacity(markers.len());

    for (i, (start, name)) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map(|(next, _)| *next).unwrap_or(lines.len());

        if !seen.insert(*name) {
            return Err(QsqlError::DuplicateQueryName {
                file: file.to_path_buf(),
                name: name.to_string(),
            });
        }

        let (options, sql_start) = parse_options(file, name, &lines[start + 1..end])?;
        let sql = trim_sql(&lines[start + 1 + sql_start..end]);

        if !has_sql(&sql) {
            return Err(QsqlError::EmptyQuery {
                file: file.to_path_buf(),
                query: name.to_string(),
            });
        }

        debug!(file = %file.display(), query = name, line = first_line + start + 1, "found block");

        blocks.push(QueryBlock {
            name: name.to_string(),
            sql,
            line: first_line + start + 1,
            options,
        });
    }

    Ok(blocks)
}

/// Reads `-- key: value` lines right after the marker.
///
/// Returns the options and the index of the first line past them.
fn parse_options(file: &Path, block: &str, lines: &[&str]) -> Result<(BlockOptions, usize)> {
    let mut options = BlockOptions::default();
    let mut consumed = 0;

    for line in lines {
        let Some(caps) = option_pattern().captures(line) else {
            break;
        };
        consumed += 1;

        let (key, value) = (&caps[1], &caps[2]);
        match key {
            "auto_run" => {
                options.auto_run = parse_bool(value).ok_or_else(|| QsqlError::HeaderParse {
                    file: file.to_path_buf(),
                    fragment: line.trim().to_string(),
                    message: format!("invalid auto_run value for block '{block}'"),
                })?;
            }
            _ => debug!(file = %file.display(), block, key, "ignoring unknown block option"),
        }
    }

    Ok((options, consumed))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("--")
}

/// Drops surrounding blank and comment lines, then leading and trailing
/// terminators.
fn trim_sql(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !is_blank_or_comment(line))
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !is_blank_or_comment(line))
        .map(|idx| idx + 1)
        .unwrap_or(start);

    lines[start..end.max(start)]
        .join("\n")
        .trim_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

/// Returns true if `text` holds anything besides comments and whitespace.
fn has_sql(text: &str) -> bool {
    let without_blocks = block_comment_pattern().replace_all(text, "");
    without_blocks
        .lines()
        .any(|line| !is_blank_or_comment(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split_ok(body: &str) -> Vec<QueryBlock> {
        split(Path::new("test.sql"), body, 0).unwrap()
    }

    #[test]
    fn test_marker_keyword_is_case_insensitive() {
        assert_eq!(marker_name("-- name: first_query"), Some("first_query"));
        assert_eq!(marker_name("-- Name: first_query"), Some("first_query"));
        assert_eq!(marker_name("--NAME:first_query trailing text"), Some("first_query"));
        assert_eq!(marker_name("  --  name :  q1"), Some("q1"));
        assert_eq!(marker_name("SELECT 1 -- name: q"), None);
        assert_eq!(marker_name("-- named: q"), None);
    }

    #[test]
    fn test_blocks_in_file_order() {
        let blocks = split_ok(
            "-- name: query_1\nSELECT * FROM user;\n\n-- name: query_2\nSELECT *\nFROM user\nWHERE name = 'Alice';\n\n-- name: query_3\nSELECT COUNT(*) AS user_count;",
        );

        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["query_1", "query_2", "query_3"]);
        assert_eq!(blocks[0].sql, "SELECT * FROM user");
        assert_eq!(blocks[1].sql, "SELECT *\nFROM user\nWHERE name = 'Alice'");
        assert_eq!(blocks[2].sql, "SELECT COUNT(*) AS user_count");
    }

    #[test]
    fn test_line_numbers_include_offset() {
        let blocks = split(Path::new("t.sql"), "\n-- name: a\nSELECT 1\n-- name: b\nSELECT 2", 4).unwrap();
        assert_eq!(blocks[0].line, 6);
        assert_eq!(blocks[1].line, 8);
    }

    #[test]
    fn test_no_blocks_is_empty() {
        assert!(split_ok("").is_empty());
        assert!(split_ok("-- just a comment\n").is_empty());
    }

    #[test]
    fn test_duplicate_name_is_error() {
        let err = split(
            Path::new("dup.sql"),
            "-- name: q\nSELECT 1;\n-- name: q\nSELECT 2;",
            0,
        )
        .unwrap_err();
        match err {
            QsqlError::DuplicateQueryName { name, .. } => assert_eq!(name, "q"),
            other => panic!("Expected DuplicateQueryName, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_block_is_error() {
        let err = split(
            Path::new("e.sql"),
            "-- name: a\n-- nothing here\n\n-- name: b\nSELECT 1",
            0,
        )
        .unwrap_err();
        assert!(matches!(err, QsqlError::EmptyQuery { ref query, .. } if query == "a"));
    }

    #[test]
    fn test_comments_around_sql_are_trimmed() {
        let blocks = split_ok(
            "-- name: q\n-- explains the query\nSELECT 1 -- inline stays\n/* block stays */\n;;\n-- trailing comment\n",
        );
        assert_eq!(blocks[0].sql, "SELECT 1 -- inline stays\n/* block stays */");
    }

    #[test]
    fn test_leading_terminators_are_trimmed() {
        let blocks = split_ok("-- name: q\n;\nSELECT 1;\n-- name: r\n; SELECT 2 ;;");
        assert_eq!(blocks[0].sql, "SELECT 1");
        assert_eq!(blocks[1].sql, "SELECT 2");
    }

    #[test]
    fn test_auto_run_option() {
        let blocks = split_ok("-- name: slow\n-- auto_run: false\nSELECT 1;\n-- name: fast\nSELECT 2;");
        assert!(!blocks[0].options.auto_run);
        assert!(blocks[1].options.auto_run);
        assert_eq!(blocks[0].sql, "SELECT 1");
    }

    #[test]
    fn test_invalid_auto_run_is_error() {
        let err = split(Path::new("t.sql"), "-- name: q\n-- auto_run: maybe\nSELECT 1", 0).unwrap_err();
        assert!(matches!(err, QsqlError::HeaderParse { .. }));
    }

    #[test]
    fn test_placeholders_pass_through() {
        let blocks = split_ok("-- name: fourth_query\nSELECT\n  name\nFROM {{ my_table }};");
        assert_eq!(blocks[0].sql, "SELECT\n  name\nFROM {{ my_table }}");
    }
}
