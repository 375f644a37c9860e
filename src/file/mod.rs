//! Annotated query files.
//!
//! A query file is an optional metadata header followed by named SQL blocks.
//! Parsing is purely textual: SQL bodies are passed through untouched apart
//! from trimming surrounding comments and statement terminators.

pub mod header;
pub mod splitter;

pub use header::{Header, InputSpec, OutputSpec};

use std::path::{Path, PathBuf};

use crate::error::{QsqlError, Result};
use crate::template::VariableBindings;

/// Per-block options written as `-- key: value` lines under the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOptions {
    /// When false the block is parsed but not executed.
    pub auto_run: bool,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self { auto_run: true }
    }
}

/// A single named SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBlock {
    /// Name, unique within its file.
    pub name: String,
    /// Raw SQL text, placeholders unresolved.
    pub sql: String,
    /// One-based line of the `name:` marker.
    pub line: usize,
    pub options: BlockOptions,
}

/// A parsed query file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFile {
    pub source: PathBuf,
    pub input: Option<InputSpec>,
    pub output: Option<OutputSpec>,
    pub vars: VariableBindings,
    pub blocks: Vec<QueryBlock>,
}

impl QueryFile {
    /// Parses file contents. `source` labels errors and anchors relative paths.
    pub fn parse(source: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let source = source.into();
        let (header, offset) = header::parse(&source, text)?;

        let first_line = text[..offset].matches('\n').count();
        let blocks = splitter::split(&source, &text[offset..], first_line)?;

        Ok(Self {
            source,
            input: header.input,
            output: header.output,
            vars: header.vars,
            blocks,
        })
    }

    /// Reads and parses a file from disk.
    pub async fn read(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| QsqlError::io(path, e))?;
        Self::parse(path, &text)
    }

    /// Directory relative header paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Input spec with relative paths resolved against the file's directory.
    pub fn resolved_input(&self) -> Option<InputSpec> {
        self.input
            .as_ref()
            .map(|input| input.resolved_against(self.base_dir()))
    }

    /// Output spec with relative paths resolved against the file's directory.
    pub fn resolved_output(&self) -> Option<OutputSpec> {
        self.output
            .as_ref()
            .map(|output| output.resolved_against(self.base_dir()))
    }

    /// Looks up a block by name.
    pub fn block(&self, name: &str) -> Option<&QueryBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Variable;
    use pretty_assertions::assert_eq;

    const EXAMPLE: &str = "/*
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
";

    #[test]
    fn test_parse_example_file() {
        let file = QueryFile::parse("jobs/example.sql", EXAMPLE).unwrap();

        assert_eq!(file.source, PathBuf::from("jobs/example.sql"));
        assert!(file.input.is_none());
        assert_eq!(file.output, Some(OutputSpec::new("./data")));
        assert_eq!(file.vars.len(), 3);
        assert_eq!(file.vars["my_var_2"], Variable::Integer(25));

        let names: Vec<&str> = file.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["first_query", "second_query", "third_query", "fourth_query"]
        );
        assert_eq!(file.blocks[0].line, 9);
        assert_eq!(file.blocks[3].sql, "SELECT\n  name\nFROM {{ my_table }}");
    }

    #[test]
    fn test_paths_resolve_against_file_dir() {
        let file = QueryFile::parse("jobs/example.sql", EXAMPLE).unwrap();
        assert_eq!(
            file.resolved_output().unwrap().dir,
            PathBuf::from("jobs/./data")
        );

        let bare = QueryFile::parse("example.sql", EXAMPLE).unwrap();
        assert_eq!(bare.base_dir(), Path::new("."));
    }

    #[test]
    fn test_block_lookup() {
        let file = QueryFile::parse("x.sql", EXAMPLE).unwrap();
        assert!(file.block("third_query").is_some());
        assert!(file.block("fifth_query").is_none());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = QueryFile::read(Path::new("/definitely/not/here.sql"))
            .await
            .unwrap_err();
        assert!(matches!(err, QsqlError::Io { .. }));
    }

    #[test]
    fn test_file_without_header_or_blocks() {
        let file = QueryFile::parse("empty.sql", "").unwrap();
        assert!(file.blocks.is_empty());
        assert!(file.vars.is_empty());
    }
}
