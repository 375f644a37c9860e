//! `{{ name }}` placeholder substitution.
//!
//! Substitution is textual splicing: the bound value is rendered as a SQL
//! literal and pasted into the statement. The database never sees the
//! placeholder and no bind parameters are used.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{QsqlError, Result};

/// A typed value bound to a template variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Variable {
    /// Emitted as a single-quoted string literal.
    String(String),
    /// Emitted as a bare integer literal.
    Integer(i64),
    /// Emitted as a bare numeric literal.
    Float(f64),
    /// Emitted verbatim, for table names and other structural positions.
    Identifier(String),
}

impl Variable {
    /// Renders the value as SQL text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Integer(i) => i.to_string(),
            // Debug keeps the fractional part (`25.0`, not `25`).
            Self::Float(f) => format!("{f:?}"),
            Self::Identifier(ident) => ident.clone(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql_literal())
    }
}

impl From<&str> for Variable {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Variable {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for Variable {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Variable {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Variable name to value mapping for one file.
pub type VariableBindings = BTreeMap<String, Variable>;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Returns the variable names referenced by `sql`, in order of appearance.
pub fn placeholders(sql: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitutes every placeholder in `sql` with its bound literal.
///
/// `file` and `query` only label the error when a variable is unbound.
pub fn resolve(
    sql: &str,
    bindings: &VariableBindings,
    file: &Path,
    query: &str,
) -> Result<String> {
    let mut missing: Option<String> = None;

    let resolved = placeholder_pattern().replace_all(sql, |caps: &Captures<'_>| {
        let name = &caps[1];
        match bindings.get(name) {
            Some(value) => value.to_sql_literal(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(variable) => Err(QsqlError::UnboundVariable {
            file: file.to_path_buf(),
            query: query.to_string(),
            variable,
        }),
        None => Ok(resolved.into_owned()),
    }
}
