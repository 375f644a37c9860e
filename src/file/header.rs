//! Leading `/* ... */` metadata block.
//!
//! The block body is YAML with three recognized keys:
//!
//! ```text
//! /*
//! input:
//!   sqlite: /tmp/test.db
//! output_dir: ./data
//! vars:
//!   my_var_1: Alice
//!   my_var_2: 25
//!   my_table: !ident user
//! */
//! ```
//!
//! A file that does not open with a block comment simply has no header.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::{debug, warn};

use crate::db::DatabaseBackend;
use crate::error::{QsqlError, Result};
use crate::template::{Variable, VariableBindings};

use super::splitter::marker_name;

/// File kinds recognized by extension that no backend can open.
const UNSUPPORTED_KINDS: &[(&str, &[&str])] = &[("duckdb", &[".ddb", ".duckdb"])];

/// Declared data source of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    /// Backend kind as written, e.g. `sqlite` or `postgres`.
    pub kind: String,
    /// Path or connection URL.
    pub locator: String,
}

impl InputSpec {
    /// Creates an input spec with an explicit kind.
    pub fn new(kind: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            locator: locator.into(),
        }
    }

    /// Infers the backend from a bare locator.
    ///
    /// Locators of known but unsupported kinds are accepted here and fail at
    /// connect time, the same as the explicit `input.<kind>:` form. Returns
    /// `None` when no kind recognizes the locator format.
    pub fn infer(locator: &str) -> Option<Self> {
        let locator = locator.trim();
        if let Some(backend) = DatabaseBackend::infer(locator) {
            return Some(Self::new(backend.as_str(), locator));
        }
        let lowered = locator.to_lowercase();
        UNSUPPORTED_KINDS
            .iter()
            .find(|(_, extensions)| extensions.iter().any(|ext| lowered.ends_with(ext)))
            .map(|(kind, _)| Self::new(*kind, locator))
    }

    /// Returns the backend for this spec, if the kind is supported.
    pub fn backend(&self) -> Option<DatabaseBackend> {
        DatabaseBackend::parse(&self.kind)
    }

    /// Makes a relative file locator relative to `base` instead of the
    /// process working directory. URLs and `:memory:` are left alone.
    pub fn resolved_against(&self, base: &Path) -> Self {
        if self.backend() != Some(DatabaseBackend::Sqlite) {
            return self.clone();
        }
        let locator = self.locator.strip_prefix("sqlite:").unwrap_or(&self.locator);
        if locator == ":memory:" || locator.is_empty() || Path::new(locator).is_absolute() {
            return self.clone();
        }
        Self::new(
            self.kind.clone(),
            base.join(locator).to_string_lossy().into_owned(),
        )
    }

    /// Returns a display-safe string (no password) for logs and reports.
    pub fn display_string(&self) -> String {
        match url::Url::parse(&self.locator) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("***"));
                format!("{}: {}", self.kind, url)
            }
            _ => format!("{}: {}", self.kind, self.locator),
        }
    }
}

/// Declared destination of result artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    pub dir: PathBuf,
}

impl OutputSpec {
    /// Creates an output spec for the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolves a relative directory against `base`.
    pub fn resolved_against(&self, base: &Path) -> Self {
        if self.dir.is_absolute() {
            self.clone()
        } else {
            Self::new(base.join(&self.dir))
        }
    }
}

/// Parsed metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub input: Option<InputSpec>,
    pub output: Option<OutputSpec>,
    pub vars: VariableBindings,
}

/// Splits `text` into the raw header body (if any) and the byte offset where
/// the rest of the file starts.
///
/// Blank lines and `--` comment lines may precede the header, as long as
/// none of them is a block marker.
pub fn extract(text: &str) -> (Option<&str>, usize) {
    let mut leading = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        let skippable = trimmed.is_empty()
            || (trimmed.starts_with("--") && marker_name(trimmed).is_none());
        if !skippable {
            break;
        }
        leading += line.len();
    }
    leading += text[leading..].len() - text[leading..].trim_start().len();
    let rest = &text[leading..];

    if !rest.starts_with("/*") {
        return (None, 0);
    }

    match rest[2..].find("*/") {
        Some(end) => {
            let body = &rest[2..2 + end];
            (Some(body), leading + 2 + end + 2)
        }
        // Unterminated: let the caller report it.
        None => (Some(&rest[2..]), text.len()),
    }
}

/// Parses the header of `text`. Missing headers yield `Header::default()`.
pub fn parse(file: &Path, text: &str) -> Result<(Header, usize)> {
    let (body, offset) = extract(text);
    let Some(body) = body else {
        return Ok((Header::default(), 0));
    };

    if offset == text.len() && !text.trim_end().ends_with("*/") {
        return Err(header_error(file, first_line(body), "unterminated header comment"));
    }

    let doc: YamlValue = serde_yaml::from_str(body).map_err(|e| {
        let fragment = e
            .location()
            .and_then(|loc| body.lines().nth(loc.line().saturating_sub(1)))
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| first_line(body));
        header_error(file, fragment, e.to_string())
    })?;

    let mapping = match doc {
        YamlValue::Mapping(mapping) => mapping,
        YamlValue::Null => return Ok((Header::default(), offset)),
        _ => {
            // A prose comment at the top of the file, not metadata.
            debug!(file = %file.display(), "leading comment is not a metadata block");
            return Ok((Header::default(), offset));
        }
    };

    Ok((parse_mapping(file, &mapping)?, offset))
}

fn parse_mapping(file: &Path, mapping: &Mapping) -> Result<Header> {
    let mut header = Header::default();

    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(header_error(file, fragment_of(key, value), "keys must be strings"));
        };

        match key {
            "input" => set_input(file, &mut header, parse_input(file, value)?)?,
            "output_dir" | "output" => {
                let dir = value.as_str().ok_or_else(|| {
                    header_error(
                        file,
                        fragment_of(&YamlValue::from(key), value),
                        "output directory must be a string",
                    )
                })?;
                header.output = Some(OutputSpec::new(dir));
            }
            "vars" => header.vars = parse_vars(file, value)?,
            _ => match key.strip_prefix("input.") {
                Some(kind) => {
                    let locator = scalar_string(value).ok_or_else(|| {
                        header_error(
                            file,
                            fragment_of(&YamlValue::from(key), value),
                            "input locator must be a scalar",
                        )
                    })?;
                    set_input(file, &mut header, InputSpec::new(kind, locator))?;
                }
                None => warn!(file = %file.display(), key, "ignoring unknown header key"),
            },
        }
    }

    Ok(header)
}

fn set_input(file: &Path, header: &mut Header, input: InputSpec) -> Result<()> {
    if let Some(existing) = &header.input {
        return Err(header_error(
            file,
            format!("input.{}", input.kind),
            format!("only one input may be declared, already have '{}'", existing.kind),
        ));
    }
    header.input = Some(input);
    Ok(())
}

fn parse_input(file: &Path, value: &YamlValue) -> Result<InputSpec> {
    match value {
        YamlValue::String(locator) => InputSpec::infer(locator).ok_or_else(|| {
            header_error(
                file,
                format!("input: {locator}"),
                "cannot infer backend from locator; supported formats: \
                 .db/.sqlite/.sqlite3 files, :memory:, postgres://...",
            )
        }),
        YamlValue::Mapping(map) => {
            if map.len() != 1 {
                return Err(header_error(
                    file,
                    fragment_of(&YamlValue::from("input"), value),
                    format!("input must name exactly one backend, got {}", map.len()),
                ));
            }
            let (kind, locator) = map.iter().next().ok_or_else(|| {
                QsqlError::internal("single-entry mapping had no entries")
            })?;
            match (kind.as_str(), scalar_string(locator)) {
                (Some(kind), Some(locator)) => Ok(InputSpec::new(kind, locator)),
                _ => Err(header_error(
                    file,
                    fragment_of(&YamlValue::from("input"), value),
                    "input must be `<backend>: <locator>`",
                )),
            }
        }
        _ => Err(header_error(
            file,
            fragment_of(&YamlValue::from("input"), value),
            "input must be a locator string or a `<backend>: <locator>` mapping",
        )),
    }
}

fn parse_vars(file: &Path, value: &YamlValue) -> Result<VariableBindings> {
    let mut vars = VariableBindings::new();

    let map = match value {
        YamlValue::Null => return Ok(vars),
        YamlValue::Mapping(map) => map,
        _ => {
            return Err(header_error(
                file,
                fragment_of(&YamlValue::from("vars"), value),
                "vars must be a mapping of name to scalar",
            ))
        }
    };

    for (name, raw) in map {
        let name = name.as_str().ok_or_else(|| {
            header_error(file, fragment_of(name, raw), "variable names must be strings")
        })?;
        let variable = to_variable(raw).ok_or_else(|| {
            header_error(
                file,
                fragment_of(&YamlValue::from(name), raw),
                format!("unsupported value for variable '{name}'"),
            )
        })?;
        vars.insert(name.to_string(), variable);
    }

    Ok(vars)
}

/// Converts a YAML scalar into a typed variable.
///
/// Identifiers are declared with a `!ident` tag or a `{ ident: ... }` map.
fn to_variable(value: &YamlValue) -> Option<Variable> {
    match value {
        YamlValue::String(s) => Some(Variable::String(s.clone())),
        YamlValue::Number(n) => n
            .as_i64()
            .map(Variable::Integer)
            .or_else(|| n.as_f64().map(Variable::Float)),
        YamlValue::Bool(b) => Some(Variable::Identifier(
            if *b { "TRUE" } else { "FALSE" }.to_string(),
        )),
        YamlValue::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            match tag.trim_start_matches('!') {
                "ident" | "identifier" => scalar_string(&tagged.value).map(Variable::Identifier),
                "str" | "string" => scalar_string(&tagged.value).map(Variable::String),
                _ => None,
            }
        }
        YamlValue::Mapping(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next()?;
            match key.as_str()? {
                "ident" | "identifier" => scalar_string(inner).map(Variable::Identifier),
                _ => None,
            }
        }
        _ => None,
    }
}

fn scalar_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fragment_of(key: &YamlValue, value: &YamlValue) -> String {
    let mut single = Mapping::new();
    single.insert(key.clone(), value.clone());
    serde_yaml::to_string(&single)
        .map(|s| s.trim().replace('\n', " "))
        .unwrap_or_default()
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn header_error(file: &Path, fragment: impl Into<String>, message: impl Into<String>) -> QsqlError {
    QsqlError::HeaderParse {
        file: file.to_path_buf(),
        fragment: fragment.into(),
        message: message.into(),
    }
}
