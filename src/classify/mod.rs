//! Statement classification.
//!
//! Parses SQL and classifies statements by the effect they have on the
//! database. The execution driver uses the effect to decide whether a failed
//! statement leaves the rest of the file unable to run.

mod parser;

pub use parser::{classify_sql, StatementClassifier};

use std::fmt;

use serde::Serialize;

/// What a statement does to the database, ordered from least to most
/// invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// SELECT, EXPLAIN, SHOW, PRAGMA reads and transaction control.
    ReadOnly,
    /// INSERT, UPDATE, DELETE, MERGE.
    DataMutating,
    /// CREATE, DROP, ALTER, TRUNCATE and friends.
    SchemaMutating,
}

impl Effect {
    /// Returns true if a failure of this statement poisons later statements.
    pub fn is_schema_mutating(&self) -> bool {
        matches!(self, Self::SchemaMutating)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::DataMutating => write!(f, "data-mutating"),
            Self::SchemaMutating => write!(f, "schema-mutating"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Create,
    Drop,
    Alter,
    Truncate,
    Explain,
    Show,
    Pragma,
    Transaction,
    Attach,
    /// Multiple statements detected; contains the most invasive type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Merge => write!(f, "MERGE"),
            Self::Create => write!(f, "CREATE"),
            Self::Drop => write!(f, "DROP"),
            Self::Alter => write!(f, "ALTER"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Pragma => write!(f, "PRAGMA"),
            Self::Transaction => write!(f, "TRANSACTION"),
            Self::Attach => write!(f, "ATTACH"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Serialize for StatementType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of classifying a block of SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub effect: Effect,
    pub statement_type: StatementType,
    /// False when the parser rejected the SQL and only the leading keyword
    /// was inspected.
    pub parsed: bool,
}

impl Classification {
    /// Creates a classification from a successful parse.
    pub fn new(effect: Effect, statement_type: StatementType) -> Self {
        Self {
            effect,
            statement_type,
            parsed: true,
        }
    }

    /// Creates a classification derived from the leading keyword only.
    pub fn from_keyword(effect: Effect, statement_type: StatementType) -> Self {
        Self {
            effect,
            statement_type,
            parsed: false,
        }
    }
}
