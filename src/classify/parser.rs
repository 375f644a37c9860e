//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the dialect of the target backend. SQL the parser
//! rejects (vendor extensions, or plain syntax errors the database will
//! report anyway) falls back to a leading-keyword check.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::trace;

use crate::db::DatabaseBackend;

use super::{Classification, Effect, StatementType};

/// SQL classifier bound to one backend's dialect.
#[derive(Debug, Clone, Copy)]
pub struct StatementClassifier {
    backend: DatabaseBackend,
}

impl StatementClassifier {
    /// Creates a classifier for the given backend.
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.backend {
            DatabaseBackend::Sqlite => Box::new(SQLiteDialect {}),
            DatabaseBackend::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }

    /// Classifies a block of SQL, which may hold several statements.
    pub fn classify(&self, sql: &str) -> Classification {
        let dialect = self.dialect();
        let statements = match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) if !statements.is_empty() => statements,
            Ok(_) => return Classification::new(Effect::ReadOnly, StatementType::Unknown),
            Err(e) => {
                trace!(error = %e, "falling back to keyword classification");
                return classify_keyword(sql);
            }
        };

        if statements.len() == 1 {
            let (effect, stmt_type) = classify_statement(&statements[0]);
            return Classification::new(effect, stmt_type);
        }

        let (effect, stmt_type) = statements
            .iter()
            .map(classify_statement)
            .fold((Effect::ReadOnly, StatementType::Unknown), max_effect);
        Classification::new(effect, StatementType::Multiple(Box::new(stmt_type)))
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(backend: DatabaseBackend, sql: &str) -> Classification {
    StatementClassifier::new(backend).classify(sql)
}

fn max_effect(
    current: (Effect, StatementType),
    next: (Effect, StatementType),
) -> (Effect, StatementType) {
    if next.0 > current.0 || current.1 == StatementType::Unknown {
        next
    } else {
        current
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (Effect, StatementType) {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                let (inner, _) = classify_statement(statement);
                (inner, StatementType::Explain)
            } else {
                (Effect::ReadOnly, StatementType::Explain)
            }
        }
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. } => (Effect::ReadOnly, StatementType::Show),
        Statement::Pragma { .. } => (Effect::ReadOnly, StatementType::Pragma),
        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. } => (Effect::ReadOnly, StatementType::Transaction),

        Statement::Insert { .. } => (Effect::DataMutating, StatementType::Insert),
        Statement::Update { .. } => (Effect::DataMutating, StatementType::Update),
        Statement::Delete { .. } => (Effect::DataMutating, StatementType::Delete),
        Statement::Merge { .. } => (Effect::DataMutating, StatementType::Merge),

        Statement::Drop { .. } => (Effect::SchemaMutating, StatementType::Drop),
        Statement::Truncate { .. } => (Effect::SchemaMutating, StatementType::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. } => (Effect::SchemaMutating, StatementType::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateVirtualTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => (Effect::SchemaMutating, StatementType::Create),
        Statement::AttachDatabase { .. } => (Effect::SchemaMutating, StatementType::Attach),

        // Everything else is treated as touching data, not schema
        _ => (Effect::DataMutating, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
fn classify_query(query: &Query) -> (Effect, StatementType) {
    let mut result = (Effect::ReadOnly, StatementType::Select);

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            result = max_effect(result, classify_query(&cte.query));
        }
    }

    max_effect(result, classify_set_expr(&query.body))
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> (Effect, StatementType) {
    match set_expr {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => select
            .from
            .iter()
            .map(classify_table_with_joins)
            .fold((Effect::ReadOnly, StatementType::Select), max_effect),
        SetExpr::SetOperation { left, right, .. } => {
            max_effect(classify_set_expr(left), classify_set_expr(right))
        }
        _ => (Effect::ReadOnly, StatementType::Select),
    }
}

/// Classifies a TableWithJoins, checking the main relation and all joins.
fn classify_table_with_joins(twj: &TableWithJoins) -> (Effect, StatementType) {
    twj.joins
        .iter()
        .map(|join| classify_table_factor(&join.relation))
        .fold(classify_table_factor(&twj.relation), max_effect)
}

/// Classifies a TableFactor, recursing into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> (Effect, StatementType) {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (Effect::ReadOnly, StatementType::Select),
    }
}

/// Classifies by the first keyword outside comments.
fn classify_keyword(sql: &str) -> Classification {
    let keyword = first_keyword(sql).to_uppercase();
    let (effect, stmt_type) = match keyword.as_str() {
        "CREATE" => (Effect::SchemaMutating, StatementType::Create),
        "DROP" => (Effect::SchemaMutating, StatementType::Drop),
        "ALTER" | "RENAME" => (Effect::SchemaMutating, StatementType::Alter),
        "TRUNCATE" => (Effect::SchemaMutating, StatementType::Truncate),
        "ATTACH" | "DETACH" => (Effect::SchemaMutating, StatementType::Attach),
        "INSERT" | "REPLACE" | "UPSERT" | "COPY" => (Effect::DataMutating, StatementType::Insert),
        "UPDATE" => (Effect::DataMutating, StatementType::Update),
        "DELETE" => (Effect::DataMutating, StatementType::Delete),
        "MERGE" => (Effect::DataMutating, StatementType::Merge),
        "SELECT" | "WITH" | "VALUES" | "TABLE" => (Effect::ReadOnly, StatementType::Select),
        "EXPLAIN" => (Effect::ReadOnly, StatementType::Explain),
        "SHOW" | "DESCRIBE" => (Effect::ReadOnly, StatementType::Show),
        "PRAGMA" => (Effect::ReadOnly, StatementType::Pragma),
        "BEGIN" | "COMMIT" | "ROLLBACK" | "END" => (Effect::ReadOnly, StatementType::Transaction),
        _ => (Effect::DataMutating, StatementType::Unknown),
    };
    Classification::from_keyword(effect, stmt_type)
}

fn first_keyword(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}
