//! Read-only verification of compiled SQL.
//!
//! Parses the statement the builder produced and accepts it only if it is
//! exactly one plain SELECT. Anything else (several statements, CTEs, set
//! operations, DML, DDL, unparseable text) is refused before a connection
//! is opened.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::{Dialect as SqlDialect, MsSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use super::Dialect;
use crate::error::ValidationError;

/// Verifies that `sql` is a single SELECT in the given dialect.
pub fn ensure_single_select(sql: &str, dialect: Dialect) -> Result<(), ValidationError> {
    let statements = match dialect {
        Dialect::LimitOffset => parse(&SQLiteDialect {}, sql)?,
        Dialect::Top => parse(&MsSqlDialect {}, sql)?,
    };

    match statements.as_slice() {
        [] => Err(ValidationError::ReadOnly("empty statement".to_string())),
        [Statement::Query(query)] => {
            if query.with.is_some() {
                return Err(ValidationError::ReadOnly("WITH clauses are not permitted".to_string()));
            }
            match query.body.as_ref() {
                SetExpr::Select(_) => Ok(()),
                other => Err(ValidationError::ReadOnly(format!(
                    "expected a plain SELECT, found {}",
                    set_expr_kind(other)
                ))),
            }
        }
        [_] => Err(ValidationError::ReadOnly("statement is not a query".to_string())),
        many => Err(ValidationError::ReadOnly(format!(
            "{} statements found, expected one",
            many.len()
        ))),
    }
}

fn parse(dialect: &dyn SqlDialect, sql: &str) -> Result<Vec<Statement>, ValidationError> {
    Parser::parse_sql(dialect, sql).map_err(|e| ValidationError::ReadOnly(format!("SQL parse error: {e}")))
}

fn set_expr_kind(expr: &SetExpr) -> &'static str {
    match expr {
        SetExpr::Select(_) => "SELECT",
        SetExpr::Query(_) => "nested query",
        SetExpr::SetOperation { .. } => "set operation",
        SetExpr::Values(_) => "VALUES",
        _ => "data-modifying expression",
    }
}
