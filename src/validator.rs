//! Static query validation.
//!
//! Every ad hoc query passes through [`QueryValidator::validate`] before a
//! connection is borrowed. The default policy is a substring denylist plus
//! quote and parenthesis counting. It is a guard rail, not a parser:
//! identifiers that happen to contain a denied word (`last_update`) are
//! rejected too.
//!
//! Strict mode additionally parses the text with
//! [sqlparser](https://docs.rs/sqlparser/) and accepts only a single
//! read-only statement. Strict mode never accepts something the denylist
//! rejects.

use crate::db::Dialect;
use crate::error::{EngineError, EngineResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::{self as sql_dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::debug;

/// Substrings that reject a query, matched against the trimmed, lower-cased
/// text.
pub const DENYLIST: &[&str] = &[
    "into outfile",
    "load_file",
    "--",
    "/*",
    "xp_",
    "shutdown",
    "drop",
    "delete",
    "update",
    "insert",
    "exec",
    "execute",
    "waitfor",
    "delay",
];

/// Rejection reasons.
mod reasons {
    pub const EMPTY: &str = "query is empty";
    pub const UNBALANCED_SINGLE: &str = "unbalanced single quotes";
    pub const UNBALANCED_DOUBLE: &str = "unbalanced double quotes";
    pub const UNBALANCED_PARENS: &str = "unbalanced parentheses";
    pub const MULTIPLE: &str = "only a single statement is accepted";
    pub const NOT_READ_ONLY: &str = "only read-only SELECT statements are accepted";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValidator {
    strict: bool,
}

impl QueryValidator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Accept or reject `sql` for execution against `dialect`.
    ///
    /// Semicolons are not treated specially by the denylist; a second
    /// statement only fails if it trips a denied word. Strict mode rejects
    /// any multi-statement text.
    pub fn validate(&self, sql: &str, dialect: Dialect) -> EngineResult<()> {
        check_denylist(sql)?;
        check_balance(sql)?;
        if self.strict {
            check_read_only(sql, dialect)?;
        }
        Ok(())
    }
}

fn reject(reason: impl Into<String>) -> EngineError {
    let reason = reason.into();
    debug!(reason = %reason, "Query rejected");
    EngineError::invalid_query(reason)
}

fn check_denylist(sql: &str) -> EngineResult<()> {
    let normalized = sql.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(reject(reasons::EMPTY));
    }

    match DENYLIST.iter().find(|pattern| normalized.contains(*pattern)) {
        Some(pattern) => Err(reject(format!(
            "query contains forbidden token '{}'",
            pattern
        ))),
        None => Ok(()),
    }
}

/// Plain counting: quotes must come in pairs and `(` and `)` must net to zero.
fn check_balance(sql: &str) -> EngineResult<()> {
    let (mut single, mut double, mut parens) = (0usize, 0usize, 0i64);
    for c in sql.chars() {
        match c {
            '\'' => single += 1,
            '"' => double += 1,
            '(' => parens += 1,
            ')' => parens -= 1,
            _ => {}
        }
    }

    if single % 2 != 0 {
        return Err(reject(reasons::UNBALANCED_SINGLE));
    }
    if double % 2 != 0 {
        return Err(reject(reasons::UNBALANCED_DOUBLE));
    }
    if parens != 0 {
        return Err(reject(reasons::UNBALANCED_PARENS));
    }
    Ok(())
}

fn parser_dialect(dialect: Dialect) -> Box<dyn sql_dialect::Dialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    }
}

fn check_read_only(sql: &str, dialect: Dialect) -> EngineResult<()> {
    let parser_dialect = parser_dialect(dialect);
    let statements = Parser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|e| reject(format!("failed to parse SQL statement: {}", e)))?;

    match statements.as_slice() {
        [] => Err(reject(reasons::EMPTY)),
        [statement] if is_read_only(statement) => Ok(()),
        [_] => Err(reject(reasons::NOT_READ_ONLY)),
        _ => Err(reject(reasons::MULTIPLE)),
    }
}

fn is_read_only(statement: &Statement) -> bool {
    match statement {
        Statement::Query(_) => true,
        Statement::Explain { statement, .. } => is_read_only(statement),
        _ => false,
    }
}
