//! SQL admission gate for model-issued queries.
//!
//! Every query-executing tool runs candidate SQL through [`validate_query`]
//! before anything reaches the store. The gate is purely static: it parses the
//! text with [sqlparser](https://docs.rs/sqlparser/), requires exactly one
//! read-only SELECT, then scans the upper-cased text for write keywords,
//! injection signatures and identifiers that have no business in an
//! analytics query. The first check that fires decides the reason.
//!
//! The identifier list is tuned for a clinical analytics vocabulary. It
//! over-blocks (a `user_id` column is refused) and under-blocks (obfuscated
//! payloads pass); moving to another domain means re-tuning the list.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Keywords refused anywhere in a SELECT, matched as whole words.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "EXEC", "EXECUTE",
];

/// Substring signatures of common injection payloads, checked in order.
const INJECTION_PATTERNS: &[(&str, &str)] = &[
    ("1=1", "Classic injection pattern"),
    ("OR 1=1", "Boolean injection pattern"),
    ("AND 1=1", "Boolean injection pattern"),
    ("OR '1'='1'", "String injection pattern"),
    ("AND '1'='1'", "String injection pattern"),
    ("WAITFOR", "Time-based injection"),
    ("SLEEP(", "Time-based injection"),
    ("BENCHMARK(", "Time-based injection"),
    ("LOAD_FILE(", "File access injection"),
    ("INTO OUTFILE", "File write injection"),
    ("INTO DUMPFILE", "File write injection"),
];

/// Identifier fragments that point at credentials rather than clinical data.
const SUSPICIOUS_IDENTIFIERS: &[&str] = &[
    "PASSWORD",
    "ADMIN",
    "USER",
    "LOGIN",
    "AUTH",
    "TOKEN",
    "CREDENTIAL",
    "SECRET",
    "KEY",
    "HASH",
    "SALT",
    "SESSION",
    "COOKIE",
];

/// Why the gate refused a query.
///
/// The `Display` text is the reason string reported back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Empty query")]
    Empty,

    #[error("Invalid SQL syntax")]
    InvalidSyntax,

    #[error("Multiple statements not allowed")]
    MultipleStatements,

    #[error("Only SELECT queries allowed")]
    NotSelect,

    #[error("Write operation not allowed: {0}")]
    WriteOperation(&'static str),

    #[error("Injection pattern detected: {0}")]
    Injection(&'static str),

    #[error("Suspicious identifier detected: {0} (not medical data)")]
    SuspiciousIdentifier(&'static str),

    #[error("Validation error: {0}")]
    Internal(String),
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlVerdict {
    pub is_safe: bool,
    pub reason: String,
}

impl SqlVerdict {
    fn safe() -> Self {
        Self {
            is_safe: true,
            reason: "Safe".to_string(),
        }
    }
}

impl From<Rejection> for SqlVerdict {
    fn from(rejection: Rejection) -> Self {
        Self {
            is_safe: false,
            reason: rejection.to_string(),
        }
    }
}

/// Decide whether `sql` may be executed against the analytical store.
///
/// Never panics and never returns an error: anything the gate cannot prove
/// safe comes back as `is_safe == false`.
///
/// # Examples
///
/// ```
/// use osler_mcp::tools::sql_validator::validate_query;
///
/// assert!(validate_query("SELECT COUNT(*) FROM core.patient").is_safe);
///
/// let verdict = validate_query("SELECT 1; DROP TABLE core.patient");
/// assert_eq!(verdict.reason, "Multiple statements not allowed");
/// ```
pub fn validate_query(sql: &str) -> SqlVerdict {
    match check_query(sql) {
        Ok(()) => SqlVerdict::safe(),
        Err(rejection) => rejection.into(),
    }
}

/// Same policy as [`validate_query`], as a `Result`.
pub fn check_query(sql: &str) -> Result<(), Rejection> {
    panic::catch_unwind(AssertUnwindSafe(|| run_checks(sql))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "validator panicked".to_string());
        Err(Rejection::Internal(message))
    })
}

fn run_checks(sql: &str) -> Result<(), Rejection> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(Rejection::Empty);
    }

    let statements = Parser::parse_sql(&GenericDialect {}, trimmed).map_err(|e| match e {
        ParserError::RecursionLimitExceeded => Rejection::Internal(e.to_string()),
        _ => Rejection::InvalidSyntax,
    })?;

    let statement = match statements.as_slice() {
        [] => return Err(Rejection::InvalidSyntax),
        [single] => single,
        _ => return Err(Rejection::MultipleStatements),
    };

    if !is_select(statement) {
        return Err(Rejection::NotSelect);
    }

    let upper = trimmed.to_uppercase();

    if let Some(keyword) = find_write_keyword(&upper) {
        return Err(Rejection::WriteOperation(keyword));
    }

    if let Some(&(_, description)) = INJECTION_PATTERNS
        .iter()
        .find(|&&(pattern, _)| upper.contains(pattern))
    {
        return Err(Rejection::Injection(description));
    }

    if let Some(name) = SUSPICIOUS_IDENTIFIERS
        .iter()
        .copied()
        .find(|name| upper.contains(name))
    {
        return Err(Rejection::SuspiciousIdentifier(name));
    }

    Ok(())
}

/// A query statement counts as SELECT unless its body is a DML statement.
fn is_select(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => {
            !matches!(query.body.as_ref(), SetExpr::Insert(_) | SetExpr::Update(_))
        }
        _ => false,
    }
}

/// First write keyword (in list order) that appears as a whole word.
fn find_write_keyword(upper: &str) -> Option<&'static str> {
    let words: Vec<&str> = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    WRITE_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| words.contains(keyword))
}

/// Remediation hints appended to a rejection message.
pub fn rejection_suggestions() -> &'static str {
    "Suggestions:\n\
     - Use a single SELECT statement\n\
     - Avoid write operations and stacked statements\n\
     - Reference clinical tables and columns only (call get_database_schema to list them)\n\
     - Filter with real predicates instead of always-true conditions"
}
