//! Query tool handler.
//!
//! Runs model-issued SQL through the admission gate and, when admitted,
//! against the analytical store. Every outcome is returned as text the model
//! can act on; nothing here raises to the MCP layer.

use crate::db::AnalyticsStore;
use crate::error::StoreError;
use crate::tools::format::render_result;
use crate::tools::sql_validator::{rejection_suggestions, validate_query};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// A single read-only SELECT statement. Qualify tables with their schema, e.g. core.patient.
    pub sql_query: String,
}

/// Broad category of a store failure, derived from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailure {
    TableNotFound,
    ColumnNotFound,
    Syntax,
    DescribeMisuse,
    Other,
}

impl BackendFailure {
    /// Best-effort classification by message substrings.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let missing = lower.contains("not found") || lower.contains("does not exist");

        if lower.contains("no such table") {
            Self::TableNotFound
        } else if lower.contains("no such column") || (lower.contains("column") && missing) {
            Self::ColumnNotFound
        } else if lower.contains("table") && missing {
            Self::TableNotFound
        } else if lower.contains("describe") || lower.contains("show ") || lower.contains("pragma")
        {
            Self::DescribeMisuse
        } else if lower.contains("syntax") || lower.contains("parser") {
            Self::Syntax
        } else {
            Self::Other
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::TableNotFound => {
                "Table not found. Call get_database_schema to list the available schema.table names, \
                 and always qualify tables with their schema (e.g. core.patient)."
            }
            Self::ColumnNotFound => {
                "Column not found. Call get_table_info with the table name to see its columns \
                 before referencing them."
            }
            Self::Syntax => {
                "SQL syntax error. Check keywords, commas and parentheses; only standard SELECT \
                 syntax is supported."
            }
            Self::DescribeMisuse => {
                "DESCRIBE, SHOW and PRAGMA are not available through execute_query. Use \
                 get_table_info to inspect a table and get_database_schema to list tables."
            }
            Self::Other => {
                "Check the query against the schema (get_database_schema, get_table_info) and try \
                 a simpler SELECT first."
            }
        }
    }
}

/// Handler for query-related tools.
pub struct QueryToolHandler<S> {
    store: Arc<S>,
    max_rows: usize,
}

impl<S: AnalyticsStore> QueryToolHandler<S> {
    pub fn new(store: Arc<S>, max_rows: usize) -> Self {
        Self { store, max_rows }
    }

    /// Gate, execute and render a model-issued query.
    pub async fn execute_query(&self, input: ExecuteQueryInput) -> String {
        let sql = input.sql_query.trim();

        let verdict = validate_query(sql);
        if !verdict.is_safe {
            warn!(reason = %verdict.reason, "Query blocked by admission gate");
            return format!(
                "Error: Query blocked by security policy: {}\n\n{}",
                verdict.reason,
                rejection_suggestions()
            );
        }

        debug!(sql_len = sql.len(), "Executing admitted query");
        match self.store.execute_query(sql, self.max_rows).await {
            Ok(result) => render_result(&result),
            Err(e) => backend_error_text(&e),
        }
    }
}

/// Format a store failure with a remediation hint.
pub fn backend_error_text(err: &StoreError) -> String {
    let message = err.to_string();
    let failure = BackendFailure::classify(&message);
    warn!(error = %message, category = ?failure, "Query failed in the store");
    format!("Error: {message}\n\nHint: {}", failure.hint())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sqlite_messages() {
        assert_eq!(
            BackendFailure::classify("Database error: no such table: core.patients"),
            BackendFailure::TableNotFound
        );
        assert_eq!(
            BackendFailure::classify("Database error: no such column: birth_dt"),
            BackendFailure::ColumnNotFound
        );
        assert_eq!(
            BackendFailure::classify("Database error: near \"FROM\": syntax error"),
            BackendFailure::Syntax
        );
        assert_eq!(
            BackendFailure::classify("Catalog Error: Table with name foo does not exist!"),
            BackendFailure::TableNotFound
        );
        assert_eq!(
            BackendFailure::classify("Timeout: query execution exceeded 30s"),
            BackendFailure::Other
        );
    }

    #[test]
    fn test_backend_error_text_includes_hint() {
        let err = StoreError::database("no such column: foo", "Check the SQL syntax");
        let text = backend_error_text(&err);
        assert!(text.starts_with("Error: Database error: no such column: foo"));
        assert!(text.contains("get_table_info"));
    }
}
