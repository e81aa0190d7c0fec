//! Query-related data models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Metadata about a column in a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Declared type, empty for expression columns
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Tabular result of a read query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    /// Rows keyed by column name, at most `row_cap` of them
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Number of rows the statement produced before truncation
    pub total_rows: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    /// First value of the first row, if any.
    pub fn scalar(&self) -> Option<&JsonValue> {
        let first_column = self.columns.first()?;
        self.rows.first()?.get(&first_column.name)
    }
}
