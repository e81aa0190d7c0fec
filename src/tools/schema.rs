//! Schema introspection tools.
//!
//! This module implements the `get_database_schema` and `get_table_info` MCP tools.

use crate::db::AnalyticsStore;
use crate::error::StoreResult;
use crate::models::{TableDescription, TableRef};
use crate::tools::format::{render_columns, render_result};
use crate::tools::query::backend_error_text;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the get_table_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TableInfoInput {
    /// Table name, optionally schema-qualified (e.g. readmissions.readmission_summary)
    pub table_name: String,
    /// Include up to three sample rows. Default: true
    #[serde(default = "default_true")]
    pub show_sample: bool,
}

fn default_true() -> bool {
    true
}

/// Handler for schema introspection tools.
pub struct SchemaToolHandler<S> {
    store: Arc<S>,
}

impl<S: AnalyticsStore> SchemaToolHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All `schema.table` names across attached schemas.
    pub async fn qualified_tables(&self) -> StoreResult<Vec<String>> {
        let mut tables = Vec::new();
        for schema in self.store.list_schemas().await? {
            for table in self.store.list_tables(&schema).await? {
                tables.push(table.qualified_name());
            }
        }
        Ok(tables)
    }

    pub async fn get_database_schema(&self) -> String {
        match self.qualified_tables().await {
            Ok(tables) if tables.is_empty() => "No tables found in the database".to_string(),
            Ok(tables) => {
                info!(count = tables.len(), "Listed database schema");
                format!(
                    "Available tables ({}):\n{}",
                    tables.len(),
                    tables.join("\n")
                )
            }
            Err(e) => backend_error_text(&e),
        }
    }

    pub async fn get_table_info(&self, input: TableInfoInput) -> String {
        let table = match TableRef::parse(&input.table_name) {
            Ok(table) => table,
            Err(message) => {
                warn!(table = %input.table_name, "Rejected table name");
                return format!(
                    "Error: {message}\n\nHint: Call get_database_schema to list valid schema.table names."
                );
            }
        };

        match self.store.describe(&table, input.show_sample).await {
            Ok(description) => render_description(&description),
            Err(e) => backend_error_text(&e),
        }
    }
}

fn render_description(description: &TableDescription) -> String {
    let mut output = format!(
        "Table: {}\n\nColumns:\n{}",
        description.table,
        render_columns(&description.columns)
    );
    if let Some(sample) = &description.sample {
        output.push_str("\n\nSample:\n");
        output.push_str(&render_result(sample));
    }
    output
}
