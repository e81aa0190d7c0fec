//! MCP service implementation using rmcp.
//!
//! This module defines the OslerService struct with the analytical tools
//! exposed via the MCP protocol using the rmcp framework's macros. Tools
//! answer in plain text because their reader is a model.

use crate::db::SqliteStore;
use crate::tools::{
    ExecuteQueryInput, MetricsToolHandler, QueryToolHandler, SchemaToolHandler, TableInfoInput,
};
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct OslerService {
    /// Shared read-only analytical store
    store: Arc<SqliteStore>,
    /// Row cap for rendered query results
    max_rows: usize,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl OslerService {
    /// Create a new OslerService instance.
    pub fn new(store: Arc<SqliteStore>, max_rows: usize) -> Self {
        Self {
            store,
            max_rows,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl OslerService {
    #[tool(
        description = "List every table in the analytical database as schema.table.\nCall this first to discover which tables exist before writing SQL."
    )]
    async fn get_database_schema(&self) -> String {
        info!(tool = "get_database_schema", "Tool called");
        SchemaToolHandler::new(self.store.clone())
            .get_database_schema()
            .await
    }

    #[tool(
        description = "Show the columns of a table and, by default, three sample rows.\nUse a schema-qualified name such as readmissions.readmission_summary."
    )]
    async fn get_table_info(&self, Parameters(input): Parameters<TableInfoInput>) -> String {
        info!(tool = "get_table_info", table = %input.table_name, "Tool called");
        SchemaToolHandler::new(self.store.clone())
            .get_table_info(input)
            .await
    }

    #[tool(
        description = "Execute a single read-only SELECT query and return the results as a table (first 50 rows).\nQueries are checked by a security policy first: no writes, no multiple statements, no injection patterns.\nQualify tables with their schema, e.g. SELECT COUNT(*) FROM core.patient."
    )]
    async fn execute_query(&self, Parameters(input): Parameters<ExecuteQueryInput>) -> String {
        info!(tool = "execute_query", "Tool called");
        QueryToolHandler::new(self.store.clone(), self.max_rows)
            .execute_query(input)
            .await
    }

    #[tool(
        description = "Average CMS-HCC payment risk score across all patients (cms_hcc.patient_risk_scores)."
    )]
    async fn get_average_cms_hcc_risk_score(&self) -> String {
        info!(tool = "get_average_cms_hcc_risk_score", "Tool called");
        MetricsToolHandler::new(self.store.clone())
            .average_cms_hcc_risk_score()
            .await
    }

    #[tool(
        description = "Overall 30-day unplanned readmission rate, as a percentage of index admissions (readmissions.readmission_summary)."
    )]
    async fn get_overall_readmission_rate(&self) -> String {
        info!(tool = "get_overall_readmission_rate", "Tool called");
        MetricsToolHandler::new(self.store.clone())
            .overall_readmission_rate()
            .await
    }
}

#[tool_handler]
impl ServerHandler for OslerService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "osler-mcp".to_owned(),
                title: Some("Osler MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only analytical tools over a clinical claims and EHR database.\n\
                \n\
                ## Workflow\n\
                1. Call `get_database_schema` to list tables as schema.table\n\
                2. Call `get_table_info` on the tables you need to see columns and sample rows\n\
                3. Call `execute_query` with a single SELECT using schema-qualified table names\n\
                \n\
                ## Shortcuts\n\
                - `get_average_cms_hcc_risk_score` and `get_overall_readmission_rate` compute\n\
                  common metrics directly\n\
                \n\
                ## Security policy\n\
                Queries that write, stack statements, look like injection payloads or touch\n\
                credential-like identifiers are refused with the reason and suggestions."
                    .to_string(),
            ),
        }
    }
}
