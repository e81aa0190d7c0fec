//! Tool execution against the MCP server.
//!
//! The benchmark talks to the real `OslerService` through an rmcp client
//! session. Both ends live in this process, joined by an in-memory duplex
//! stream, so the model sees exactly the tool surface an external MCP client
//! would see.

use crate::bench::schema::{JsonObject, ToolSchema};
use crate::db::SqliteStore;
use crate::error::{BenchError, ToolError};
use crate::mcp::OslerService;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, CallToolResult},
    service::RunningService,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Buffer size of the in-memory duplex pipe.
const DUPLEX_BUFFER: usize = 64 * 1024;

/// Runs one named tool with arguments and returns its text output.
///
/// Errors are returned as-is; deciding what a failure means is the caller's job.
pub trait ToolExecutor: Send + Sync {
    fn execute(
        &self,
        name: &str,
        arguments: &JsonObject,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// `ToolExecutor` backed by an rmcp client session.
pub struct McpToolExecutor {
    client: RunningService<RoleClient, ()>,
}

impl McpToolExecutor {
    /// Serve `OslerService` in-process and connect a client to it.
    pub async fn connect_in_process(
        store: Arc<SqliteStore>,
        max_rows: usize,
    ) -> Result<Self, BenchError> {
        let (server_io, client_io) = tokio::io::duplex(DUPLEX_BUFFER);

        let service = OslerService::new(store, max_rows);
        tokio::spawn(async move {
            match service.serve(server_io).await {
                Ok(running) => {
                    if let Err(e) = running.waiting().await {
                        warn!(error = %e, "In-process MCP server stopped with an error");
                    }
                }
                Err(e) => warn!(error = %e, "In-process MCP server failed to start"),
            }
        });

        let client = ().serve(client_io).await.map_err(BenchError::mcp)?;
        info!("Connected to in-process MCP server");
        Ok(Self { client })
    }

    /// Fetch the full tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolSchema>, BenchError> {
        let tools = self.client.list_all_tools().await.map_err(BenchError::mcp)?;
        let catalog = tools
            .iter()
            .map(|tool| serde_json::to_value(tool).and_then(serde_json::from_value))
            .collect::<Result<Vec<ToolSchema>, _>>()
            .map_err(BenchError::mcp)?;
        info!(count = catalog.len(), "Fetched tool catalog");
        Ok(catalog)
    }

    /// End the client session.
    pub async fn close(self) {
        if let Err(e) = self.client.cancel().await {
            warn!(error = %e, "MCP client did not shut down cleanly");
        }
    }
}

impl ToolExecutor for McpToolExecutor {
    async fn execute(&self, name: &str, arguments: &JsonObject) -> Result<String, ToolError> {
        let request: CallToolRequestParam =
            serde_json::from_value(json!({"name": name, "arguments": arguments}))
                .map_err(|e| ToolError::Transport(e.to_string()))?;

        debug!(tool = name, "Calling MCP tool");
        let result = self
            .client
            .call_tool(request)
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let text = result_text(&result);
        if result.is_error == Some(true) {
            return Err(ToolError::Reported(text));
        }
        Ok(text)
    }
}

/// Concatenate the text items of a tool result; fall back to structured content.
fn result_text(result: &CallToolResult) -> String {
    let parts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.as_str()))
        .collect();

    if parts.is_empty() {
        if let Some(structured) = &result.structured_content {
            return structured.to_string();
        }
    }
    parts.join("\n")
}
