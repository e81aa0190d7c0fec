//! Stdio transport for the MCP server.
//!
//! JSON-RPC frames arrive on stdin and leave on stdout, so nothing else may
//! write to stdout while this transport runs.

use crate::db::SqliteStore;
use crate::error::{StoreError, StoreResult};
use crate::mcp::OslerService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Stdio transport implementation.
pub struct StdioTransport {
    store: Arc<SqliteStore>,
    max_rows: usize,
}

impl StdioTransport {
    pub fn new(store: Arc<SqliteStore>, max_rows: usize) -> Self {
        Self { store, max_rows }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> StoreResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = OslerService::new(self.store.clone(), self.max_rows);
        let running_service = service.serve(stdio()).await.map_err(|e| {
            StoreError::internal(format!("Failed to start stdio transport: {}", e))
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "Stdio transport error");
                    return Err(StoreError::internal(format!("Stdio transport error: {}", e)));
                }
                info!("Stdio transport completed normally");
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing analytical store");
        self.store.close().await;

        if shutdown_requested {
            // A blocked stdin read cannot be cancelled from select!.
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
