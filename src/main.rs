//! Osler MCP Server - Main entry point.
//!
//! Serves guarded read-only SQL tools over an analytical healthcare database
//! to MCP clients, on stdio or Streamable HTTP.

use clap::Parser;
use osler_mcp::auth::TokenValidator;
use osler_mcp::config::{ServerConfig, TransportMode};
use osler_mcp::db::SqliteStore;
use osler_mcp::logging::init_tracing;
use osler_mcp::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    // Stdio clients often treat stderr noise as failure, so logs are opt-in there.
    if config.enable_logs || config.transport == TransportMode::Http {
        init_tracing(&config.log_level, config.json_logs);
    }

    info!(
        transport = %config.transport,
        "Starting Osler MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let oauth2 = config.oauth2()?;
    if oauth2.is_enabled() {
        info!(
            issuer = %oauth2.issuer_url,
            jwks = %oauth2.jwks_url,
            "OAuth2 authentication enabled"
        );
    }
    let validator = TokenValidator::from_config(oauth2)?;

    let attachments = config.attachments()?;
    let store = Arc::new(
        SqliteStore::open(
            &config.database,
            &attachments,
            config.query_timeout_duration(),
        )
        .await?,
    );

    let result = match config.transport {
        TransportMode::Stdio => {
            if validator.is_enabled() {
                let token = config
                    .oauth2_token
                    .as_deref()
                    .ok_or("OSLER_OAUTH2_TOKEN is required for stdio when OAuth2 is enabled")?;
                validator
                    .validate(token, chrono::Utc::now().timestamp())
                    .await?;
                info!("Startup token accepted");
            }
            StdioTransport::new(store, config.max_rows).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                store,
                config.max_rows,
                validator,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
