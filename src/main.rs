use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use mcp_sqlserver::{app_router, AppConfig, MCPDatabaseServer, ServerState, SqlServerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize tracing for logs
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Read configuration from the environment
    let config = AppConfig::from_env()?;

    tracing::info!("Starting MCP SQL Server application");
    tracing::info!(
        api_keys_configured = config.api_keys_configured(),
        sql_connection_configured = config.sql.is_configured(),
        "Configuration loaded"
    );
    if !config.api_keys_configured() {
        tracing::warn!("API_KEYS is not set; API key checks are disabled");
    }

    // Create database service for MCP
    let db_service = SqlServerService::new(config.sql.clone());
    let server = MCPDatabaseServer::new(Arc::new(db_service));
    let state = Arc::new(ServerState::new(server, config.api_keys.clone()));

    // Build router with auth and tracing layers
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!("Listening on http://{}", config.bind_addr);
    tracing::info!("SSE endpoint available at http://{}/sse", config.bind_addr);
    tracing::info!("MCP endpoint available at http://{}/mcp", config.bind_addr);

    // Run it
    axum::serve(listener, app).await.context("HTTP server error")?;

    Ok(())
}
