mod health_handler;
mod mcp_handler;
mod sse_handler;

pub use health_handler::*;
pub use mcp_handler::*;
pub use sse_handler::*;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::mcp::MCPDatabaseServer;
use crate::utils::require_api_key;

/// Open SSE sessions: session id → sender feeding that session's stream.
pub type SessionRegistry = DashMap<Uuid, mpsc::Sender<String>>;

pub struct ServerState {
    pub server: MCPDatabaseServer,
    pub api_keys: Vec<String>,
    pub sessions: SessionRegistry,
}

impl ServerState {
    pub fn new(server: MCPDatabaseServer, api_keys: Vec<String>) -> Self {
        Self {
            server,
            api_keys,
            sessions: DashMap::new(),
        }
    }
}

/// All routes. Everything except `/health` sits behind the API-key check.
pub fn app_router(state: Arc<ServerState>) -> Router {
    let protected = Router::new()
        .route("/sse", get(sse_handler))
        .route("/messages", post(message_handler))
        .route(MESSAGES_PATH, post(message_handler))
        .route("/mcp", post(mcp_handler))
        .route("/mcp/initialize", post(initialize_handler))
        .route("/mcp/tools/list", post(tools_list_handler))
        .route("/mcp/tools/call", post(tools_call_handler))
        .route("/mcp/resources", get(resources_handler).post(resources_handler))
        .route("/mcp/debug", post(debug_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
