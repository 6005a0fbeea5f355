use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::handlers::ServerState;
use crate::mcp::conversion::{decode_body, normalize, TOOLS_CALL};
use crate::mcp::{MCPDatabaseServer, MCPResponse};

// JSON-RPC responses are always HTTP 200, errors included
impl IntoResponse for MCPResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

// Handler for generic MCP requests
pub async fn mcp_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    dispatch(&state, &body, None).await
}

pub async fn initialize_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    dispatch(&state, &body, Some("initialize")).await
}

pub async fn tools_list_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    dispatch(&state, &body, Some("tools/list")).await
}

pub async fn tools_call_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    dispatch(&state, &body, Some(TOOLS_CALL)).await
}

pub async fn resources_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    dispatch(&state, &body, Some("resources/list")).await
}

/// Decode, dispatch and encode one HTTP request. Notifications get a bare 202.
async fn dispatch(state: &ServerState, body: &[u8], route_method: Option<&str>) -> Response {
    // Parse JSON-RPC request
    let request = match decode_body(body) {
        Ok(request) => request,
        Err((id, error)) => {
            tracing::warn!(code = error.code, message = %error.message, "Rejected MCP request body");
            return MCPResponse::failure(id, error).into_response();
        }
    };

    // A path-fixed method wins over the body
    let id = request.id.clone();
    let call = match normalize(request, route_method) {
        Ok(call) => call,
        Err(error) => return MCPResponse::failure(id, error).into_response(),
    };

    tracing::debug!(method = %call.method, "Handling MCP request");
    // Process based on the method
    match state.server.handle(call).await {
        Some(response) => response.into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Show how a request body would be decoded and routed, without running it.
pub async fn debug_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let (envelope, dispatch) = match decode_body(&body) {
        Ok(request) => {
            // Report the routing decision without dispatching
            let envelope = serde_json::to_value(&request).unwrap_or(Value::Null);
            let dispatch = match normalize(request, None) {
                Ok(call) => json!({
                    "id": call.id,
                    "method": call.method,
                    "params": call.params,
                    "known_method": MCPDatabaseServer::knows_method(&call.method),
                    "notification": call.method.starts_with("notifications/"),
                }),
                Err(error) => json!({ "error": error }),
            };
            (envelope, dispatch)
        }
        Err((_, error)) => (Value::Null, json!({ "error": error })),
    };

    Json(json!({
        "received": {
            "content_type": headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            "body": String::from_utf8_lossy(&body),
        },
        "envelope": envelope,
        "dispatch": dispatch,
        "config": {
            "api_keys_configured": !state.api_keys.is_empty(),
            "sql_connection_configured": state.server.is_configured(),
        },
    }))
}
