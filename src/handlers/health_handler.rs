use axum::{extract::State, Json};
use std::sync::Arc;

use crate::handlers::ServerState;
use crate::models::HealthStatus;

/// Liveness plus configuration presence. Never touches the database.
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy(
        !state.api_keys.is_empty(),
        state.server.is_configured(),
    ))
}
