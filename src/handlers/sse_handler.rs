use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::handlers::ServerState;
use crate::mcp::conversion::{decode_body, normalize};
use crate::mcp::MCPResponse;

pub const MESSAGES_PATH: &str = "/messages/";

const SESSION_CHANNEL_CAPACITY: usize = 32;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// Removes the session from the registry once the event stream is dropped
struct SessionGuard {
    session_id: Uuid,
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions.remove(&self.session_id);
        tracing::info!(session_id = %self.session_id, "SSE session closed");
    }
}

/// Open an MCP session. The first event tells the client where to POST its
/// messages; every response is then pushed as a `message` event.
pub async fn sse_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Register a new session
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<String>(SESSION_CHANNEL_CAPACITY);
    state.sessions.insert(session_id, tx);
    tracing::info!(%session_id, "SSE session opened");

    let guard = SessionGuard {
        session_id,
        state: state.clone(),
    };

    // Tell the client where to send its messages
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?session_id={}", MESSAGES_PATH, session_id.simple()));

    let messages = ReceiverStream::new(rx).map(move |message| {
        let _guard = &guard;
        Ok::<_, Infallible>(Event::default().event("message").data(message))
    });

    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub session_id: Option<String>,
}

/// Accept a JSON-RPC message for an open session. The response is delivered
/// on the session's event stream, not in this HTTP response.
pub async fn message_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    // Validate session id
    let Some(session_id) = query
        .session_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
    else {
        tracing::warn!("Message without a valid session_id");
        return (StatusCode::BAD_REQUEST, "Missing or invalid session_id").into_response();
    };

    let Some(sender) = state
        .sessions
        .get(&session_id)
        .map(|entry| entry.value().clone())
    else {
        tracing::warn!(%session_id, "Message for unknown session");
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    };

    // Parse JSON-RPC request
    let request = match decode_body(&body) {
        Ok(request) => request,
        Err((_, error)) => {
            tracing::warn!(%session_id, message = %error.message, "Could not parse message");
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };

    // Process in the background and push the response onto the stream
    let state = state.clone();
    tokio::spawn(async move {
        let id = request.id.clone();
        let response = match normalize(request, None) {
            Ok(call) => state.server.handle(call).await,
            Err(error) => Some(MCPResponse::failure(id, error)),
        };

        let Some(response) = response else {
            return;
        };

        match serde_json::to_string(&response) {
            Ok(payload) => {
                if sender.send(payload).await.is_err() {
                    tracing::warn!(%session_id, "SSE session closed before the response was delivered");
                }
            }
            Err(e) => tracing::error!(%session_id, error = %e, "Failed to encode MCP response"),
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
