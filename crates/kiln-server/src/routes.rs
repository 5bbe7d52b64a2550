//! HTTP routes for the chat gateway.
//!
//! `POST /chat` submits a request to the scheduler and returns either a
//! buffered JSON reply or an SSE stream of token deltas. A buffered
//! generation cut short with partial output returns that prefix with
//! its status rather than an HTTP error, so no generated output is
//! thrown away; a deadline that produced nothing at all is a 504.

use crate::types::{ChatApiRequest, ChatApiResponse, ChatStreamChunk, ErrorBody, Usage};
use axum::{
    extract::State,
    http::StatusCode,
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use kiln_scheduler::{InferenceScheduler, ResponseAggregator, StreamEvent};
use kiln_types::{CompletionStatus, GenerationParams, KilnError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<InferenceScheduler>,
    pub defaults: GenerationParams,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(api_request): Json<ChatApiRequest>,
) -> Result<Response, ServerError> {
    let streaming = api_request.stream;
    let request = api_request.into_chat_request(&state.defaults);
    let id = request.id;
    info!(request_id = %id, streaming, "chat request received");

    let handle = state.scheduler.submit(request).map_err(ServerError)?;

    if streaming {
        Ok(stream_reply(state, handle).await)
    } else {
        buffered_reply(handle).await
    }
}

/// Wait for the whole generation and reply with one JSON body.
async fn buffered_reply(handle: kiln_scheduler::RequestHandle) -> Result<Response, ServerError> {
    let response = ResponseAggregator::buffer(handle).await;
    debug!(request_id = %response.request_id, status = ?response.status, "chat request finished");

    match response.status {
        CompletionStatus::Failed => {
            let err = match response.error {
                Some(message) => KilnError::model(message),
                None => KilnError::internal("generation failed"),
            };
            Err(ServerError(err))
        }
        // A deadline that produced nothing is a gateway timeout; with
        // partial output the prefix is returned with its status.
        CompletionStatus::DeadlineExceeded if response.text.is_empty() => {
            Err(ServerError(KilnError::DeadlineExceeded))
        }
        status => Ok(Json(ChatApiResponse {
            id: response.request_id.to_string(),
            reply: response.text,
            status,
            usage: Usage {
                completion_tokens: response.completion_tokens,
            },
            latency_ms: response.latency_ms,
        })
        .into_response()),
    }
}

/// Forward the token stream as SSE. The terminal frame carries the
/// completion status and is followed by a `[DONE]` frame. A client
/// that disconnects mid-stream gets its generation cancelled so the
/// execution slot frees up.
async fn stream_reply(state: AppState, handle: kiln_scheduler::RequestHandle) -> Response {
    let id = handle.id();
    let id_text = id.to_string();
    let (tx, rx) = mpsc::channel::<Result<Event, axum::Error>>(32);

    let scheduler = Arc::clone(&state.scheduler);
    tokio::spawn(async move {
        let mut events = std::pin::pin!(ResponseAggregator::stream(handle));
        while let Some(event) = events.next().await {
            let chunk = match event {
                StreamEvent::Token(delta) => ChatStreamChunk::token(&id_text, delta),
                StreamEvent::End { status, error } => {
                    ChatStreamChunk::terminal(&id_text, status, error.map(|e| e.to_string()))
                }
            };
            let is_terminal = chunk.status.is_some();

            let frame = Event::default()
                .json_data(&chunk)
                .unwrap_or_else(|_| Event::default().data("{}"));
            if tx.send(Ok(frame)).await.is_err() {
                // Client hung up; release the slot.
                warn!(request_id = %id, "sse client disconnected, cancelling");
                scheduler.cancel(id).await;
                return;
            }
            if is_terminal {
                let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
                return;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let stats = state.scheduler.stats();
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": uptime,
        "scheduler": stats,
    }))
    .into_response()
}

async fn root_handler() -> Response {
    Json(serde_json::json!({
        "name": "kiln",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/chat", "/health"],
    }))
    .into_response()
}

/// Maps scheduler errors onto HTTP statuses.
#[derive(Debug)]
pub struct ServerError(pub KilnError);

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            KilnError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            KilnError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            KilnError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            KilnError::Cancelled => StatusCode::CONFLICT,
            KilnError::Model { .. } | KilnError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_match_taxonomy() {
        let cases = [
            (KilnError::CapacityExceeded { depth: 2 }, StatusCode::TOO_MANY_REQUESTS),
            (KilnError::invalid_request("empty"), StatusCode::BAD_REQUEST),
            (KilnError::DeadlineExceeded, StatusCode::GATEWAY_TIMEOUT),
            (KilnError::model("boom"), StatusCode::INTERNAL_SERVER_ERROR),
            (KilnError::internal("oops"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ServerError(err).status_code(), expected);
        }
    }
}
