//! HTTP gateway in front of the kiln inference scheduler.
//!
//! One `POST /chat` endpoint with buffered and SSE streaming replies,
//! plus `/health` for liveness and scheduler stats.

pub mod routes;
pub mod types;

pub use routes::{build_router, AppState, ServerError};
pub use types::{ChatApiRequest, ChatApiResponse, ChatStreamChunk, ErrorBody, Usage};
