//! Wire types for the chat gateway.

use kiln_types::{ChatRequest, CompletionStatus, GenerationParams, KilnError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatApiRequest {
    /// User message to respond to
    pub message: String,
    /// Cap on generated tokens; server default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Sequences that cut generation short
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// When true the reply is delivered as SSE instead of one JSON body
    #[serde(default)]
    pub stream: bool,
    /// Per-request deadline, measured from admission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ChatApiRequest {
    /// Map the wire request onto an internal one, filling unset knobs
    /// from the server defaults.
    pub fn into_chat_request(self, defaults: &GenerationParams) -> ChatRequest {
        let mut params = defaults.clone();
        if let Some(max_tokens) = self.max_tokens {
            params.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            params.temperature = temperature;
        }
        if let Some(stop) = self.stop {
            params.stop_sequences = stop;
        }

        let request = ChatRequest::new(self.message).with_params(params);
        match self.timeout_ms {
            Some(ms) => request.with_timeout(Duration::from_millis(ms)),
            None => request,
        }
    }
}

/// Token accounting reported back to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub completion_tokens: usize,
}

/// Body of a buffered `POST /chat` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub id: String,
    /// Generated text; partial when `status` is not `complete`
    pub reply: String,
    pub status: CompletionStatus,
    pub usage: Usage,
    pub latency_ms: u64,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    /// Stable machine-readable code, e.g. `capacity_exceeded`
    pub code: String,
}

impl ErrorBody {
    pub fn from_error(err: &KilnError) -> Self {
        Self {
            error: ErrorDetail {
                message: err.to_string(),
                code: err.code().to_string(),
            },
        }
    }
}

/// Payload of one SSE `data:` frame in streaming mode. A token frame
/// carries `delta`; the single terminal frame carries `status` and is
/// followed by a literal `[DONE]` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CompletionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatStreamChunk {
    pub fn token(id: &str, delta: String) -> Self {
        Self {
            id: id.to_string(),
            delta: Some(delta),
            status: None,
            error: None,
        }
    }

    pub fn terminal(id: &str, status: CompletionStatus, error: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            delta: None,
            status: Some(status),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_fall_back_to_defaults() {
        let defaults = GenerationParams::default();
        let api = ChatApiRequest {
            message: "hi".to_string(),
            max_tokens: Some(7),
            temperature: None,
            stop: None,
            stream: false,
            timeout_ms: None,
        };
        let request = api.into_chat_request(&defaults);
        assert_eq!(request.params.max_tokens, 7);
        assert_eq!(request.params.temperature, defaults.temperature);
        assert!(request.deadline.is_none());
    }

    #[test]
    fn timeout_becomes_a_deadline() {
        let api = ChatApiRequest {
            message: "hi".to_string(),
            max_tokens: None,
            temperature: None,
            stop: None,
            stream: false,
            timeout_ms: Some(250),
        };
        let request = api.into_chat_request(&GenerationParams::default());
        let deadline = request.deadline.unwrap();
        let remaining = deadline - request.submitted_at;
        assert!(remaining <= chrono::Duration::milliseconds(250));
        assert!(remaining > chrono::Duration::milliseconds(0));
    }

    #[test]
    fn minimal_request_body_parses() {
        let api: ChatApiRequest = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert_eq!(api.message, "hello");
        assert!(!api.stream);
        assert!(api.max_tokens.is_none());
    }

    #[test]
    fn error_body_carries_stable_code() {
        let body = ErrorBody::from_error(&KilnError::CapacityExceeded { depth: 4 });
        assert_eq!(body.error.code, "capacity_exceeded");
        assert!(body.error.message.contains("4"));
    }
}
