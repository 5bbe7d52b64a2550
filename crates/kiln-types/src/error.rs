//! Error taxonomy for the kiln gateway
//!
//! Every scheduler-internal failure attaches to a single request and is
//! reported only to that request's waiter. Nothing is retried inside
//! the core; retry is always a new top-level submission.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for kiln operations
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum KilnError {
    /// Queue is at its configured depth; the caller should retry later
    #[error("queue is full ({depth} pending requests)")]
    CapacityExceeded { depth: usize },

    /// Request deadline elapsed before generation completed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Request was cancelled by the client; a normal outcome, not a fault
    #[error("request cancelled")]
    Cancelled,

    /// Fault surfaced by the model runtime (opaque message)
    #[error("model error: {message}")]
    Model { message: String },

    /// Request rejected at validation
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal errors (should not happen in normal operation)
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, KilnError>;

impl KilnError {
    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for wire responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::Model { .. } => "model_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::InvalidRequest { .. } | Self::Cancelled
        )
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded | Self::Model { .. } | Self::Internal { .. }
        )
    }
}
