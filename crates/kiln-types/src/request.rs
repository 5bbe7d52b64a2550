//! Request and response types for the scheduler core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{GenerationParams, KilnError, RequestId, Result};

/// One admitted chat request.
///
/// Immutable after creation. Owned by the queue until dequeued, then by
/// the scheduler worker that runs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Unique request identifier
    pub id: RequestId,
    /// Input prompt text
    pub prompt: String,
    /// Generation parameters
    pub params: GenerationParams,
    /// Admission timestamp
    pub submitted_at: DateTime<Utc>,
    /// Optional wall-clock deadline, measured from submission
    pub deadline: Option<DateTime<Utc>>,
}

impl ChatRequest {
    /// Create a new request with default generation parameters
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            prompt: prompt.into(),
            params: GenerationParams::default(),
            submitted_at: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline as a timeout relative to submission
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(delta) = chrono::Duration::from_std(timeout) {
            self.deadline = Some(self.submitted_at + delta);
        }
        self
    }

    /// Validate the request before admission
    pub fn validate(&self) -> Result<()> {
        if self.prompt.is_empty() {
            return Err(KilnError::invalid_request("prompt cannot be empty"));
        }
        self.params.validate()
    }
}

/// Lifecycle state of an admitted request.
///
/// Transitions are monotone and happen exactly once:
/// `Queued -> Running -> {Completed | Cancelled | Failed}`, with
/// `Queued -> Cancelled` allowed for requests cancelled before a worker
/// picks them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Waiting in the admission queue
    Queued,
    /// A worker is driving its generation
    Running,
    /// Generation ran to end-of-stream
    Completed,
    /// Cancelled by the client
    Cancelled,
    /// Terminated by a deadline or model fault
    Failed,
}

impl EntryState {
    /// Whether a transition to `next` is legal
    pub fn can_transition(self, next: EntryState) -> bool {
        use EntryState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Queued, Failed)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
        )
    }

    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::Completed | EntryState::Cancelled | EntryState::Failed
        )
    }
}

/// How a generation ended; the single terminal marker every response
/// stream carries exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Stream ran to end-of-stream
    Complete,
    /// Client cancelled; already-emitted output stands
    Cancelled,
    /// Deadline elapsed mid-stream
    DeadlineExceeded,
    /// Model runtime fault
    Failed,
}

impl CompletionStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, CompletionStatus::Complete)
    }

    /// The entry state this status resolves to
    pub fn entry_state(self) -> EntryState {
        match self {
            CompletionStatus::Complete => EntryState::Completed,
            CompletionStatus::Cancelled => EntryState::Cancelled,
            CompletionStatus::DeadlineExceeded | CompletionStatus::Failed => EntryState::Failed,
        }
    }
}

/// The client-visible reply assembled by the aggregator in buffered
/// mode. On cancellation or failure `text` holds whatever had been
/// generated up to that point; nothing is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// Request this reply corresponds to
    pub request_id: RequestId,
    /// Generated text (possibly a prefix, see `status`)
    pub text: String,
    /// Terminal marker
    pub status: CompletionStatus,
    /// Number of tokens in `text`
    pub completion_tokens: usize,
    /// Error detail for `Failed` / `DeadlineExceeded` outcomes
    pub error: Option<String>,
    /// Wall-clock latency from submission, in milliseconds
    pub latency_ms: u64,
}
