//! Client-side handle for a submitted request

use chrono::{DateTime, Utc};
use kiln_types::{CompletionStatus, EntryState, KilnError, RequestId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One event on a request's response channel.
///
/// A well-formed event sequence is zero or more `Token`s followed by
/// exactly one `End`; the scheduler guarantees the terminal marker is
/// sent once per request on every exit path.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One generated token, in arrival order
    Token(String),
    /// Terminal marker
    End {
        status: CompletionStatus,
        error: Option<KilnError>,
    },
}

/// The waiter side of an admitted request.
///
/// Returned by `InferenceScheduler::submit`; consumed by the
/// [`ResponseAggregator`](crate::ResponseAggregator) in either buffered
/// or streaming mode. Dropping the handle tells the scheduler nobody is
/// listening, which cancels the generation at the next token boundary.
#[derive(Debug)]
pub struct RequestHandle {
    pub(crate) id: RequestId,
    pub(crate) submitted_at: DateTime<Utc>,
    pub(crate) state: Arc<Mutex<EntryState>>,
    pub(crate) events: mpsc::Receiver<StreamEvent>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Current lifecycle state of the request
    pub fn state(&self) -> EntryState {
        *self.state.lock()
    }

    /// Receive the next event; `None` only if the scheduler dropped the
    /// entry without a terminal marker, which the aggregator reports as
    /// an internal failure.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}
