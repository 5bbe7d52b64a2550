//! Admission queue for pending chat requests

use chrono::Utc;
use kiln_types::{ChatRequest, EntryState, KilnError, RequestId, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

use crate::handle::{RequestHandle, StreamEvent};

/// The admitted, trackable unit of work wrapping one [`ChatRequest`].
///
/// Owned by the queue while `Queued`, then by exactly one scheduler
/// worker. The cancellation flag is shared with the scheduler so the
/// gateway can cancel a request that is already running.
#[derive(Debug)]
pub struct QueueEntry {
    pub request: ChatRequest,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) state: Arc<Mutex<EntryState>>,
    pub(crate) events: mpsc::Sender<StreamEvent>,
}

impl QueueEntry {
    /// Create an entry plus the waiter-side handle for it
    pub fn new(request: ChatRequest, channel_capacity: usize) -> (Self, RequestHandle) {
        let (events_tx, events_rx) = mpsc::channel(channel_capacity);
        let state = Arc::new(Mutex::new(EntryState::Queued));
        let handle = RequestHandle {
            id: request.id,
            submitted_at: request.submitted_at,
            state: Arc::clone(&state),
            events: events_rx,
        };
        let entry = Self {
            request,
            cancelled: Arc::new(AtomicBool::new(false)),
            state,
            events: events_tx,
        };
        (entry, handle)
    }

    pub fn id(&self) -> RequestId {
        self.request.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Advance the lifecycle state, enforcing monotone transitions
    pub(crate) fn advance(&self, next: EntryState) {
        let mut state = self.state.lock();
        if state.can_transition(next) {
            *state = next;
        } else {
            warn!(request_id = %self.request.id, from = ?*state, to = ?next,
                "ignoring illegal entry state transition");
        }
    }
}

/// Ordered admission structure holding pending requests.
///
/// FIFO with a hard depth limit: admission beyond the limit is rejected
/// synchronously rather than growing the queue or blocking the caller.
/// Safe for concurrent enqueue/dequeue/cancel; an entry is delivered to
/// at most one `dequeue` call.
#[derive(Debug)]
pub struct RequestQueue {
    pending: Mutex<VecDeque<QueueEntry>>,
    max_depth: usize,
    /// Wakes a worker after each successful enqueue
    pub(crate) notify: Notify,
}

impl RequestQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(max_depth)),
            max_depth,
            notify: Notify::new(),
        }
    }

    /// Append an entry to the tail.
    ///
    /// Fails with `CapacityExceeded` when the queue already holds
    /// `max_depth` entries; the queue is left untouched in that case.
    pub fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.max_depth {
                return Err(KilnError::CapacityExceeded {
                    depth: pending.len(),
                });
            }
            pending.push_back(entry);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the head entry; non-blocking poll semantics
    pub fn dequeue(&self) -> Option<QueueEntry> {
        self.pending.lock().pop_front()
    }

    /// Cancel a pending entry.
    ///
    /// If the request is still queued it is removed immediately and
    /// returned so the scheduler can resolve it `Cancelled`. Returns
    /// `None` when no queued entry matches (the request may already be
    /// running, finished, or unknown).
    pub fn cancel(&self, id: RequestId) -> Option<QueueEntry> {
        let mut pending = self.pending.lock();
        let pos = pending.iter().position(|entry| entry.id() == id)?;
        let entry = pending.remove(pos)?;
        entry.cancelled.store(true, Ordering::Release);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Resolve an entry with its terminal marker.
///
/// Sends exactly one `End` event and advances the entry state. Used by
/// the scheduler on every exit path; a closed receiver (waiter gone) is
/// not an error.
pub(crate) async fn resolve(
    entry: &QueueEntry,
    status: kiln_types::CompletionStatus,
    error: Option<KilnError>,
) {
    entry.advance(status.entry_state());
    let _ = entry
        .events
        .send(StreamEvent::End { status, error })
        .await;
    tracing::debug!(request_id = %entry.request.id, ?status,
        elapsed_ms = (Utc::now() - entry.request.submitted_at).num_milliseconds(),
        "request resolved");
}
