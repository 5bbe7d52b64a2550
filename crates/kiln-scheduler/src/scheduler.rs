//! Request-serialized inference scheduler
//!
//! The scheduler is the sole owner of the model runtime. N fixed worker
//! tasks (N = the model's safe concurrency, often exactly 1) pull
//! admitted requests off the queue in FIFO order and drive each
//! generation to completion, cancellation, or failure. All model access
//! goes through a worker; no other component may call the runtime.

use chrono::Utc;
use kiln_types::{
    ChatRequest, CompletionStatus, EntryState, KilnError, RequestId, Result, SchedulerConfig,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::handle::{RequestHandle, StreamEvent};
use crate::queue::{resolve, QueueEntry, RequestQueue};
use crate::runtime::ModelRuntime;

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    /// Entries waiting in the admission queue
    pub queued: usize,
    /// Entries currently holding an execution slot
    pub running: usize,
    /// Requests that ran to end-of-stream
    pub completed: u64,
    /// Requests cancelled by the client
    pub cancelled: u64,
    /// Requests that ended in a deadline or model fault
    pub failed: u64,
}

/// The single serialization point for model access.
pub struct InferenceScheduler {
    config: SchedulerConfig,
    runtime: Arc<dyn ModelRuntime>,
    queue: RequestQueue,
    /// Cancellation flags of every live entry, registered at admission
    /// and dropped at resolution, so a cancel can always reach an
    /// unresolved request even while a worker is picking it up.
    flags: Mutex<HashMap<RequestId, Arc<AtomicBool>>>,
    running: AtomicUsize,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    accepting: AtomicBool,
    shutdown_notify: Notify,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InferenceScheduler {
    /// Create the scheduler and spawn its worker tasks.
    ///
    /// The runtime is injected once and exclusively owned from here on;
    /// call [`shutdown`](Self::shutdown) to stop the workers and tear
    /// it down.
    pub fn spawn(config: SchedulerConfig, runtime: Arc<dyn ModelRuntime>) -> Result<Arc<Self>> {
        config.validate()?;
        info!(
            concurrency = config.concurrency,
            max_queue_depth = config.max_queue_depth,
            "starting inference scheduler"
        );

        let scheduler = Arc::new(Self {
            queue: RequestQueue::new(config.max_queue_depth),
            runtime,
            flags: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
            workers: Mutex::new(Vec::new()),
            config,
        });

        let mut workers = scheduler.workers.lock();
        for worker_id in 0..scheduler.config.concurrency {
            let scheduler = Arc::clone(&scheduler);
            workers.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id).await;
            }));
        }
        drop(workers);

        Ok(scheduler)
    }

    /// Admit a request.
    ///
    /// Validates it, stamps the default deadline when the request
    /// carries none, and appends it to the queue. Fails synchronously
    /// with `CapacityExceeded` when the queue is at depth; the caller
    /// should retry later. The returned handle is the only way to
    /// observe the request's output.
    pub fn submit(&self, mut request: ChatRequest) -> Result<RequestHandle> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(KilnError::internal("scheduler is shut down"));
        }
        request.validate()?;

        if request.deadline.is_none() {
            if let Some(timeout) = self.config.default_timeout {
                request = request.with_timeout(timeout);
            }
        }

        let id = request.id;
        let (entry, handle) = QueueEntry::new(request, self.config.channel_capacity);
        self.flags.lock().insert(id, Arc::clone(&entry.cancelled));
        match self.queue.enqueue(entry) {
            Ok(()) => {
                debug!(request_id = %id, position = self.queue.len(), "request queued");
                Ok(handle)
            }
            Err(err) => {
                self.flags.lock().remove(&id);
                warn!(request_id = %id, "queue full, rejecting request");
                Err(err)
            }
        }
    }

    /// Cancel a request by id.
    ///
    /// A queued request is removed immediately and resolved
    /// `Cancelled`. Any other live request has its flag set; the worker
    /// observes it at the next token boundary and stops generating,
    /// leaving already-emitted output intact. The flag is registered at
    /// admission, so a request a worker is in the middle of picking up
    /// is still reachable. Returns `false` only when the id is unknown
    /// or already resolved.
    pub async fn cancel(&self, id: RequestId) -> bool {
        if let Some(entry) = self.queue.cancel(id) {
            self.flags.lock().remove(&id);
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            resolve(&entry, CompletionStatus::Cancelled, None).await;
            debug!(request_id = %id, "cancelled while queued");
            return true;
        }
        if let Some(flag) = self.flags.lock().get(&id) {
            flag.store(true, Ordering::Release);
            debug!(request_id = %id, "cancellation flagged");
            return true;
        }
        false
    }

    /// Counter snapshot for health reporting
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.queue.len(),
            running: self.running.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting, wake the workers, and wait for them to finish
    /// their current entries. Requests still queued at shutdown are
    /// never started.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!("shutting down inference scheduler");
        }
        self.shutdown_notify.notify_waiters();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
        // Resolve whatever was still queued so no waiter hangs.
        while let Some(entry) = self.queue.dequeue() {
            self.flags.lock().remove(&entry.id());
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            resolve(&entry, CompletionStatus::Cancelled, None).await;
        }
        info!("inference scheduler stopped");
    }

    async fn worker_loop(&self, worker_id: usize) {
        debug!(worker_id, "worker started");
        loop {
            if !self.accepting.load(Ordering::Acquire) {
                break;
            }
            match self.queue.dequeue() {
                Some(entry) => self.process_entry(worker_id, entry).await,
                None => {
                    let queued = self.queue.notify.notified();
                    let shutdown = self.shutdown_notify.notified();
                    tokio::pin!(queued, shutdown);
                    // Register both waiters before re-checking, so a
                    // notification landing after the failed dequeue is
                    // not lost.
                    queued.as_mut().enable();
                    shutdown.as_mut().enable();
                    if !self.accepting.load(Ordering::Acquire) {
                        break;
                    }
                    if !self.queue.is_empty() {
                        continue;
                    }
                    tokio::select! {
                        _ = &mut queued => {}
                        _ = &mut shutdown => break,
                    }
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    /// Run one entry to a terminal state. The worker itself is the
    /// execution slot: it handles entries strictly one at a time, so
    /// at most `concurrency` generations are ever in flight.
    async fn process_entry(&self, worker_id: usize, entry: QueueEntry) {
        let id = entry.id();

        // Cancelled between dequeue and here; the flag wins.
        if entry.is_cancelled() {
            self.flags.lock().remove(&id);
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            resolve(&entry, CompletionStatus::Cancelled, None).await;
            return;
        }

        // Deadline may already have elapsed while queued.
        let remaining = match entry.request.deadline {
            Some(deadline) => match (deadline - Utc::now()).to_std() {
                Ok(remaining) => Some(remaining),
                Err(_) => {
                    self.flags.lock().remove(&id);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    resolve(
                        &entry,
                        CompletionStatus::DeadlineExceeded,
                        Some(KilnError::DeadlineExceeded),
                    )
                    .await;
                    return;
                }
            },
            None => None,
        };

        entry.advance(EntryState::Running);
        self.running.fetch_add(1, Ordering::Relaxed);
        debug!(worker_id, request_id = %id, "generation started");

        let (status, error) = self.drive_generation(&entry, remaining).await;

        self.running.fetch_sub(1, Ordering::Relaxed);
        self.flags.lock().remove(&id);
        match status {
            CompletionStatus::Complete => self.completed.fetch_add(1, Ordering::Relaxed),
            CompletionStatus::Cancelled => self.cancelled.fetch_add(1, Ordering::Relaxed),
            CompletionStatus::DeadlineExceeded | CompletionStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed)
            }
        };
        resolve(&entry, status, error).await;
    }

    /// Pull tokens from the model and forward them to the waiter,
    /// checking cancellation and the deadline at every token boundary.
    /// Cancellation is cooperative: it never pre-empts mid-token, and
    /// tokens already forwarded are never retracted.
    async fn drive_generation(
        &self,
        entry: &QueueEntry,
        remaining: Option<Duration>,
    ) -> (CompletionStatus, Option<KilnError>) {
        let mut stream = match self
            .runtime
            .generate(&entry.request.prompt, &entry.request.params)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!(request_id = %entry.request.id, error = %err, "model rejected request");
                return (CompletionStatus::Failed, Some(err));
            }
        };

        let timeout_at = remaining.map(|r| tokio::time::Instant::now() + r);

        loop {
            if entry.is_cancelled() {
                return (CompletionStatus::Cancelled, None);
            }

            let next = match timeout_at {
                Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        return (
                            CompletionStatus::DeadlineExceeded,
                            Some(KilnError::DeadlineExceeded),
                        )
                    }
                },
                None => stream.next().await,
            };

            match next {
                Some(Ok(token)) => {
                    if entry.events.send(StreamEvent::Token(token)).await.is_err() {
                        // The waiter is gone; stop generating.
                        return (CompletionStatus::Cancelled, None);
                    }
                }
                Some(Err(err)) => {
                    warn!(request_id = %entry.request.id, error = %err, "generation failed");
                    return (CompletionStatus::Failed, Some(err));
                }
                None => return (CompletionStatus::Complete, None),
            }
        }
    }
}

impl std::fmt::Debug for InferenceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceScheduler")
            .field("concurrency", &self.config.concurrency)
            .field("queued", &self.queue.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}
