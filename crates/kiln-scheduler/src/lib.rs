//! # Kiln Scheduler
//!
//! Request-serialized inference scheduling for a local language model.
//!
//! ## Overview
//!
//! A local model instance tolerates only a small, fixed number of
//! concurrent generations (often exactly one). This crate admits
//! concurrent chat requests against that budget: an ordered admission
//! queue with reject-on-full backpressure, N worker tasks that own all
//! model access, cooperative per-request cancellation and deadlines
//! checked at token boundaries, and response aggregation into either a
//! buffered reply or an ordered chunk stream.
//!
//! ## Design Principles
//!
//! - **Single owner**: only scheduler workers touch the model runtime
//! - **FIFO admission**: no starvation while the queue drains
//! - **Cooperative cancellation**: observed at token boundaries, never
//!   pre-empting mid-token; emitted output always stands
//! - **Per-entry failure**: one request's fault never affects another

pub mod aggregator;
pub mod handle;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod stream;

pub use aggregator::ResponseAggregator;
pub use handle::{RequestHandle, StreamEvent};
pub use queue::{QueueEntry, RequestQueue};
pub use runtime::{ModelRuntime, StubRuntime};
pub use scheduler::{InferenceScheduler, SchedulerStats};
pub use stream::TokenStream;
