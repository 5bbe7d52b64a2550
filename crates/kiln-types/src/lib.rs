//! # Kiln Types
//!
//! Shared data model for the kiln inference gateway: request and
//! response types, generation parameters, the error taxonomy, and
//! configuration for the scheduler and HTTP server.
//!
//! These types carry no behavior beyond construction, validation, and
//! state bookkeeping; the scheduling logic lives in `kiln-scheduler`.

pub mod config;
pub mod error;
pub mod ids;
pub mod params;
pub mod request;

pub use config::{SchedulerConfig, ServerConfig};
pub use error::{KilnError, Result};
pub use ids::RequestId;
pub use params::GenerationParams;
pub use request::{AggregatedResponse, ChatRequest, CompletionStatus, EntryState};
