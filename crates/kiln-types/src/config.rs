//! Configuration types for kiln components

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{KilnError, Result};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Model concurrency limit N (number of execution slots; usually 1
    /// for a single local model instance)
    pub concurrency: usize,
    /// Maximum number of pending requests before admission rejects
    pub max_queue_depth: usize,
    /// Default per-request timeout applied when the request carries no
    /// deadline of its own; `None` means no timeout
    pub default_timeout: Option<Duration>,
    /// Capacity of each per-request token channel
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_queue_depth: 32,
            default_timeout: Some(Duration::from_secs(120)),
            channel_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(KilnError::invalid_request("concurrency must be at least 1"));
        }
        if self.max_queue_depth == 0 {
            return Err(KilnError::invalid_request(
                "max_queue_depth must be at least 1",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(KilnError::invalid_request(
                "channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
