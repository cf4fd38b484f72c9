//! Core system configuration parameters.
//!
//! Manages the properties shared by every running operation:
//! - Event log and subscriber queue sizing
//! - Cancellation polling and process termination timing

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Event bus configuration for the bounded log and per-subscriber queues.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct EventBusConfig {
    /// Number of events retained in the log before the oldest is evicted.
    #[serde(default = "default_log_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub log_capacity: usize,

    /// Capacity of each streaming subscriber's queue.
    #[serde(default = "default_subscriber_capacity")]
    #[validate(range(min = 1, max = 100_000))]
    pub subscriber_capacity: usize,

    /// Events replayed to a new subscriber before live forwarding.
    #[serde(default = "default_backfill")]
    #[validate(range(max = 100_000))]
    pub backfill: usize,

    /// Events returned by the log query route.
    #[serde(default = "default_log_tail")]
    #[validate(range(max = 1_000_000))]
    pub log_tail: usize,
}

fn default_log_capacity() -> usize {
    500
}

fn default_subscriber_capacity() -> usize {
    200
}

fn default_backfill() -> usize {
    50
}

fn default_log_tail() -> usize {
    200
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            backfill: default_backfill(),
            log_tail: default_log_tail(),
        }
    }
}

/// Orchestrator timing.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct OrchestratorConfig {
    /// Window between the graceful terminate signal and a force kill (milliseconds).
    #[serde(default = "default_grace_ms")]
    #[validate(range(min = 10, max = 60_000))]
    pub grace_ms: u64,

    /// How often a routine re-checks its cancellation flag (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10, max = 10_000))]
    pub poll_interval_ms: u64,

    /// Upper bound for short helper commands such as `iw` (seconds).
    #[serde(default = "default_command_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub command_timeout_secs: u64,
}

fn default_grace_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}
