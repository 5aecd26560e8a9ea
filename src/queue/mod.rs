//! Request Queue
//!
//! Protects the remote source from bursts and repeated failures.
//!
//! - Concurrency cap and minimum inter-dispatch interval
//! - Exponential backoff retries for transport, status, and timeout errors
//! - Queue-wide circuit breaker with a single half-open trial
//! - Generation-tagged cancellation via `clear()`

mod circuit_breaker;
mod request_queue;

use std::time::Duration;

pub use circuit_breaker::{Admission, BreakerStatus, CircuitBreaker};
pub use request_queue::{AddOptions, QueueStats, RequestQueue};

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Tasks allowed to execute at once
    pub max_concurrent: usize,
    /// Minimum spacing between dispatches
    pub min_interval: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay
    pub backoff_max: Duration,
    /// Deadline for one attempt
    pub task_timeout: Duration,
    /// Consecutive failures that open the breaker
    pub breaker_threshold: u32,
    /// Time the breaker stays open before a trial
    pub breaker_cooldown: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval: Duration::from_millis(250),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            task_timeout: Duration::from_secs(15),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    /// Delay before retry number `retry` (1-based): base doubled per retry, capped
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}
