//! Error types for the period cache

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, caching, or serving periods.
///
/// The enum is `Clone` because a single in-flight fetch hands the same
/// outcome to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // =========================================================================
    // Upstream Errors
    // =========================================================================
    /// The period does not exist upstream
    #[error("Period not found upstream: {key}")]
    NotFound { key: String },

    /// Connection or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {code} for {key}")]
    HttpStatus { code: u16, key: String },

    /// Upstream payload could not be decoded or failed validation
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// A single attempt exceeded its deadline
    #[error("Fetch for {key} timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    /// The task was cancelled by an explicit clear
    #[error("Request queue was cleared")]
    QueueCleared,

    /// Fast-fail while the circuit breaker is open
    #[error("Circuit breaker open, refusing {key}")]
    CircuitOpen { key: String },

    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Period cannot be represented as a calendar year
    #[error("Invalid period: {0}")]
    InvalidPeriod(i32),

    /// Requested range is inverted
    #[error("Invalid range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the request queue should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::HttpStatus { .. } | Error::Timeout { .. }
        )
    }

    /// Whether this error counts against the circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        self.is_retryable() || matches!(self, Error::MalformedPayload(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
