//! Queue-wide circuit breaker.
//!
//! After `threshold` consecutive upstream failures the breaker opens and
//! refuses dispatch for a cooldown period. Once the cooldown has elapsed a
//! single trial task is admitted (half-open): its success closes the breaker,
//! its failure reopens it and restarts the cooldown.
//!
//! The breaker holds no lock of its own; it lives inside the queue state and
//! every transition happens under that mutex.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Current breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Normal operation
    Closed,
    /// Tripped; dispatch is refused until the cooldown expires
    Open,
    /// Cooldown expired; one trial task decides the next state
    HalfOpen,
}

/// Decision for a task about to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Admitted as the single half-open trial
    Trial,
    Rejected,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    status: BreakerStatus,
    consecutive_failures: u32,
    tripped_at: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
            tripped_at: None,
            threshold: threshold.max(1),
            cooldown,
            trial_in_flight: false,
        }
    }

    pub fn status(&self) -> BreakerStatus {
        self.status
    }

    /// True unless the breaker is fully closed
    pub fn is_open(&self) -> bool {
        self.status != BreakerStatus::Closed
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True if `admit(now)` would refuse, without claiming the trial slot
    pub fn rejects(&self, now: Instant) -> bool {
        match self.status {
            BreakerStatus::Closed => false,
            BreakerStatus::Open => !self.remaining_cooldown(now).is_zero(),
            BreakerStatus::HalfOpen => self.trial_in_flight,
        }
    }

    /// Decide whether a task may be dispatched at `now`
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.status {
            BreakerStatus::Closed => Admission::Allowed,
            BreakerStatus::Open => {
                let cooled = self
                    .tripped_at
                    .map_or(true, |at| now.duration_since(at) >= self.cooldown);
                if cooled {
                    info!("Circuit breaker half-open, admitting trial request");
                    self.status = BreakerStatus::HalfOpen;
                    self.trial_in_flight = true;
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
            BreakerStatus::HalfOpen => {
                if self.trial_in_flight {
                    Admission::Rejected
                } else {
                    self.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    /// Upstream answered; close the breaker and reset the counter
    pub fn record_success(&mut self) {
        if self.status != BreakerStatus::Closed {
            info!("Circuit breaker closed");
        }
        self.status = BreakerStatus::Closed;
        self.consecutive_failures = 0;
        self.trial_in_flight = false;
    }

    /// Upstream failed; trip once the threshold is reached or a trial fails
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.status {
            BreakerStatus::HalfOpen => self.trip(now),
            BreakerStatus::Closed if self.consecutive_failures >= self.threshold => self.trip(now),
            _ => {}
        }
    }

    /// Outcome said nothing about upstream health; free the trial slot
    pub fn release_trial(&mut self) {
        self.trial_in_flight = false;
    }

    /// Time left before a trial is admitted (zero unless open)
    pub fn remaining_cooldown(&self, now: Instant) -> Duration {
        match (self.status, self.tripped_at) {
            (BreakerStatus::Open, Some(at)) => self.cooldown.saturating_sub(now.duration_since(at)),
            _ => Duration::ZERO,
        }
    }

    fn trip(&mut self, now: Instant) {
        warn!(
            failures = self.consecutive_failures,
            cooldown_ms = self.cooldown.as_millis() as u64,
            "Circuit breaker opened"
        );
        self.status = BreakerStatus::Open;
        self.tripped_at = Some(now);
        self.trial_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(cb.admit(Instant::now()), Admission::Allowed);
        assert!(!cb.is_open());
    }

    #[test]
    fn trips_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));
        let now = Instant::now();
        cb.record_failure(now);
        cb.record_failure(now);
        assert_eq!(cb.admit(now), Admission::Allowed);
        cb.record_failure(now);
        assert_eq!(cb.status(), BreakerStatus::Open);
        assert_eq!(cb.admit(now), Admission::Rejected);
    }

    #[test]
    fn success_resets_counter() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));
        let now = Instant::now();
        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_success();
        cb.record_failure(now);
        assert_eq!(cb.consecutive_failures(), 1);
        assert_eq!(cb.status(), BreakerStatus::Closed);
    }

    #[test]
    fn admits_exactly_one_trial_after_cooldown() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let start = Instant::now();
        cb.record_failure(start);

        assert_eq!(cb.admit(start + Duration::from_secs(9)), Admission::Rejected);
        assert_eq!(
            cb.remaining_cooldown(start + Duration::from_secs(9)),
            Duration::from_secs(1)
        );

        let later = start + Duration::from_secs(10);
        assert_eq!(cb.admit(later), Admission::Trial);
        assert_eq!(cb.status(), BreakerStatus::HalfOpen);
        assert_eq!(cb.admit(later), Admission::Rejected);

        cb.record_success();
        assert_eq!(cb.admit(later), Admission::Allowed);
    }

    #[test]
    fn failed_trial_reopens_and_restarts_cooldown() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let start = Instant::now();
        cb.record_failure(start);

        let trial_at = start + Duration::from_secs(10);
        assert_eq!(cb.admit(trial_at), Admission::Trial);
        cb.record_failure(trial_at);

        assert_eq!(cb.status(), BreakerStatus::Open);
        assert_eq!(cb.admit(trial_at + Duration::from_secs(5)), Admission::Rejected);
        assert_eq!(cb.admit(trial_at + Duration::from_secs(10)), Admission::Trial);
    }

    #[test]
    fn released_trial_frees_the_trial_slot() {
        let mut cb = CircuitBreaker::new(1, Duration::ZERO);
        let now = Instant::now();
        cb.record_failure(now);
        assert_eq!(cb.admit(now), Admission::Trial);
        cb.release_trial();
        assert_eq!(cb.status(), BreakerStatus::HalfOpen);
        assert_eq!(cb.admit(now), Admission::Trial);
    }

    #[test]
    fn rejects_matches_admit_without_claiming_trial() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(!cb.rejects(start));

        cb.record_failure(start);
        assert!(cb.rejects(start + Duration::from_secs(9)));

        let later = start + Duration::from_secs(10);
        assert!(!cb.rejects(later));
        assert!(!cb.rejects(later));
        assert_eq!(cb.status(), BreakerStatus::Open);

        assert_eq!(cb.admit(later), Admission::Trial);
        assert!(cb.rejects(later));
    }
}
