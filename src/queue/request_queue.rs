//! Request Queue
//!
//! Runs fetch tasks under a concurrency cap and a minimum dispatch interval,
//! retrying retryable failures with exponential backoff behind a queue-wide
//! circuit breaker.
//!
//! # Task Lifecycle
//!
//! ```text
//!   add() ──▶ pending ──pump──▶ breaker gate ──▶ active ──▶ attempt ⇄ backoff
//!               │                    │                        │
//!             clear()            Rejected                  settle
//!               ▼                    ▼                        ▼
//!          QueueCleared          CircuitOpen       waiter (if generation current)
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::circuit_breaker::{Admission, BreakerStatus, CircuitBreaker};
use super::QueueConfig;
use crate::error::{Error, Result};

type Executor<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Options for [`RequestQueue::add`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Queue ahead of normal-priority tasks
    pub to_front: bool,
}

impl AddOptions {
    pub fn front() -> Self {
        Self { to_front: true }
    }
}

/// Snapshot returned by [`RequestQueue::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Keys currently executing, in dispatch order
    pub active_keys: Vec<String>,
    /// Keys waiting for a slot, in dispatch order
    pub queued_keys: Vec<String>,
    pub circuit_open: bool,
    pub breaker: BreakerStatus,
    pub consecutive_failures: u32,
    pub generation: u64,
}

struct QueuedTask<T> {
    id: Uuid,
    key: String,
    executor: Executor<T>,
    to_front: bool,
    enqueued_at: Instant,
    generation: u64,
    responder: oneshot::Sender<Result<T>>,
}

struct ActiveTask<T> {
    id: Uuid,
    key: String,
    generation: u64,
    /// Taken by `clear()` so a stale completion cannot reach the waiter
    responder: Option<oneshot::Sender<Result<T>>>,
}

struct QueueState<T> {
    pending: VecDeque<QueuedTask<T>>,
    active: Vec<ActiveTask<T>>,
    last_dispatch: Option<Instant>,
    wake_scheduled: bool,
    breaker: CircuitBreaker,
    generation: u64,
}

struct QueueInner<T> {
    config: QueueConfig,
    state: Mutex<QueueState<T>>,
}

/// What to do after an attempt settles
enum Step<T> {
    Done(Result<T>),
    Retry { delay: Duration, error: Error },
}

/// Rate-limited, retrying task queue
pub struct RequestQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    pub fn new(mut config: QueueConfig) -> Self {
        config.max_concurrent = config.max_concurrent.max(1);
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown);
        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: Vec::new(),
                    last_dispatch: None,
                    wake_scheduled: false,
                    breaker,
                    generation: 0,
                }),
            }),
        }
    }

    /// Enqueue a task and return a future for its final result.
    ///
    /// The task is queued before this returns, so a `clear()` issued right
    /// after `add()` rejects it. Must be called from within a tokio runtime.
    pub fn add<F, Fut>(
        &self,
        key: impl Into<String>,
        executor: F,
        options: AddOptions,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let key = key.into();
        {
            let mut state = self.inner.state.lock();
            let task = QueuedTask {
                id: Uuid::new_v4(),
                key: key.clone(),
                executor: Arc::new(move || executor().boxed()),
                to_front: options.to_front,
                enqueued_at: Instant::now(),
                generation: state.generation,
                responder: tx,
            };
            if options.to_front {
                let pos = state.pending.iter().take_while(|t| t.to_front).count();
                state.pending.insert(pos, task);
            } else {
                state.pending.push_back(task);
            }
            debug!(
                key = %key,
                to_front = options.to_front,
                queued = state.pending.len(),
                "Task enqueued"
            );
        }
        QueueInner::pump(&self.inner);

        async move { rx.await.unwrap_or(Err(Error::QueueCleared)) }
    }

    /// Reject every queued and in-flight waiter with `QueueCleared`.
    ///
    /// In-flight executions keep running until they settle but their results
    /// are discarded. Returns the number of waiters rejected.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.generation += 1;

        let mut rejected = 0;
        for task in state.pending.drain(..).collect::<Vec<_>>() {
            let _ = task.responder.send(Err(Error::QueueCleared));
            rejected += 1;
        }
        for active in state.active.iter_mut() {
            if let Some(tx) = active.responder.take() {
                let _ = tx.send(Err(Error::QueueCleared));
                rejected += 1;
            }
        }

        info!(generation = state.generation, rejected, "Request queue cleared");
        rejected
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            active_keys: state.active.iter().map(|t| t.key.clone()).collect(),
            queued_keys: state.pending.iter().map(|t| t.key.clone()).collect(),
            circuit_open: state.breaker.is_open(),
            breaker: state.breaker.status(),
            consecutive_failures: state.breaker.consecutive_failures(),
            generation: state.generation,
        }
    }

    /// Incremented by every `clear()`
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

impl<T: Send + 'static> QueueInner<T> {
    /// Dispatch as many queued tasks as slots, throttle, and breaker allow
    fn pump(self: &Arc<Self>) {
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            if state.breaker.rejects(now) && !state.pending.is_empty() {
                let rejected: Vec<_> = state.pending.drain(..).collect();
                debug!(count = rejected.len(), "Circuit open, failing queued tasks fast");
                for task in rejected {
                    let _ = task.responder.send(Err(Error::CircuitOpen { key: task.key }));
                }
                return;
            }
            if state.active.len() >= self.config.max_concurrent || state.pending.is_empty() {
                return;
            }

            if let Some(last) = state.last_dispatch {
                let ready_at = last + self.config.min_interval;
                if now < ready_at {
                    if !state.wake_scheduled {
                        state.wake_scheduled = true;
                        let inner = Arc::clone(self);
                        tokio::spawn(async move {
                            tokio::time::sleep_until(ready_at).await;
                            inner.state.lock().wake_scheduled = false;
                            inner.pump();
                        });
                    }
                    return;
                }
            }

            let Some(task) = state.pending.pop_front() else {
                return;
            };

            match state.breaker.admit(now) {
                Admission::Rejected => {
                    debug!(key = %task.key, "Circuit open, failing task fast");
                    let _ = task.responder.send(Err(Error::CircuitOpen { key: task.key }));
                    continue;
                }
                Admission::Trial => info!(key = %task.key, "Dispatching half-open trial"),
                Admission::Allowed => {}
            }

            state.last_dispatch = Some(now);
            state.active.push(ActiveTask {
                id: task.id,
                key: task.key.clone(),
                generation: task.generation,
                responder: Some(task.responder),
            });
            debug!(
                key = %task.key,
                task_id = %task.id,
                waited_ms = now.duration_since(task.enqueued_at).as_millis() as u64,
                "Dispatching task"
            );

            let inner = Arc::clone(self);
            tokio::spawn(inner.run(task.id, task.key, task.executor, task.generation));
        }
    }

    async fn run(self: Arc<Self>, id: Uuid, key: String, executor: Executor<T>, generation: u64) {
        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            let result = match timeout(self.config.task_timeout, executor()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    key: key.clone(),
                    timeout: self.config.task_timeout,
                }),
            };

            match self.settle_attempt(&key, attempt, generation, result) {
                Step::Done(result) => break result,
                Step::Retry { delay, error } => {
                    warn!(
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            if let Err(error) = self.readmit(&key, generation) {
                break Err(error);
            }
        };

        self.complete(id, outcome);
        self.pump();
    }

    /// Record the attempt with the breaker and decide whether to retry
    fn settle_attempt(
        &self,
        key: &str,
        attempt: u32,
        generation: u64,
        result: Result<T>,
    ) -> Step<T> {
        let mut state = self.state.lock();
        match &result {
            Ok(_) | Err(Error::NotFound { .. }) => state.breaker.record_success(),
            Err(e) if e.trips_breaker() => state.breaker.record_failure(Instant::now()),
            Err(_) => state.breaker.release_trial(),
        }

        let error = match result {
            Ok(value) => return Step::Done(Ok(value)),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt > self.config.max_retries {
            return Step::Done(Err(error));
        }
        if state.generation != generation {
            debug!(key = %key, "Queue cleared, abandoning retries");
            return Step::Done(Err(error));
        }
        if state.breaker.status() == BreakerStatus::Open {
            return Step::Done(Err(Error::CircuitOpen {
                key: key.to_string(),
            }));
        }

        Step::Retry {
            delay: self.config.backoff_delay(attempt),
            error,
        }
    }

    /// Ask again before a retry: the queue may have been cleared or the
    /// breaker tripped by another task during the backoff
    fn readmit(&self, key: &str, generation: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(key = %key, "Queue cleared during backoff, abandoning retries");
            return Err(Error::QueueCleared);
        }
        match state.breaker.admit(Instant::now()) {
            Admission::Rejected => {
                debug!(key = %key, "Circuit open after backoff, abandoning retries");
                Err(Error::CircuitOpen {
                    key: key.to_string(),
                })
            }
            Admission::Trial => {
                info!(key = %key, "Retrying as half-open trial");
                Ok(())
            }
            Admission::Allowed => Ok(()),
        }
    }

    fn complete(&self, id: Uuid, outcome: Result<T>) {
        let mut state = self.state.lock();
        let Some(pos) = state.active.iter().position(|t| t.id == id) else {
            return;
        };
        let task = state.active.remove(pos);

        if task.generation != state.generation {
            debug!(key = %task.key, "Discarding result from cleared generation");
            return;
        }
        if let Some(tx) = task.responder {
            let _ = tx.send(outcome);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    fn config() -> QueueConfig {
        QueueConfig {
            max_concurrent: 2,
            min_interval: Duration::ZERO,
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
            task_timeout: Duration::from_secs(10),
            breaker_threshold: 50,
            breaker_cooldown: Duration::from_secs(30),
        }
    }

    fn transport() -> Error {
        Error::Transport("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let queue: RequestQueue<u32> = RequestQueue::new(config());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                queue.add(
                    format!("year={}", 2020 + i),
                    move || {
                        let running = running.clone();
                        let peak = peak.clone();
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok(i)
                        }
                    },
                    AddOptions::default(),
                )
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        assert_eq!(results, vec![Ok(0), Ok(1), Ok(2), Ok(3), Ok(4)]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_throttles_dispatch() {
        let mut cfg = config();
        cfg.max_concurrent = 4;
        cfg.min_interval = Duration::from_millis(200);
        let queue: RequestQueue<Instant> = RequestQueue::new(cfg);

        let handles: Vec<_> = (0..3)
            .map(|i| {
                queue.add(format!("k{i}"), || async { Ok(Instant::now()) }, AddOptions::default())
            })
            .collect();
        let times: Vec<Instant> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(times[1].duration_since(times[0]) >= Duration::from_millis(200));
        assert!(times[2].duration_since(times[1]) >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_front_priority_is_fifo_among_equals() {
        let mut cfg = config();
        cfg.max_concurrent = 1;
        let queue: RequestQueue<()> = RequestQueue::new(cfg);
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |name: &'static str| {
            let order = order.clone();
            move || {
                let order = order.clone();
                async move {
                    order.lock().push(name);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                }
            }
        };

        let handles = vec![
            queue.add("blocker", record("blocker"), AddOptions::default()),
            queue.add("a", record("a"), AddOptions::default()),
            queue.add("b", record("b"), AddOptions::default()),
            queue.add("c", record("c"), AddOptions::front()),
            queue.add("d", record("d"), AddOptions::front()),
        ];
        assert_eq!(queue.stats().queued_keys, vec!["c", "d", "a", "b"]);
        assert_eq!(queue.stats().active_keys, vec!["blocker"]);

        futures::future::join_all(handles).await;
        assert_eq!(*order.lock(), vec!["blocker", "c", "d", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_then_success() {
        let queue: RequestQueue<&'static str> = RequestQueue::new(config());
        let attempts = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let counter = attempts.clone();
        let result = queue
            .add(
                "year=2023",
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(transport())
                        } else {
                            Ok("payload")
                        }
                    }
                },
                AddOptions::default(),
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 100ms before retry 1, 200ms before retry 2
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let mut cfg = config();
        cfg.max_retries = 2;
        let queue: RequestQueue<()> = RequestQueue::new(cfg);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = queue
            .add(
                "year=2023",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::HttpStatus { code: 503, key: "year=2023".into() }) }
                },
                AddOptions::default(),
            )
            .await;

        assert_matches!(result, Err(Error::HttpStatus { code: 503, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let queue: RequestQueue<()> = RequestQueue::new(config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = queue
            .add(
                "year=1800",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::NotFound { key: "year=1800".into() }) }
                },
                AddOptions::default(),
            )
            .await;

        assert_matches!(result, Err(Error::NotFound { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!queue.stats().circuit_open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable_and_does_not_block_queue() {
        let mut cfg = config();
        cfg.max_retries = 1;
        cfg.task_timeout = Duration::from_secs(1);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let slow = queue.add(
            "slow",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(1)
                }
            },
            AddOptions::default(),
        );
        let fast = queue.add("fast", || async { Ok(2) }, AddOptions::default());

        assert_eq!(fast.await, Ok(2));
        assert_matches!(slow.await, Err(Error::Timeout { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_fails_fast_then_admits_one_trial() {
        let mut cfg = config();
        cfg.max_retries = 0;
        cfg.breaker_threshold = 2;
        cfg.breaker_cooldown = Duration::from_secs(5);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let executions = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let result = queue
                .add("bad", || async { Err(transport()) }, AddOptions::default())
                .await;
            assert_matches!(result, Err(Error::Transport(_)));
        }
        assert!(queue.stats().circuit_open);

        let counter = executions.clone();
        let rejected = queue
            .add(
                "year=2023",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(1) }
                },
                AddOptions::default(),
            )
            .await;
        assert_matches!(rejected, Err(Error::CircuitOpen { .. }));
        assert_eq!(executions.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;

        let make = |executions: Arc<AtomicU32>| {
            move || {
                executions.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(7)
                }
            }
        };
        let trial = queue.add("trial", make(executions.clone()), AddOptions::default());
        let second = queue.add("second", make(executions.clone()), AddOptions::default());

        assert_matches!(second.await, Err(Error::CircuitOpen { .. }));
        assert_eq!(trial.await, Ok(7));
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        let stats = queue.stats();
        assert!(!stats.circuit_open);
        assert_eq!(stats.consecutive_failures, 0);

        let after = queue.add("after", make(executions.clone()), AddOptions::default());
        assert_eq!(after.await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_breaker() {
        let mut cfg = config();
        cfg.max_retries = 3;
        cfg.breaker_threshold = 1;
        cfg.breaker_cooldown = Duration::from_secs(5);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let attempts = Arc::new(AtomicU32::new(0));

        let first = queue.add("bad", || async { Err(transport()) }, AddOptions::default()).await;
        // The retry finds the breaker open and stops without consuming more attempts
        assert_matches!(first, Err(Error::CircuitOpen { .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let counter = attempts.clone();
        let trial = queue
            .add(
                "trial",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(transport()) }
                },
                AddOptions::default(),
            )
            .await;
        assert_matches!(trial, Err(Error::CircuitOpen { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().breaker, BreakerStatus::Open);

        let immediate = queue.add("next", || async { Ok(1) }, AddOptions::default()).await;
        assert_matches!(immediate, Err(Error::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_rejects_queued_and_in_flight_waiters() {
        let mut cfg = config();
        cfg.max_concurrent = 1;
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let finished = Arc::new(AtomicBool::new(false));
        let queued_ran = Arc::new(AtomicBool::new(false));

        let done = finished.clone();
        let running = queue.add(
            "running",
            move || {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    done.store(true, Ordering::SeqCst);
                    Ok(1)
                }
            },
            AddOptions::default(),
        );
        let ran = queued_ran.clone();
        let queued = queue.add(
            "queued",
            move || {
                ran.store(true, Ordering::SeqCst);
                async { Ok(2) }
            },
            AddOptions::default(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.stats().active_keys, vec!["running"]);

        assert_eq!(queue.clear(), 2);
        assert_eq!(queued.await, Err(Error::QueueCleared));
        assert_eq!(running.await, Err(Error::QueueCleared));
        assert_eq!(queue.generation(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(!queued_ran.load(Ordering::SeqCst));
        assert!(queue.stats().active_keys.is_empty());

        let fresh = queue.add("fresh", || async { Ok(3) }, AddOptions::default()).await;
        assert_eq!(fresh, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_tripped_during_backoff_stops_retry() {
        let mut cfg = config();
        cfg.backoff_base = Duration::from_secs(1);
        cfg.breaker_threshold = 2;
        cfg.breaker_cooldown = Duration::from_secs(30);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let flaky_runs = Arc::new(AtomicUsize::new(0));

        let runs = flaky_runs.clone();
        let flaky = queue.add(
            "flaky",
            move || {
                let first = runs.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        Err(transport())
                    } else {
                        Ok(1)
                    }
                }
            },
            AddOptions::default(),
        );
        let failing = queue.add(
            "failing",
            || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(transport())
            },
            AddOptions::default(),
        );

        assert_matches!(failing.await, Err(Error::CircuitOpen { .. }));
        assert_eq!(queue.stats().breaker, BreakerStatus::Open);

        assert_matches!(flaky.await, Err(Error::CircuitOpen { key }) if key == "flaky");
        assert_eq!(flaky_runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().breaker, BreakerStatus::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_cooldown_runs_as_single_trial() {
        let mut cfg = config();
        cfg.backoff_base = Duration::from_secs(10);
        cfg.backoff_max = Duration::from_secs(10);
        cfg.breaker_threshold = 2;
        cfg.breaker_cooldown = Duration::from_secs(5);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let start = Instant::now();
        let slow_runs = Arc::new(AtomicUsize::new(0));

        let runs = slow_runs.clone();
        let slow = queue.add(
            "slow",
            move || {
                let first = runs.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        return Err(transport());
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(1)
                }
            },
            AddOptions::default(),
        );
        let failing = queue.add(
            "failing",
            || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(transport())
            },
            AddOptions::default(),
        );
        assert_matches!(failing.await, Err(Error::CircuitOpen { .. }));

        // The retry wakes after the cooldown and holds the trial slot
        tokio::time::sleep_until(start + Duration::from_millis(10_050)).await;
        assert_eq!(queue.stats().breaker, BreakerStatus::HalfOpen);
        let blocked = queue.add("blocked", || async { Ok(3) }, AddOptions::default());
        assert_matches!(blocked.await, Err(Error::CircuitOpen { .. }));

        assert_eq!(slow.await, Ok(1));
        assert_eq!(slow_runs.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().breaker, BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_backoff_skips_further_attempts() {
        let mut cfg = config();
        cfg.backoff_base = Duration::from_secs(1);
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let waiter = queue.add(
            "failing",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(transport()) }
            },
            AddOptions::default(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.clear(), 1);
        assert_eq!(waiter.await, Err(Error::QueueCleared));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(queue.stats().active_keys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast_ahead_of_throttle() {
        let mut cfg = config();
        cfg.max_retries = 0;
        cfg.min_interval = Duration::from_secs(1);
        cfg.breaker_threshold = 1;
        let queue: RequestQueue<u8> = RequestQueue::new(cfg);

        let bad = queue.add("bad", || async { Err(transport()) }, AddOptions::default());
        assert_matches!(bad.await, Err(Error::Transport(_)));
        assert!(queue.stats().circuit_open);

        let started = Instant::now();
        let rejected = queue.add("next", || async { Ok(1) }, AddOptions::default()).await;
        assert_matches!(rejected, Err(Error::CircuitOpen { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(queue.stats().queued_keys.is_empty());
    }
}
