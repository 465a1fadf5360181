//! Circuit breaker guarding each venue adapter.
//!
//! Prevents cascading failures when a venue becomes unavailable or
//! unresponsive.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (failure_threshold consecutive failures in window)
//! OPEN → HALF_OPEN (reset_timeout elapsed; one probe admitted)
//! HALF_OPEN → CLOSED (probe succeeds)
//! HALF_OPEN → OPEN (probe fails)
//! ```
//!
//! While OPEN, callers must fail fast without invoking the venue; the
//! guard layer translates that into a non-retryable `SYSTEM` error.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the venue.
    Open,
    /// One probe call is admitted to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures within the monitoring window that open the
    /// circuit.
    pub failure_threshold: u32,
    /// Duration to stay OPEN before admitting a probe.
    pub reset_timeout: Duration,
    /// Window within which failures are counted.
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    /// Timestamps of consecutive failures, pruned to the monitoring window.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Set while the single HALF_OPEN probe is outstanding.
    probe_admitted: bool,
    total_calls: u64,
    total_failures: u64,
    state_transitions: u64,
}

/// Circuit breaker for a single external venue.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new breaker in the CLOSED state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_admitted: false,
                total_calls: 0,
                total_failures: 0,
                state_transitions: 0,
            }),
        }
    }

    /// The guarded service's name, for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the OPEN → HALF_OPEN timer transition.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        let mut inner = self.inner.lock();
        self.maybe_enter_half_open(&mut inner);
        inner.state
    }

    /// Whether a call may proceed right now.
    ///
    /// In HALF_OPEN this admits exactly one probe; further callers are
    /// rejected until the probe's outcome is recorded.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_enter_half_open(&mut inner);

        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => false,
            CircuitBreakerState::HalfOpen => {
                if inner.probe_admitted {
                    false
                } else {
                    inner.probe_admitted = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        match inner.state {
            CircuitBreakerState::Closed => {
                // A success breaks the consecutive-failure run.
                inner.failures.clear();
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(&mut inner, CircuitBreakerState::Closed);
            }
            CircuitBreakerState::Open => {
                tracing::warn!(name = %self.name, "call outcome recorded while OPEN");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;

        match inner.state {
            CircuitBreakerState::Closed => {
                let now = Instant::now();
                inner.failures.push_back(now);
                let window = self.config.monitoring_period;
                while inner
                    .failures
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > window)
                {
                    inner.failures.pop_front();
                }

                if inner.failures.len() >= self.config.failure_threshold as usize {
                    self.transition(&mut inner, CircuitBreakerState::Open);
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(&mut inner, CircuitBreakerState::Open);
            }
            CircuitBreakerState::Open => {
                tracing::warn!(name = %self.name, "call outcome recorded while OPEN");
            }
        }
    }

    /// Force OPEN (tests and emergency stops).
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitBreakerState::Open);
    }

    /// Force CLOSED (tests and manual recovery).
    pub fn force_close(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitBreakerState::Closed);
    }

    /// Snapshot of counters for operator surfaces.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        self.maybe_enter_half_open(&mut inner);
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            recent_failures: inner.failures.len() as u64,
            state_transitions: inner.state_transitions,
        }
    }

    fn maybe_enter_half_open(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitBreakerState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.reset_timeout)
        {
            self.transition(inner, CircuitBreakerState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.state_transitions += 1;

        match to {
            CircuitBreakerState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.probe_admitted = false;
                tracing::warn!(name = %self.name, %from, to = %to, "circuit breaker opened");
            }
            CircuitBreakerState::HalfOpen => {
                inner.probe_admitted = false;
                tracing::info!(name = %self.name, %from, to = %to, "circuit breaker probing");
            }
            CircuitBreakerState::Closed => {
                inner.failures.clear();
                inner.opened_at = None;
                inner.probe_admitted = false;
                tracing::info!(name = %self.name, %from, to = %to, "circuit breaker closed");
            }
        }
    }
}

/// Counters exposed by a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Guarded service name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Total recorded calls.
    pub total_calls: u64,
    /// Total recorded failures.
    pub total_failures: u64,
    /// Failures currently inside the monitoring window.
    pub recent_failures: u64,
    /// Number of state transitions so far.
    pub state_transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(20),
            monitoring_period: Duration::from_secs(120),
        }
    }

    #[test]
    fn default_config_matches_contract() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.monitoring_period, Duration::from_secs(120));
    }

    #[test]
    fn starts_closed_and_permits_calls() {
        let breaker = CircuitBreaker::new("orca", CircuitBreakerConfig::default());
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert!(breaker.is_call_permitted());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("orca", fast_config());

        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        }
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let breaker = CircuitBreaker::new("orca", fast_config());

        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure();
        }

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn open_admits_single_probe_after_reset_timeout() {
        let breaker = CircuitBreaker::new("orca", fast_config());
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert!(!breaker.is_call_permitted());

        std::thread::sleep(Duration::from_millis(30));

        // First caller is the probe; a second concurrent caller is held off.
        assert!(breaker.is_call_permitted());
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn successful_probe_closes_the_breaker() {
        let breaker = CircuitBreaker::new("orca", fast_config());
        for _ in 0..5 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.is_call_permitted());

        breaker.record_success();

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert!(breaker.is_call_permitted());
    }

    #[test]
    fn failing_probe_reopens_the_breaker() {
        let breaker = CircuitBreaker::new("orca", fast_config());
        for _ in 0..5 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.is_call_permitted());

        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn stale_failures_outside_window_are_pruned() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_millis(10),
        };
        let breaker = CircuitBreaker::new("orca", config);

        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        breaker.record_failure();

        // Two stale failures were pruned before the count was evaluated.
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn force_open_and_close() {
        let breaker = CircuitBreaker::new("orca", CircuitBreakerConfig::default());

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn metrics_track_counts() {
        let breaker = CircuitBreaker::new("raydium", CircuitBreakerConfig::default());
        breaker.record_success();
        breaker.record_failure();
        breaker.record_success();

        let metrics = breaker.metrics();
        assert_eq!(metrics.name, "raydium");
        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.recent_failures, 0);
    }
}
