use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use strum::Display;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures while closed before tripping open
    pub failure_threshold: u32,
    /// Consecutive successes while half-open before closing
    pub success_threshold: u32,
    /// How long to stay open before allowing probes
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    total_short_circuits: u64,
    last_transition: SystemTime,
}

/// Counters and state snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_short_circuits: u64,
    /// Unix millis of the last state transition
    pub last_transition_ms: u64,
}

/// Stateful guard around the selector calls.
///
/// Transitions:
/// closed -> open after `failure_threshold` consecutive failures,
/// open -> half-open once `reset_timeout` elapsed,
/// half-open -> closed after `success_threshold` consecutive
/// successes, half-open -> open on any failure.
///
/// All transitions happen under one small mutex with short critical
/// sections, callers never hold it across io.
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig) -> Self {
        CircuitBreaker {
            cfg,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                total_successes: 0,
                total_failures: 0,
                total_short_circuits: 0,
                last_transition: SystemTime::now(),
            }),
        }
    }

    fn transition(inner: &mut Inner, to: CircuitState) {
        inner.state = to;
        inner.last_transition = SystemTime::now();
    }

    /// Whether a call may proceed. False means short-circuit, the
    /// caller must fail open without touching the network
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);

                if elapsed >= self.cfg.reset_timeout {
                    Self::transition(&mut inner, CircuitState::HalfOpen);
                    inner.consecutive_successes = 0;
                    info!("Circuit breaker half-open, probing");
                    true
                } else {
                    inner.total_short_circuits += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        inner.total_successes += 1;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;

            if inner.consecutive_successes >= self.cfg.success_threshold {
                Self::transition(&mut inner, CircuitState::Closed);
                inner.opened_at = None;
                info!("Circuit breaker closed");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        inner.total_failures += 1;
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        let should_trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.cfg.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_trip {
            Self::transition(&mut inner, CircuitState::Open);
            inner.opened_at = Some(Instant::now());
            warn!(
                "Circuit breaker open after {} consecutive failures",
                inner.consecutive_failures
            );
        }
    }

    /// Admin override, trips the breaker open immediately
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();

        Self::transition(&mut inner, CircuitState::Open);
        inner.opened_at = Some(Instant::now());
    }

    /// Admin override, returns to closed and clears streaks
    pub fn reset(&self) {
        let mut inner = self.inner.lock();

        Self::transition(&mut inner, CircuitState::Closed);
        inner.opened_at = None;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();

        BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_short_circuits: inner.total_short_circuits,
            last_transition_ms: inner
                .last_transition
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout,
        })
    }

    #[test]
    fn test_trips_open_after_consecutive_failures() {
        let breaker = breaker(Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = breaker(Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout_then_closes() {
        let breaker = breaker(Duration::ZERO);

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // zero reset timeout, first acquire flips to half-open
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = breaker(Duration::ZERO);

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_short_circuits_counted() {
        let breaker = breaker(Duration::from_secs(60));

        breaker.force_open();
        assert!(!breaker.try_acquire());
        assert!(!breaker.try_acquire());

        assert_eq!(breaker.stats().total_short_circuits, 2);
    }

    #[test]
    fn test_admin_reset() {
        let breaker = breaker(Duration::from_secs(60));

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }
}
