//! Process-wide circuit breaker.
//!
//! The breaker counts consecutive failed calls across every endpoint. Once the
//! count reaches [`BreakerConfig::max_consecutive_failures`] all calls are
//! refused without touching the network until
//! [`BreakerConfig::reset_after`] has passed since the last failure. The first
//! call after that quiet period resets the counter and goes through.
//!
//! A [`CircuitBreaker`] is a cheap handle: clones share the same counters, so
//! one breaker can guard several clients.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Shared failure counter guarding the gateway.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        CircuitBreaker {
            config,
            state: Arc::new(Mutex::new(BreakerState::default())),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Checks whether a call may proceed.
    ///
    /// Resets the counter first when the last failure is older than the
    /// reset window.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if let Some(last_failure) = state.last_failure
            && last_failure.elapsed() > self.config.reset_after
            && state.consecutive_failures > 0
        {
            debug!(
                failures = state.consecutive_failures,
                "circuit breaker reset after quiet period"
            );
            state.consecutive_failures = 0;
        }
        state.consecutive_failures < self.config.max_consecutive_failures
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if state.consecutive_failures == self.config.max_consecutive_failures {
            warn!(
                failures = state.consecutive_failures,
                reset_after = ?self.config.reset_after,
                "circuit breaker opened"
            );
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// `true` while calls would be refused. Does not reset the counter.
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        let cooled_down = state
            .last_failure
            .is_some_and(|last| last.elapsed() > self.config.reset_after);
        state.consecutive_failures >= self.config.max_consecutive_failures && !cooled_down
    }

    /// Clears all state.
    pub fn reset(&self) {
        *self.lock() = BreakerState::default();
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Every mutation is a plain store, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            max_consecutive_failures: 3,
            reset_after: Duration::from_secs(30),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold() {
        let breaker = breaker();
        for _ in 0..2 {
            assert!(breaker.try_acquire());
            breaker.record_failure();
        }
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert!(!breaker.try_acquire());
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_window_is_strict() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!breaker.try_acquire());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.try_acquire());
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_clears_counter() {
        let breaker = breaker();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(breaker.try_acquire());
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_state() {
        let breaker = breaker();
        let other = breaker.clone();
        for _ in 0..3 {
            other.record_failure();
        }
        assert!(!breaker.try_acquire());
        breaker.reset();
        assert!(other.try_acquire());
    }
}
