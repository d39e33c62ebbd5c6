//! Per-query caching and retry policies.
//!
//! Policies deserialize from YAML or JSON with humantime durations:
//!
//! ```yaml
//! stale_time: 30s
//! refetch_interval: 1m
//! gc_time: 1m
//! retry:
//!   max_retries: 3
//!   base_delay: 1s
//!   max_delay: 30s
//! keep_previous_data: true
//! ```

use std::time::Duration;

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};

bounded_integer! {
    /// Number of retries after the first failed attempt (0-10).
    #[repr(u8)]
    pub struct MaxRetries { 0..=10 }
}

/// Exponential backoff for failed fetches.
///
/// Attempt `n` (zero based) waits `base_delay * 2^n`, capped at `max_delay`.
/// Errors that are not retriable (4xx other than 401, undecodable bodies)
/// are returned immediately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: MaxRetries,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Retry policy allowing `max_retries` retries with default delays.
    pub fn new(max_retries: MaxRetries) -> Self {
        RetryPolicy {
            max_retries,
            ..Self::default()
        }
    }

    /// No retries at all.
    pub fn disabled() -> Self {
        Self::new(MaxRetries::MIN)
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: MaxRetries::new(3).unwrap_or(MaxRetries::MAX),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Caching behaviour for one query.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QueryPolicy {
    /// How long fetched data counts as fresh. `None` means stale immediately.
    #[serde(default, with = "humantime_serde")]
    pub stale_time: Option<Duration>,
    /// Background refetch period for active observers.
    #[serde(default, with = "humantime_serde")]
    pub refetch_interval: Option<Duration>,
    /// How long an unused entry stays in the store.
    #[serde(default = "default_gc_time", with = "humantime_serde")]
    pub gc_time: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Observers keep showing the previous key's data while a new key loads.
    #[serde(default)]
    pub keep_previous_data: bool,
}

fn default_gc_time() -> Duration {
    Duration::from_secs(60)
}

impl Default for QueryPolicy {
    fn default() -> Self {
        QueryPolicy {
            stale_time: Some(Duration::from_secs(30)),
            refetch_interval: None,
            gc_time: default_gc_time(),
            retry: RetryPolicy::default(),
            keep_previous_data: false,
        }
    }
}

impl QueryPolicy {
    /// Latest-price pages: fresh for 30s, refetched every minute, previous
    /// page kept on screen while the next one loads.
    pub fn list() -> Self {
        QueryPolicy {
            stale_time: Some(Duration::from_secs(30)),
            refetch_interval: Some(Duration::from_secs(60)),
            keep_previous_data: true,
            ..Self::default()
        }
    }

    /// Multi-symbol history.
    pub fn history() -> Self {
        QueryPolicy {
            stale_time: Some(Duration::from_secs(120)),
            refetch_interval: Some(Duration::from_secs(300)),
            ..Self::default()
        }
    }

    /// Single-symbol history inside a combined view. Retries once.
    pub fn symbol_history() -> Self {
        QueryPolicy {
            retry: RetryPolicy::new(MaxRetries::new(1).unwrap_or(MaxRetries::MIN)),
            ..Self::history()
        }
    }

    /// Coin details.
    pub fn detail() -> Self {
        QueryPolicy {
            stale_time: Some(Duration::from_secs(15)),
            refetch_interval: Some(Duration::from_secs(30)),
            ..Self::default()
        }
    }

    /// Search results. Point in time, never refetched in the background.
    pub fn search() -> Self {
        QueryPolicy {
            stale_time: Some(Duration::from_secs(30)),
            refetch_interval: None,
            ..Self::default()
        }
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        QueryPolicy { retry, ..self }
    }

    pub fn with_stale_time(self, stale_time: Option<Duration>) -> Self {
        QueryPolicy { stale_time, ..self }
    }

    pub fn with_refetch_interval(self, refetch_interval: Option<Duration>) -> Self {
        QueryPolicy {
            refetch_interval,
            ..self
        }
    }
}
