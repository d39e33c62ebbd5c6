//! Cached query values with freshness metadata.
//!
//! A [`QueryValue`] wraps fetched data together with the moment it was fetched
//! and, optionally, the moment it becomes stale. Stale data is still served;
//! staleness only tells the query layer that the next read should trigger a
//! background refetch.
//!
//! ```
//! use std::time::Duration;
//! use chrono::Utc;
//! use coinwatch_core::{Freshness, QueryValue};
//!
//! let now = Utc::now();
//! let value = QueryValue::new(42, now, Some(Duration::from_secs(30)));
//! assert_eq!(value.freshness_at(now), Freshness::Fresh);
//! assert_eq!(
//!     value.freshness_at(now + chrono::Duration::seconds(31)),
//!     Freshness::Stale
//! );
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Whether cached data is still inside its staleness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the staleness window.
    Fresh,
    /// Past the staleness window or explicitly invalidated.
    Stale,
}

/// Data stored for one query key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryValue<T> {
    data: T,
    fetched_at: DateTime<Utc>,
    stale_at: Option<DateTime<Utc>>,
}

impl<T> QueryValue<T> {
    /// Stamps `data` fetched at `fetched_at`. A `None` stale time means the
    /// value is stale immediately.
    pub fn new(data: T, fetched_at: DateTime<Utc>, stale_time: Option<Duration>) -> Self {
        let stale_at = stale_time
            .and_then(|window| chrono::Duration::from_std(window).ok())
            .and_then(|window| fetched_at.checked_add_signed(window));
        QueryValue {
            data,
            fetched_at,
            stale_at,
        }
    }

    /// Returns a reference to the data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns when the data was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Returns when the data becomes stale.
    pub fn stale_at(&self) -> Option<DateTime<Utc>> {
        self.stale_at
    }

    /// Consumes the value and returns the data.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Maps the data, keeping the freshness metadata.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> QueryValue<U> {
        QueryValue {
            data: f(self.data),
            fetched_at: self.fetched_at,
            stale_at: self.stale_at,
        }
    }

    /// Freshness relative to `now`.
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        match self.stale_at {
            Some(stale_at) if now < stale_at => Freshness::Fresh,
            _ => Freshness::Stale,
        }
    }

    /// Freshness relative to the current time.
    pub fn freshness(&self) -> Freshness {
        self.freshness_at(Utc::now())
    }

    /// Marks the value stale without discarding the data.
    pub fn invalidate(&mut self) {
        self.stale_at = None;
    }

    /// Time elapsed since the fetch, saturating at zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
    }
}
