//! Metric names and recording helpers.
//!
//! Everything here compiles to no-ops unless the `metrics` feature is on.

use std::time::Duration;

use coinwatch_core::QueryKind;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Reads answered from fresh stored data.
    pub static ref QUERY_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "coinwatch_query_hit_total",
            "Total number of queries answered from fresh stored data."
        );
        "coinwatch_query_hit_total"
    };
    /// Reads that needed a fetch.
    pub static ref QUERY_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "coinwatch_query_miss_total",
            "Total number of queries that needed a fetch."
        );
        "coinwatch_query_miss_total"
    };
    /// Callers that joined a fetch already in flight.
    pub static ref QUERY_DEDUPLICATED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "coinwatch_query_deduplicated_total",
            "Total number of callers that awaited a fetch already in flight."
        );
        "coinwatch_query_deduplicated_total"
    };
    pub static ref QUERY_FAILURE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "coinwatch_query_failure_total",
            "Total number of fetches that failed after retries."
        );
        "coinwatch_query_failure_total"
    };
    pub static ref QUERY_FETCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "coinwatch_query_fetch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of query fetches including retries, in seconds."
        );
        "coinwatch_query_fetch_duration_seconds"
    };

    pub static ref BACKGROUND_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "coinwatch_background_tasks_spawned_total",
            "Total number of background tasks spawned."
        );
        "coinwatch_background_tasks_spawned_total"
    };
    pub static ref BACKGROUND_TASKS_DEDUPLICATED: &'static str = {
        metrics::describe_counter!(
            "coinwatch_background_tasks_deduplicated_total",
            "Total number of background tasks skipped because one was running for the same query."
        );
        "coinwatch_background_tasks_deduplicated_total"
    };
    pub static ref BACKGROUND_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "coinwatch_background_tasks_timeout_total",
            "Total number of background tasks cancelled by timeout."
        );
        "coinwatch_background_tasks_timeout_total"
    };
}

/// Counts a store lookup as hit or miss.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_lookup(kind: QueryKind, hit: bool) {
    let counter = if hit {
        *QUERY_HIT_COUNTER
    } else {
        *QUERY_MISS_COUNTER
    };
    metrics::counter!(counter, "kind" => kind.as_str()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_lookup(_kind: QueryKind, _hit: bool) {}

#[cfg(feature = "metrics")]
#[inline]
pub fn record_deduplicated(kind: QueryKind) {
    metrics::counter!(*QUERY_DEDUPLICATED_COUNTER, "kind" => kind.as_str()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_deduplicated(_kind: QueryKind) {}

/// Records a finished fetch.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_fetch(kind: QueryKind, duration: Duration, succeeded: bool) {
    metrics::histogram!(*QUERY_FETCH_DURATION, "kind" => kind.as_str())
        .record(duration.as_secs_f64());
    if !succeeded {
        metrics::counter!(*QUERY_FAILURE_COUNTER, "kind" => kind.as_str()).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_fetch(_kind: QueryKind, _duration: Duration, _succeeded: bool) {}
