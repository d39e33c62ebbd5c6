//! Retry with exponential backoff.

use std::future::Future;

use coinwatch_core::QueryKey;
use tracing::debug;

use crate::error::QueryResult;
use crate::policy::RetryPolicy;

/// Runs `fetch` until it succeeds, fails with a non-retriable error, or the
/// policy's retries are used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, key: &QueryKey, mut fetch: F) -> QueryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    let max_retries = u32::from(policy.max_retries.get());
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retriable() && attempt < max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(%key, attempt, ?delay, %error, "query failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
