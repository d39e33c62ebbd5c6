//! The query client: store, in-flight deduplication and change events.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use coinwatch_core::{Freshness, KeyScope, QueryKey, QueryValue};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, debug_span, warn};

use crate::concurrency::{ConcurrencyDecision, InFlight};
use crate::error::{QueryError, QueryResult};
use crate::metrics;
use crate::policy::QueryPolicy;
use crate::retry::with_retry;
use crate::store::{AnyData, QueryStore};
use crate::tasks::{TaskConfig, TaskManager};

const EVENT_CAPACITY: usize = 256;

/// Change notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// New data was stored under the key.
    Updated(QueryKey),
    /// Entries in the scope were marked stale.
    Invalidated(KeyScope),
    /// Entries in the scope were dropped.
    Removed(KeyScope),
}

#[derive(Debug, Clone)]
pub struct QueryClientConfig {
    /// Upper bound on stored entries.
    pub max_entries: u64,
    pub tasks: TaskConfig,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        QueryClientConfig {
            max_entries: 10_000,
            tasks: TaskConfig::default(),
        }
    }
}

#[derive(Debug)]
struct QueryClientInner {
    store: QueryStore,
    in_flight: InFlight<QueryResult<AnyData>>,
    events: broadcast::Sender<QueryEvent>,
    tasks: TaskManager,
}

/// Shared query cache.
///
/// Cloning is cheap; clones share the store, in-flight fetches and events.
#[derive(Debug, Clone)]
pub struct QueryClient {
    inner: Arc<QueryClientInner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryClientConfig::default())
    }
}

impl QueryClient {
    pub fn new(config: QueryClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        QueryClient {
            inner: Arc::new(QueryClientInner {
                store: QueryStore::new(config.max_entries),
                in_flight: InFlight::new(),
                events,
                tasks: TaskManager::new(config.tasks),
            }),
        }
    }

    pub fn store(&self) -> &QueryStore {
        &self.inner.store
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.inner.tasks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.inner.events.subscribe()
    }

    /// Returns `true` while a fetch for `key` is running.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.is_in_flight(key)
    }

    /// Fresh stored data, or the result of a fetch.
    ///
    /// Concurrent calls for the same key share one fetch. Stale data is
    /// refetched before returning.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: &QueryKey,
        policy: &QueryPolicy,
        fetcher: F,
    ) -> QueryResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        if let Some(data) = self.fresh_data::<T>(key).await? {
            metrics::record_lookup(key.kind(), true);
            return Ok(data);
        }
        metrics::record_lookup(key.kind(), false);
        self.fetch_shared(key, policy, &fetcher, false).await
    }

    /// Fetches regardless of freshness. Still joins a fetch already running.
    pub async fn refetch_query<T, F, Fut>(
        &self,
        key: &QueryKey,
        policy: &QueryPolicy,
        fetcher: F,
    ) -> QueryResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.fetch_shared(key, policy, &fetcher, true).await
    }

    /// Starts a background fetch unless the data is fresh or a prefetch for
    /// the key is already running. Returns `true` if a task was spawned.
    pub fn prefetch_query<T, F, Fut>(&self, key: QueryKey, policy: QueryPolicy, fetcher: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        if self.is_fetching(&key) {
            return false;
        }
        let client = self.clone();
        self.inner.tasks.spawn_with_key(key.clone(), async move {
            if let Err(error) = client.fetch_query::<T, _, _>(&key, &policy, fetcher).await {
                debug!(%key, %error, "prefetch failed");
            }
        })
    }

    /// Stored data regardless of freshness.
    pub async fn get_query_data<T>(&self, key: &QueryKey) -> QueryResult<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        Ok(self
            .inner
            .store
            .get::<T>(key)
            .await?
            .map(QueryValue::into_inner))
    }

    /// Stored value with its freshness metadata.
    pub async fn get_query_value<T>(&self, key: &QueryKey) -> QueryResult<Option<QueryValue<Arc<T>>>>
    where
        T: Send + Sync + 'static,
    {
        self.inner.store.get::<T>(key).await
    }

    /// Stores `data` as if it had just been fetched.
    pub async fn set_query_data<T>(&self, key: &QueryKey, data: T, policy: &QueryPolicy) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let data = Arc::new(data);
        self.store_data(key, data.clone(), policy).await;
        data
    }

    /// Marks entries in `scope` stale and wakes their observers.
    pub async fn invalidate(&self, scope: impl Into<KeyScope>) -> Vec<QueryKey> {
        let scope = scope.into();
        let keys = self.inner.store.invalidate(&scope).await;
        let _ = self.inner.events.send(QueryEvent::Invalidated(scope));
        keys
    }

    /// Drops entries in `scope`.
    pub async fn remove(&self, scope: impl Into<KeyScope>) -> usize {
        let scope = scope.into();
        let removed = self.inner.store.remove(&scope).await;
        let _ = self.inner.events.send(QueryEvent::Removed(scope));
        removed
    }

    async fn fresh_data<T>(&self, key: &QueryKey) -> QueryResult<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        Ok(self
            .inner
            .store
            .get::<T>(key)
            .await?
            .filter(|value| value.freshness() == Freshness::Fresh)
            .map(QueryValue::into_inner))
    }

    async fn store_data(&self, key: &QueryKey, data: AnyData, policy: &QueryPolicy) {
        let value = QueryValue::new(data, Utc::now(), policy.stale_time);
        self.inner
            .store
            .insert(key.clone(), value, policy.gc_time)
            .await;
        let _ = self.inner.events.send(QueryEvent::Updated(key.clone()));
    }

    async fn fetch_shared<T, F, Fut>(
        &self,
        key: &QueryKey,
        policy: &QueryPolicy,
        fetcher: &F,
        force: bool,
    ) -> QueryResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        loop {
            match self.inner.in_flight.check(key) {
                ConcurrencyDecision::Proceed(guard) => {
                    // another leader may have stored fresh data in the meantime
                    if !force && let Some(data) = self.fresh_data::<T>(key).await? {
                        // waiters get the stored data; the leader already holds it
                        let _ = guard.complete(Ok(data.clone() as AnyData));
                        return Ok(data);
                    }

                    let start = Instant::now();
                    let result = with_retry(&policy.retry, key, || async {
                        fetcher().await.map(|data| Arc::new(data) as AnyData)
                    })
                    .instrument(debug_span!("query_fetch", %key))
                    .await;
                    metrics::record_fetch(key.kind(), start.elapsed(), result.is_ok());

                    match &result {
                        Ok(data) => self.store_data(key, data.clone(), policy).await,
                        Err(error) => warn!(%key, %error, "query fetch failed"),
                    }
                    return downcast(key, guard.complete(result));
                }
                ConcurrencyDecision::Await(wait) => {
                    metrics::record_deduplicated(key.kind());
                    match wait.await {
                        Some(result) => return downcast(key, result),
                        None => debug!(%key, "leading fetch dropped, retrying"),
                    }
                }
            }
        }
    }
}

fn downcast<T>(key: &QueryKey, result: QueryResult<AnyData>) -> QueryResult<Arc<T>>
where
    T: Send + Sync + 'static,
{
    result?
        .downcast::<T>()
        .map_err(|_| QueryError::TypeMismatch(key.to_string()))
}
