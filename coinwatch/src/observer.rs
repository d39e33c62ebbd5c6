//! Live views of one query.
//!
//! A [`QueryObserver`] owns a background task that loads the query, refetches
//! it on the policy's interval, and refetches again whenever the key is
//! invalidated. Snapshots are published through a `watch` channel. Dropping
//! the observer stops the task and its timers.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coinwatch_core::{Freshness, QueryKey};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, info_span};

use crate::client::{QueryClient, QueryEvent};
use crate::error::QueryError;
use crate::policy::QueryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No data yet and the first fetch is running.
    Loading,
    Success,
    /// The last fetch failed. Earlier data, if any, is kept.
    Error,
}

/// What an observer currently shows.
#[derive(Debug)]
pub struct QuerySnapshot<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub status: QueryStatus,
    pub is_fetching: bool,
    /// `data` belongs to the previously observed key.
    pub is_placeholder: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        QuerySnapshot {
            data: self.data.clone(),
            error: self.error.clone(),
            status: self.status,
            is_fetching: self.is_fetching,
            is_placeholder: self.is_placeholder,
            updated_at: self.updated_at,
        }
    }
}

impl<T> QuerySnapshot<T> {
    fn loading(placeholder: Option<Arc<T>>) -> Self {
        QuerySnapshot {
            is_placeholder: placeholder.is_some(),
            data: placeholder,
            error: None,
            status: QueryStatus::Loading,
            is_fetching: false,
            updated_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

/// Handle to a running query observation.
pub struct QueryObserver<T> {
    key: QueryKey,
    receiver: watch::Receiver<QuerySnapshot<T>>,
    task: JoinHandle<()>,
}

impl<T> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T> QueryObserver<T>
where
    T: Send + Sync + 'static,
{
    /// Starts observing `key`.
    ///
    /// With `placeholder` set, the observer shows that data (flagged as a
    /// placeholder) until its own first fetch completes.
    pub fn spawn<F, Fut>(
        client: QueryClient,
        key: QueryKey,
        policy: QueryPolicy,
        fetcher: F,
        placeholder: Option<Arc<T>>,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(QuerySnapshot::loading(placeholder));
        let span = info_span!("query_observer", %key);
        let observation = Observation {
            events: client.subscribe(),
            client,
            key: key.clone(),
            policy,
            fetcher,
            sender,
        };
        let task = tokio::spawn(observation.run().instrument(span));
        QueryObserver {
            key,
            receiver,
            task,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QuerySnapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Current data, placeholder included.
    pub fn data(&self) -> Option<Arc<T>> {
        self.receiver.borrow().data.clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&QuerySnapshot<T>) -> bool,
    ) -> Option<QuerySnapshot<T>> {
        self.receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.receiver.clone()
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Observation<T, F> {
    client: QueryClient,
    key: QueryKey,
    policy: QueryPolicy,
    fetcher: F,
    sender: watch::Sender<QuerySnapshot<T>>,
    events: broadcast::Receiver<QueryEvent>,
}

impl<T, F, Fut> Observation<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    async fn run(mut self) {
        self.load().await;

        let mut ticker = self.policy.refetch_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = tick(&mut ticker) => {
                    debug!(key = %self.key, "interval refetch");
                    self.refresh(true).await;
                }
                event = self.events.recv() => match event {
                    Ok(QueryEvent::Invalidated(scope)) if self.key.matches(&scope) => {
                        debug!(key = %self.key, "invalidated, refetching");
                        self.refresh(false).await;
                    }
                    Ok(QueryEvent::Updated(key)) if key == self.key => self.sync_from_store().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(key = %self.key, skipped, "observer lagged behind events");
                        self.sync_from_store().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Shows stored data right away, then fetches if it is missing or stale.
    async fn load(&mut self) {
        if let Ok(Some(value)) = self.client.get_query_value::<T>(&self.key).await {
            let fresh = value.freshness() == Freshness::Fresh;
            let fetched_at = value.fetched_at();
            self.publish_data(value.into_inner(), fetched_at);
            if fresh {
                return;
            }
        }
        self.refresh(false).await;
    }

    async fn refresh(&mut self, force: bool) {
        self.sender.send_modify(|snapshot| snapshot.is_fetching = true);

        let result = if force {
            self.client
                .refetch_query(&self.key, &self.policy, &self.fetcher)
                .await
        } else {
            self.client
                .fetch_query(&self.key, &self.policy, &self.fetcher)
                .await
        };

        match result {
            Ok(data) => {
                let fetched_at = match self.client.get_query_value::<T>(&self.key).await {
                    Ok(Some(value)) => value.fetched_at(),
                    _ => Utc::now(),
                };
                self.publish_data(data, fetched_at);
            }
            Err(error) => self.sender.send_modify(|snapshot| {
                snapshot.error = Some(error);
                snapshot.status = QueryStatus::Error;
                snapshot.is_fetching = false;
            }),
        }
    }

    /// Picks up data stored by someone else's fetch for the same key.
    async fn sync_from_store(&mut self) {
        let Ok(Some(value)) = self.client.get_query_value::<T>(&self.key).await else {
            return;
        };
        let fetched_at = value.fetched_at();
        let newer = self
            .sender
            .borrow()
            .updated_at
            .is_none_or(|current| fetched_at > current);
        if newer {
            self.publish_data(value.into_inner(), fetched_at);
        }
    }

    fn publish_data(&self, data: Arc<T>, fetched_at: DateTime<Utc>) {
        self.sender.send_modify(|snapshot| {
            snapshot.data = Some(data);
            snapshot.error = None;
            snapshot.status = QueryStatus::Success;
            snapshot.is_fetching = false;
            snapshot.is_placeholder = false;
            snapshot.updated_at = Some(fetched_at);
        });
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinwatch_client::{ApiError, Failure};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter(calls: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<Result<usize, QueryError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || futures::future::ready(Ok(calls.fetch_add(1, Ordering::SeqCst)))
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_on_interval_until_dropped() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut observer = QueryObserver::spawn(
            client,
            QueryKey::list(1),
            QueryPolicy::list(),
            counter(&calls),
            None,
        );

        let first = observer.wait_for(QuerySnapshot::is_success).await.unwrap();
        assert_eq!(first.data.as_deref(), Some(&0));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let second = observer
            .wait_for(|snapshot| snapshot.data.as_deref() == Some(&1))
            .await
            .unwrap();
        assert!(!second.is_fetching);

        drop(observer);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_interval_means_no_background_refetch() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut observer = QueryObserver::spawn(
            client,
            QueryKey::search("btc"),
            QueryPolicy::search(),
            counter(&calls),
            None,
        );
        observer.wait_for(QuerySnapshot::is_success).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_observer_reuses_fresh_data() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::detail("ada");

        let mut first = QueryObserver::spawn(
            client.clone(),
            key.clone(),
            QueryPolicy::detail(),
            counter(&calls),
            None,
        );
        first.wait_for(QuerySnapshot::is_success).await.unwrap();

        let mut second =
            QueryObserver::spawn(client, key, QueryPolicy::detail(), counter(&calls), None);
        let snapshot = second.wait_for(QuerySnapshot::is_success).await.unwrap();
        assert_eq!(snapshot.data.as_deref(), Some(&0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_published() {
        let client = QueryClient::default();
        let policy = QueryPolicy::detail().with_retry(crate::policy::RetryPolicy::disabled());
        let mut observer = QueryObserver::spawn(
            client,
            QueryKey::detail("xyz"),
            policy,
            || async {
                Err::<u8, _>(QueryError::Api(ApiError::new(Failure::Transport, "offline")))
            },
            None,
        );

        let snapshot = observer
            .wait_for(|snapshot| snapshot.status == QueryStatus::Error)
            .await
            .unwrap();
        assert!(snapshot.data.is_none());
        assert_eq!(snapshot.error.unwrap().message(), "offline");
        assert!(!snapshot.is_fetching);
    }
}
