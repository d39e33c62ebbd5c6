//! In-flight fetch deduplication.
//!
//! The first caller for a key becomes the leader and performs the fetch.
//! Callers arriving while the fetch runs subscribe to its result instead of
//! hitting the network.

use std::sync::Arc;

use coinwatch_core::QueryKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use tokio::sync::broadcast;

/// Whether to fetch or to wait for a fetch already running.
pub enum ConcurrencyDecision<Res> {
    /// Perform the fetch and publish through the guard.
    Proceed(InFlightGuard<Res>),
    /// Await the leader's result. Resolves to `None` if the leader was
    /// dropped before publishing.
    Await(BoxFuture<'static, Option<Res>>),
}

/// Tracks one broadcast channel per key being fetched.
pub struct InFlight<Res> {
    waiters: Arc<DashMap<QueryKey, broadcast::Sender<Res>>>,
}

impl<Res> Clone for InFlight<Res> {
    fn clone(&self) -> Self {
        InFlight {
            waiters: self.waiters.clone(),
        }
    }
}

impl<Res> Default for InFlight<Res> {
    fn default() -> Self {
        InFlight {
            waiters: Arc::new(DashMap::new()),
        }
    }
}

impl<Res> std::fmt::Debug for InFlight<Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("keys", &self.waiters.len())
            .finish()
    }
}

impl<Res> InFlight<Res>
where
    Res: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &QueryKey) -> ConcurrencyDecision<Res> {
        match self.waiters.entry(key.clone()) {
            Entry::Occupied(entry) => {
                // subscribe under the shard lock so the leader cannot publish in between
                let mut receiver = entry.get().subscribe();
                drop(entry);
                ConcurrencyDecision::Await(Box::pin(async move { receiver.recv().await.ok() }))
            }
            Entry::Vacant(entry) => {
                let (sender, _) = broadcast::channel(1);
                entry.insert(sender);
                ConcurrencyDecision::Proceed(InFlightGuard {
                    key: key.clone(),
                    waiters: self.waiters.clone(),
                    completed: false,
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.waiters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Leadership over one key's fetch.
///
/// Dropping the guard without [`complete`](Self::complete) releases the key
/// and wakes waiters with `None`, so one of them takes over.
pub struct InFlightGuard<Res> {
    key: QueryKey,
    waiters: Arc<DashMap<QueryKey, broadcast::Sender<Res>>>,
    completed: bool,
}

impl<Res: Clone> InFlightGuard<Res> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Publishes the result to every waiter and hands it back.
    pub fn complete(mut self, result: Res) -> Res {
        self.completed = true;
        if let Some((_, sender)) = self.waiters.remove(&self.key) {
            // no receivers is fine
            let _ = sender.send(result.clone());
        }
        result
    }
}

impl<Res> Drop for InFlightGuard<Res> {
    fn drop(&mut self) {
        if !self.completed {
            self.waiters.remove(&self.key);
        }
    }
}
