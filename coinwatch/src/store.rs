//! Type-erased query store on top of moka.
//!
//! Values of any `Send + Sync` type live side by side under their
//! [`QueryKey`]. Each entry is evicted after staying unread for its query's
//! `gc_time`.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coinwatch_core::{KeyScope, QueryKey, QueryValue};
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tracing::debug;

use crate::error::{QueryError, QueryResult};

/// Stored query data.
pub type AnyData = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct StoredEntry {
    value: QueryValue<AnyData>,
    gc_time: Duration,
}

struct GcExpiry;

impl Expiry<QueryKey, StoredEntry> for GcExpiry {
    fn expire_after_create(
        &self,
        _key: &QueryKey,
        entry: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.gc_time)
    }

    fn expire_after_read(
        &self,
        _key: &QueryKey,
        entry: &StoredEntry,
        _read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        Some(entry.gc_time)
    }

    fn expire_after_update(
        &self,
        _key: &QueryKey,
        entry: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.gc_time)
    }
}

#[derive(Clone)]
pub struct QueryStore {
    cache: Cache<QueryKey, StoredEntry>,
}

impl std::fmt::Debug for QueryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl QueryStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(GcExpiry)
            .build();
        QueryStore { cache }
    }

    /// Raw stored value.
    pub async fn get_raw(&self, key: &QueryKey) -> Option<QueryValue<AnyData>> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    /// Stored value downcast to `T`.
    pub async fn get<T>(&self, key: &QueryKey) -> QueryResult<Option<QueryValue<Arc<T>>>>
    where
        T: Send + Sync + 'static,
    {
        let Some(value) = self.get_raw(key).await else {
            return Ok(None);
        };
        let data = value
            .data()
            .clone()
            .downcast::<T>()
            .map_err(|_| QueryError::TypeMismatch(key.to_string()))?;
        Ok(Some(value.map(|_| data)))
    }

    pub async fn insert(&self, key: QueryKey, value: QueryValue<AnyData>, gc_time: Duration) {
        self.cache.insert(key, StoredEntry { value, gc_time }).await;
    }

    /// Marks every entry in `scope` stale, keeping its data. Returns the
    /// affected keys.
    pub async fn invalidate(&self, scope: &KeyScope) -> Vec<QueryKey> {
        let mut keys = Vec::new();
        for key in self.keys_in(scope) {
            if self.mark_stale(&key).await {
                keys.push(key);
            }
        }
        debug!(?scope, invalidated = keys.len(), "query entries marked stale");
        keys
    }

    fn keys_in(&self, scope: &KeyScope) -> Vec<QueryKey> {
        self.cache
            .iter()
            .filter(|(key, _)| key.matches(scope))
            .map(|(key, _)| (*key).clone())
            .collect()
    }

    /// Flips the stale flag of whatever entry `key` holds right now. Entries
    /// written or removed since `key` was listed are respected.
    async fn mark_stale(&self, key: &QueryKey) -> bool {
        let result = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|current| async move {
                match current {
                    Some(entry) => {
                        let mut stored = entry.into_value();
                        stored.value.invalidate();
                        Op::Put(stored)
                    }
                    None => Op::Nop,
                }
            })
            .await;
        matches!(result, CompResult::ReplacedWith(_))
    }

    /// Drops every entry in `scope`. Returns how many were removed.
    pub async fn remove(&self, scope: &KeyScope) -> usize {
        let keys: Vec<QueryKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.matches(scope))
            .map(|(key, _)| (*key).clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.cache.remove(&key).await.is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.cache.iter().map(|(key, _)| (*key).clone()).collect()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.cache.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coinwatch_core::{Freshness, QueryKind};

    fn fresh(data: AnyData) -> QueryValue<AnyData> {
        QueryValue::new(data, Utc::now(), Some(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn typed_roundtrip_and_mismatch() {
        let store = QueryStore::new(100);
        let key = QueryKey::list(1);
        store
            .insert(key.clone(), fresh(Arc::new(vec![1u32, 2])), Duration::from_secs(60))
            .await;

        let value = store.get::<Vec<u32>>(&key).await.unwrap().unwrap();
        assert_eq!(*value.data().as_ref(), vec![1, 2]);
        assert_eq!(value.freshness(), Freshness::Fresh);

        let error = store.get::<String>(&key).await.unwrap_err();
        assert!(matches!(error, QueryError::TypeMismatch(_)));
        assert!(store.get::<String>(&QueryKey::list(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_by_kind_keeps_data() {
        let store = QueryStore::new(100);
        let gc = Duration::from_secs(60);
        store.insert(QueryKey::list(1), fresh(Arc::new(1u8)), gc).await;
        store.insert(QueryKey::list(2), fresh(Arc::new(2u8)), gc).await;
        store.insert(QueryKey::detail("btc"), fresh(Arc::new(3u8)), gc).await;

        let keys = store.invalidate(&KeyScope::Kind(QueryKind::List)).await;
        assert_eq!(keys.len(), 2);

        let page = store.get::<u8>(&QueryKey::list(2)).await.unwrap().unwrap();
        assert_eq!(**page.data(), 2);
        assert_eq!(page.freshness(), Freshness::Stale);
        let detail = store.get::<u8>(&QueryKey::detail("BTC")).await.unwrap().unwrap();
        assert_eq!(detail.freshness(), Freshness::Fresh);
    }

    #[tokio::test]
    async fn invalidation_keeps_writes_made_after_listing() {
        let store = QueryStore::new(100);
        let gc = Duration::from_secs(60);
        let key = QueryKey::list(1);
        store.insert(key.clone(), fresh(Arc::new(1u8)), gc).await;
        store.insert(QueryKey::list(2), fresh(Arc::new(2u8)), gc).await;

        let listed = store.keys_in(&KeyScope::Kind(QueryKind::List));
        assert_eq!(listed.len(), 2);
        store.insert(key.clone(), fresh(Arc::new(9u8)), gc).await;
        store.cache.invalidate(&QueryKey::list(2)).await;

        let mut marked = Vec::new();
        for listed_key in listed {
            if store.mark_stale(&listed_key).await {
                marked.push(listed_key);
            }
        }
        assert_eq!(marked, vec![key.clone()]);

        let page = store.get::<u8>(&key).await.unwrap().unwrap();
        assert_eq!(**page.data(), 9);
        assert_eq!(page.freshness(), Freshness::Stale);
        assert!(!store.contains(&QueryKey::list(2)));
    }

    #[tokio::test]
    async fn remove_exact_key() {
        let store = QueryStore::new(100);
        let gc = Duration::from_secs(60);
        store.insert(QueryKey::search("eth"), fresh(Arc::new(())), gc).await;
        store.insert(QueryKey::search("btc"), fresh(Arc::new(())), gc).await;

        assert_eq!(store.remove(&KeyScope::Exact(QueryKey::search(" ETH "))).await, 1);
        assert!(!store.contains(&QueryKey::search("eth")));
        assert!(store.contains(&QueryKey::search("btc")));
    }
}
