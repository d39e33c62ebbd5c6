//! Market data queries.
//!
//! [`CryptoQueries`] binds a [`MarketData`] source to a [`QueryClient`] with
//! the key layout and policies the dashboard uses:
//!
//! | query | key | stale | refetch |
//! |-------|-----|-------|---------|
//! | price page | `list:page=N` | 30s | 60s, previous page kept while loading |
//! | history of a symbol set | `history:symbols=A,B` | 2m | 5m |
//! | one symbol inside a page view | `history:symbol=A` | 2m | 5m, one retry, failure is an empty series |
//! | coin details | `detail:symbol=A` | 15s | 30s |
//! | coin chart | `history:symbols=A&interval=7d` | 2m | 5m |
//! | search | `search:q=a` | 30s | never |

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use coinwatch_client::{
    ApiClient, ApiResult, DEFAULT_HISTORY_LIMIT, DEFAULT_INTERVAL, DEFAULT_PAGE_SIZE,
};
use coinwatch_core::{
    Coin, HistorySeries, KeyPart, KeyScope, Page, QueryKey, QueryKind, normalize_symbols,
};
use futures::future::{BoxFuture, join_all};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::client::QueryClient;
use crate::error::{QueryError, QueryResult};
use crate::observer::QueryObserver;
use crate::policy::QueryPolicy;

/// Source of market data.
#[async_trait]
pub trait MarketData: Send + Sync + 'static {
    async fn latest_prices(&self, page: u32, page_size: u32) -> ApiResult<Page<Coin>>;

    async fn history(
        &self,
        symbols: &[SmolStr],
        interval: Option<&str>,
        limit: u32,
    ) -> ApiResult<Vec<HistorySeries>>;

    async fn coin_details(&self, symbol: &str) -> ApiResult<Option<Coin>>;

    async fn coin_history(&self, symbol: &str, interval: &str, limit: u32)
    -> ApiResult<HistorySeries>;

    async fn search(&self, query: &str) -> ApiResult<Vec<Coin>>;
}

#[async_trait]
impl MarketData for ApiClient {
    async fn latest_prices(&self, page: u32, page_size: u32) -> ApiResult<Page<Coin>> {
        ApiClient::latest_prices(self, page, page_size, None).await
    }

    async fn history(
        &self,
        symbols: &[SmolStr],
        interval: Option<&str>,
        limit: u32,
    ) -> ApiResult<Vec<HistorySeries>> {
        let symbols: Vec<&str> = symbols.iter().map(SmolStr::as_str).collect();
        ApiClient::history(self, &symbols, interval, limit).await
    }

    async fn coin_details(&self, symbol: &str) -> ApiResult<Option<Coin>> {
        ApiClient::coin_details(self, symbol).await
    }

    async fn coin_history(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> ApiResult<HistorySeries> {
        ApiClient::coin_history(self, symbol, interval, limit).await
    }

    async fn search(&self, query: &str) -> ApiResult<Vec<Coin>> {
        ApiClient::search(self, query).await
    }
}

type Fetcher<T> = Box<dyn Fn() -> BoxFuture<'static, QueryResult<T>> + Send + Sync>;

/// A price page with the history of every coin on it.
#[derive(Debug, Clone)]
pub struct CryptoWithHistory {
    pub page: u32,
    pub coins: Arc<Page<Coin>>,
    pub total_pages: Option<u32>,
    /// Price values per upper-cased symbol, oldest first.
    pub history: BTreeMap<SmolStr, Vec<f64>>,
}

/// Cached market data queries and the actions that refresh them.
pub struct CryptoQueries<M> {
    api: Arc<M>,
    queries: QueryClient,
    page_size: u32,
    history_limit: u32,
}

impl<M> Clone for CryptoQueries<M> {
    fn clone(&self) -> Self {
        CryptoQueries {
            api: self.api.clone(),
            queries: self.queries.clone(),
            page_size: self.page_size,
            history_limit: self.history_limit,
        }
    }
}

impl<M> std::fmt::Debug for CryptoQueries<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoQueries")
            .field("queries", &self.queries)
            .field("page_size", &self.page_size)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

/// Key of one symbol's history inside a page view.
pub fn symbol_history_key(symbol: &str) -> QueryKey {
    QueryKey::new(
        QueryKind::History,
        vec![KeyPart::new("symbol", Some(symbol.trim().to_uppercase()))],
    )
}

impl<M: MarketData> CryptoQueries<M> {
    pub fn new(api: Arc<M>, queries: QueryClient) -> Self {
        CryptoQueries {
            api,
            queries,
            page_size: DEFAULT_PAGE_SIZE,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_page_size(self, page_size: u32) -> Self {
        CryptoQueries {
            page_size: page_size.max(1),
            ..self
        }
    }

    pub fn with_history_limit(self, history_limit: u32) -> Self {
        CryptoQueries {
            history_limit,
            ..self
        }
    }

    pub fn api(&self) -> &Arc<M> {
        &self.api
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// One page of latest prices. Once the page count is known the next page
    /// is prefetched in the background.
    pub async fn list(&self, page: u32) -> QueryResult<Arc<Page<Coin>>> {
        let page = page.max(1);
        let coins = self
            .queries
            .fetch_query(&QueryKey::list(page), &QueryPolicy::list(), self.list_fetcher(page))
            .await?;
        if let Some(total) = coins.resolve_total_pages(page, self.page_size)
            && page < total
        {
            self.prefetch_list(page + 1);
        }
        Ok(coins)
    }

    /// History for a symbol set. No symbols means no fetch.
    pub async fn history(&self, symbols: &[&str]) -> QueryResult<Arc<Vec<HistorySeries>>> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }
        let key = QueryKey::history(&symbols);
        self.queries
            .fetch_query(&key, &QueryPolicy::history(), self.history_fetcher(symbols))
            .await
    }

    /// One symbol's history. A failed fetch yields an empty series, which is
    /// not stored, so other symbols are unaffected and the next read retries.
    pub async fn symbol_history(&self, symbol: &str) -> Arc<HistorySeries> {
        let key = symbol_history_key(symbol);
        let fetch = self
            .queries
            .fetch_query(&key, &QueryPolicy::symbol_history(), self.symbol_fetcher(symbol))
            .await;
        match fetch {
            Ok(series) => series,
            Err(error) => {
                warn!(%key, %error, "symbol history unavailable");
                Arc::new(HistorySeries::empty(symbol))
            }
        }
    }

    /// Histories for several symbols, fetched concurrently and keyed by
    /// upper-cased symbol.
    pub async fn histories(&self, symbols: &[&str]) -> BTreeMap<SmolStr, Arc<HistorySeries>> {
        let symbols = normalize_symbols(symbols);
        let series = join_all(symbols.iter().map(|symbol| self.symbol_history(symbol))).await;
        symbols.into_iter().zip(series).collect()
    }

    pub async fn coin_detail(&self, symbol: &str) -> QueryResult<Arc<Option<Coin>>> {
        self.queries
            .fetch_query(
                &QueryKey::detail(symbol),
                &QueryPolicy::detail(),
                self.detail_fetcher(symbol),
            )
            .await
    }

    /// Chart data for one coin. `interval` defaults to `7d`.
    pub async fn coin_history(
        &self,
        symbol: &str,
        interval: Option<&str>,
    ) -> QueryResult<Arc<HistorySeries>> {
        let interval = interval.unwrap_or(DEFAULT_INTERVAL);
        self.queries
            .fetch_query(
                &QueryKey::coin_history(symbol, interval),
                &QueryPolicy::history(),
                self.coin_history_fetcher(symbol, interval),
            )
            .await
    }

    /// Coins matching `query`. A blank query returns nothing without a fetch.
    pub async fn search(&self, query: &str) -> QueryResult<Arc<Vec<Coin>>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }
        self.queries
            .fetch_query(
                &QueryKey::search(query),
                &QueryPolicy::search(),
                self.search_fetcher(query),
            )
            .await
    }

    /// A price page plus every listed coin's history.
    pub async fn with_history(&self, page: u32) -> QueryResult<CryptoWithHistory> {
        let page = page.max(1);
        let coins = self.list(page).await?;
        let symbols: Vec<String> = coins.items.iter().map(Coin::normalized_symbol).collect();
        let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let history = self
            .histories(&symbols)
            .await
            .into_iter()
            .map(|(symbol, series)| (symbol, series.values()))
            .collect();
        Ok(CryptoWithHistory {
            page,
            total_pages: coins.resolve_total_pages(page, self.page_size),
            coins,
            history,
        })
    }

    /// Marks one price page, or every page, stale.
    pub async fn refresh_list(&self, page: Option<u32>) -> Vec<QueryKey> {
        let scope = match page {
            Some(page) => KeyScope::Exact(QueryKey::list(page.max(1))),
            None => KeyScope::Kind(QueryKind::List),
        };
        self.queries.invalidate(scope).await
    }

    /// Marks every history covering any of `symbols` stale, or every history
    /// when no symbols are given. Symbol sets, per-symbol series and interval
    /// queries all count.
    pub async fn refresh_history(&self, symbols: Option<&[&str]>) -> Vec<QueryKey> {
        let scope = match symbols {
            Some(symbols) => KeyScope::history_of(symbols),
            None => KeyScope::Kind(QueryKind::History),
        };
        self.queries.invalidate(scope).await
    }

    /// Marks every market query stale.
    pub async fn refresh_all(&self) -> Vec<QueryKey> {
        self.queries.invalidate(KeyScope::All).await
    }

    /// Loads a price page in the background. Returns `false` when it was
    /// already being loaded.
    pub fn prefetch_list(&self, page: u32) -> bool {
        let page = page.max(1);
        debug!(page, "prefetching price page");
        self.queries
            .prefetch_query(QueryKey::list(page), QueryPolicy::list(), self.list_fetcher(page))
    }

    /// Observes a price page. Passing the observer of the page being left
    /// keeps its coins visible until the new page arrives.
    pub fn watch_list(
        &self,
        page: u32,
        previous: Option<&QueryObserver<Page<Coin>>>,
    ) -> QueryObserver<Page<Coin>> {
        let page = page.max(1);
        let policy = QueryPolicy::list();
        let placeholder = previous
            .filter(|_| policy.keep_previous_data)
            .and_then(QueryObserver::data);
        QueryObserver::spawn(
            self.queries.clone(),
            QueryKey::list(page),
            policy,
            self.list_fetcher(page),
            placeholder,
        )
    }

    pub fn watch_coin(&self, symbol: &str) -> QueryObserver<Option<Coin>> {
        QueryObserver::spawn(
            self.queries.clone(),
            QueryKey::detail(symbol),
            QueryPolicy::detail(),
            self.detail_fetcher(symbol),
            None,
        )
    }

    pub fn watch_history(&self, symbols: &[&str]) -> QueryObserver<Vec<HistorySeries>> {
        let symbols = normalize_symbols(symbols);
        QueryObserver::spawn(
            self.queries.clone(),
            QueryKey::history(&symbols),
            QueryPolicy::history(),
            self.history_fetcher(symbols),
            None,
        )
    }

    fn list_fetcher(&self, page: u32) -> Fetcher<Page<Coin>> {
        let api = self.api.clone();
        let page_size = self.page_size;
        fetcher(move || {
            let api = api.clone();
            async move { api.latest_prices(page, page_size).await }
        })
    }

    fn history_fetcher(&self, symbols: Vec<SmolStr>) -> Fetcher<Vec<HistorySeries>> {
        let api = self.api.clone();
        let limit = self.history_limit;
        let symbols: Arc<[SmolStr]> = symbols.into();
        fetcher(move || {
            let api = api.clone();
            let symbols = symbols.clone();
            async move { api.history(&symbols, None, limit).await }
        })
    }

    fn symbol_fetcher(&self, symbol: &str) -> Fetcher<HistorySeries> {
        let api = self.api.clone();
        let limit = self.history_limit;
        let symbol = SmolStr::new(symbol.trim().to_uppercase());
        fetcher(move || {
            let api = api.clone();
            let symbol = symbol.clone();
            async move {
                let series = api
                    .history(std::slice::from_ref(&symbol), None, limit)
                    .await?;
                Ok(series
                    .into_iter()
                    .find(|series| series.symbol() == symbol)
                    .unwrap_or_else(|| HistorySeries::empty(&symbol)))
            }
        })
    }

    fn detail_fetcher(&self, symbol: &str) -> Fetcher<Option<Coin>> {
        let api = self.api.clone();
        let symbol = SmolStr::new(symbol.trim());
        fetcher(move || {
            let api = api.clone();
            let symbol = symbol.clone();
            async move { api.coin_details(&symbol).await }
        })
    }

    fn coin_history_fetcher(&self, symbol: &str, interval: &str) -> Fetcher<HistorySeries> {
        let api = self.api.clone();
        let limit = self.history_limit;
        let symbol = SmolStr::new(symbol.trim());
        let interval = SmolStr::new(interval.trim());
        fetcher(move || {
            let api = api.clone();
            let symbol = symbol.clone();
            let interval = interval.clone();
            async move { api.coin_history(&symbol, &interval, limit).await }
        })
    }

    fn search_fetcher(&self, query: &str) -> Fetcher<Vec<Coin>> {
        let api = self.api.clone();
        let query = SmolStr::new(query);
        fetcher(move || {
            let api = api.clone();
            let query = query.clone();
            async move { api.search(&query).await }
        })
    }
}

/// Boxes an API call as a query fetcher.
fn fetcher<T, F, Fut>(call: F) -> Fetcher<T>
where
    T: 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, QueryResult<T>> {
        let call = call();
        Box::pin(async move { call.await.map_err(QueryError::from) })
    })
}
