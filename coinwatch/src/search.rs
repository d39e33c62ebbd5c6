//! Debounced symbol search.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use coinwatch_core::Coin;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span};

use crate::crypto::{CryptoQueries, MarketData};
use crate::error::QueryError;

/// Quiet period before a search is sent.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Keeps ASCII letters and digits, upper-cased.
///
/// ```
/// assert_eq!(coinwatch::search::sanitize_search_input(" b-tc! "), "BTC");
/// ```
pub fn sanitize_search_input(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Sanitized query the results belong to.
    pub query: String,
    pub results: Option<Arc<Vec<Coin>>>,
    pub error: Option<QueryError>,
    /// A search is pending or in flight.
    pub is_searching: bool,
}

/// Search box state.
///
/// Each [`input`](Self::input) restarts the debounce timer and cancels the
/// search scheduled by the previous input, so an older response can never
/// replace a newer one. Empty input clears the results without a fetch.
pub struct DebouncedSearch<M> {
    queries: CryptoQueries<M>,
    delay: Duration,
    state: Arc<watch::Sender<SearchState>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<M> std::fmt::Debug for DebouncedSearch<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedSearch")
            .field("delay", &self.delay)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<M: MarketData> DebouncedSearch<M> {
    pub fn new(queries: CryptoQueries<M>) -> Self {
        Self::with_delay(queries, SEARCH_DEBOUNCE)
    }

    pub fn with_delay(queries: CryptoQueries<M>, delay: Duration) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        DebouncedSearch {
            queries,
            delay,
            state: Arc::new(state),
            pending: Mutex::new(None),
        }
    }

    /// Handles new search box input.
    pub fn input(&self, raw: &str) {
        let query = sanitize_search_input(raw);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        if query.is_empty() {
            self.state.send_replace(SearchState::default());
            return;
        }

        self.state.send_modify(|state| {
            state.query.clone_from(&query);
            state.is_searching = true;
        });

        let queries = self.queries.clone();
        let state = self.state.clone();
        let delay = self.delay;
        let span = debug_span!("search", %query);
        *pending = Some(tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                debug!("sending search");
                let result = queries.search(&query).await;
                state.send_if_modified(|current| {
                    if current.query != query {
                        return false;
                    }
                    match result {
                        Ok(coins) => {
                            current.results = Some(coins);
                            current.error = None;
                        }
                        Err(error) => current.error = Some(error),
                    }
                    current.is_searching = false;
                    true
                });
            }
            .instrument(span),
        ));
    }

    /// Drops pending work and clears the results.
    pub fn clear(&self) {
        self.input("");
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }
}

impl<M> Drop for DebouncedSearch<M> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::QueryClient;
    use async_trait::async_trait;
    use coinwatch_client::ApiResult;
    use coinwatch_core::{HistorySeries, Page};
    use smol_str::SmolStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Searches {
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketData for Searches {
        async fn latest_prices(&self, _page: u32, _page_size: u32) -> ApiResult<Page<Coin>> {
            Ok(Page::from_items(Vec::new()))
        }

        async fn history(
            &self,
            _symbols: &[SmolStr],
            _interval: Option<&str>,
            _limit: u32,
        ) -> ApiResult<Vec<HistorySeries>> {
            Ok(Vec::new())
        }

        async fn coin_details(&self, _symbol: &str) -> ApiResult<Option<Coin>> {
            Ok(None)
        }

        async fn coin_history(&self, symbol: &str, _interval: &str, _limit: u32) -> ApiResult<HistorySeries> {
            Ok(HistorySeries::empty(symbol))
        }

        async fn search(&self, query: &str) -> ApiResult<Vec<Coin>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(query.to_owned());
            Ok(vec![serde_json::from_value(serde_json::json!({ "symbol": query })).unwrap()])
        }
    }

    fn search() -> (Arc<Searches>, DebouncedSearch<Searches>) {
        let api = Arc::new(Searches::default());
        let queries = CryptoQueries::new(api.clone(), QueryClient::default());
        (api, DebouncedSearch::new(queries))
    }

    #[test]
    fn sanitizes_to_upper_alphanumerics() {
        assert_eq!(sanitize_search_input("eth/usd 2"), "ETHUSD2");
        assert_eq!(sanitize_search_input("  ?! "), "");
        assert_eq!(sanitize_search_input("دوج"), "");
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_input_is_sent() {
        let (api, search) = search();
        let mut updates = search.subscribe();

        search.input("b");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("bt");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("btc");

        let state = updates
            .wait_for(|state| !state.is_searching && state.results.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.query, "BTC");
        assert_eq!(state.results.unwrap()[0].symbol, "BTC");
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*api.seen.lock().unwrap(), vec!["BTC".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_clears_without_fetch() {
        let (api, search) = search();
        search.input("sol");
        search.input("  ");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = search.state();
        assert!(state.query.is_empty());
        assert!(state.results.is_none());
        assert!(!state.is_searching);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
