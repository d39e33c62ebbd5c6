//! Market data endpoints.

use coinwatch_core::{Coin, HistorySeries, Page, normalize_symbols};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::decode::{decode_history, decode_page};
use crate::error::{ApiError, ApiResult};
use crate::gateway::ApiRequest;

/// Coins per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;
/// Points requested per history series.
pub const DEFAULT_HISTORY_LIMIT: u32 = 8;
/// Interval used for a single coin's chart.
pub const DEFAULT_INTERVAL: &str = "7d";

impl ApiClient {
    /// One page of latest prices, optionally filtered to `symbols`.
    #[instrument(skip(self, symbols))]
    pub async fn latest_prices(
        &self,
        page: u32,
        page_size: u32,
        symbols: Option<&[&str]>,
    ) -> ApiResult<Page<Coin>> {
        let mut url = self.routes.latest_prices.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.max(1).to_string());
            query.append_pair("page_size", &page_size.to_string());
            if let Some(symbols) = symbols {
                query.append_pair("symbols", &join_symbols(symbols.iter().copied()));
            }
        }
        let body = self.get_json(url).await?;
        decode_page(body)
    }

    /// History for a set of symbols. An empty set returns no series without a
    /// network call.
    #[instrument(skip(self, symbols))]
    pub async fn history(
        &self,
        symbols: &[&str],
        interval: Option<&str>,
        limit: u32,
    ) -> ApiResult<Vec<HistorySeries>> {
        let joined = join_symbols(symbols.iter().copied());
        if joined.is_empty() {
            debug!("history requested for no symbols");
            return Ok(Vec::new());
        }
        let mut url = self.routes.price_history.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(interval) = interval {
                query.append_pair("interval", interval);
            }
            query.append_pair("limit", &limit.to_string());
            query.append_pair("symbols", &joined);
        }
        let body = self.get_json(url).await?;
        let fallback = (symbols.len() == 1).then(|| symbols[0]);
        decode_history(body, fallback)
    }

    /// Latest stats for one coin, `None` when the backend doesn't know it.
    pub async fn coin_details(&self, symbol: &str) -> ApiResult<Option<Coin>> {
        let page = self
            .latest_prices(1, DEFAULT_PAGE_SIZE, Some(&[symbol][..]))
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// One coin's history at `interval`. Missing data is an empty series.
    pub async fn coin_history(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> ApiResult<HistorySeries> {
        let series = self.history(&[symbol], Some(interval), limit).await?;
        Ok(series
            .into_iter()
            .next()
            .unwrap_or_else(|| HistorySeries::empty(symbol)))
    }

    /// Coins whose symbol matches `query`. A blank query returns nothing
    /// without a network call.
    pub async fn search(&self, query: &str) -> ApiResult<Vec<Coin>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let page = self
            .latest_prices(1, DEFAULT_PAGE_SIZE, Some(&[query][..]))
            .await?;
        Ok(page.items)
    }

    /// Asks the advisor a question and returns the trimmed answer.
    #[instrument(skip_all)]
    pub async fn ask(&self, question: &str) -> ApiResult<String> {
        let request = ApiRequest::post(self.routes.ai_ask.clone())
            .with_body(serde_json::json!({ "question": question }));
        let body = self.gateway.request(request).await.into_result()?;
        match body.get("answer") {
            Some(Value::String(answer)) => Ok(answer.trim().to_owned()),
            Some(Value::Null) | None => Ok(String::new()),
            Some(other) => Err(ApiError::decode("answer", other)),
        }
    }

    async fn get_json(&self, url: Url) -> ApiResult<Value> {
        self.gateway.request(ApiRequest::get(url)).await.into_result()
    }
}

fn join_symbols<'a>(symbols: impl Iterator<Item = &'a str>) -> String {
    normalize_symbols(symbols).join(",")
}
