//! Query and cache layer for coinwatch.
//!
//! A [`QueryClient`] keeps fetched data in a moka store under structured
//! [`QueryKey`]s and makes sure concurrent readers of one key share a single
//! fetch. Data carries a staleness deadline from its [`QueryPolicy`]: fresh
//! data is served directly, stale data is refetched, and invalidation marks
//! entries stale without dropping them.
//!
//! [`QueryObserver`]s keep a query live: they refetch on the policy's
//! interval, react to invalidation, and publish snapshots through a `watch`
//! channel until dropped.
//!
//! [`CryptoQueries`] wires the market data endpoints into this layer and adds
//! the dashboard actions (`refresh_list`, `refresh_history`, `refresh_all`,
//! `prefetch_list`). [`DebouncedSearch`] drives the search box.
//!
//! ```no_run
//! use std::sync::Arc;
//! use coinwatch::{CryptoQueries, QueryClient};
//! use coinwatch_client::{ApiClient, ClientConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(ApiClient::new(ClientConfig::from_env()?)?);
//! let crypto = CryptoQueries::new(api, QueryClient::default());
//!
//! let view = crypto.with_history(1).await?;
//! for coin in &view.coins.items {
//!     let points = view.history.get(coin.symbol.as_str()).map_or(0, Vec::len);
//!     println!("{} {:?} ({points} points)", coin.symbol, coin.price_usd);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod concurrency;
pub mod crypto;
pub mod error;
/// Metrics for query lookups, fetches and background tasks. Recording is a
/// no-op without the `metrics` feature.
pub mod metrics;
pub mod observer;
pub mod policy;
pub mod retry;
pub mod search;
pub mod store;
pub mod tasks;

pub use client::{QueryClient, QueryClientConfig, QueryEvent};
pub use crypto::{CryptoQueries, CryptoWithHistory, MarketData};
pub use error::{QueryError, QueryResult};
pub use observer::{QueryObserver, QuerySnapshot, QueryStatus};
pub use policy::{MaxRetries, QueryPolicy, RetryPolicy};
pub use search::{DebouncedSearch, SearchState};

pub use coinwatch_core::{Freshness, KeyScope, QueryKey, QueryKind, QueryValue};
