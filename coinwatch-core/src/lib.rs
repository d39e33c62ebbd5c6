//! Domain types shared across the coinwatch crates.
//!
//! This crate has no I/O. It defines the vocabulary the other crates speak:
//!
//! - [`QueryKey`] and [`KeyScope`] - structured cache keys for list, history,
//!   detail and search queries, with symbol sets normalized so equivalent
//!   requests collapse onto one entry
//! - [`QueryValue`] - cached data stamped with its fetch time and staleness
//!   window
//! - [`UserProfile`] and [`PremiumStatus`] - the authenticated user and the
//!   client-computed premium entitlement
//! - [`HistorySeries`] and [`PricePoint`] - price history, always ascending by
//!   timestamp
//! - [`Coin`] and [`Page`] - latest-price listings and pagination metadata
//! - [`RedirectTarget`] - where access checks send a denied visitor
//!
//! ```
//! use coinwatch_core::QueryKey;
//!
//! let a = QueryKey::history(["eth", "BTC"]);
//! let b = QueryKey::history(["btc", "eth", "ETH"]);
//! assert_eq!(a, b);
//! assert_eq!(a.to_string(), "history:symbols=BTC,ETH");
//! ```

#![warn(missing_docs)]

pub mod history;
pub mod key;
pub mod market;
pub mod profile;
pub mod redirect;
pub mod value;

pub use history::{HistorySeries, PricePoint};
pub use key::{KeyPart, KeyScope, QueryKey, QueryKind, normalize_symbols};
pub use market::{Coin, Page};
pub use profile::{PremiumStatus, UserProfile};
pub use redirect::RedirectTarget;
pub use value::{Freshness, QueryValue};
