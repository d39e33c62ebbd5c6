//! Structured query keys.
//!
//! Every cached query is identified by a [`QueryKey`]: a resource kind plus an
//! ordered list of [`KeyPart`]s. Keys are built through the constructors on
//! [`QueryKey`] so that parameters are normalized the same way everywhere:
//!
//! - symbol sets are trimmed, upper-cased, sorted and de-duplicated
//! - single symbols are upper-cased
//! - search terms are trimmed and lower-cased
//!
//! ## Format
//!
//! When displayed, keys follow `{kind}:key1=value1&key2=value2`.
//!
//! ```
//! use coinwatch_core::{KeyScope, QueryKey, QueryKind};
//!
//! assert_eq!(QueryKey::list(2).to_string(), "list:page=2");
//! assert_eq!(QueryKey::detail("btc").to_string(), "detail:symbol=BTC");
//! assert_eq!(
//!     QueryKey::coin_history("eth", "7d").to_string(),
//!     "history:symbols=ETH&interval=7d"
//! );
//!
//! let key = QueryKey::history(["sol"]);
//! assert!(key.matches(&KeyScope::Kind(QueryKind::History)));
//! assert!(!key.matches(&KeyScope::Kind(QueryKind::List)));
//! ```
//!
//! [`QueryKey`] wraps its data in an `Arc`, so cloning a key only bumps a
//! reference count. Keys are cloned into every in-flight registry, store and
//! background task that touches them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Resource kind a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Paginated latest-price listing.
    List,
    /// Price history for a symbol set, optionally at a fixed interval.
    History,
    /// Latest price and stats for one symbol.
    Detail,
    /// Point-in-time symbol search.
    Search,
}

impl QueryKind {
    /// Returns the lowercase name used in key display and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::List => "list",
            QueryKind::History => "history",
            QueryKind::Detail => "detail",
            QueryKind::Search => "search",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `name=value` component of a query key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl KeyPart {
    /// Creates a key part. A `None` value renders as the bare name.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the part name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the part value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKeyInner {
    kind: QueryKind,
    parts: Vec<KeyPart>,
}

/// Identity of a cached query.
///
/// Two keys are equal when their kind and every part match, so requests that
/// normalize to the same parameters share one cache entry and one in-flight
/// fetch.
#[derive(Clone)]
pub struct QueryKey {
    inner: Arc<QueryKeyInner>,
}

impl QueryKey {
    /// Creates a key from raw parts. Prefer the typed constructors.
    pub fn new(kind: QueryKind, parts: Vec<KeyPart>) -> Self {
        QueryKey {
            inner: Arc::new(QueryKeyInner { kind, parts }),
        }
    }

    /// Key for one page of the latest-price listing.
    pub fn list(page: u32) -> Self {
        Self::new(
            QueryKind::List,
            vec![KeyPart::new("page", Some(page.to_string()))],
        )
    }

    /// Key for the history of a symbol set.
    ///
    /// The set is normalized, so `["eth", "BTC"]` and `["BTC", "ETH", "eth"]`
    /// produce the same key.
    pub fn history<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(QueryKind::History, vec![symbols_part(symbols)])
    }

    /// Key for one coin's history at a given interval (e.g. `"7d"`).
    pub fn coin_history(symbol: &str, interval: &str) -> Self {
        Self::new(
            QueryKind::History,
            vec![
                symbols_part([symbol]),
                KeyPart::new("interval", Some(interval.trim())),
            ],
        )
    }

    /// Key for one coin's details.
    pub fn detail(symbol: &str) -> Self {
        Self::new(
            QueryKind::Detail,
            vec![KeyPart::new("symbol", Some(symbol.trim().to_uppercase()))],
        )
    }

    /// Key for a search term.
    pub fn search(query: &str) -> Self {
        Self::new(
            QueryKind::Search,
            vec![KeyPart::new("q", Some(query.trim().to_lowercase()))],
        )
    }

    /// Returns the resource kind.
    pub fn kind(&self) -> QueryKind {
        self.inner.kind
    }

    /// Returns the key parts in construction order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.inner.parts
    }

    /// Returns the value of the named part.
    pub fn part(&self, name: &str) -> Option<&str> {
        self.inner
            .parts
            .iter()
            .find(|part| part.key() == name)
            .and_then(KeyPart::value)
    }

    /// Returns `true` if this key falls inside `scope`.
    pub fn matches(&self, scope: &KeyScope) -> bool {
        match scope {
            KeyScope::All => true,
            KeyScope::Kind(kind) => self.inner.kind == *kind,
            KeyScope::Exact(key) => self == key,
            KeyScope::HistoryOf(symbols) => {
                self.inner.kind == QueryKind::History && self.mentions_any(symbols)
            }
        }
    }

    fn mentions_any(&self, symbols: &[SmolStr]) -> bool {
        let single = self.part("symbol").into_iter();
        let set = self
            .part("symbols")
            .into_iter()
            .flat_map(|joined| joined.split(','));
        single
            .chain(set)
            .any(|symbol| symbols.iter().any(|wanted| wanted.eq_ignore_ascii_case(symbol)))
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({})", self)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.inner.kind)?;
        for (i, part) in self.inner.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Selects a group of keys, used for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// Every key.
    All,
    /// Every key of one kind.
    Kind(QueryKind),
    /// One exact key.
    Exact(QueryKey),
    /// Every history key that covers at least one of these symbols, whether
    /// as a single symbol or as a member of a symbol set.
    HistoryOf(Vec<SmolStr>),
}

impl KeyScope {
    /// History keys covering any of `symbols`, normalized.
    pub fn history_of<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        KeyScope::HistoryOf(normalize_symbols(symbols))
    }
}

impl From<QueryKey> for KeyScope {
    fn from(key: QueryKey) -> Self {
        KeyScope::Exact(key)
    }
}

impl From<QueryKind> for KeyScope {
    fn from(kind: QueryKind) -> Self {
        KeyScope::Kind(kind)
    }
}

/// Normalizes a symbol set: trimmed, upper-cased, empty entries dropped,
/// sorted and de-duplicated.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<SmolStr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<SmolStr> = symbols
        .into_iter()
        .map(|symbol| symbol.as_ref().trim().to_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .map(SmolStr::from)
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn symbols_part<I, S>(symbols: I) -> KeyPart
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = normalize_symbols(symbols).join(",");
    KeyPart::new("symbols", Some(joined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equivalent_symbol_sets_collapse() {
        let keys: HashSet<QueryKey> = [
            QueryKey::history(["btc", "eth"]),
            QueryKey::history(["ETH", "BTC"]),
            QueryKey::history([" eth ", "btc", "BTC", ""]),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn distinct_parameters_stay_distinct() {
        assert_ne!(QueryKey::list(1), QueryKey::list(2));
        assert_ne!(QueryKey::history(["BTC"]), QueryKey::coin_history("BTC", "7d"));
        assert_ne!(QueryKey::detail("BTC"), QueryKey::search("btc"));
    }

    #[test]
    fn search_terms_are_case_insensitive() {
        assert_eq!(QueryKey::search("  BtC "), QueryKey::search("btc"));
        assert_eq!(QueryKey::search("BTC").part("q"), Some("btc"));
    }

    #[test]
    fn scope_matching() {
        let list = QueryKey::list(3);
        assert!(list.matches(&KeyScope::All));
        assert!(list.matches(&QueryKind::List.into()));
        assert!(list.matches(&QueryKey::list(3).into()));
        assert!(!list.matches(&QueryKey::list(4).into()));
    }

    #[test]
    fn history_scope_covers_sets_and_single_symbols() {
        let scope = KeyScope::history_of(["btc"]);
        assert!(QueryKey::history(["ETH", "BTC"]).matches(&scope));
        assert!(QueryKey::coin_history("btc", "30d").matches(&scope));
        assert!(!QueryKey::history(["ETH"]).matches(&scope));
        assert!(!QueryKey::detail("BTC").matches(&scope));
        assert!(!QueryKey::history(["BTCB"]).matches(&scope));
    }

    #[test]
    fn normalize_drops_blanks_and_duplicates() {
        let symbols = normalize_symbols(["sol", " ", "btc", "Sol"]);
        assert_eq!(symbols, vec![SmolStr::new("BTC"), SmolStr::new("SOL")]);
    }
}
