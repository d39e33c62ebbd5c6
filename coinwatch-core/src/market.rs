//! Latest-price listings.

use serde::{Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;

/// One coin from the latest-prices endpoint.
///
/// Numeric fields arrive either as JSON numbers or as decimal strings
/// depending on the backend serializer, so both are accepted. Unparseable
/// values become `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Ticker symbol, e.g. `BTC`.
    pub symbol: SmolStr,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Logo image URL.
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Latest price in USD.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_usd: Option<f64>,
    /// 24 hour change in percent.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_24h_percent: Option<f64>,
    /// Market capitalization in USD.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap_usd: Option<f64>,
    /// 24 hour traded volume in USD.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume_24h_usd: Option<f64>,
    /// Circulating supply.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub circulating_supply: Option<f64>,
    /// Total supply.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_supply: Option<f64>,
    /// Maximum supply, if capped.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_supply: Option<f64>,
    /// All-time high.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ath: Option<f64>,
    /// All-time low.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub atl: Option<f64>,
    /// Rank by market cap.
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
}

impl Coin {
    /// Returns the upper-cased symbol.
    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_uppercase()
    }
}

/// One page of a paginated listing plus whatever pagination metadata the
/// backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub count: Option<u64>,
    /// Total number of pages, when sent directly.
    pub total_pages: Option<u32>,
    /// URL of the next page.
    pub next: Option<String>,
    /// URL of the previous page.
    pub previous: Option<String>,
}

impl<T> Page<T> {
    /// A page with only items and no metadata.
    pub fn from_items(items: Vec<T>) -> Self {
        Page {
            items,
            count: None,
            total_pages: None,
            next: None,
            previous: None,
        }
    }

    /// Works out the page count.
    ///
    /// `count` wins when present (`max(1, ceil(count / page_size))`), then an
    /// explicit `total_pages`. A short first page means there is exactly one
    /// page. Otherwise the total is unknown.
    pub fn resolve_total_pages(&self, page: u32, page_size: u32) -> Option<u32> {
        if let Some(count) = self.count {
            let size = u64::from(page_size.max(1));
            let pages = count.div_ceil(size).max(1);
            return Some(u32::try_from(pages).unwrap_or(u32::MAX));
        }
        if let Some(total) = self.total_pages {
            return Some(total);
        }
        if page <= 1 && self.items.len() < page_size as usize {
            return Some(1);
        }
        None
    }

    /// Returns `true` if a page after `page` is known to exist.
    pub fn has_next(&self, page: u32, page_size: u32) -> bool {
        match self.resolve_total_pages(page, page_size) {
            Some(total) => page < total,
            None => self.next.is_some(),
        }
    }

    /// Maps the items, keeping the metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            total_pages: self.total_pages,
            next: self.next,
            previous: self.previous,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_accepts_numeric_strings() {
        let coin: Coin = serde_json::from_value(serde_json::json!({
            "symbol": "btc",
            "name": "Bitcoin",
            "price_usd": "64000.5",
            "change_24h_percent": -1.25,
            "max_supply": null,
            "ath": "n/a",
            "market_cap_rank": 1
        }))
        .unwrap();
        assert_eq!(coin.price_usd, Some(64000.5));
        assert_eq!(coin.change_24h_percent, Some(-1.25));
        assert_eq!(coin.max_supply, None);
        assert_eq!(coin.ath, None);
        assert_eq!(coin.normalized_symbol(), "BTC");
    }

    #[test]
    fn total_pages_prefers_count() {
        let mut page = Page::from_items(vec![(); 25]);
        page.count = Some(51);
        page.total_pages = Some(9);
        assert_eq!(page.resolve_total_pages(1, 25), Some(3));

        page.count = Some(0);
        assert_eq!(page.resolve_total_pages(1, 25), Some(1));
    }

    #[test]
    fn total_pages_fallbacks() {
        let mut page = Page::from_items(vec![(); 25]);
        page.total_pages = Some(4);
        assert_eq!(page.resolve_total_pages(2, 25), Some(4));

        let short = Page::from_items(vec![(); 3]);
        assert_eq!(short.resolve_total_pages(1, 25), Some(1));

        let full = Page::from_items(vec![(); 25]);
        assert_eq!(full.resolve_total_pages(1, 25), None);
        assert!(!full.has_next(1, 25));
    }
}
