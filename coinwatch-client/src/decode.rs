//! Decoders for the backend's response shapes.
//!
//! Each decoder lists the shapes it accepts. Anything else is a
//! [`Failure::Decode`](crate::Failure::Decode) error rather than an empty
//! result.

use chrono::{DateTime, NaiveDateTime, Utc};
use coinwatch_core::{HistorySeries, Page, PricePoint, UserProfile};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
#[serde(untagged)]
enum PageShape<T> {
    Results {
        results: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        total_pages: Option<u32>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    Items {
        items: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        total_pages: Option<u32>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    Data {
        data: Vec<T>,
    },
    Bare(Vec<T>),
}

/// Decodes a paginated listing.
///
/// Accepts `{results, count?, total_pages?, next?, previous?}`, the same with
/// `items`, `{data: [...]}` and a bare array.
pub fn decode_page<T: DeserializeOwned>(body: Value) -> ApiResult<Page<T>> {
    let shape: PageShape<T> =
        serde_json::from_value(body).map_err(|error| ApiError::decode("page", error))?;
    Ok(match shape {
        PageShape::Results {
            results: items,
            count,
            total_pages,
            next,
            previous,
        }
        | PageShape::Items {
            items,
            count,
            total_pages,
            next,
            previous,
        } => Page {
            items,
            count,
            total_pages,
            next,
            previous,
        },
        PageShape::Data { data } => Page::from_items(data),
        PageShape::Bare(items) => Page::from_items(items),
    })
}

#[derive(Deserialize)]
struct RawSeries {
    #[serde(default)]
    symbol: Option<String>,
    points: Vec<(Value, Value)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryShape {
    List(Vec<RawSeries>),
    Results { results: Vec<RawSeries> },
    Single(RawSeries),
}

/// Decodes price history.
///
/// Accepts an array of `{symbol?, points}`, `{results: [...]}` and a single
/// `{symbol?, points}`. Points are `[timestamp, price]` pairs where the
/// timestamp is RFC 3339 or epoch seconds/milliseconds and the price is a
/// number or a numeric string. A series without a symbol takes `fallback`.
pub fn decode_history(body: Value, fallback: Option<&str>) -> ApiResult<Vec<HistorySeries>> {
    let shape: HistoryShape =
        serde_json::from_value(body).map_err(|error| ApiError::decode("history", error))?;
    let raw = match shape {
        HistoryShape::List(series) | HistoryShape::Results { results: series } => series,
        HistoryShape::Single(series) => vec![series],
    };
    raw.into_iter()
        .map(|series| {
            let symbol = series
                .symbol
                .map(SmolStr::from)
                .or_else(|| fallback.map(SmolStr::from))
                .unwrap_or_default();
            let points = series
                .points
                .into_iter()
                .map(|(timestamp, price)| decode_point(&timestamp, &price))
                .collect::<ApiResult<Vec<_>>>()?;
            Ok(HistorySeries::new(symbol, points))
        })
        .collect()
}

fn decode_point(timestamp: &Value, price: &Value) -> ApiResult<PricePoint> {
    let timestamp = parse_timestamp(timestamp)
        .ok_or_else(|| ApiError::decode("history", format!("bad timestamp {timestamp}")))?;
    let price = match price {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ApiError::decode("history", format!("bad price {price}")))?;
    Ok(PricePoint::new(timestamp, price))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(number) => {
            let raw = number.as_i64()?;
            // Anything past year 5138 in seconds is read as milliseconds.
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileShape {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

/// Decodes the profile endpoint: a bare profile or `{user: {...}}`.
pub fn decode_profile(body: Value) -> ApiResult<UserProfile> {
    let shape: ProfileShape =
        serde_json::from_value(body).map_err(|error| ApiError::decode("profile", error))?;
    Ok(match shape {
        ProfileShape::Wrapped { user } | ProfileShape::Bare(user) => user,
    })
}
