//! Price history series.
//!
//! The backend does not promise any ordering for history points, so a
//! [`HistorySeries`] sorts its points oldest-first on construction. Every
//! derived value (sparkline values, trend) is computed from that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One `(timestamp, price)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Price in USD.
    pub price: f64,
}

impl PricePoint {
    /// Creates a point.
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        PricePoint { timestamp, price }
    }
}

/// Price history for one symbol, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawHistorySeries")]
pub struct HistorySeries {
    symbol: SmolStr,
    points: Vec<PricePoint>,
}

/// Wire form. Deserialized series are rebuilt through [`HistorySeries::new`].
#[derive(Deserialize)]
struct RawHistorySeries {
    symbol: SmolStr,
    points: Vec<PricePoint>,
}

impl From<RawHistorySeries> for HistorySeries {
    fn from(raw: RawHistorySeries) -> Self {
        HistorySeries::new(raw.symbol, raw.points)
    }
}

impl HistorySeries {
    /// Builds a series, sorting `points` oldest-first.
    ///
    /// The sort is stable: points sharing a timestamp keep their input order,
    /// so sorting an already sorted series is a no-op.
    pub fn new(symbol: impl AsRef<str>, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|point| point.timestamp);
        HistorySeries {
            symbol: SmolStr::new(symbol.as_ref().trim().to_uppercase()),
            points,
        }
    }

    /// An empty series. Used when a symbol's history could not be loaded.
    pub fn empty(symbol: impl AsRef<str>) -> Self {
        Self::new(symbol, Vec::new())
    }

    /// Returns the upper-cased symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the points, oldest first.
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Returns just the prices, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.price).collect()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Oldest point.
    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    /// Newest point.
    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Percent change from the oldest to the newest price.
    ///
    /// `None` with fewer than two points or a zero starting price.
    pub fn trend(&self) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }
        let first = self.first()?.price;
        let last = self.last()?.price;
        if first == 0.0 {
            return None;
        }
        Some((last - first) / first * 100.0)
    }

    /// Returns `true` if timestamps never decrease.
    pub fn is_ascending(&self) -> bool {
        self.points
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }
}
