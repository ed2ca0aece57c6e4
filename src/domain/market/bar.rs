use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One time-bucketed OHLCV bar as delivered by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
    #[serde(default)]
    pub quote_asset_volume: f64,
    #[serde(default)]
    pub trade_count: u64,
    #[serde(default)]
    pub taker_buy_base: f64,
    #[serde(default)]
    pub taker_buy_quote: f64,
}

impl Bar {
    /// Builds a bar carrying only the OHLCV core; extended fields are zeroed.
    pub fn ohlcv(
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
            quote_asset_volume: 0.0,
            trade_count: 0,
            taker_buy_base: 0.0,
            taker_buy_quote: 0.0,
        }
    }
}

/// The bar history ingested for one asset, ordered by `open_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: String,
    pub interval: String,
    pub fetched_at: Option<DateTime<Utc>>,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|bar| bar.open_time);
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            fetched_at: None,
            bars,
        }
    }

    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Price and volume overview of the whole series. `None` when empty.
    pub fn summary(&self) -> Option<SeriesSummary> {
        let first = self.bars.first()?;
        let last = self.bars.last()?;

        let high = self
            .bars
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let low = self.bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let total_volume: f64 = self.bars.iter().map(|b| b.volume).sum();

        let absolute_change = last.close - first.close;
        let percent_change = if first.close == 0.0 {
            0.0
        } else {
            absolute_change / first.close * 100.0
        };

        Some(SeriesSummary {
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            bar_count: self.bars.len(),
            start: first.open_time,
            end: last.close_time,
            first_close: first.close,
            last_close: last.close,
            absolute_change,
            percent_change,
            high,
            low,
            total_volume,
            average_volume: total_volume / self.bars.len() as f64,
            fetched_at: self.fetched_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub symbol: String,
    pub interval: String,
    pub bar_count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub first_close: f64,
    pub last_close: f64,
    pub absolute_change: f64,
    pub percent_change: f64,
    pub high: f64,
    pub low: f64,
    pub total_volume: f64,
    pub average_volume: f64,
    pub fetched_at: Option<DateTime<Utc>>,
}
