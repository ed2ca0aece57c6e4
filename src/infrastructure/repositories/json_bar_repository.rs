//! File-backed bar repository reading the kline JSON files written by the
//! data collector: one `{kline_dir}/{asset lower}.json` per ticker.

use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::{Bar, BarSeries};
use crate::domain::repositories::BarRepository;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

/// Exchange payloads carry prices as strings and counters as numbers;
/// both shapes are accepted for every field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct KlineFile {
    symbol: String,
    interval: String,
    #[serde(default)]
    timestamp: Option<String>,
    klines: Vec<Vec<Numeric>>,
}

pub struct JsonBarRepository {
    kline_dir: PathBuf,
}

impl JsonBarRepository {
    pub fn new(kline_dir: impl Into<PathBuf>) -> Self {
        Self {
            kline_dir: kline_dir.into(),
        }
    }

    fn path_for(&self, asset: &str) -> PathBuf {
        self.kline_dir.join(format!("{}.json", asset.to_lowercase()))
    }
}

impl BarRepository for JsonBarRepository {
    fn load(&self, asset: &str) -> RegimeResult<BarSeries> {
        let path = self.path_for(asset);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RegimeError::BarsNotFound {
                    asset: asset.to_uppercase(),
                });
            }
            Err(e) => return Err(RegimeError::storage(&path, e)),
        };

        let file: KlineFile = serde_json::from_str(&content).map_err(|e| malformed(asset, e.to_string()))?;

        let mut bars = Vec::with_capacity(file.klines.len());
        for (idx, row) in file.klines.iter().enumerate() {
            bars.push(parse_kline(row).map_err(|reason| malformed(asset, format!("kline {}: {}", idx, reason)))?);
        }

        let fetched_at = file.timestamp.as_deref().and_then(parse_fetched_at);
        if file.timestamp.is_some() && fetched_at.is_none() {
            warn!("Ignoring unparseable fetch timestamp for {}", asset.to_uppercase());
        }

        info!("Loaded {} klines for {}", bars.len(), asset.to_uppercase());
        let series = BarSeries::new(file.symbol, file.interval, bars);
        Ok(match fetched_at {
            Some(at) => series.with_fetched_at(at),
            None => series,
        })
    }

    fn list_assets(&self) -> RegimeResult<Vec<String>> {
        let entries = match fs::read_dir(&self.kline_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegimeError::storage(&self.kline_dir, e)),
        };

        let mut assets = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| RegimeError::storage(&self.kline_dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    assets.push(stem.to_uppercase());
                }
            }
        }
        assets.sort();
        Ok(assets)
    }
}

fn malformed(asset: &str, reason: String) -> RegimeError {
    RegimeError::MalformedBars {
        asset: asset.to_uppercase(),
        reason,
    }
}

/// `[open_ms, open, high, low, close, volume, close_ms, quote_volume,
/// trades, taker_base, taker_quote, ignore]`; only the first seven are
/// required.
fn parse_kline(row: &[Numeric]) -> Result<Bar, String> {
    if row.len() < 7 {
        return Err(format!("expected at least 7 fields, got {}", row.len()));
    }

    let field = |i: usize| -> Result<f64, String> {
        row[i]
            .as_f64()
            .ok_or_else(|| format!("field {} is not numeric: {:?}", i, row[i]))
    };
    let optional = |i: usize| row.get(i).and_then(Numeric::as_f64).unwrap_or(0.0);
    let instant = |i: usize| -> Result<DateTime<Utc>, String> {
        let ms = field(i)?;
        DateTime::from_timestamp_millis(ms as i64).ok_or_else(|| format!("field {} is not a valid timestamp", i))
    };

    Ok(Bar {
        open_time: instant(0)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
        close_time: instant(6)?,
        quote_asset_volume: optional(7),
        trade_count: optional(8).max(0.0) as u64,
        taker_buy_base: optional(9),
        taker_buy_quote: optional(10),
    })
}

/// The collector writes a naive local ISO timestamp; RFC 3339 is also
/// accepted.
fn parse_fetched_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}
