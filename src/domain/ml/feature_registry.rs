use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered list of feature names.
/// This order MUST match the order of `FeatureVector::to_vec`.
/// Any change here is a breaking change for persisted models.
pub const FEATURE_NAMES: &[&str] = &[
    "return",
    "volatility_7",
    "volatility_14",
    "ma_7",
    "ma_14",
    "ma_50",
    "ma_slope",
    "rsi_14",
    "macd",
    "macd_signal",
    "volume_change",
];

pub const VOLATILITY_SHORT_WINDOW: usize = 7;
pub const VOLATILITY_LONG_WINDOW: usize = 14;
pub const MA_SHORT_WINDOW: usize = 7;
pub const MA_MEDIUM_WINDOW: usize = 14;
pub const MA_LONG_WINDOW: usize = 50;
pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Longest trailing window; rows before this index are warm-up.
pub const MAX_WINDOW: usize = MA_LONG_WINDOW;

/// Owned copy of `FEATURE_NAMES`, as recorded in model artifacts.
pub fn feature_columns() -> Vec<String> {
    FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Indicator snapshot for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "return")]
    pub ret: f64,
    pub volatility_7: f64,
    pub volatility_14: f64,
    pub ma_7: f64,
    pub ma_14: f64,
    pub ma_50: f64,
    pub ma_slope: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub volume_change: f64,
}

impl FeatureVector {
    /// Model input in `FEATURE_NAMES` order.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.ret,
            self.volatility_7,
            self.volatility_14,
            self.ma_7,
            self.ma_14,
            self.ma_50,
            self.ma_slope,
            self.rsi_14,
            self.macd,
            self.macd_signal,
            self.volume_change,
        ]
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_vec()).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }
}

/// A feature vector anchored to its bar.
///
/// `future_return` is the next bar's return. It is only populated on
/// training rows and is never part of the model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub open_time: DateTime<Utc>,
    pub close: f64,
    pub features: FeatureVector,
    pub future_return: Option<f64>,
}

/// Feature rows computed for one symbol/interval.
#[derive(Debug, Clone)]
pub struct FeatureDataset {
    pub symbol: String,
    pub interval: String,
    pub rows: Vec<FeatureRow>,
}

impl FeatureDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|row| row.features.to_vec()).collect()
    }

    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }
}
