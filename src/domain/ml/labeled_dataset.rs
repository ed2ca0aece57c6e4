use crate::domain::market::RegimeLabel;
use crate::domain::ml::feature_registry::FeatureRow;
use serde::{Deserialize, Serialize};

/// A training row tagged with its cluster assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub row: FeatureRow,
    pub cluster: usize,
    pub regime: Option<RegimeLabel>,
}

/// Clustered history for one symbol/interval, oldest first.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub symbol: String,
    pub interval: String,
    pub samples: Vec<LabeledSample>,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_any_label(&self) -> bool {
        self.samples.iter().any(|s| s.regime.is_some())
    }

    /// Pairs each sample with the regime of the sample after it.
    ///
    /// The last sample has no successor and is dropped, as is any sample
    /// whose successor is unlabeled.
    pub fn with_next_state(&self) -> Vec<(&LabeledSample, RegimeLabel)> {
        self.samples
            .windows(2)
            .filter_map(|pair| pair[1].regime.map(|next| (&pair[0], next)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::FeatureVector;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(i: i64, regime: Option<RegimeLabel>) -> LabeledSample {
        let features = FeatureVector {
            ret: 0.0,
            volatility_7: 0.0,
            volatility_14: 0.0,
            ma_7: 0.0,
            ma_14: 0.0,
            ma_50: 0.0,
            ma_slope: 0.0,
            rsi_14: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            volume_change: 0.0,
        };
        LabeledSample {
            row: FeatureRow {
                open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
                close: 100.0 + i as f64,
                features,
                future_return: Some(0.0),
            },
            cluster: 0,
            regime,
        }
    }

    #[test]
    fn test_last_sample_has_no_next_state() {
        let dataset = LabeledDataset {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            samples: vec![
                sample(0, Some(RegimeLabel::Bullish)),
                sample(1, Some(RegimeLabel::Bearish)),
                sample(2, Some(RegimeLabel::Sideway)),
            ],
        };

        let pairs = dataset.with_next_state();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1, RegimeLabel::Bearish);
        assert_eq!(pairs[1].1, RegimeLabel::Sideway);
        assert_eq!(pairs[1].0.row.close, 101.0);
    }

    #[test]
    fn test_unlabeled_successor_is_skipped() {
        let dataset = LabeledDataset {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            samples: vec![
                sample(0, Some(RegimeLabel::Bullish)),
                sample(1, None),
                sample(2, Some(RegimeLabel::Bearish)),
            ],
        };

        let pairs = dataset.with_next_state();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.row.close, 101.0);
        assert!(dataset.has_any_label());
    }
}
