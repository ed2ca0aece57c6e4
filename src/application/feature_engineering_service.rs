use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::BarSeries;
use crate::domain::ml::feature_registry::{
    FeatureDataset, FeatureRow, FeatureVector, MA_LONG_WINDOW, MA_MEDIUM_WINDOW, MA_SHORT_WINDOW,
    MACD_FAST, MACD_SIGNAL, MACD_SLOW, MAX_WINDOW, RSI_WINDOW, VOLATILITY_LONG_WINDOW,
    VOLATILITY_SHORT_WINDOW,
};
use statrs::statistics::Statistics;
use ta::Next;
use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage};
use tracing::debug;

/// Turns a bar series into indicator feature rows.
///
/// Stateless: indicators are rebuilt on every call so training and
/// inference always see the same warm-up.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Rows carrying `future_return`; the last bar is excluded.
    pub fn training_rows(&self, series: &BarSeries) -> RegimeResult<FeatureDataset> {
        self.compute(series, true)
    }

    /// Rows for prediction; includes the latest bar, never a forward target.
    pub fn inference_rows(&self, series: &BarSeries) -> RegimeResult<FeatureDataset> {
        self.compute(series, false)
    }

    fn compute(&self, series: &BarSeries, training: bool) -> RegimeResult<FeatureDataset> {
        let bars = series.bars();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let returns = pct_change(&closes);
        let volume_changes = pct_change(&volumes);
        let deltas: Vec<Option<f64>> = (0..closes.len())
            .map(|i| (i > 0).then(|| closes[i] - closes[i - 1]))
            .collect();
        let gains: Vec<Option<f64>> = deltas.iter().map(|d| d.map(|d| d.max(0.0))).collect();
        let losses: Vec<Option<f64>> = deltas.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();

        let mut ma_short = SimpleMovingAverage::new(MA_SHORT_WINDOW).map_err(indicator_error)?;
        let mut ma_medium = SimpleMovingAverage::new(MA_MEDIUM_WINDOW).map_err(indicator_error)?;
        let mut ma_long = SimpleMovingAverage::new(MA_LONG_WINDOW).map_err(indicator_error)?;
        let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
            .map_err(indicator_error)?;

        let mut rows = Vec::new();
        let mut dropped = 0usize;

        for (i, bar) in bars.iter().enumerate() {
            let close = closes[i];
            // Indicators must see every bar, including warm-up ones
            let ma_7 = ma_short.next(close);
            let ma_14 = ma_medium.next(close);
            let ma_50 = ma_long.next(close);
            let macd_out = macd.next(close);

            if i < MAX_WINDOW {
                continue;
            }

            let future_return = if training {
                match closes.get(i + 1) {
                    Some(next) => Some(next / close - 1.0),
                    None => continue,
                }
            } else {
                None
            };

            let row = (|| {
                let avg_gain = trailing_mean(&gains, i, RSI_WINDOW)?;
                let avg_loss = trailing_mean(&losses, i, RSI_WINDOW)?;
                let features = FeatureVector {
                    ret: returns[i]?,
                    volatility_7: trailing_std(&returns, i, VOLATILITY_SHORT_WINDOW)?,
                    volatility_14: trailing_std(&returns, i, VOLATILITY_LONG_WINDOW)?,
                    ma_7,
                    ma_14,
                    ma_50,
                    ma_slope: ma_7 - ma_14,
                    rsi_14: relative_strength_index(avg_gain, avg_loss)?,
                    macd: macd_out.macd,
                    macd_signal: macd_out.signal,
                    volume_change: volume_changes[i]?,
                };
                let complete = features.is_finite() && future_return.is_none_or(f64::is_finite);
                complete.then(|| FeatureRow {
                    open_time: bar.open_time,
                    close,
                    features,
                    future_return,
                })
            })();

            match row {
                Some(row) => rows.push(row),
                None => dropped += 1,
            }
        }

        if rows.is_empty() {
            let needed = MAX_WINDOW + if training { 2 } else { 1 };
            return Err(RegimeError::insufficient(format!(
                "not enough data to compute features for {} ({}): got {} bars, need at least {} with defined indicators",
                series.symbol,
                series.interval,
                bars.len(),
                needed
            )));
        }

        debug!(
            "Computed {} feature rows for {} ({}) from {} bars ({} incomplete rows dropped)",
            rows.len(),
            series.symbol,
            series.interval,
            bars.len(),
            dropped
        );

        Ok(FeatureDataset {
            symbol: series.symbol.clone(),
            interval: series.interval.clone(),
            rows,
        })
    }
}

fn indicator_error<E: std::fmt::Debug>(e: E) -> RegimeError {
    RegimeError::Indicator(format!("{:?}", e))
}

/// `values[i] / values[i - 1] - 1`; undefined for the first element and
/// for non-finite results.
fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i == 0 {
                return None;
            }
            let change = values[i] / values[i - 1] - 1.0;
            change.is_finite().then_some(change)
        })
        .collect()
}

fn trailing_window(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    if end + 1 < window {
        return None;
    }
    values[end + 1 - window..=end].iter().copied().collect()
}

fn trailing_mean(values: &[Option<f64>], end: usize, window: usize) -> Option<f64> {
    trailing_window(values, end, window).map(|w| w.iter().mean())
}

/// Sample standard deviation (n - 1) over the trailing window.
fn trailing_std(values: &[Option<f64>], end: usize, window: usize) -> Option<f64> {
    trailing_window(values, end, window).map(|w| w.iter().std_dev())
}

/// RSI from simple-mean gains and losses. A window without losses reads 100
/// unless it also has no gains, in which case RSI is undefined.
fn relative_strength_index(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
