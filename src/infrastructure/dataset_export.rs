use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::RegimeLabel;
use crate::domain::ml::labeled_dataset::LabeledDataset;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// One flattened CSV line of the labeled training history.
#[derive(Debug, Clone, Serialize)]
struct LabeledRecord {
    open_time: i64,
    symbol: String,
    close: f64,
    // Flattened features
    #[serde(rename = "return")]
    ret: f64,
    volatility_7: f64,
    volatility_14: f64,
    ma_7: f64,
    ma_14: f64,
    ma_50: f64,
    ma_slope: f64,
    rsi_14: f64,
    macd: f64,
    macd_signal: f64,
    volume_change: f64,
    // Labels
    future_return_1: Option<f64>,
    cluster: usize,
    market_state: Option<RegimeLabel>,
    next_state: Option<RegimeLabel>,
}

/// Writes `dataset` to `path` as CSV with a header line, replacing any
/// existing file. Returns the number of records written.
pub fn export_labeled_dataset(dataset: &LabeledDataset, path: &Path) -> RegimeResult<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RegimeError::storage(parent, e))?;
    }

    let mut wtr = csv::Writer::from_path(path).map_err(|e| RegimeError::storage(path, e.into()))?;

    for (idx, sample) in dataset.samples.iter().enumerate() {
        let f = &sample.row.features;
        let record = LabeledRecord {
            open_time: sample.row.open_time.timestamp_millis(),
            symbol: dataset.symbol.clone(),
            close: sample.row.close,
            ret: f.ret,
            volatility_7: f.volatility_7,
            volatility_14: f.volatility_14,
            ma_7: f.ma_7,
            ma_14: f.ma_14,
            ma_50: f.ma_50,
            ma_slope: f.ma_slope,
            rsi_14: f.rsi_14,
            macd: f.macd,
            macd_signal: f.macd_signal,
            volume_change: f.volume_change,
            future_return_1: sample.row.future_return,
            cluster: sample.cluster,
            market_state: sample.regime,
            next_state: dataset.samples.get(idx + 1).and_then(|next| next.regime),
        };
        wtr.serialize(record).map_err(|e| RegimeError::storage(path, e.into()))?;
    }
    wtr.flush().map_err(|e| RegimeError::storage(path, e))?;

    info!("Exported {} labeled rows to {:?}", dataset.len(), path);
    Ok(dataset.len())
}
