use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the market-state pipeline.
///
/// Every component returns these at the point of detection. Nothing is
/// retried internally; callers decide how to report them.
#[derive(Debug, Error)]
pub enum RegimeError {
    #[error("Insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("Model training failed: {0}")]
    ModelTraining(String),

    #[error("Classifier training failed: {0}")]
    ClassifierTraining(String),

    #[error("No trained market-state model found for {symbol} ({interval})")]
    ModelNotFound { symbol: String, interval: String },

    #[error("No trained classifier model found for {symbol} ({interval})")]
    ClassifierModelNotFound { symbol: String, interval: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Kline data not found for {asset}")]
    BarsNotFound { asset: String },

    #[error("Malformed kline data for {asset}: {reason}")]
    MalformedBars { asset: String, reason: String },

    #[error("Incompatible model artifact at {path:?}: {reason}")]
    IncompatibleArtifact { path: PathBuf, reason: String },

    #[error("Indicator error: {0}")]
    Indicator(String),

    #[error("Storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegimeError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        RegimeError::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegimeError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type RegimeResult<T> = Result<T, RegimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_formatting() {
        let error = RegimeError::ClassifierModelNotFound {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
        };

        let msg = error.to_string();
        assert!(msg.contains("classifier"));
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("1h"));
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = RegimeError::storage("models/btc_1h_cluster.json", io);

        assert!(error.to_string().contains("btc_1h_cluster.json"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
