use crate::domain::errors::RegimeError;
use crate::domain::ml::scaler::StandardScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bumped whenever the persisted layout changes. Artifacts written with a
/// different version are refused on load.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPurpose {
    Cluster,
    Forecast,
}

impl ModelPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPurpose::Cluster => "cluster",
            ModelPurpose::Forecast => "forecast",
        }
    }
}

impl fmt::Display for ModelPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelPurpose {
    type Err = RegimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cluster" => Ok(ModelPurpose::Cluster),
            "forecast" => Ok(ModelPurpose::Forecast),
            _ => Err(RegimeError::InvalidArgument(format!(
                "unknown model kind '{}': must be 'cluster' or 'forecast'",
                s
            ))),
        }
    }
}

/// Storage address of one artifact. The symbol is lower-cased so lookups
/// are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub symbol: String,
    pub interval: String,
    pub purpose: ModelPurpose,
}

impl ModelKey {
    pub fn new(symbol: &str, interval: &str, purpose: ModelPurpose) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            interval: interval.to_string(),
            purpose,
        }
    }

    pub fn cluster(symbol: &str, interval: &str) -> Self {
        Self::new(symbol, interval, ModelPurpose::Cluster)
    }

    pub fn forecast(symbol: &str, interval: &str) -> Self {
        Self::new(symbol, interval, ModelPurpose::Forecast)
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.json", self.symbol, self.interval, self.purpose)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub symbol: String,
    pub interval: String,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub samples: usize,
}

/// Versioned on-disk record: scaler, fitted model and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<M> {
    pub schema_version: u32,
    pub purpose: ModelPurpose,
    pub metadata: ArtifactMetadata,
    pub scaler: StandardScaler,
    pub model: M,
}

impl<M> ModelArtifact<M> {
    pub fn new(purpose: ModelPurpose, metadata: ArtifactMetadata, scaler: StandardScaler, model: M) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            purpose,
            metadata,
            scaler,
            model,
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(&self.metadata.symbol, &self.metadata.interval, self.purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lowercases_symbol() {
        let key = ModelKey::cluster("BTCUSDT", "1h");
        assert_eq!(key.symbol, "btcusdt");
        assert_eq!(key.file_name(), "btcusdt_1h_cluster.json");
    }

    #[test]
    fn test_purpose_parsing() {
        assert_eq!("Forecast".parse::<ModelPurpose>().unwrap(), ModelPurpose::Forecast);
        assert_eq!("cluster".parse::<ModelPurpose>().unwrap(), ModelPurpose::Cluster);
        assert!(matches!(
            "regression".parse::<ModelPurpose>(),
            Err(RegimeError::InvalidArgument(_))
        ));
    }
}
