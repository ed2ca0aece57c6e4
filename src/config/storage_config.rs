//! Storage locations parsed from environment variables.

use super::VarLookup;
use std::path::PathBuf;

/// Storage environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEnvConfig {
    /// Directory holding persisted model artifacts.
    pub models_dir: PathBuf,
    /// Directory holding one kline JSON file per asset.
    pub kline_data_dir: PathBuf,
}

impl Default for StorageEnvConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            kline_data_dir: PathBuf::from("data/kline"),
        }
    }
}

impl StorageEnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&super::env_lookup)
    }

    pub fn from_lookup(vars: VarLookup<'_>) -> Self {
        Self {
            models_dir: PathBuf::from(vars("MODELS_DIR").unwrap_or_else(|| "models".to_string())),
            kline_data_dir: PathBuf::from(vars("KLINE_DATA_DIR").unwrap_or_else(|| "data/kline".to_string())),
        }
    }
}
