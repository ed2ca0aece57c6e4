//! Configuration module for marketstate.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Storage, Clustering and Forecast.

mod clustering_config;
mod forecast_config;
mod storage_config;

pub use clustering_config::ClusteringEnvConfig;
pub use forecast_config::ForecastEnvConfig;
pub use storage_config::StorageEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Resolves a variable name to its raw value.
pub type VarLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_or<T>(vars: VarLookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars(key) {
        Some(raw) => raw.trim().parse::<T>().context(format!("Failed to parse {}", key)),
        None => Ok(default),
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub storage: StorageEnvConfig,
    pub clustering: ClusteringEnvConfig,
    pub forecast: ForecastEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(vars: VarLookup<'_>) -> Result<Self> {
        let config = Self {
            storage: StorageEnvConfig::from_lookup(vars),
            clustering: ClusteringEnvConfig::from_lookup(vars).context("Failed to load clustering config")?,
            forecast: ForecastEnvConfig::from_lookup(vars).context("Failed to load forecast config")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let clustering = &self.clustering;
        if clustering.min_clusters < 2 {
            anyhow::bail!("MIN_CLUSTERS must be at least 2, got {}", clustering.min_clusters);
        }
        if clustering.min_clusters > clustering.max_clusters {
            anyhow::bail!(
                "MIN_CLUSTERS ({}) must not exceed MAX_CLUSTERS ({})",
                clustering.min_clusters,
                clustering.max_clusters
            );
        }
        if clustering.kmeans_n_init == 0 || clustering.kmeans_max_iter == 0 {
            anyhow::bail!("KMEANS_N_INIT and KMEANS_MAX_ITER must be positive");
        }

        let forecast = &self.forecast;
        if !(forecast.test_size > 0.0 && forecast.test_size < 1.0) {
            anyhow::bail!("FORECAST_TEST_SIZE must be within (0, 1), got {}", forecast.test_size);
        }
        if forecast.n_estimators == 0 {
            anyhow::bail!("FORECAST_N_ESTIMATORS must be at least 1");
        }
        if forecast.min_samples_split < 2 {
            anyhow::bail!(
                "FORECAST_MIN_SAMPLES_SPLIT must be at least 2, got {}",
                forecast.min_samples_split
            );
        }
        Ok(())
    }
}
