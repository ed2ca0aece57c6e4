//! Forecaster configuration parsing from environment variables.

use super::{VarLookup, parse_or};
use crate::application::regime_forecaster::ForecasterTrainingOptions;
use anyhow::{Context, Result};

/// Forecaster environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEnvConfig {
    pub test_size: f64,
    pub n_estimators: usize,
    /// Unlimited when unset.
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
}

impl Default for ForecastEnvConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            n_estimators: 200,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

impl ForecastEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&super::env_lookup)
    }

    pub fn from_lookup(vars: VarLookup<'_>) -> Result<Self> {
        let max_depth = match vars("FORECAST_MAX_DEPTH").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .context("Failed to parse FORECAST_MAX_DEPTH")?,
            ),
            None => None,
        };

        Ok(Self {
            test_size: parse_or(vars, "FORECAST_TEST_SIZE", 0.2)?,
            n_estimators: parse_or(vars, "FORECAST_N_ESTIMATORS", 200)?,
            max_depth,
            min_samples_split: parse_or(vars, "FORECAST_MIN_SAMPLES_SPLIT", 2)?,
        })
    }

    /// Training options with CLI overrides applied on top of the
    /// configured values.
    pub fn training_options(
        &self,
        seed: u64,
        test_size: Option<f64>,
        n_estimators: Option<usize>,
        max_depth: Option<u16>,
    ) -> ForecasterTrainingOptions {
        ForecasterTrainingOptions {
            test_size: test_size.unwrap_or(self.test_size),
            n_estimators: n_estimators.unwrap_or(self.n_estimators),
            max_depth: max_depth.or(self.max_depth),
            min_samples_split: self.min_samples_split,
            seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_config_defaults() {
        let config = ForecastEnvConfig::from_lookup(&|_| None).expect("Should parse with defaults");
        assert_eq!(config, ForecastEnvConfig::default());
    }

    #[test]
    fn test_forecast_config_max_depth() {
        let config = ForecastEnvConfig::from_lookup(&|key| (key == "FORECAST_MAX_DEPTH").then(|| "8".to_string()))
            .unwrap();
        assert_eq!(config.max_depth, Some(8));

        let blank = ForecastEnvConfig::from_lookup(&|key| (key == "FORECAST_MAX_DEPTH").then(|| " ".to_string()))
            .unwrap();
        assert_eq!(blank.max_depth, None);
    }

    #[test]
    fn test_training_options_overrides() {
        let config = ForecastEnvConfig {
            max_depth: Some(5),
            ..Default::default()
        };
        let options = config.training_options(7, Some(0.3), None, None);
        assert_eq!(options.test_size, 0.3);
        assert_eq!(options.n_estimators, 200);
        assert_eq!(options.max_depth, Some(5));
        assert_eq!(options.seed, 7);
    }
}
