//! Clustering configuration parsing from environment variables.
//!
//! Controls the cluster-count search range and the k-means restarts.

use super::{VarLookup, parse_or};
use crate::application::ml::kmeans::KMeansParams;
use crate::application::regime_clusterer::ClusterTrainingOptions;
use anyhow::Result;

/// Clustering environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringEnvConfig {
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub kmeans_n_init: usize,
    pub kmeans_max_iter: usize,
    /// Shared by k-means seeding, the train/test split and the forest.
    pub random_seed: u64,
}

impl Default for ClusteringEnvConfig {
    fn default() -> Self {
        Self {
            min_clusters: 2,
            max_clusters: 6,
            kmeans_n_init: 10,
            kmeans_max_iter: 300,
            random_seed: 42,
        }
    }
}

impl ClusteringEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&super::env_lookup)
    }

    pub fn from_lookup(vars: VarLookup<'_>) -> Result<Self> {
        Ok(Self {
            min_clusters: parse_or(vars, "MIN_CLUSTERS", 2)?,
            max_clusters: parse_or(vars, "MAX_CLUSTERS", 6)?,
            kmeans_n_init: parse_or(vars, "KMEANS_N_INIT", 10)?,
            kmeans_max_iter: parse_or(vars, "KMEANS_MAX_ITER", 300)?,
            random_seed: parse_or(vars, "RANDOM_SEED", 42)?,
        })
    }

    pub fn kmeans_params(&self) -> KMeansParams {
        KMeansParams {
            n_init: self.kmeans_n_init,
            max_iter: self.kmeans_max_iter,
            seed: self.random_seed,
            ..KMeansParams::default()
        }
    }

    /// Training options for an optional fixed cluster count; CLI bounds
    /// override the configured search range when given.
    pub fn training_options(
        &self,
        n_clusters: Option<usize>,
        min_clusters: Option<usize>,
        max_clusters: Option<usize>,
    ) -> ClusterTrainingOptions {
        ClusterTrainingOptions {
            n_clusters,
            min_clusters: min_clusters.unwrap_or(self.min_clusters),
            max_clusters: max_clusters.unwrap_or(self.max_clusters),
        }
    }
}
