//! Unsupervised market regime detection.
//!
//! Fits k-means over standardized feature vectors, ranks clusters by their
//! mean forward return and names them Bullish / Sideway / Bearish. The fitted
//! centroids, scaler and label map are persisted through [`ModelStore`].

use crate::application::ml::kmeans::{self, KMeansFit, KMeansModel, KMeansParams};
use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::{RegimeLabel, UNLABELED_STATE, assign_regime_labels};
use crate::domain::ml::artifact::{ArtifactMetadata, ModelArtifact, ModelKey, ModelPurpose};
use crate::domain::ml::feature_registry::{FeatureDataset, feature_columns};
use crate::domain::ml::labeled_dataset::{LabeledDataset, LabeledSample};
use crate::domain::ml::reports::{ClusterTrainingReport, LatestState, MarketStateReport};
use crate::domain::ml::scaler::StandardScaler;
use crate::infrastructure::model_store::ModelStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted clustering state: centroids plus the return-ranked labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub kmeans: KMeansModel,
    /// Mean forward return of every non-empty cluster.
    pub cluster_returns: BTreeMap<usize, f64>,
    pub cluster_labels: BTreeMap<usize, RegimeLabel>,
    pub n_clusters: usize,
    pub silhouette: Option<f64>,
}

impl ClusterModel {
    pub fn label_for(&self, cluster: usize) -> Option<RegimeLabel> {
        self.cluster_labels.get(&cluster).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTrainingOptions {
    /// Fixed cluster count; `None` searches `min_clusters..=max_clusters`.
    pub n_clusters: Option<usize>,
    pub min_clusters: usize,
    pub max_clusters: usize,
}

impl Default for ClusterTrainingOptions {
    fn default() -> Self {
        Self {
            n_clusters: None,
            min_clusters: 2,
            max_clusters: 6,
        }
    }
}

type ClusterArtifact = ModelArtifact<ClusterModel>;

pub struct RegimeClusterer {
    store: Arc<ModelStore>,
    params: KMeansParams,
}

impl RegimeClusterer {
    pub fn new(store: Arc<ModelStore>, params: KMeansParams) -> Self {
        Self { store, params }
    }

    /// Fits and persists a cluster model for the dataset's symbol/interval.
    ///
    /// Every row must carry a forward return (see
    /// `FeatureEngineer::training_rows`).
    pub fn train(
        &self,
        dataset: &FeatureDataset,
        options: &ClusterTrainingOptions,
    ) -> RegimeResult<ClusterTrainingReport> {
        let samples = dataset.len();
        if samples < 2 {
            return Err(RegimeError::ModelTraining(format!(
                "need at least 2 samples to cluster, got {}",
                samples
            )));
        }
        let future_returns: Vec<f64> = dataset
            .rows
            .iter()
            .map(|row| row.future_return)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| {
                RegimeError::InvalidArgument("cluster training rows need a forward return".to_string())
            })?;

        let (scaler, scaled) = StandardScaler::fit_transform(&dataset.matrix())?;

        let (fit, silhouette) = match options.n_clusters {
            Some(k) => self.fit_fixed(&scaled, k)?,
            None => self.search(&scaled, options)?,
        };

        let cluster_returns = mean_returns(&fit.assignments, &future_returns);
        let cluster_labels = assign_regime_labels(&cluster_returns);
        let n_clusters = fit.model.k();

        info!(
            "Trained {} clusters for {} {} on {} samples (silhouette {:?})",
            n_clusters, dataset.symbol, dataset.interval, samples, silhouette
        );
        for (cluster, label) in &cluster_labels {
            debug!(
                "Cluster {} -> {} (mean return {:.6})",
                cluster,
                label,
                cluster_returns.get(cluster).copied().unwrap_or_default()
            );
        }

        let model = ClusterModel {
            kmeans: fit.model,
            cluster_returns: cluster_returns.clone(),
            cluster_labels: cluster_labels.clone(),
            n_clusters,
            silhouette,
        };
        let artifact = ModelArtifact::new(
            ModelPurpose::Cluster,
            ArtifactMetadata {
                symbol: dataset.symbol.clone(),
                interval: dataset.interval.clone(),
                trained_at: Utc::now(),
                feature_columns: feature_columns(),
                samples,
            },
            scaler,
            model,
        );
        let model_path = self.store.save(&artifact)?;

        Ok(ClusterTrainingReport {
            symbol: dataset.symbol.clone(),
            interval: dataset.interval.clone(),
            n_clusters,
            silhouette,
            cluster_labels,
            cluster_returns,
            samples,
            model_path,
        })
    }

    /// Classifies every row with the stored model and reports the latest
    /// state with the distribution of states over the whole dataset.
    pub fn predict(&self, dataset: &FeatureDataset) -> RegimeResult<MarketStateReport> {
        let (artifact, model_path) = self.load(dataset)?;
        let latest = dataset.latest().ok_or_else(|| RegimeError::insufficient("no feature rows to classify"))?;

        let assignments = assign(&artifact, dataset)?;
        let model = &artifact.model;

        let mut state_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for &cluster in &assignments {
            let name = model
                .label_for(cluster)
                .map(|label| label.to_string())
                .unwrap_or_else(|| UNLABELED_STATE.to_string());
            *state_distribution.entry(name).or_default() += 1;
        }

        let latest_cluster = assignments.last().copied().unwrap_or_default();
        let latest_state = LatestState {
            timestamp: latest.open_time,
            close: latest.close,
            cluster: latest_cluster,
            regime: model.label_for(latest_cluster),
            features: latest.features,
        };

        info!(
            "{} {} market state: {} (cluster {})",
            dataset.symbol,
            dataset.interval,
            latest_state.state_name(),
            latest_cluster
        );

        Ok(MarketStateReport {
            symbol: dataset.symbol.clone(),
            interval: dataset.interval.clone(),
            n_clusters: model.n_clusters,
            cluster_labels: model.cluster_labels.clone(),
            latest_state,
            state_distribution,
            model_path,
        })
    }

    /// Tags every row with its stored cluster and regime label.
    pub fn label_dataset(&self, dataset: &FeatureDataset) -> RegimeResult<LabeledDataset> {
        let (artifact, _) = self.load(dataset)?;
        let assignments = assign(&artifact, dataset)?;

        let samples = dataset
            .rows
            .iter()
            .zip(assignments)
            .map(|(row, cluster)| LabeledSample {
                row: row.clone(),
                cluster,
                regime: artifact.model.label_for(cluster),
            })
            .collect();

        Ok(LabeledDataset {
            symbol: dataset.symbol.clone(),
            interval: dataset.interval.clone(),
            samples,
        })
    }

    fn load(&self, dataset: &FeatureDataset) -> RegimeResult<(ClusterArtifact, PathBuf)> {
        self.store
            .load(&ModelKey::cluster(&dataset.symbol, &dataset.interval))
    }

    fn fit_fixed(&self, scaled: &[Vec<f64>], k: usize) -> RegimeResult<(KMeansFit, Option<f64>)> {
        if k < 2 {
            return Err(RegimeError::ModelTraining(format!(
                "KMeans requires at least 2 clusters, got {}",
                k
            )));
        }
        if k >= scaled.len() {
            return Err(RegimeError::ModelTraining(format!(
                "number of clusters ({}) must be smaller than the number of samples ({})",
                k,
                scaled.len()
            )));
        }

        let fit = KMeansModel::fit(scaled, k, &self.params)?;
        let silhouette = kmeans::silhouette_score(scaled, &fit.assignments);
        Ok((fit, silhouette))
    }

    /// Picks the k with the best silhouette; the earliest k wins ties.
    fn search(
        &self,
        scaled: &[Vec<f64>],
        options: &ClusterTrainingOptions,
    ) -> RegimeResult<(KMeansFit, Option<f64>)> {
        if options.min_clusters > options.max_clusters {
            return Err(RegimeError::InvalidArgument(format!(
                "min clusters ({}) exceeds max clusters ({})",
                options.min_clusters, options.max_clusters
            )));
        }

        let mut candidates = Vec::new();
        for k in options.min_clusters.max(1)..=options.max_clusters {
            if scaled.len() <= k {
                break;
            }
            candidates.push(KMeansModel::fit(scaled, k, &self.params)?);
        }

        best_candidate(scaled, candidates).map(|(fit, score)| (fit, Some(score))).ok_or_else(|| {
            RegimeError::ModelTraining(format!(
                "no cluster count in {}..={} produced more than one distinct cluster",
                options.min_clusters, options.max_clusters
            ))
        })
    }
}

/// Highest-silhouette fit among those with more than one distinct cluster.
/// Earlier candidates win ties.
fn best_candidate(
    scaled: &[Vec<f64>],
    candidates: impl IntoIterator<Item = KMeansFit>,
) -> Option<(KMeansFit, f64)> {
    let mut best: Option<(KMeansFit, f64)> = None;
    for fit in candidates {
        let k = fit.model.k();
        if kmeans::distinct_clusters(&fit.assignments) < 2 {
            debug!("k={} collapsed to a single cluster, skipping", k);
            continue;
        }
        let Some(score) = kmeans::silhouette_score(scaled, &fit.assignments) else {
            continue;
        };
        debug!("k={} silhouette {:.4}", k, score);

        if best.as_ref().is_none_or(|(_, top)| score > *top) {
            best = Some((fit, score));
        }
    }
    best
}

fn assign(artifact: &ClusterArtifact, dataset: &FeatureDataset) -> RegimeResult<Vec<usize>> {
    let scaled = artifact.scaler.transform(&dataset.matrix())?;
    Ok(artifact.model.kmeans.predict(&scaled))
}

fn mean_returns(assignments: &[usize], future_returns: &[f64]) -> BTreeMap<usize, f64> {
    let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for (&cluster, &ret) in assignments.iter().zip(future_returns) {
        let entry = sums.entry(cluster).or_default();
        entry.0 += ret;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(cluster, (sum, count))| (cluster, sum / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::{FeatureRow, FeatureVector};
    use chrono::{Duration, TimeZone};
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_clusterer() -> (RegimeClusterer, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "marketstate_test_{}_{}_{}_clusterer",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        let store = ModelStore::new(temp_dir.join("models")).expect("Failed to create test store");
        (
            RegimeClusterer::new(Arc::new(store), KMeansParams::default()),
            temp_dir,
        )
    }

    fn cleanup_test_dir(temp_dir: PathBuf) {
        fs::remove_dir_all(temp_dir).ok();
    }

    fn vector(level: f64, jitter: f64) -> FeatureVector {
        FeatureVector {
            ret: level * 0.01,
            volatility_7: 0.01,
            volatility_14: 0.01,
            ma_7: 100.0 + level * 10.0 + jitter,
            ma_14: 100.0 + level * 10.0,
            ma_50: 100.0,
            ma_slope: level + jitter * 0.1,
            rsi_14: 50.0 + level * 20.0,
            macd: level,
            macd_signal: level * 0.5,
            volume_change: 0.0,
        }
    }

    /// Two well separated groups: an up-trending one followed by higher
    /// returns and a down-trending one followed by losses.
    fn two_regime_dataset(n: usize) -> FeatureDataset {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = (0..n)
            .map(|i| {
                let up = i % 2 == 0;
                let level = if up { 1.0 } else { -1.0 };
                let jitter = (i % 5) as f64 * 0.1;
                FeatureRow {
                    open_time: start + Duration::hours(i as i64),
                    close: 100.0 + i as f64,
                    features: vector(level, jitter),
                    future_return: Some(if up { 0.02 } else { -0.01 }),
                }
            })
            .collect();
        FeatureDataset {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            rows,
        }
    }

    #[test]
    fn test_auto_search_finds_two_regimes() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let dataset = two_regime_dataset(40);

        let report = clusterer.train(&dataset, &ClusterTrainingOptions::default()).unwrap();
        assert_eq!(report.n_clusters, 2);
        assert_eq!(report.samples, 40);
        assert!(report.silhouette.unwrap() > 0.5);
        assert!(report.model_path.exists());

        let labels: Vec<RegimeLabel> = report.cluster_labels.values().copied().collect();
        assert!(labels.contains(&RegimeLabel::Bullish));
        assert!(labels.contains(&RegimeLabel::Bearish));

        let bullish = report
            .cluster_labels
            .iter()
            .find(|(_, label)| **label == RegimeLabel::Bullish)
            .map(|(cluster, _)| *cluster)
            .unwrap();
        assert!((report.cluster_returns[&bullish] - 0.02).abs() < 1e-12);
        cleanup_test_dir(temp_dir);
    }

    /// Three overlapping groups with uneven spread, so the best k is not
    /// obvious from the construction.
    fn noisy_regime_dataset(n: usize) -> FeatureDataset {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = (0..n)
            .map(|i| {
                let t = i as f64;
                let level = [1.0, -0.4, -1.2][i % 3];
                let wobble = (t * 0.7).sin() * 0.6 + (t * 1.3).cos() * 0.3;
                let mut features = vector(level, wobble);
                features.volatility_7 = 0.01 + (t * 0.9).sin().abs() * 0.02;
                features.volume_change = (t * 0.4).cos() * 0.5;
                FeatureRow {
                    open_time: start + Duration::hours(i as i64),
                    close: 100.0 + (t * 0.2).sin() * 5.0,
                    features,
                    future_return: Some(level * 0.01 + wobble * 0.002),
                }
            })
            .collect();
        FeatureDataset {
            symbol: "ETHUSDT".to_string(),
            interval: "1h".to_string(),
            rows,
        }
    }

    fn collapsed_fit(scaled: &[Vec<f64>]) -> KMeansFit {
        KMeansFit {
            model: KMeansModel {
                centroids: scaled.iter().take(3).cloned().collect(),
                inertia: 0.0,
            },
            assignments: vec![0; scaled.len()],
        }
    }

    #[test]
    fn test_auto_search_picks_highest_silhouette() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let dataset = noisy_regime_dataset(90);

        let report = clusterer.train(&dataset, &ClusterTrainingOptions::default()).unwrap();

        let (_, scaled) = StandardScaler::fit_transform(&dataset.matrix()).unwrap();
        let params = KMeansParams::default();
        let mut expected: Option<(usize, f64)> = None;
        for k in 2..=6 {
            let fit = KMeansModel::fit(&scaled, k, &params).unwrap();
            if kmeans::distinct_clusters(&fit.assignments) < 2 {
                continue;
            }
            let score = kmeans::silhouette_score(&scaled, &fit.assignments).unwrap();
            if expected.is_none_or(|(_, best)| score > best) {
                expected = Some((k, score));
            }
        }

        let (best_k, best_score) = expected.unwrap();
        assert_eq!(report.n_clusters, best_k);
        assert!((report.silhouette.unwrap() - best_score).abs() < 1e-12);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_collapsed_candidate_is_never_selected() {
        let dataset = two_regime_dataset(20);
        let (_, scaled) = StandardScaler::fit_transform(&dataset.matrix()).unwrap();
        let params = KMeansParams::default();
        let two = KMeansModel::fit(&scaled, 2, &params).unwrap();
        let three = KMeansModel::fit(&scaled, 3, &params).unwrap();

        let (chosen, score) = best_candidate(&scaled, vec![collapsed_fit(&scaled), two, three]).unwrap();
        assert_eq!(chosen.model.k(), 2);
        assert_eq!(kmeans::distinct_clusters(&chosen.assignments), 2);
        assert!(score > 0.5);

        assert!(best_candidate(&scaled, vec![collapsed_fit(&scaled)]).is_none());
    }

    #[test]
    fn test_explicit_k_below_two_is_rejected() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let options = ClusterTrainingOptions {
            n_clusters: Some(1),
            ..Default::default()
        };

        let result = clusterer.train(&two_regime_dataset(20), &options);
        assert!(
            matches!(result, Err(RegimeError::ModelTraining(msg)) if msg.contains("at least 2 clusters"))
        );
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_explicit_k_not_below_sample_count_is_rejected() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let options = ClusterTrainingOptions {
            n_clusters: Some(5),
            ..Default::default()
        };

        let result = clusterer.train(&two_regime_dataset(5), &options);
        assert!(matches!(result, Err(RegimeError::ModelTraining(_))));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_inverted_search_range_is_invalid() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let options = ClusterTrainingOptions {
            n_clusters: None,
            min_clusters: 5,
            max_clusters: 3,
        };

        let result = clusterer.train(&two_regime_dataset(20), &options);
        assert!(matches!(result, Err(RegimeError::InvalidArgument(_))));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_identical_rows_cannot_be_clustered() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let mut dataset = two_regime_dataset(10);
        let first = dataset.rows[0].features;
        for row in dataset.rows.iter_mut() {
            row.features = first;
        }

        let result = clusterer.train(&dataset, &ClusterTrainingOptions::default());
        assert!(matches!(result, Err(RegimeError::ModelTraining(_))));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_predict_requires_trained_model() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let result = clusterer.predict(&two_regime_dataset(10));
        assert!(matches!(result, Err(RegimeError::ModelNotFound { .. })));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_predict_uses_stored_labels() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let dataset = two_regime_dataset(40);
        let trained = clusterer.train(&dataset, &ClusterTrainingOptions::default()).unwrap();

        let report = clusterer.predict(&dataset).unwrap();
        assert_eq!(report.n_clusters, trained.n_clusters);
        assert_eq!(report.cluster_labels, trained.cluster_labels);
        // Row 39 belongs to the down-trending group
        assert_eq!(report.latest_state.regime, Some(RegimeLabel::Bearish));
        assert_eq!(report.state_distribution.get("Bullish"), Some(&20));
        assert_eq!(report.state_distribution.get("Bearish"), Some(&20));
        assert_eq!(report.state_distribution.values().sum::<usize>(), 40);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_label_dataset_tags_every_row() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let dataset = two_regime_dataset(30);
        clusterer.train(&dataset, &ClusterTrainingOptions::default()).unwrap();

        let labeled = clusterer.label_dataset(&dataset).unwrap();
        assert_eq!(labeled.len(), 30);
        assert!(labeled.samples.iter().all(|s| s.regime.is_some()));
        assert_eq!(labeled.samples[0].regime, Some(RegimeLabel::Bullish));
        assert_eq!(labeled.samples[1].regime, Some(RegimeLabel::Bearish));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_rows_without_forward_return_are_rejected() {
        let (clusterer, temp_dir) = create_test_clusterer();
        let mut dataset = two_regime_dataset(10);
        dataset.rows[3].future_return = None;

        let result = clusterer.train(&dataset, &ClusterTrainingOptions::default());
        assert!(matches!(result, Err(RegimeError::InvalidArgument(_))));
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_mean_returns_per_cluster() {
        let returns = mean_returns(&[0, 1, 0, 2], &[0.01, 0.05, 0.03, -0.02]);
        assert_eq!(returns.len(), 3);
        assert!((returns[&0] - 0.02).abs() < 1e-12);
        assert_eq!(returns[&1], 0.05);
    }
}
