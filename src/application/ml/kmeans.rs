//! K-means partitioning with k-means++ seeding and silhouette scoring.

use crate::domain::errors::{RegimeError, RegimeResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParams {
    /// Independent restarts; the run with the lowest inertia is kept.
    pub n_init: usize,
    pub max_iter: usize,
    /// Stop once the summed squared centroid shift falls below this.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub model: KMeansModel,
    pub assignments: Vec<usize>,
}

impl KMeansModel {
    pub fn fit(data: &[Vec<f64>], k: usize, params: &KMeansParams) -> RegimeResult<KMeansFit> {
        if k == 0 {
            return Err(RegimeError::ModelTraining("k-means needs k >= 1".to_string()));
        }
        if data.len() < k {
            return Err(RegimeError::ModelTraining(format!(
                "number of samples ({}) is less than k ({})",
                data.len(),
                k
            )));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..params.n_init.max(1) {
            let centroids = init_plus_plus(data, k, &mut rng);
            let candidate = lloyd(data, centroids, params);
            let better = best
                .as_ref()
                .is_none_or(|b| candidate.model.inertia < b.model.inertia);
            if better {
                best = Some(candidate);
            }
        }

        best.ok_or_else(|| RegimeError::ModelTraining("k-means produced no run".to_string()))
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Index of the nearest centroid; ties go to the lowest index.
    pub fn predict_row(&self, row: &[f64]) -> usize {
        nearest(&self.centroids, row).0
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<usize> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[Vec<f64>], row: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(row, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

fn init_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..n)].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = data.iter().map(|row| nearest(&centroids, row).1).collect();
        let total: f64 = distances.iter().sum();

        let chosen = if total > 0.0 {
            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            distances
                .iter()
                .position(|d| {
                    cumulative += d;
                    cumulative > threshold
                })
                .unwrap_or(n - 1)
        } else {
            // Every point already sits on a centroid
            rng.random_range(0..n)
        };
        centroids.push(data[chosen].clone());
    }
    centroids
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, params: &KMeansParams) -> KMeansFit {
    let k = centroids.len();
    let dims = data[0].len();
    let mut assignments: Vec<usize> = Vec::new();

    for _ in 0..params.max_iter {
        let next: Vec<usize> = data.iter().map(|row| nearest(&centroids, row).0).collect();
        if next == assignments {
            break;
        }
        assignments = next;

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in data.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(row) {
                *s += v;
            }
        }

        let mut shift = 0.0;
        for cluster in 0..k {
            // Empty clusters keep their previous centroid
            if counts[cluster] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[cluster].iter().map(|s| s / counts[cluster] as f64).collect();
            shift += squared_distance(&updated, &centroids[cluster]);
            centroids[cluster] = updated;
        }

        if shift <= params.tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    let assignments: Vec<usize> = data
        .iter()
        .map(|row| {
            let (cluster, d) = nearest(&centroids, row);
            inertia += d;
            cluster
        })
        .collect();

    KMeansFit {
        model: KMeansModel { centroids, inertia },
        assignments,
    }
}

pub fn distinct_clusters(assignments: &[usize]) -> usize {
    assignments.iter().collect::<BTreeSet<_>>().len()
}

/// Mean silhouette coefficient over all samples (Euclidean distance).
///
/// Defined only for 2 <= distinct clusters <= n - 1. Samples alone in their
/// cluster score 0.
pub fn silhouette_score(data: &[Vec<f64>], assignments: &[usize]) -> Option<f64> {
    let n = data.len();
    let clusters: Vec<usize> = assignments.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    if n != assignments.len() || clusters.len() < 2 || clusters.len() >= n {
        return None;
    }

    let sizes: Vec<usize> = clusters
        .iter()
        .map(|c| assignments.iter().filter(|&&a| a == *c).count())
        .collect();
    let position = |cluster: usize| clusters.iter().position(|&c| c == cluster).unwrap_or(0);

    let mut total = 0.0;
    for i in 0..n {
        let own = position(assignments[i]);
        if sizes[own] == 1 {
            continue;
        }

        let mut sums = vec![0.0; clusters.len()];
        for j in 0..n {
            if i != j {
                sums[position(assignments[j])] += squared_distance(&data[i], &data[j]).sqrt();
            }
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..clusters.len())
            .filter(|&c| c != own)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Some(total / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.2],
            vec![-0.1, 0.1],
            vec![0.2, -0.1],
            vec![10.0, 10.0],
            vec![10.1, 9.9],
            vec![9.8, 10.2],
            vec![10.2, 10.1],
        ]
    }

    #[test]
    fn test_separates_blobs() {
        let fit = KMeansModel::fit(&two_blobs(), 2, &KMeansParams::default()).unwrap();
        let a = fit.assignments[0];
        assert!(fit.assignments[..4].iter().all(|&c| c == a));
        assert!(fit.assignments[4..].iter().all(|&c| c != a));
        assert_eq!(distinct_clusters(&fit.assignments), 2);
        assert_eq!(fit.model.predict_row(&[9.5, 9.5]), fit.assignments[4]);
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let params = KMeansParams::default();
        let first = KMeansModel::fit(&two_blobs(), 3, &params).unwrap();
        let second = KMeansModel::fit(&two_blobs(), 3, &params).unwrap();
        assert_eq!(first.model, second.model);
        assert_eq!(first.assignments, second.assignments);
    }

    #[test]
    fn test_rejects_more_clusters_than_samples() {
        let data = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            KMeansModel::fit(&data, 3, &KMeansParams::default()),
            Err(RegimeError::ModelTraining(_))
        ));
    }

    #[test]
    fn test_identical_points_collapse() {
        let data = vec![vec![1.0, 1.0]; 6];
        let fit = KMeansModel::fit(&data, 3, &KMeansParams::default()).unwrap();
        assert_eq!(distinct_clusters(&fit.assignments), 1);
        assert_eq!(fit.model.inertia, 0.0);
    }

    #[test]
    fn test_silhouette_well_separated() {
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let score = silhouette_score(&two_blobs(), &labels).unwrap();
        assert!(score > 0.9);

        let mixed = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let poor = silhouette_score(&two_blobs(), &mixed).unwrap();
        assert!(poor < score);
    }

    #[test]
    fn test_silhouette_undefined_for_one_cluster() {
        assert!(silhouette_score(&two_blobs(), &[0; 8]).is_none());
    }

    #[test]
    fn test_silhouette_known_value() {
        // Points 0, 1 in one cluster and 4 alone: s0 = (4-1)/4, s1 = (3-1)/3, s2 = 0
        let data = vec![vec![0.0], vec![1.0], vec![4.0]];
        let score = silhouette_score(&data, &[0, 0, 1]).unwrap();
        let expected = (0.75 + 2.0 / 3.0) / 3.0;
        assert!((score - expected).abs() < 1e-12);
    }
}
