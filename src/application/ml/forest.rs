use crate::domain::errors::{RegimeError, RegimeResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};
use std::collections::BTreeSet;
use tracing::debug;

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Serialize, Deserialize)]
enum ForestTree {
    /// Bootstrap sample held a single class.
    Constant { class: u32 },
    Fitted { features: Vec<usize>, tree: Tree },
}

/// Random-subspace bagging over smartcore decision trees.
///
/// Each tree is fit on a bootstrap sample restricted to one random subset of
/// ceil(sqrt(p)) features, drawn per tree rather than per split. Class
/// probabilities are fractions of hard tree votes, not averaged leaf
/// distributions, so scores differ from a per-split random forest.
#[derive(Serialize, Deserialize)]
pub struct RegimeForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<ForestTree>,
}

impl RegimeForest {
    /// `y` holds class indices in `0..n_classes`.
    pub fn fit(x: &[Vec<f64>], y: &[u32], n_classes: usize, params: &ForestParams) -> RegimeResult<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(RegimeError::ClassifierTraining(format!(
                "invalid training set: {} samples, {} targets",
                x.len(),
                y.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(RegimeError::InvalidArgument("n_estimators must be at least 1".to_string()));
        }
        if y.iter().any(|&c| c as usize >= n_classes) {
            return Err(RegimeError::ClassifierTraining("target class out of range".to_string()));
        }

        let n = x.len();
        let n_features = x[0].len();
        let max_features = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1));

        let mut tree_params = DecisionTreeClassifierParameters::default()
            .with_min_samples_split(params.min_samples_split);
        if let Some(depth) = params.max_depth {
            tree_params = tree_params.with_max_depth(depth);
        }

        let mut trees = Vec::with_capacity(params.n_trees);
        for t in 0..params.n_trees {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
            let rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let targets: Vec<u32> = rows.iter().map(|&r| y[r]).collect();

            let classes: BTreeSet<u32> = targets.iter().copied().collect();
            if classes.len() < 2 {
                trees.push(ForestTree::Constant { class: targets[0] });
                continue;
            }

            let mut features = rand::seq::index::sample(&mut rng, n_features, max_features).into_vec();
            features.sort_unstable();

            let projected: Vec<Vec<f64>> = rows.iter().map(|&r| project(&x[r], &features)).collect();
            let matrix = DenseMatrix::from_2d_vec(&projected)
                .map_err(|e| RegimeError::ClassifierTraining(format!("Matrix error: {}", e)))?;
            let tree = DecisionTreeClassifier::fit(&matrix, &targets, tree_params.clone())
                .map_err(|e| RegimeError::ClassifierTraining(format!("Training error: {}", e)))?;

            trees.push(ForestTree::Fitted { features, tree });
        }

        debug!(
            "Fitted forest: {} trees ({} constant), {} features per tree",
            trees.len(),
            trees.iter().filter(|t| matches!(t, ForestTree::Constant { .. })).count(),
            max_features
        );

        Ok(Self {
            n_classes,
            n_features,
            trees,
        })
    }

    /// Fraction of trees voting for each class, per row.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> RegimeResult<Vec<Vec<f64>>> {
        if x.iter().any(|row| row.len() != self.n_features) {
            return Err(RegimeError::InvalidArgument(format!(
                "expected {} features per row",
                self.n_features
            )));
        }

        let mut votes = vec![vec![0usize; self.n_classes]; x.len()];
        for tree in &self.trees {
            match tree {
                ForestTree::Constant { class } => {
                    for row_votes in votes.iter_mut() {
                        row_votes[*class as usize] += 1;
                    }
                }
                ForestTree::Fitted { features, tree } => {
                    let projected: Vec<Vec<f64>> = x.iter().map(|row| project(row, features)).collect();
                    let matrix = DenseMatrix::from_2d_vec(&projected)
                        .map_err(|e| RegimeError::InvalidArgument(format!("Matrix error: {}", e)))?;
                    let predicted = tree
                        .predict(&matrix)
                        .map_err(|e| RegimeError::InvalidArgument(format!("Prediction failed: {}", e)))?;
                    for (row_votes, class) in votes.iter_mut().zip(predicted) {
                        if let Some(slot) = row_votes.get_mut(class as usize) {
                            *slot += 1;
                        }
                    }
                }
            }
        }

        let n_trees = self.trees.len().max(1) as f64;
        Ok(votes
            .into_iter()
            .map(|row| row.into_iter().map(|v| v as f64 / n_trees).collect())
            .collect())
    }

    /// Majority vote; ties go to the lowest class index.
    pub fn predict(&self, x: &[Vec<f64>]) -> RegimeResult<Vec<u32>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|probs| argmax(probs) as u32)
            .collect())
    }
}

fn project(row: &[f64], features: &[usize]) -> Vec<f64> {
    features.iter().map(|&f| row[f]).collect()
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = idx;
        }
    }
    best
}
