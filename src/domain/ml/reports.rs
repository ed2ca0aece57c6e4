//! Result records returned by each pipeline stage.

use crate::domain::market::{RegimeLabel, UNKNOWN_STATE};
use crate::domain::ml::feature_registry::FeatureVector;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterTrainingReport {
    pub symbol: String,
    pub interval: String,
    pub n_clusters: usize,
    pub silhouette: Option<f64>,
    pub cluster_labels: BTreeMap<usize, RegimeLabel>,
    pub cluster_returns: BTreeMap<usize, f64>,
    pub samples: usize,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestState {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub cluster: usize,
    pub regime: Option<RegimeLabel>,
    pub features: FeatureVector,
}

impl LatestState {
    pub fn state_name(&self) -> String {
        self.regime
            .map(|r| r.to_string())
            .unwrap_or_else(|| UNKNOWN_STATE.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketStateReport {
    pub symbol: String,
    pub interval: String,
    pub n_clusters: usize,
    pub cluster_labels: BTreeMap<usize, RegimeLabel>,
    pub latest_state: LatestState,
    pub state_distribution: BTreeMap<String, usize>,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: RegimeLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 with overall accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub weighted_f1: f64,
    pub support: usize,
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                class.label.to_string(),
                class.precision,
                class.recall,
                class.f1,
                class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.support
        )?;
        writeln!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.support
        )?;
        write!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "weighted avg",
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.support
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifierTrainingReport {
    pub symbol: String,
    pub interval: String,
    pub classes: Vec<RegimeLabel>,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub classification_report: ClassificationReport,
    /// Rows are true classes, columns predicted classes, both in `classes` order.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub samples: usize,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub symbol: String,
    pub interval: String,
    pub prediction_timestamp: DateTime<Utc>,
    pub predicted_state: RegimeLabel,
    pub state_probabilities: BTreeMap<RegimeLabel, f64>,
    pub latest_features: FeatureVector,
    pub model_path: PathBuf,
}
