//! Supervised next-regime forecasting.
//!
//! Learns to predict the regime of the following bar from the current
//! feature vector, using the cluster labels produced by the regime
//! clusterer as targets.

use crate::application::ml::dataset_split::train_test_split;
use crate::application::ml::forest::{ForestParams, RegimeForest, argmax};
use crate::application::ml::metrics::{accuracy, classification_report, confusion_matrix};
use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::RegimeLabel;
use crate::domain::ml::artifact::{ArtifactMetadata, ModelArtifact, ModelKey, ModelPurpose};
use crate::domain::ml::feature_registry::{FeatureDataset, feature_columns};
use crate::domain::ml::labeled_dataset::LabeledDataset;
use crate::domain::ml::reports::{ClassifierTrainingReport, ForecastReport};
use crate::domain::ml::scaler::StandardScaler;
use crate::infrastructure::model_store::ModelStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted forecaster: the forest plus the class order its outputs use.
#[derive(Serialize, Deserialize)]
pub struct ForecasterModel {
    pub forest: RegimeForest,
    /// Class index `i` of the forest is `classes[i]`.
    pub classes: Vec<RegimeLabel>,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecasterTrainingOptions {
    pub test_size: f64,
    pub n_estimators: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForecasterTrainingOptions {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            n_estimators: 200,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl ForecasterTrainingOptions {
    fn validate(&self) -> RegimeResult<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(RegimeError::InvalidArgument(format!(
                "test size must be within (0, 1), got {}",
                self.test_size
            )));
        }
        if self.n_estimators == 0 {
            return Err(RegimeError::InvalidArgument("n_estimators must be at least 1".to_string()));
        }
        Ok(())
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            seed: self.seed,
        }
    }
}

pub struct RegimeForecaster {
    store: Arc<ModelStore>,
}

impl RegimeForecaster {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    pub fn train(
        &self,
        labeled: &LabeledDataset,
        options: &ForecasterTrainingOptions,
    ) -> RegimeResult<ClassifierTrainingReport> {
        options.validate()?;

        if !labeled.has_any_label() {
            return Err(RegimeError::ModelTraining(
                "No market-state labels available. Train the clustering model first.".to_string(),
            ));
        }

        let pairs = labeled.with_next_state();
        if pairs.is_empty() {
            return Err(RegimeError::ClassifierTraining(
                "Not enough labeled samples to train the classifier.".to_string(),
            ));
        }

        let classes: Vec<RegimeLabel> = pairs
            .iter()
            .map(|(_, next)| *next)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let class_index: BTreeMap<RegimeLabel, u32> = classes
            .iter()
            .enumerate()
            .map(|(idx, label)| (*label, idx as u32))
            .collect();

        let features: Vec<Vec<f64>> = pairs.iter().map(|(sample, _)| sample.row.features.to_vec()).collect();
        let targets: Vec<u32> = pairs.iter().map(|(_, next)| class_index[next]).collect();

        let (scaler, scaled) = StandardScaler::fit_transform(&features)?;
        let split = train_test_split(&targets, options.test_size, options.seed)?;

        let x_train: Vec<Vec<f64>> = split.train.iter().map(|&i| scaled[i].clone()).collect();
        let y_train: Vec<u32> = split.train.iter().map(|&i| targets[i]).collect();
        let x_test: Vec<Vec<f64>> = split.test.iter().map(|&i| scaled[i].clone()).collect();
        let y_test: Vec<u32> = split.test.iter().map(|&i| targets[i]).collect();

        debug!(
            "Forecaster split for {} {}: {} train / {} test over {} classes",
            labeled.symbol,
            labeled.interval,
            x_train.len(),
            x_test.len(),
            classes.len()
        );

        let forest = RegimeForest::fit(&x_train, &y_train, classes.len(), &options.forest_params())?;

        let train_accuracy = accuracy(&y_train, &forest.predict(&x_train)?);
        let y_pred = forest.predict(&x_test)?;
        let test_accuracy = accuracy(&y_test, &y_pred);
        let report = classification_report(&y_test, &y_pred, &classes);
        let matrix = confusion_matrix(&y_test, &y_pred, classes.len());

        info!(
            "Trained forecaster for {} {}: train accuracy {:.4}, test accuracy {:.4}",
            labeled.symbol, labeled.interval, train_accuracy, test_accuracy
        );

        let samples = pairs.len();
        let artifact = ModelArtifact::new(
            ModelPurpose::Forecast,
            ArtifactMetadata {
                symbol: labeled.symbol.clone(),
                interval: labeled.interval.clone(),
                trained_at: Utc::now(),
                feature_columns: feature_columns(),
                samples,
            },
            scaler,
            ForecasterModel {
                forest,
                classes: classes.clone(),
                train_accuracy,
                test_accuracy,
            },
        );
        let model_path = self.store.save(&artifact)?;

        Ok(ClassifierTrainingReport {
            symbol: labeled.symbol.clone(),
            interval: labeled.interval.clone(),
            classes,
            train_accuracy,
            test_accuracy,
            classification_report: report,
            confusion_matrix: matrix,
            train_samples: x_train.len(),
            test_samples: x_test.len(),
            samples,
            model_path,
        })
    }

    /// Predicts the regime of the bar after the dataset's latest row.
    pub fn forecast(&self, dataset: &FeatureDataset) -> RegimeResult<ForecastReport> {
        let key = ModelKey::forecast(&dataset.symbol, &dataset.interval);
        let (artifact, model_path) = self.store.load::<ForecasterModel>(&key)?;

        let latest = dataset
            .latest()
            .ok_or_else(|| RegimeError::ClassifierTraining("No feature data available for forecasting.".to_string()))?;

        let model = &artifact.model;
        let scaled = artifact.scaler.transform_row(&latest.features.to_vec())?;
        let probabilities = model
            .forest
            .predict_proba(&[scaled])?
            .into_iter()
            .next()
            .unwrap_or_default();

        let predicted_state = model.classes.get(argmax(&probabilities)).copied().ok_or_else(|| {
            RegimeError::IncompatibleArtifact {
                path: model_path.clone(),
                reason: "forecaster has no classes".to_string(),
            }
        })?;
        let state_probabilities: BTreeMap<RegimeLabel, f64> =
            model.classes.iter().copied().zip(probabilities).collect();

        info!(
            "{} {} next state forecast: {} ({:?})",
            dataset.symbol, dataset.interval, predicted_state, state_probabilities
        );

        Ok(ForecastReport {
            symbol: dataset.symbol.clone(),
            interval: dataset.interval.clone(),
            prediction_timestamp: latest.open_time,
            predicted_state,
            state_probabilities,
            latest_features: latest.features,
            model_path,
        })
    }
}
