//! End-to-end market-state workflow for one asset at a time.
//!
//! Wires the bar repository, feature engineering, the clusterer, the
//! forecaster and the model store together. Construct it once and share it;
//! it holds no per-asset state.

use crate::application::feature_engineering_service::FeatureEngineer;
use crate::application::ml::kmeans::KMeansParams;
use crate::application::regime_clusterer::{ClusterTrainingOptions, RegimeClusterer};
use crate::application::regime_forecaster::{ForecasterTrainingOptions, RegimeForecaster};
use crate::config::Config;
use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::{BarSeries, SeriesSummary};
use crate::domain::ml::artifact::{ModelKey, ModelPurpose};
use crate::domain::ml::labeled_dataset::LabeledDataset;
use crate::domain::ml::reports::{
    ClassifierTrainingReport, ClusterTrainingReport, ForecastReport, MarketStateReport,
};
use crate::domain::repositories::BarRepository;
use crate::infrastructure::dataset_export;
use crate::infrastructure::model_store::ModelStore;
use crate::infrastructure::repositories::JsonBarRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct RegimePipeline {
    bars: Arc<dyn BarRepository>,
    engineer: FeatureEngineer,
    clusterer: RegimeClusterer,
    forecaster: RegimeForecaster,
    store: Arc<ModelStore>,
}

impl RegimePipeline {
    pub fn new(bars: Arc<dyn BarRepository>, store: Arc<ModelStore>, kmeans: KMeansParams) -> Self {
        Self {
            bars,
            engineer: FeatureEngineer::new(),
            clusterer: RegimeClusterer::new(store.clone(), kmeans),
            forecaster: RegimeForecaster::new(store.clone()),
            store,
        }
    }

    /// Builds the file-backed pipeline described by `config`.
    pub fn from_config(config: &Config) -> RegimeResult<Self> {
        let bars = Arc::new(JsonBarRepository::new(&config.storage.kline_data_dir));
        let store = Arc::new(ModelStore::new(&config.storage.models_dir)?);
        Ok(Self::new(bars, store, config.clustering.kmeans_params()))
    }

    pub fn list_assets(&self) -> RegimeResult<Vec<String>> {
        self.bars.list_assets()
    }

    pub fn load_bars(&self, asset: &str) -> RegimeResult<BarSeries> {
        self.bars.load(asset)
    }

    /// Price and volume overview of the stored bars.
    pub fn summary(&self, asset: &str) -> RegimeResult<SeriesSummary> {
        self.load_bars(asset)?
            .summary()
            .ok_or_else(|| RegimeError::insufficient(format!("no bars stored for {}", asset.to_uppercase())))
    }

    pub fn train_clusters(
        &self,
        asset: &str,
        options: &ClusterTrainingOptions,
    ) -> RegimeResult<ClusterTrainingReport> {
        let series = self.load_bars(asset)?;
        info!("Training market-state clusters for {} ({} bars)", asset.to_uppercase(), series.len());
        let dataset = self.engineer.training_rows(&series)?;
        self.clusterer.train(&dataset, options)
    }

    /// Current regime, read from the latest bar.
    pub fn market_state(&self, asset: &str) -> RegimeResult<MarketStateReport> {
        let series = self.load_bars(asset)?;
        self.store.require(&ModelKey::cluster(&series.symbol, &series.interval))?;
        let dataset = self.engineer.inference_rows(&series)?;
        self.clusterer.predict(&dataset)
    }

    /// Training history tagged with the stored cluster labels.
    pub fn labeled_dataset(&self, asset: &str) -> RegimeResult<LabeledDataset> {
        let series = self.load_bars(asset)?;
        self.store.require(&ModelKey::cluster(&series.symbol, &series.interval))?;
        let dataset = self.engineer.training_rows(&series)?;
        self.clusterer.label_dataset(&dataset)
    }

    pub fn train_forecaster(
        &self,
        asset: &str,
        options: &ForecasterTrainingOptions,
    ) -> RegimeResult<ClassifierTrainingReport> {
        let labeled = self.labeled_dataset(asset)?;
        info!(
            "Training next-state forecaster for {} ({} labeled rows)",
            asset.to_uppercase(),
            labeled.len()
        );
        self.forecaster.train(&labeled, options)
    }

    /// Regime forecast for the bar after the latest one.
    pub fn forecast(&self, asset: &str) -> RegimeResult<ForecastReport> {
        let series = self.load_bars(asset)?;
        // A missing model outranks a short history
        self.store.require(&ModelKey::forecast(&series.symbol, &series.interval))?;
        let dataset = self.engineer.inference_rows(&series)?;
        self.forecaster.forecast(&dataset)
    }

    /// Location of the stored `kind` model ("cluster" or "forecast").
    pub fn model_path(&self, asset: &str, kind: &str) -> RegimeResult<PathBuf> {
        let purpose: ModelPurpose = kind.parse()?;
        let series = self.load_bars(asset)?;
        self.store
            .require(&ModelKey::new(&series.symbol, &series.interval, purpose))
    }

    /// Writes the labeled training history to `path` as CSV.
    pub fn export_labeled_dataset(&self, asset: &str, path: &Path) -> RegimeResult<usize> {
        let labeled = self.labeled_dataset(asset)?;
        dataset_export::export_labeled_dataset(&labeled, path)
    }
}
