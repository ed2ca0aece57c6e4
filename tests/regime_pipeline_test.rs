use chrono::{Duration, TimeZone, Utc};
use marketstate::application::ml::kmeans::KMeansParams;
use marketstate::application::pipeline::RegimePipeline;
use marketstate::application::regime_clusterer::ClusterTrainingOptions;
use marketstate::application::regime_forecaster::ForecasterTrainingOptions;
use marketstate::domain::errors::RegimeError;
use marketstate::domain::market::{Bar, BarSeries, RegimeLabel};
use marketstate::infrastructure::InMemoryBarRepository;
use marketstate::infrastructure::model_store::ModelStore;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(tag: &str) -> PathBuf {
    let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "marketstate_it_{}_{}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
        unique_id,
        tag
    ))
}

fn series_from_closes(symbol: &str, closes: &[f64]) -> BarSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open_time = start + Duration::hours(i as i64);
            let volume = 1000.0 + ((i * 7) % 5) as f64 * 100.0;
            Bar::ohlcv(
                open_time,
                open_time + Duration::hours(1) - Duration::milliseconds(1),
                close,
                close * 1.002,
                close * 0.998,
                close,
                volume,
            )
        })
        .collect();
    BarSeries::new(symbol, "1h", bars)
}

/// Strictly increasing closes with uneven step sizes.
fn rising_closes(n: usize) -> Vec<f64> {
    let mut closes = Vec::with_capacity(n);
    let mut close = 100.0;
    for i in 0..n {
        closes.push(close);
        close *= 1.0 + 0.004 + 0.003 * (i % 4) as f64;
    }
    closes
}

/// Oscillating closes on a slow drift, giving up, down and flat phases.
fn cyclical_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 10.0 * (t / 8.0).sin() + 3.0 * (t / 3.0).cos() + t * 0.05
        })
        .collect()
}

struct Fixture {
    pipeline: RegimePipeline,
    dir: PathBuf,
}

impl Fixture {
    fn new(tag: &str, assets: &[(&str, BarSeries)]) -> Self {
        let dir = temp_dir(tag);
        let repo = InMemoryBarRepository::new();
        for (asset, series) in assets {
            repo.insert(asset, series.clone());
        }
        let store = ModelStore::new(dir.join("models")).expect("Failed to create store");
        Self {
            pipeline: RegimePipeline::new(Arc::new(repo), Arc::new(store), KMeansParams::default()),
            dir,
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

fn quick_forecaster() -> ForecasterTrainingOptions {
    ForecasterTrainingOptions {
        n_estimators: 20,
        ..Default::default()
    }
}

#[test]
fn rising_market_top_cluster_is_bullish() {
    let fixture = Fixture::new("rising", &[("BTC", series_from_closes("BTCUSDT", &rising_closes(60)))]);

    let report = fixture
        .pipeline
        .train_clusters("BTC", &ClusterTrainingOptions::default())
        .unwrap();

    assert!(report.n_clusters >= 2);
    assert_eq!(report.samples, 60 - 50 - 1);

    let mut top: Option<(usize, f64)> = None;
    for (&cluster, &ret) in &report.cluster_returns {
        if top.is_none_or(|(_, best)| ret > best) {
            top = Some((cluster, ret));
        }
    }
    let (top_cluster, _) = top.unwrap();
    assert_eq!(report.cluster_labels[&top_cluster], RegimeLabel::Bullish);
    assert!(report.cluster_labels.values().any(|l| *l == RegimeLabel::Bearish));
}

#[test]
fn three_bars_are_insufficient() {
    let fixture = Fixture::new("short", &[("BTC", series_from_closes("BTCUSDT", &[100.0, 101.0, 102.0]))]);

    let result = fixture.pipeline.train_clusters("BTC", &ClusterTrainingOptions::default());
    assert!(matches!(result, Err(RegimeError::InsufficientData { .. })));
}

#[test]
fn forecast_before_training_reports_missing_classifier() {
    let fixture = Fixture::new("untrained", &[("BTC", series_from_closes("BTCUSDT", &cyclical_closes(120)))]);

    let result = fixture.pipeline.forecast("BTC");
    assert!(matches!(result, Err(RegimeError::ClassifierModelNotFound { .. })));
}

#[test]
fn missing_models_outrank_short_history() {
    let fixture = Fixture::new("shortuntrained", &[("BTC", series_from_closes("BTCUSDT", &cyclical_closes(40)))]);

    assert!(matches!(
        fixture.pipeline.forecast("BTC"),
        Err(RegimeError::ClassifierModelNotFound { .. })
    ));
    assert!(matches!(
        fixture.pipeline.market_state("BTC"),
        Err(RegimeError::ModelNotFound { .. })
    ));
}

#[test]
fn model_path_resolves_by_kind() {
    let fixture = Fixture::new("modelpath", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(120)))]);

    assert!(matches!(
        fixture.pipeline.model_path("ETH", "regression"),
        Err(RegimeError::InvalidArgument(_))
    ));
    assert!(matches!(
        fixture.pipeline.model_path("ETH", "cluster"),
        Err(RegimeError::ModelNotFound { .. })
    ));

    let report = fixture
        .pipeline
        .train_clusters("ETH", &ClusterTrainingOptions::default())
        .unwrap();
    assert_eq!(fixture.pipeline.model_path("ETH", "Cluster").unwrap(), report.model_path);
    assert!(matches!(
        fixture.pipeline.model_path("ETH", "forecast"),
        Err(RegimeError::ClassifierModelNotFound { .. })
    ));
}

#[test]
fn explicit_single_cluster_is_rejected() {
    let fixture = Fixture::new("k1", &[("BTC", series_from_closes("BTCUSDT", &cyclical_closes(120)))]);
    let options = ClusterTrainingOptions {
        n_clusters: Some(1),
        ..Default::default()
    };

    let result = fixture.pipeline.train_clusters("BTC", &options);
    match result {
        Err(RegimeError::ModelTraining(msg)) => assert!(msg.contains("at least 2 clusters")),
        other => panic!("expected ModelTraining, got {:?}", other.map(|r| r.n_clusters)),
    }
}

#[test]
fn unknown_asset_is_not_found() {
    let fixture = Fixture::new("missing", &[]);
    assert!(matches!(
        fixture.pipeline.market_state("DOGE"),
        Err(RegimeError::BarsNotFound { .. })
    ));
}

#[test]
fn market_state_requires_cluster_model() {
    let fixture = Fixture::new("nomodel", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(120)))]);
    assert!(matches!(
        fixture.pipeline.market_state("ETH"),
        Err(RegimeError::ModelNotFound { .. })
    ));
}

#[test]
fn train_then_predict_uses_known_labels() {
    let fixture = Fixture::new("predict", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(200)))]);

    let trained = fixture
        .pipeline
        .train_clusters("ETH", &ClusterTrainingOptions::default())
        .unwrap();
    let state = fixture.pipeline.market_state("ETH").unwrap();

    assert_eq!(state.cluster_labels, trained.cluster_labels);
    assert!(trained.cluster_labels.contains_key(&state.latest_state.cluster));
    assert!(!state.state_distribution.contains_key("Unlabeled"));
    // Inference rows include the latest bar
    assert_eq!(state.state_distribution.values().sum::<usize>(), 200 - 50);

    let labeled = fixture.pipeline.labeled_dataset("ETH").unwrap();
    assert_eq!(labeled.len(), trained.samples);
    assert!(labeled.samples.iter().all(|s| s.regime.is_some()));
}

#[test]
fn forecaster_trains_on_rows_with_a_next_state() {
    let fixture = Fixture::new("forecast", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(200)))]);

    fixture
        .pipeline
        .train_clusters("ETH", &ClusterTrainingOptions::default())
        .unwrap();
    let labeled = fixture.pipeline.labeled_dataset("ETH").unwrap();

    let report = fixture.pipeline.train_forecaster("ETH", &quick_forecaster()).unwrap();
    assert_eq!(report.samples, labeled.len() - 1);
    assert_eq!(report.train_samples + report.test_samples, report.samples);
    assert!((0.0..=1.0).contains(&report.test_accuracy));

    let forecast = fixture.pipeline.forecast("ETH").unwrap();
    assert!(report.classes.contains(&forecast.predicted_state));
    assert!((forecast.state_probabilities.values().sum::<f64>() - 1.0).abs() < 1e-9);
    let series = fixture.pipeline.load_bars("ETH").unwrap();
    assert_eq!(
        forecast.prediction_timestamp,
        series.bars().last().unwrap().open_time
    );
}

#[test]
fn forecaster_needs_cluster_model_first() {
    let fixture = Fixture::new("order", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(120)))]);
    assert!(matches!(
        fixture.pipeline.train_forecaster("ETH", &quick_forecaster()),
        Err(RegimeError::ModelNotFound { .. })
    ));
}

#[test]
fn retraining_overwrites_previous_model() {
    let fixture = Fixture::new("retrain", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(150)))]);

    let fixed = ClusterTrainingOptions {
        n_clusters: Some(4),
        ..Default::default()
    };
    let first = fixture.pipeline.train_clusters("ETH", &fixed).unwrap();
    assert_eq!(first.n_clusters, 4);

    let fixed = ClusterTrainingOptions {
        n_clusters: Some(2),
        ..Default::default()
    };
    let second = fixture.pipeline.train_clusters("ETH", &fixed).unwrap();
    assert_eq!(second.model_path, first.model_path);

    let state = fixture.pipeline.market_state("ETH").unwrap();
    assert_eq!(state.n_clusters, 2);
}

#[test]
fn export_writes_one_line_per_labeled_row() {
    let fixture = Fixture::new("export", &[("ETH", series_from_closes("ETHUSDT", &cyclical_closes(120)))]);
    fixture
        .pipeline
        .train_clusters("ETH", &ClusterTrainingOptions::default())
        .unwrap();

    let path = fixture.dir.join("export").join("eth.csv");
    let rows = fixture.pipeline.export_labeled_dataset("ETH", &path).unwrap();
    assert_eq!(rows, 120 - 50 - 1);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), rows + 1);
}
