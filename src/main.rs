//! marketstate - market regime detection and next-state forecasting
//!
//! Reads kline files collected per asset, clusters their indicator features
//! into Bullish / Sideway / Bearish regimes and forecasts the next regime.
//!
//! # Usage
//! ```sh
//! marketstate train -c BTC
//! marketstate market -c BTC --show-history
//! marketstate train-classifier -c BTC -n 300
//! marketstate forecast -c BTC
//! marketstate model -c BTC -k forecast
//! ```
//!
//! # Environment Variables
//! - `MODELS_DIR` - Directory for trained models (default: models)
//! - `KLINE_DATA_DIR` - Directory holding `{asset}.json` kline files (default: data/kline)
//! - `RUST_LOG` - Log filter (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marketstate::application::pipeline::RegimePipeline;
use marketstate::config::Config;
use marketstate::domain::errors::RegimeError;
use std::path::PathBuf;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the stored klines of an asset
    Analyze {
        /// Crypto name to analyze (e.g. BTC, ETH)
        #[arg(short, long)]
        crypto: String,
    },
    /// Train the market-state clustering model
    Train {
        /// Crypto symbol to train (e.g. BTC)
        #[arg(short, long)]
        crypto: String,

        /// Number of clusters (auto-select if omitted)
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Minimum clusters when auto-selecting
        #[arg(long)]
        min_clusters: Option<usize>,

        /// Maximum clusters when auto-selecting
        #[arg(long)]
        max_clusters: Option<usize>,
    },
    /// Show the current market state
    Market {
        /// Crypto symbol to analyze (e.g. BTC)
        #[arg(short, long)]
        crypto: String,

        /// Print the state distribution as JSON
        #[arg(long)]
        show_history: bool,
    },
    /// Train the next-state forecaster on clustered history
    TrainClassifier {
        /// Crypto symbol to train the classifier for (e.g. BTC)
        #[arg(short, long)]
        crypto: String,

        /// Test size ratio for evaluation
        #[arg(long)]
        test_size: Option<f64>,

        /// Number of trees in the forest
        #[arg(short = 'n', long = "estimators")]
        estimators: Option<usize>,

        /// Max depth of each tree
        #[arg(long)]
        max_depth: Option<u16>,
    },
    /// Forecast the next market state
    Forecast {
        /// Crypto symbol to forecast (e.g. BTC)
        #[arg(short, long)]
        crypto: String,
    },
    /// Show where a trained model is stored
    Model {
        /// Crypto symbol (e.g. BTC)
        #[arg(short, long)]
        crypto: String,

        /// Model kind: cluster or forecast
        #[arg(short, long, default_value = "cluster")]
        kind: String,
    },
    /// Export the labeled training history as CSV
    Export {
        /// Crypto symbol to export (e.g. BTC)
        #[arg(short, long)]
        crypto: String,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let pipeline = RegimePipeline::from_config(&config).context("Failed to initialize pipeline")?;

    if let Err(e) = run(&pipeline, &config, cli.command) {
        error!("{}", e);
        if matches!(e, RegimeError::BarsNotFound { .. }) {
            hint_available_assets(&pipeline);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run(pipeline: &RegimePipeline, config: &Config, command: Commands) -> Result<(), RegimeError> {
    match command {
        Commands::Analyze { crypto } => {
            let summary = pipeline.summary(&crypto)?;
            info!("Analysis for {}", summary.symbol);
            info!("{}", "=".repeat(50));
            info!("Interval: {}", summary.interval);
            info!("Data points: {} klines", summary.bar_count);
            info!(
                "Time range: {} -> {}",
                summary.start.format("%Y-%m-%d %H:%M:%S"),
                summary.end.format("%Y-%m-%d %H:%M:%S")
            );
            info!("Price Information:");
            info!("  Current price: ${:.2}", summary.last_close);
            info!(
                "  Price change: ${:.2} ({:+.2}%)",
                summary.absolute_change, summary.percent_change
            );
            info!("  High: ${:.2}", summary.high);
            info!("  Low: ${:.2}", summary.low);
            info!("Volume Information:");
            info!("  Total volume: {:.2}", summary.total_volume);
            info!("  Average volume: {:.2}", summary.average_volume);
            if let Some(fetched_at) = summary.fetched_at {
                info!("Data fetched: {}", fetched_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        Commands::Train {
            crypto,
            clusters,
            min_clusters,
            max_clusters,
        } => {
            let options = config
                .clustering
                .training_options(clusters, min_clusters, max_clusters);
            let report = pipeline.train_clusters(&crypto, &options)?;
            info!(
                "Trained KMeans model for {} ({}) using {} clusters on {} samples",
                report.symbol, report.interval, report.n_clusters, report.samples
            );
            if let Some(score) = report.silhouette {
                info!("Silhouette score: {:.4}", score);
            }
            info!("Model saved to: {}", report.model_path.display());
            for (cluster, label) in &report.cluster_labels {
                let ret = report.cluster_returns.get(cluster).copied().unwrap_or(f64::NAN);
                info!("  Cluster {} → {} (mean future return: {:.4})", cluster, label, ret);
            }
        }
        Commands::Market { crypto, show_history } => {
            let report = pipeline.market_state(&crypto)?;
            let latest = &report.latest_state;
            info!("Market state for {} ({})", report.symbol, report.interval);
            info!("{}", "=".repeat(50));
            info!("Latest timestamp: {}", latest.timestamp.to_rfc3339());
            info!("Closing price: ${:.2}", latest.close);
            info!("Cluster {} → {}", latest.cluster, latest.state_name());
            info!("Feature snapshot:");
            for (name, value) in latest.features.named() {
                info!("  {}: {:.6}", name, value);
            }
            info!("State distribution:");
            for (state, count) in &report.state_distribution {
                info!("  {}: {}", state, count);
            }
            if show_history {
                info!(
                    "Full distribution JSON:\n{}",
                    serde_json::to_string_pretty(&report.state_distribution)?
                );
            }
        }
        Commands::TrainClassifier {
            crypto,
            test_size,
            estimators,
            max_depth,
        } => {
            let options =
                config
                    .forecast
                    .training_options(config.clustering.random_seed, test_size, estimators, max_depth);
            let report = pipeline.train_forecaster(&crypto, &options)?;
            info!(
                "Trained classifier for {} ({}) on {} samples",
                report.symbol, report.interval, report.samples
            );
            info!("Model saved to: {}", report.model_path.display());
            info!("Train accuracy: {:.4}", report.train_accuracy);
            info!("Test accuracy: {:.4}", report.test_accuracy);
            info!("Classification report:\n{}", report.classification_report);
            info!("Confusion matrix: {:?}", report.confusion_matrix);
        }
        Commands::Forecast { crypto } => {
            let report = pipeline.forecast(&crypto)?;
            info!("Forecast for {} ({})", report.symbol, report.interval);
            info!("{}", "=".repeat(50));
            info!("Prediction timestamp: {}", report.prediction_timestamp.to_rfc3339());
            info!("Predicted next state: {}", report.predicted_state);
            if !report.state_probabilities.is_empty() {
                info!(
                    "Probabilities:\n{}",
                    serde_json::to_string_pretty(&report.state_probabilities)?
                );
            }
            info!("Model: {}", report.model_path.display());
        }
        Commands::Model { crypto, kind } => {
            let path = pipeline.model_path(&crypto, &kind)?;
            info!("{} {} model: {}", crypto.to_uppercase(), kind.to_lowercase(), path.display());
        }
        Commands::Export { crypto, output } => {
            let rows = pipeline.export_labeled_dataset(&crypto, &output)?;
            info!("Exported {} labeled rows to {}", rows, output.display());
        }
    }
    Ok(())
}

fn hint_available_assets(pipeline: &RegimePipeline) {
    match pipeline.list_assets() {
        Ok(assets) if !assets.is_empty() => info!("Available cryptos: {}", assets.join(", ")),
        Ok(_) => warn!("No kline data available. Collect some klines first."),
        Err(e) => warn!("Could not list available klines: {}", e),
    }
}
