// Feature derivation from raw bars
pub mod feature_engineering_service;

// Learning primitives: k-means, decision-tree forest, metrics
pub mod ml;

// Regime detection and next-state forecasting
pub mod regime_clusterer;
pub mod regime_forecaster;

// Orchestrator
pub mod pipeline;
