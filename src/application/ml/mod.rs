// Learning primitives behind the clusterer and the forecaster
pub mod dataset_split;
pub mod forest;
pub mod kmeans;
pub mod metrics;

pub use dataset_split::{TrainTestSplit, train_test_split};
pub use forest::{ForestParams, RegimeForest};
pub use kmeans::{KMeansFit, KMeansModel, KMeansParams, silhouette_score};
