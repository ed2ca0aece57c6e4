// Feature layout, standardization and persisted model records
pub mod artifact;
pub mod feature_registry;
pub mod labeled_dataset;
pub mod reports;
pub mod scaler;

pub use artifact::{ARTIFACT_SCHEMA_VERSION, ArtifactMetadata, ModelArtifact, ModelKey, ModelPurpose};
pub use feature_registry::{FEATURE_NAMES, FeatureDataset, FeatureRow, FeatureVector};
pub use labeled_dataset::{LabeledDataset, LabeledSample};
pub use scaler::StandardScaler;
