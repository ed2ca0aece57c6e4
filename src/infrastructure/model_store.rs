//! On-disk storage for trained regime models.
//!
//! Each artifact is one JSON file under the models directory, named
//! `{symbol}_{interval}_{purpose}.json`. Writes go through a temp file and a
//! rename so readers never observe a partial artifact.

use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::ml::artifact::{ARTIFACT_SCHEMA_VERSION, ArtifactMetadata, ModelArtifact, ModelKey, ModelPurpose};
use crate::domain::ml::feature_registry::feature_columns;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Leading fields of an artifact, checked before the model body is parsed.
#[derive(Deserialize)]
struct ArtifactHeader {
    schema_version: u32,
    purpose: ModelPurpose,
    metadata: ArtifactMetadata,
}

pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    /// Opens the store, creating `models_dir` when missing.
    pub fn new(models_dir: impl Into<PathBuf>) -> RegimeResult<Self> {
        let models_dir = models_dir.into();
        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| RegimeError::storage(&models_dir, e))?;
        }
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn path_for(&self, key: &ModelKey) -> PathBuf {
        self.models_dir.join(key.file_name())
    }

    /// Path of the stored artifact for `key`, or the not-found error of the
    /// key's purpose when nothing has been trained yet.
    pub fn require(&self, key: &ModelKey) -> RegimeResult<PathBuf> {
        let path = self.path_for(key);
        if path.is_file() {
            Ok(path)
        } else {
            Err(not_found(key))
        }
    }

    /// Persists the artifact, replacing any previous one for the same key.
    pub fn save<M: Serialize>(&self, artifact: &ModelArtifact<M>) -> RegimeResult<PathBuf> {
        let path = self.path_for(&artifact.key());
        let content = serde_json::to_string(artifact)?;

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| RegimeError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| RegimeError::storage(&path, e))?;

        info!("Saved {} model to {:?}", artifact.purpose, path);
        Ok(path)
    }

    /// Loads the artifact for `key` and returns it with its path.
    ///
    /// A missing file maps to the not-found error of the key's purpose.
    /// Artifacts written with another schema version, another purpose or
    /// another feature layout are refused.
    pub fn load<M: DeserializeOwned>(&self, key: &ModelKey) -> RegimeResult<(ModelArtifact<M>, PathBuf)> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(key)),
            Err(e) => return Err(RegimeError::storage(&path, e)),
        };

        let header: ArtifactHeader = serde_json::from_str(&content).map_err(|e| incompatible(&path, e))?;
        if header.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(RegimeError::IncompatibleArtifact {
                path,
                reason: format!(
                    "schema version {} (expected {})",
                    header.schema_version, ARTIFACT_SCHEMA_VERSION
                ),
            });
        }
        if header.purpose != key.purpose {
            return Err(RegimeError::IncompatibleArtifact {
                path,
                reason: format!("holds a {} model, expected {}", header.purpose, key.purpose),
            });
        }
        if header.metadata.feature_columns != feature_columns() {
            return Err(RegimeError::IncompatibleArtifact {
                path,
                reason: format!("feature columns {:?} do not match", header.metadata.feature_columns),
            });
        }

        let artifact: ModelArtifact<M> = serde_json::from_str(&content).map_err(|e| incompatible(&path, e))?;
        debug!("Loaded {} model from {:?}", key.purpose, path);
        Ok((artifact, path))
    }
}

fn not_found(key: &ModelKey) -> RegimeError {
    match key.purpose {
        ModelPurpose::Cluster => RegimeError::ModelNotFound {
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
        },
        ModelPurpose::Forecast => RegimeError::ClassifierModelNotFound {
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
        },
    }
}

fn incompatible(path: &Path, error: serde_json::Error) -> RegimeError {
    RegimeError::IncompatibleArtifact {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
