//! In-Memory Repository Implementation
//!
//! Thread-safe, in-memory implementation of `domain::repositories::BarRepository`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Testing**: Ideal for unit tests and embedding without a kline directory
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - Limited by available RAM

use crate::domain::errors::{RegimeError, RegimeResult};
use crate::domain::market::BarSeries;
use crate::domain::repositories::BarRepository;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory implementation of BarRepository, keyed by upper-cased ticker.
#[derive(Clone, Default)]
pub struct InMemoryBarRepository {
    series: Arc<RwLock<HashMap<String, BarSeries>>>,
}

impl InMemoryBarRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `series` under `asset`, replacing any previous series.
    pub fn insert(&self, asset: &str, series: BarSeries) {
        let mut guard = self.series.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(asset.to_uppercase(), series);
    }

    pub fn with_series(self, asset: &str, series: BarSeries) -> Self {
        self.insert(asset, series);
        self
    }
}

impl BarRepository for InMemoryBarRepository {
    fn load(&self, asset: &str) -> RegimeResult<BarSeries> {
        let guard = self.series.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(&asset.to_uppercase())
            .cloned()
            .ok_or_else(|| RegimeError::BarsNotFound {
                asset: asset.to_uppercase(),
            })
    }

    fn list_assets(&self) -> RegimeResult<Vec<String>> {
        let guard = self.series.read().unwrap_or_else(|e| e.into_inner());
        let mut assets: Vec<String> = guard.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }
}
