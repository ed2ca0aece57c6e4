use crate::domain::errors::{RegimeError, RegimeResult};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Per-column zero-mean / unit-variance standardization.
///
/// Uses the population standard deviation. Constant columns get a scale of
/// 1.0 so they map to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> RegimeResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| RegimeError::insufficient("cannot fit a scaler on zero samples"))?;
        let n_features = first.len();
        if rows.iter().any(|row| row.len() != n_features) {
            return Err(RegimeError::InvalidArgument(
                "all samples must have the same number of features".to_string(),
            ));
        }

        let mut mean = Vec::with_capacity(n_features);
        let mut scale = Vec::with_capacity(n_features);
        for col in 0..n_features {
            let column: Vec<f64> = rows.iter().map(|row| row[col]).collect();
            let m = column.iter().mean();
            let sd = column.iter().population_std_dev();
            mean.push(m);
            scale.push(if sd > 0.0 && sd.is_finite() { sd } else { 1.0 });
        }

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> RegimeResult<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(RegimeError::InvalidArgument(format!(
                "expected {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> RegimeResult<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> RegimeResult<(Self, Vec<Vec<f64>>)> {
        let scaler = Self::fit(rows)?;
        let scaled = scaler.transform(rows)?;
        Ok((scaler, scaled))
    }
}
