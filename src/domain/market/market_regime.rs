use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Report label used for a cluster id missing from the stored label map.
pub const UNKNOWN_STATE: &str = "Unknown";

/// Distribution bucket for rows whose cluster has no label.
pub const UNLABELED_STATE: &str = "Unlabeled";

/// Discrete market regime assigned to a cluster.
///
/// Variants are declared in alphabetical order so the derived `Ord` matches
/// the class ordering persisted with the forecaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    Bearish,
    Bullish,
    Sideway,
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeLabel::Bearish => write!(f, "Bearish"),
            RegimeLabel::Bullish => write!(f, "Bullish"),
            RegimeLabel::Sideway => write!(f, "Sideway"),
        }
    }
}

/// Derives the cluster → regime map from per-cluster mean future returns.
///
/// Clusters are ranked by mean return descending; equal returns keep
/// ascending cluster-id order. The top cluster is Bullish, the bottom one
/// Bearish, everything in between Sideway. A lone cluster is Sideway.
pub fn assign_regime_labels(cluster_returns: &BTreeMap<usize, f64>) -> BTreeMap<usize, RegimeLabel> {
    let mut ranked: Vec<(usize, f64)> = cluster_returns.iter().map(|(&id, &r)| (id, r)).collect();
    // Stable sort: ties stay in id order from the BTreeMap
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut labels = BTreeMap::new();
    match ranked.len() {
        0 => {}
        1 => {
            labels.insert(ranked[0].0, RegimeLabel::Sideway);
        }
        n => {
            for (position, (cluster_id, _)) in ranked.iter().enumerate() {
                let label = if position == 0 {
                    RegimeLabel::Bullish
                } else if position == n - 1 {
                    RegimeLabel::Bearish
                } else {
                    RegimeLabel::Sideway
                };
                labels.insert(*cluster_id, label);
            }
        }
    }
    labels
}
