// Market data domain
pub mod bar;
pub mod market_regime;

pub use bar::{Bar, BarSeries, SeriesSummary};
pub use market_regime::{RegimeLabel, UNKNOWN_STATE, UNLABELED_STATE, assign_regime_labels};
