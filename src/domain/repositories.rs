//! Repository Pattern Abstractions
//!
//! Bars are produced by an external collector; the modeling pipeline only
//! reads them through `BarRepository`, keeping storage out of the
//! business logic.
//!
//! # Current Implementations
//!
//! - `JsonBarRepository`: one kline JSON file per asset ticker
//! - `InMemoryBarRepository`: for tests and embedding
//!
//! # Example
//!
//! ```rust,no_run
//! use marketstate::domain::repositories::BarRepository;
//! use marketstate::infrastructure::JsonBarRepository;
//!
//! let repo = JsonBarRepository::new("data/kline");
//! let series = repo.load("BTC")?;
//! println!("{} bars for {}", series.len(), series.symbol);
//! # Ok::<(), marketstate::domain::errors::RegimeError>(())
//! ```

use crate::domain::errors::RegimeResult;
use crate::domain::market::BarSeries;

/// Resolves an asset ticker to its most recently ingested bar series.
pub trait BarRepository: Send + Sync {
    /// Load the bar series for `asset`. Fails with `BarsNotFound` when
    /// nothing was ingested for that ticker.
    fn load(&self, asset: &str) -> RegimeResult<BarSeries>;

    /// Tickers with ingested data, upper-cased and sorted.
    fn list_assets(&self) -> RegimeResult<Vec<String>>;
}
