//! Market data seam.
//!
//! The coordinator reads one [`MarketSnapshot`] per tick from an injectable
//! [`PriceOracle`]. Retry and backoff belong to whoever implements the oracle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prices and portfolio value as seen at the start of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Asset symbol -> USD price
    pub prices: BTreeMap<String, f64>,

    /// Total treasury value in USD
    pub portfolio_value_usd: f64,
}

impl MarketSnapshot {
    pub fn new(portfolio_value_usd: f64) -> Self {
        Self {
            prices: BTreeMap::new(),
            portfolio_value_usd,
        }
    }

    /// Adds an asset price.
    pub fn with_price(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.prices.insert(symbol.into(), price);
        self
    }
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::new(2_500_000.0)
            .with_price("ETH", 3_200.0)
            .with_price("BTC", 64_000.0)
            .with_price("USDC", 1.0)
            .with_price("ARB", 1.15)
    }
}

/// Source of market data for impact computation.
pub trait PriceOracle: Send + Sync {
    fn snapshot(&self) -> MarketSnapshot;
}

impl<F> PriceOracle for F
where
    F: Fn() -> MarketSnapshot + Send + Sync,
{
    fn snapshot(&self) -> MarketSnapshot {
        self()
    }
}

/// Oracle that always returns the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    snapshot: MarketSnapshot,
}

impl StaticOracle {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self { snapshot }
    }
}

impl PriceOracle for StaticOracle {
    fn snapshot(&self) -> MarketSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_oracle() {
        let oracle = || MarketSnapshot::new(10.0).with_price("ETH", 1.0);
        let snap = PriceOracle::snapshot(&oracle);
        assert_eq!(snap.portfolio_value_usd, 10.0);
        assert_eq!(snap.prices.get("ETH"), Some(&1.0));
    }

    #[test]
    fn test_static_oracle_default() {
        let snap = StaticOracle::default().snapshot();
        assert_eq!(snap.prices.len(), 4);
        assert!(snap.portfolio_value_usd > 0.0);
    }
}
