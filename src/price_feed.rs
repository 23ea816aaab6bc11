// Price Feed Integration
//
// The engine and the swap modules read prices through the `PriceFeed` trait and
// never care whether they come from Chainlink, Pyth or a test board. Prices are
// quoted per whole unit of an asset in units of the reference asset. A missing,
// stale or non-positive price means "no information" and every caller fails
// closed instead of substituting a default.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AssetId, Price, Timestamp};

/// Unique identifier for a price source
pub type PriceSourceId = u32;

/// Default time to live for a published price: one hour.
pub const DEFAULT_TTL_MILLIS: i64 = 3_600_000;

/// A single price observation from an oracle or feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub asset: AssetId,
    pub price: Decimal,
    pub updated_at: Timestamp,
    pub source_id: PriceSourceId,
    /// Time to live before this price is considered stale
    pub ttl_millis: i64,
}

impl PriceUpdate {
    pub fn new(asset: AssetId, price: Decimal, updated_at: Timestamp, source_id: PriceSourceId) -> Self {
        Self {
            asset,
            price,
            updated_at,
            source_id,
            ttl_millis: DEFAULT_TTL_MILLIS,
        }
    }

    pub fn with_ttl(mut self, ttl_millis: i64) -> Self {
        self.ttl_millis = ttl_millis;
        self
    }

    pub fn is_stale(&self, now: Timestamp) -> bool {
        now.as_millis() > self.updated_at.as_millis() + self.ttl_millis
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("Oracle has no information about the token!")]
    NoPriceAvailable { asset: AssetId },

    #[error("price for {asset:?} is stale since {updated_at:?}")]
    Stale { asset: AssetId, updated_at: Timestamp },

    #[error("price deviation {deviation} exceeds {max_deviation}")]
    ExcessiveDeviation { deviation: Decimal, max_deviation: Decimal },
}

/// Read-only price source, `latestPrice(asset)` in oracle terms.
pub trait PriceFeed {
    fn source_id(&self) -> PriceSourceId;
    fn latest_price(&self, asset: AssetId) -> Option<PriceUpdate>;
}

/// Latest price if it is present, fresh and positive.
pub fn fresh_price(feed: &dyn PriceFeed, asset: AssetId, now: Timestamp) -> Result<Price, PriceFeedError> {
    let update = feed
        .latest_price(asset)
        .ok_or(PriceFeedError::NoPriceAvailable { asset })?;
    if update.is_stale(now) {
        return Err(PriceFeedError::Stale {
            asset,
            updated_at: update.updated_at,
        });
    }
    Price::new(update.price).ok_or(PriceFeedError::NoPriceAvailable { asset })
}

/// How many units of `asset_out` one unit of `asset_in` is worth.
pub fn cross_rate(feed: &dyn PriceFeed, asset_in: AssetId, asset_out: AssetId, now: Timestamp) -> Result<Decimal, PriceFeedError> {
    if asset_in == asset_out {
        return Ok(Decimal::ONE);
    }
    let price_in = fresh_price(feed, asset_in, now)?;
    let price_out = fresh_price(feed, asset_out, now)?;
    Ok(price_in.value() / price_out.value())
}

/// Relative deviation `|a - b| / b`.
pub fn deviation(observed: Decimal, reference: Decimal) -> Decimal {
    if reference.is_zero() {
        return Decimal::MAX;
    }
    ((observed - reference) / reference).abs()
}

/// In-memory price board. Stands in for an oracle network in simulation and
/// doubles as a venue's own quote book.
#[derive(Debug, Clone, Default)]
pub struct PriceBoard {
    source_id: PriceSourceId,
    name: String,
    ttl_millis: i64,
    prices: HashMap<AssetId, PriceUpdate>,
}

impl PriceBoard {
    pub fn new(source_id: PriceSourceId, name: &str) -> Self {
        Self {
            source_id,
            name: name.to_string(),
            ttl_millis: DEFAULT_TTL_MILLIS,
            prices: HashMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl_millis: i64) -> Self {
        self.ttl_millis = ttl_millis;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_price(&mut self, asset: AssetId, price: Decimal, now: Timestamp) {
        let update = PriceUpdate::new(asset, price, now, self.source_id).with_ttl(self.ttl_millis);
        self.prices.insert(asset, update);
    }

    pub fn remove_price(&mut self, asset: AssetId) {
        self.prices.remove(&asset);
    }
}

impl PriceFeed for PriceBoard {
    fn source_id(&self) -> PriceSourceId {
        self.source_id
    }

    fn latest_price(&self, asset: AssetId) -> Option<PriceUpdate> {
        self.prices.get(&asset).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const WETH: AssetId = AssetId(2);
    const USDC: AssetId = AssetId(1);

    #[test]
    fn test_price_update_staleness() {
        let update = PriceUpdate::new(WETH, dec!(4000), Timestamp::from_secs(1000), 1).with_ttl(60_000);

        assert!(!update.is_stale(Timestamp::from_secs(1030))); // 30 seconds later, still fresh
        assert!(!update.is_stale(Timestamp::from_secs(1060))); // exactly at TTL
        assert!(update.is_stale(Timestamp::from_secs(1061))); // 1 second past TTL
    }

    #[test]
    fn test_missing_price_fails_closed() {
        let board = PriceBoard::new(1, "chainlink");
        let err = fresh_price(&board, WETH, Timestamp::from_secs(0)).unwrap_err();
        assert_eq!(err.to_string(), "Oracle has no information about the token!");
    }

    #[test]
    fn test_zero_price_fails_closed() {
        let mut board = PriceBoard::new(1, "chainlink");
        board.set_price(WETH, Decimal::ZERO, Timestamp::from_secs(0));
        assert!(matches!(
            fresh_price(&board, WETH, Timestamp::from_secs(1)),
            Err(PriceFeedError::NoPriceAvailable { .. })
        ));
    }

    #[test]
    fn test_stale_price_fails_closed() {
        let mut board = PriceBoard::new(1, "chainlink").with_ttl(1_000);
        board.set_price(WETH, dec!(4000), Timestamp::from_secs(0));
        assert!(fresh_price(&board, WETH, Timestamp::from_millis(1_000)).is_ok());
        assert!(matches!(
            fresh_price(&board, WETH, Timestamp::from_millis(1_001)),
            Err(PriceFeedError::Stale { .. })
        ));
    }

    #[test]
    fn test_cross_rate() {
        let mut board = PriceBoard::new(1, "chainlink");
        let now = Timestamp::from_secs(0);
        board.set_price(WETH, dec!(4000), now);
        board.set_price(USDC, dec!(1), now);

        assert_eq!(cross_rate(&board, WETH, USDC, now).unwrap(), dec!(4000));
        assert_eq!(cross_rate(&board, USDC, WETH, now).unwrap(), dec!(0.00025));
        assert_eq!(cross_rate(&board, USDC, USDC, now).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_deviation() {
        assert_eq!(deviation(dec!(102), dec!(100)), dec!(0.02));
        assert_eq!(deviation(dec!(98), dec!(100)), dec!(0.02));
    }
}
