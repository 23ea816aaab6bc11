// 12.0 config.rs: protocol settings in one place. listed assets and their pools,
// risk thresholds, timelock, oracle freshness. presets per environment.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::pool::{PoolParams, MAX_INSURANCE_RATE_MULTIPLIER};
use crate::types::{default_red_coeff, default_yellow_coeff, Bps};

/// Shortest timelock a production deployment may use.
pub const MIN_TIMELOCK_MILLIS: i64 = 3_600_000;
/// Longest timelock, one week.
pub const MAX_TIMELOCK_MILLIS: i64 = 7 * 86_400_000;
/// Mainnet default: one day.
pub const DEFAULT_TIMELOCK_MILLIS: i64 = 86_400_000;

// One listed fungible asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u32,
    // Price in the reference asset at startup
    pub initial_price: Decimal,
    // None means collateral only, no lending pool
    pub pool: Option<PoolParams>,
}

impl AssetConfig {
    pub fn new(symbol: &str, decimals: u32, initial_price: Decimal, pool: Option<PoolParams>) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            initial_price,
            pool,
        }
    }
}

/** 12.1: risk thresholds. lower ratio means more risk, so yellow sits above red */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    // Borrowing and ratio-reducing withdrawals stop below this
    pub yellow_coeff: Decimal,
    // Liquidatable at or below this
    pub red_coeff: Decimal,
    // Cut of the reference-asset surplus paid to the liquidator
    pub liquidator_fee: Bps,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            yellow_coeff: default_yellow_coeff(),
            red_coeff: default_red_coeff(),
            liquidator_fee: Bps::new(100), // 1%
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.red_coeff <= Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "red coefficient must be above 1.0".to_string(),
            });
        }
        if self.yellow_coeff <= self.red_coeff {
            return Err(ConfigError::InvalidRisk {
                reason: "yellow coefficient must be above red".to_string(),
            });
        }
        if self.liquidator_fee.is_negative() || self.liquidator_fee > Bps::MAX {
            return Err(ConfigError::InvalidRisk {
                reason: "liquidator fee must be within 0..=10000 bps".to_string(),
            });
        }
        Ok(())
    }
}

// The complete protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    // Symbol of the asset every value is quoted in
    pub reference_asset: String,
    pub assets: Vec<AssetConfig>,
    pub risk: RiskConfig,
    // None disables the two-phase guard on risk setters
    pub timelock_delay_millis: Option<i64>,
    // Prices older than this are treated as missing
    pub price_ttl_millis: i64,
    // Fee of the built-in oracle swap module
    pub swap_fee: Bps,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            reference_asset: "USDC".to_string(),
            assets: vec![
                AssetConfig::new("USDC", 6, dec!(1), Some(PoolParams::default())),
                AssetConfig::new("WETH", 18, dec!(4000), Some(PoolParams::default())),
                AssetConfig::new("WBTC", 8, dec!(60000), Some(PoolParams::default())),
            ],
            risk: RiskConfig::default(),
            timelock_delay_millis: None,
            price_ttl_millis: 3_600_000,
            swap_fee: Bps::new(0),
        }
    }
}

impl ProtocolConfig {
    // Testnet: looser oracle freshness, a small swap fee to exercise fee paths
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.price_ttl_millis = 86_400_000;
        config.swap_fee = Bps::new(5);
        config.risk.liquidator_fee = Bps::new(50);
        config
    }

    // Mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.risk.yellow_coeff = dec!(1.20);
        config.risk.red_coeff = dec!(1.10);
        config.timelock_delay_millis = Some(DEFAULT_TIMELOCK_MILLIS);
        config.price_ttl_millis = 600_000; // 10 minutes
        config.swap_fee = Bps::new(30);
        for asset in &mut config.assets {
            if let Some(pool) = asset.pool.as_mut() {
                pool.insurance_rate_multiplier = Bps::new(3_000);
                pool.maximum_borrow_multiplier = Bps::new(7_000);
                pool.withdrawal_delay_millis = 3_600_000;
            }
        }
        config
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn asset(&self, symbol: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset(&self.reference_asset).is_none() {
            return Err(ConfigError::UnknownReferenceAsset(self.reference_asset.clone()));
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if !seen.insert(asset.symbol.as_str()) {
                return Err(ConfigError::InvalidAsset {
                    symbol: asset.symbol.clone(),
                    reason: "listed twice".to_string(),
                });
            }
            // rust_decimal carries at most 28 fractional digits
            if asset.decimals > 28 {
                return Err(ConfigError::InvalidAsset {
                    symbol: asset.symbol.clone(),
                    reason: "more than 28 decimals".to_string(),
                });
            }
            if asset.initial_price <= Decimal::ZERO {
                return Err(ConfigError::InvalidAsset {
                    symbol: asset.symbol.clone(),
                    reason: "price must be positive".to_string(),
                });
            }
            if let Some(pool) = &asset.pool {
                validate_pool(&asset.symbol, pool)?;
            }
        }

        self.risk.validate()?;

        if let Some(delay) = self.timelock_delay_millis {
            if !(MIN_TIMELOCK_MILLIS..=MAX_TIMELOCK_MILLIS).contains(&delay) {
                return Err(ConfigError::InvalidTimelock(delay));
            }
        }

        if self.price_ttl_millis <= 0 {
            return Err(ConfigError::InvalidPriceFeed {
                reason: "price ttl must be positive".to_string(),
            });
        }

        if self.swap_fee.is_negative() || self.swap_fee >= Bps::MAX {
            return Err(ConfigError::InvalidFees {
                reason: "swap fee must be below 100%".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_pool(symbol: &str, pool: &PoolParams) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPool {
        symbol: symbol.to_string(),
        reason: reason.to_string(),
    };
    if pool.interest_rate.is_negative() {
        return Err(invalid("interest rate must not be negative"));
    }
    if pool.insurance_rate_multiplier.is_negative() || pool.insurance_rate_multiplier > MAX_INSURANCE_RATE_MULTIPLIER {
        return Err(invalid("insurance multiplier must be within 0..=5000 bps"));
    }
    if pool.maximum_borrow_multiplier.is_negative() {
        return Err(invalid("borrow multiplier must not be negative"));
    }
    if pool.maximum_pool_capacity < Decimal::ZERO {
        return Err(invalid("capacity must not be negative"));
    }
    if pool.withdrawal_delay_millis < 0 {
        return Err(invalid("withdrawal delay must not be negative"));
    }
    Ok(())
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("reference asset {0} is not listed")]
    UnknownReferenceAsset(String),

    #[error("asset {symbol}: {reason}")]
    InvalidAsset { symbol: String, reason: String },

    #[error("pool {symbol}: {reason}")]
    InvalidPool { symbol: String, reason: String },

    #[error("invalid risk config: {reason}")]
    InvalidRisk { reason: String },

    #[error("timelock delay {0}ms outside 1h..=7d")]
    InvalidTimelock(i64),

    #[error("invalid price feed config: {reason}")]
    InvalidPriceFeed { reason: String },

    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("config parse error: {0}")]
    Parse(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}
