// 8.0.2: result types and errors for engine operations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access::AccessError;
use crate::accounts::AccountsError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::options::OptionsError;
use crate::pool::PoolError;
use crate::price_feed::PriceFeedError;
use crate::router::RouterError;
use crate::types::{Address, AssetId, CollectionId, MarginAccountId, PositionId};
use crate::vault::VaultError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskZone {
    /// ratio at or above yellow: everything allowed
    Green,
    /// between red and yellow: no new borrowing, no ratio-reducing withdrawals or swaps
    Yellow,
    /// ratio at or below red: liquidatable by anyone
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResult {
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub ratio_before: Decimal,
    pub ratio_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiquidationResult {
    pub account: MarginAccountId,
    pub ratio_before: Decimal,
    pub positions_exercised: Vec<(CollectionId, PositionId, Decimal)>,
    pub positions_returned: Vec<(CollectionId, PositionId)>,
    pub debt_repaid: Vec<(AssetId, Decimal)>,
    pub insurance_used: Vec<(AssetId, Decimal)>,
    pub shortfall: Vec<(AssetId, Decimal)>,
    pub liquidator_fee: Decimal,
    /// Everything left in the account, sent to the owner's wallet.
    pub surplus_to_owner: Vec<(AssetId, Decimal)>,
}

impl LiquidationResult {
    pub fn had_shortfall(&self) -> bool {
        self.shortfall.iter().any(|(_, amount)| !amount.is_zero())
    }
}

/// Error classes a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Authorization,
    Eligibility,
    CapacityLimit,
    RiskThreshold,
    ArithmeticBalance,
    LiquidationState,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("reentrant call")]
    Reentrant,

    #[error("You are not the owner of the token")]
    NotOwner { caller: Address, account: MarginAccountId },

    #[error("Token is not supported")]
    UnsupportedToken(AssetId),

    #[error("Token is not available")]
    TokenNotAvailable(AssetId),

    #[error("token id is not valid")]
    InvalidPosition { collection: CollectionId, position: PositionId },

    #[error("Insufficient funds for the swap")]
    InsufficientSwapFunds { available: Decimal, requested: Decimal },

    #[error("Cannot borrow more; margin account ratio is too high")]
    BorrowRatio { ratio_after: Decimal },

    #[error("portfolioRatio is too low")]
    WithdrawRatio { ratio_after: Decimal },

    #[error("cannot swap; margin account ratio would fall to {ratio_after}")]
    SwapRatio { ratio_before: Decimal, ratio_after: Decimal },

    #[error("Margin Account ratio is too high to execute liquidation")]
    NotLiquidatable { ratio: Decimal },

    #[error("liquidation left {remaining} of {asset} unpaid")]
    LiquidationIncomplete { asset: AssetId, remaining: Decimal },

    #[error("asset {0} already has a pool")]
    PoolExists(AssetId),

    #[error("invalid risk parameter: {0}")]
    InvalidRiskParameter(&'static str),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Accounts(#[from] AccountsError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    PriceFeed(#[from] PriceFeedError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        use ErrorCategory::*;
        match self {
            EngineError::Reentrant | EngineError::NotOwner { .. } | EngineError::Access(_) => Authorization,
            EngineError::Accounts(AccountsError::NotOwnerOrApproved { .. }) => Authorization,
            EngineError::Accounts(AccountsError::InvalidAccount(_)) => Eligibility,

            EngineError::UnsupportedToken(_)
            | EngineError::TokenNotAvailable(_)
            | EngineError::InvalidPosition { .. }
            | EngineError::PoolExists(_)
            | EngineError::InvalidRiskParameter(_)
            | EngineError::PriceFeed(_)
            | EngineError::Options(_)
            | EngineError::Config(_) => Eligibility,

            EngineError::BorrowRatio { .. } | EngineError::WithdrawRatio { .. } | EngineError::SwapRatio { .. } => RiskThreshold,

            EngineError::NotLiquidatable { .. } | EngineError::LiquidationIncomplete { .. } => LiquidationState,

            EngineError::InsufficientSwapFunds { .. } | EngineError::Ledger(_) => ArithmeticBalance,

            EngineError::Pool(e) => match e {
                PoolError::Access(_) => Authorization,
                PoolError::CapacityExceeded { .. }
                | PoolError::LimitExceeded { .. }
                | PoolError::InsufficientFreeLiquidity { .. }
                | PoolError::WithdrawalLocked { .. } => CapacityLimit,
                PoolError::InsuranceRateTooHigh | PoolError::InvalidParameter(_) => Eligibility,
                _ => ArithmeticBalance,
            },

            EngineError::Vault(e) => match e {
                VaultError::Access(_) => Authorization,
                VaultError::NotAvailableForDeposit | VaultError::NotAvailableForWithdrawal { .. } | VaultError::IdNotFound { .. } => Eligibility,
                _ => ArithmeticBalance,
            },

            EngineError::Router(e) => match e {
                RouterError::Access(_) => Authorization,
                RouterError::SameAsset | RouterError::ZeroAmount | RouterError::Slippage { .. } | RouterError::ExcessiveInput { .. } | RouterError::Ledger(_) => {
                    ArithmeticBalance
                }
                _ => Eligibility,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn categories_follow_taxonomy() {
        let not_owner = EngineError::NotOwner {
            caller: Address(1),
            account: MarginAccountId(0),
        };
        assert_eq!(not_owner.category(), ErrorCategory::Authorization);
        assert_eq!(EngineError::UnsupportedToken(AssetId(9)).category(), ErrorCategory::Eligibility);
        assert_eq!(
            EngineError::Pool(PoolError::LimitExceeded {
                limit: dec!(1),
                requested: dec!(2)
            })
            .category(),
            ErrorCategory::CapacityLimit
        );
        assert_eq!(
            EngineError::BorrowRatio { ratio_after: dec!(1.09) }.category(),
            ErrorCategory::RiskThreshold
        );
        assert_eq!(
            EngineError::Vault(VaultError::InsufficientBalance {
                available: dec!(0),
                requested: dec!(1)
            })
            .category(),
            ErrorCategory::ArithmeticBalance
        );
        assert_eq!(
            EngineError::NotLiquidatable { ratio: dec!(2) }.category(),
            ErrorCategory::LiquidationState
        );
    }

    #[test]
    fn messages_match_protocol_wording() {
        assert_eq!(
            EngineError::BorrowRatio { ratio_after: dec!(1.09) }.to_string(),
            "Cannot borrow more; margin account ratio is too high"
        );
        assert_eq!(
            EngineError::NotLiquidatable { ratio: dec!(2) }.to_string(),
            "Margin Account ratio is too high to execute liquidation"
        );
        let pool_err: EngineError = PoolError::NoPoolTokens.into();
        assert_eq!(pool_err.to_string(), "Liquidity pool has no pool tokens");
    }
}
