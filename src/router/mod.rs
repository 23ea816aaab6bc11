// 7.0: swap routing. the registry maps an asset pair (or a position collection) to a
// module; the engine never knows which venue or settlement mechanism sits behind it.
// modules only see a context (ledger, price feed, option book, clock), never the engine.

mod option_module;
mod oracle_module;
mod registry;

pub use option_module::OptionExerciseModule;
pub use oracle_module::{OracleSwapModule, Venue};
pub use registry::{ModuleHandle, SwapRouter};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access::AccessError;
use crate::ledger::{LedgerError, TokenLedger};
use crate::options::{OptionsError, PositionValuation};
use crate::price_feed::{PriceFeed, PriceFeedError};
use crate::types::{Address, AssetId, CollectionId, PositionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    /// quote + execute
    Swap,
    /// quote + exercise
    Exercise,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("The addresses for the token exchange must not match!")]
    SameAsset,

    #[error("The number of tokens to be exchanged cannot be equal to 0!")]
    ZeroAmount,

    #[error("no exchange module for {asset_in} -> {asset_out}")]
    NoRoute { asset_in: AssetId, asset_out: AssetId },

    #[error("no position module for {collection:?} -> {asset_out}")]
    NoPositionModule { collection: CollectionId, asset_out: AssetId },

    #[error("amount out below minimum: {amount_out} < {min_out}")]
    Slippage { amount_out: Decimal, min_out: Decimal },

    #[error("amount in above maximum: {amount_in} > {max_in}")]
    ExcessiveInput { amount_in: Decimal, max_in: Decimal },

    #[error("module {module} does not support {capability}")]
    Unsupported { module: String, capability: &'static str },

    #[error("token id is not valid")]
    InvalidPosition { collection: CollectionId, position: PositionId },

    #[error("module {module} settles in {settles_in:?}, route pays out {asset_out}")]
    SettlementMismatch {
        module: String,
        settles_in: Option<AssetId>,
        asset_out: AssetId,
    },

    #[error(transparent)]
    PriceFeed(#[from] PriceFeedError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Read-only view handed to quoting calls.
pub struct QuoteContext<'a> {
    pub ledger: &'a TokenLedger,
    pub prices: &'a dyn PriceFeed,
    pub positions: &'a dyn PositionValuation,
    pub now: Timestamp,
}

/// Mutable view handed to execution calls. Balance debits on the caller's
/// side are already applied when a module sees this.
pub struct ModuleContext<'a> {
    pub ledger: &'a mut TokenLedger,
    pub prices: &'a dyn PriceFeed,
    pub positions: &'a mut dyn PositionValuation,
    pub now: Timestamp,
}

impl<'a> ModuleContext<'a> {
    pub fn view(&self) -> QuoteContext<'_> {
        QuoteContext {
            ledger: &*self.ledger,
            prices: self.prices,
            positions: &*self.positions,
            now: self.now,
        }
    }
}

/// One leg of an exchange. For exact-in swaps `amount` is the input and
/// `limit` the minimum output; for exact-out it is the output and the
/// maximum input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub payer: Address,
    pub recipient: Address,
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount: Decimal,
    pub limit: Decimal,
}

impl SwapRequest {
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.asset_in == self.asset_out {
            return Err(RouterError::SameAsset);
        }
        if self.amount <= Decimal::ZERO {
            return Err(RouterError::ZeroAmount);
        }
        Ok(())
    }
}

/// A pluggable venue or instrument adapter. Capabilities a module does not
/// have answer with `RouterError::Unsupported`.
pub trait SwapModule {
    fn name(&self) -> &str;

    fn kind(&self) -> ModuleKind;

    /// Ledger address the module pulls from and pays out of.
    fn address(&self) -> Address;

    /// Asset an exercise pays out in; `None` for modules that cannot exercise.
    fn settlement_asset(&self) -> Option<AssetId> {
        None
    }

    fn quote_exact_in(&self, _ctx: &QuoteContext<'_>, _asset_in: AssetId, _asset_out: AssetId, _amount_in: Decimal) -> Result<Decimal, RouterError> {
        Err(self.unsupported("quote_exact_in"))
    }

    /// Input needed to receive exactly `amount_out`.
    fn quote_exact_out(&self, _ctx: &QuoteContext<'_>, _asset_in: AssetId, _asset_out: AssetId, _amount_out: Decimal) -> Result<Decimal, RouterError> {
        Err(self.unsupported("quote_exact_out"))
    }

    /// Returns the realized output.
    fn swap_exact_in(&self, _ctx: &mut ModuleContext<'_>, _request: SwapRequest) -> Result<Decimal, RouterError> {
        Err(self.unsupported("swap_exact_in"))
    }

    /// Returns the input spent.
    fn swap_exact_out(&self, _ctx: &mut ModuleContext<'_>, _request: SwapRequest) -> Result<Decimal, RouterError> {
        Err(self.unsupported("swap_exact_out"))
    }

    /// True iff the position is active and has a positive payoff.
    fn check_validity(&self, _ctx: &QuoteContext<'_>, _collection: CollectionId, _position: PositionId) -> bool {
        false
    }

    /// Realizable value of the position in the module's settlement asset, zero once inactive.
    fn position_value(&self, _ctx: &QuoteContext<'_>, _collection: CollectionId, _position: PositionId) -> Result<Decimal, RouterError> {
        Err(self.unsupported("position_value"))
    }

    /// Takes the position from `holder` and pays its payoff to `recipient`.
    fn exercise(
        &self,
        _ctx: &mut ModuleContext<'_>,
        _holder: Address,
        _recipient: Address,
        _collection: CollectionId,
        _position: PositionId,
    ) -> Result<Decimal, RouterError> {
        Err(self.unsupported("exercise"))
    }

    fn unsupported(&self, capability: &'static str) -> RouterError {
        RouterError::Unsupported {
            module: self.name().to_string(),
            capability,
        }
    }
}
