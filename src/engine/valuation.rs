// 8.7: valuation. everything is priced in the reference asset: fungible balances through
// the router's quotes, positions through their module, debt through the price feed.

use rust_decimal::Decimal;

use super::core::Engine;
use super::results::{EngineError, RiskZone};
use crate::accounts::AccountRegistry;
use crate::price_feed::cross_rate;
use crate::router::QuoteContext;
use crate::types::{truncate_ratio, AssetId, MarginAccountId, Timestamp, INFINITE_RATIO};

impl Engine {
    pub(super) fn quote_context(&self) -> QuoteContext<'_> {
        QuoteContext {
            ledger: &self.ledger,
            prices: &self.prices,
            positions: &self.options,
            now: self.current_time,
        }
    }

    /// Realizable value of everything the account holds, in the reference asset.
    pub fn collateral_value(&self, account: MarginAccountId) -> Result<Decimal, EngineError> {
        let ctx = self.quote_context();
        let mut total = Decimal::ZERO;

        for (asset, amount) in self.vault.account_balances(account) {
            total += if asset == self.reference_asset {
                amount
            } else {
                self.router.calculate_amount_out(&ctx, asset, self.reference_asset, amount)?
            };
        }
        for (collection, position) in self.vault.account_positions(account) {
            total += self
                .router
                .position_value(&ctx, collection, self.reference_asset, position)?;
        }
        Ok(total)
    }

    /// Debt with accrued interest across every pool, in the reference asset.
    pub fn debt_value(&self, account: MarginAccountId) -> Result<Decimal, EngineError> {
        let mut total = Decimal::ZERO;
        for (asset, pool) in &self.pools {
            let debt = pool.debt_with_accrued_interest(account, self.current_time)?;
            if debt.is_zero() {
                continue;
            }
            total += if *asset == self.reference_asset {
                debt
            } else {
                debt * cross_rate(&self.prices, *asset, self.reference_asset, self.current_time)?
            };
        }
        Ok(total)
    }

    // unchecked: the account id is not validated
    pub(super) fn ratio_of(&self, account: MarginAccountId) -> Result<Decimal, EngineError> {
        let debt = self.debt_value(account)?;
        if debt.is_zero() {
            return Ok(INFINITE_RATIO);
        }
        let collateral = self.collateral_value(account)?;
        Ok(collateral
            .checked_div(debt)
            .map(truncate_ratio)
            .unwrap_or(INFINITE_RATIO))
    }

    pub(super) fn zone_for(&self, ratio: Decimal) -> RiskZone {
        if ratio <= self.risk.red_coeff {
            RiskZone::Red
        } else if ratio < self.risk.yellow_coeff {
            RiskZone::Yellow
        } else {
            RiskZone::Green
        }
    }

    /// `collateral / debt` truncated to 5 places; `Decimal::MAX` without debt.
    pub fn margin_ratio(&self, account: MarginAccountId) -> Result<Decimal, EngineError> {
        self.accounts.owner_of(account)?;
        self.ratio_of(account)
    }

    pub fn risk_zone(&self, account: MarginAccountId) -> Result<RiskZone, EngineError> {
        Ok(self.zone_for(self.margin_ratio(account)?))
    }

    pub fn debt_with_accrued_interest(&self, account: MarginAccountId, asset: AssetId) -> Result<Decimal, EngineError> {
        self.debt_with_accrued_interest_at(account, asset, self.current_time)
    }

    pub fn debt_with_accrued_interest_at(&self, account: MarginAccountId, asset: AssetId, at: Timestamp) -> Result<Decimal, EngineError> {
        let pool = self.pools.get(&asset).ok_or(EngineError::UnsupportedToken(asset))?;
        Ok(pool.debt_with_accrued_interest(account, at)?)
    }
}
