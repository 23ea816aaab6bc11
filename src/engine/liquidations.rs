//! Liquidation of red-zone margin accounts.
//!
//! Collateral is converted into the debt assets and repaid pool by pool.
//! Whatever collateral cannot cover is drawn from the pool's insurance sink
//! and then written off against the pool's depositors. The liquidator earns a
//! cut of the reference-asset surplus; everything else goes to the owner.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::core::Engine;
use super::results::{EngineError, LiquidationResult, RiskZone};
use crate::accounts::AccountRegistry;
use crate::events::{EventPayload, LiquidationEvent, ShortfallEvent};
use crate::types::{round_down, Address, AssetId, MarginAccountId};

impl Engine {
    /// Accounts currently at or below the red threshold.
    pub fn liquidatable_accounts(&self) -> Vec<MarginAccountId> {
        (0..self.accounts.len() as u64)
            .map(MarginAccountId)
            .filter(|account| {
                self.ratio_of(*account)
                    .map(|ratio| self.zone_for(ratio) == RiskZone::Red)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Liquidates a red-zone account. Anyone may call it; the caller receives
    /// the liquidator fee.
    pub fn liquidate(&mut self, caller: Address, account: MarginAccountId) -> Result<LiquidationResult, EngineError> {
        self.transact("liquidate", Some(account), |e| e.liquidate_inner(caller, account))
    }

    fn liquidate_inner(&mut self, caller: Address, account: MarginAccountId) -> Result<LiquidationResult, EngineError> {
        let owner = self.accounts.owner_of(account)?;
        let ratio_before = self.ratio_of(account)?;
        if self.zone_for(ratio_before) != RiskZone::Red {
            return Err(EngineError::NotLiquidatable { ratio: ratio_before });
        }

        let mut result = LiquidationResult {
            account,
            ratio_before,
            ..LiquidationResult::default()
        };
        let reference = self.reference_asset;

        // positions: realize the live ones, hand back the worthless ones
        for (collection, position) in self.vault.account_positions(account) {
            let valid = self
                .router
                .check_validity(&self.quote_context(), collection, reference, position);
            if valid {
                let payoff = self.exercise_in_custody(account, collection, position)?;
                result.positions_exercised.push((collection, position, payoff));
            } else {
                self.vault.remove_position(account, collection, position)?;
                self.ledger
                    .transfer_position(self.vault.address(), owner, collection, position)?;
                result.positions_returned.push((collection, position));
            }
        }

        let mut debt_assets: Vec<AssetId> = self
            .pools
            .iter()
            .filter(|(_, pool)| !pool.debt_shares_of(account).is_zero())
            .map(|(asset, _)| *asset)
            .collect();
        debt_assets.sort_by_key(|asset| (*asset != reference, *asset));

        // same-asset balances pay their own debt first
        for &asset in &debt_assets {
            self.repay_held(account, asset, &mut result)?;
        }

        // everything else not owed becomes reference asset
        for (asset, amount) in self.vault.account_balances(account) {
            if asset == reference || !self.debt_of(account, asset)?.is_zero() {
                continue;
            }
            if self.router.get_module(asset, reference).is_some() {
                self.swap_in_custody(account, asset, reference, amount, Decimal::ZERO)?;
            }
        }

        for &asset in &debt_assets {
            let debt = self.debt_of(account, asset)?;
            if debt.is_zero() {
                continue;
            }
            if asset != reference {
                self.buy_debt_asset(account, asset, debt)?;
            }
            self.repay_held(account, asset, &mut result)?;
            self.settle_shortfall(account, asset, &mut result)?;
        }

        for &asset in &debt_assets {
            let remaining = self.debt_of(account, asset)?;
            let shares = self
                .pools
                .get(&asset)
                .map(|pool| pool.debt_shares_of(account))
                .unwrap_or(Decimal::ZERO);
            if !remaining.is_zero() || !shares.is_zero() {
                return Err(EngineError::LiquidationIncomplete { asset, remaining });
            }
        }

        // liquidator fee out of the reference surplus, the rest to the owner
        let surplus = self.vault.get_balance(account, reference);
        let decimals = self.ledger.decimals(reference)?;
        let fee = round_down(surplus * self.risk.liquidator_fee.as_fraction(), decimals);
        if fee > Decimal::ZERO {
            self.vault
                .withdraw_fungible(&mut self.ledger, self.address, account, caller, reference, fee)?;
        }
        result.liquidator_fee = fee;

        for (asset, amount) in self.vault.account_balances(account) {
            self.vault
                .withdraw_fungible(&mut self.ledger, self.address, account, owner, asset, amount)?;
            result.surplus_to_owner.push((asset, amount));
        }

        let surplus_to_owner = result
            .surplus_to_owner
            .iter()
            .find(|(asset, _)| *asset == reference)
            .map(|(_, amount)| *amount)
            .unwrap_or(Decimal::ZERO);

        if result.had_shortfall() {
            warn!(account = account.0, %ratio_before, shortfall = ?result.shortfall, "account liquidated with shortfall");
        } else {
            info!(account = account.0, %ratio_before, liquidator_fee = %fee, %surplus_to_owner, "account liquidated");
        }
        self.emit_event(EventPayload::Liquidation(LiquidationEvent {
            account,
            liquidator: caller,
            owner,
            ratio_before,
            liquidator_fee: fee,
            surplus_to_owner,
        }));
        Ok(result)
    }

    fn debt_of(&self, account: MarginAccountId, asset: AssetId) -> Result<Decimal, EngineError> {
        match self.pools.get(&asset) {
            Some(pool) => Ok(pool.debt_with_accrued_interest(account, self.current_time)?),
            None => Ok(Decimal::ZERO),
        }
    }

    // repays as much of the asset's debt as the account holds of it
    fn repay_held(&mut self, account: MarginAccountId, asset: AssetId, result: &mut LiquidationResult) -> Result<(), EngineError> {
        let held = self.vault.get_balance(account, asset);
        if held.is_zero() || self.debt_of(account, asset)?.is_zero() {
            return Ok(());
        }
        let outcome = self.repay_from_vault(account, asset, held)?;
        add_to(&mut result.debt_repaid, asset, outcome.repaid);
        Ok(())
    }

    // buys the debt asset with the reference balance: exactly the debt when
    // affordable, otherwise everything there is
    fn buy_debt_asset(&mut self, account: MarginAccountId, asset: AssetId, debt: Decimal) -> Result<(), EngineError> {
        let reference = self.reference_asset;
        let budget = self.vault.get_balance(account, reference);
        if budget.is_zero() || self.router.get_module(reference, asset).is_none() {
            return Ok(());
        }
        let missing = debt - self.vault.get_balance(account, asset);
        if missing <= Decimal::ZERO {
            return Ok(());
        }
        let needed = self
            .router
            .calculate_amount_in(&self.quote_context(), reference, asset, missing)?;
        if needed <= budget {
            self.buy_in_custody(account, reference, asset, missing)?;
        } else {
            self.swap_in_custody(account, reference, asset, budget, Decimal::ZERO)?;
        }
        Ok(())
    }

    // insurance sink first, then the pool's depositors
    fn settle_shortfall(&mut self, account: MarginAccountId, asset: AssetId, result: &mut LiquidationResult) -> Result<(), EngineError> {
        let remaining = self.debt_of(account, asset)?;
        if remaining.is_zero() {
            return Ok(());
        }
        let Some(pool) = self.pools.get(&asset) else {
            return Ok(());
        };
        let insurance = pool.insurance_pool();
        let vault = self.vault.address();

        let cover = self.ledger.balance_of(insurance, asset).min(remaining);
        if cover > Decimal::ZERO {
            self.ledger.transfer(insurance, vault, asset, cover)?;
            self.vault.credit(account, asset, cover);
            let outcome = self.repay_from_vault(account, asset, cover)?;
            add_to(&mut result.debt_repaid, asset, outcome.repaid);
            add_to(&mut result.insurance_used, asset, outcome.repaid);
        }

        let (engine, now) = (self.address, self.current_time);
        let Some(pool) = self.pools.get_mut(&asset) else {
            return Ok(());
        };
        let outcome = pool.absorb_shortfall(engine, account, now)?;
        if !outcome.debt_written_off.is_zero() {
            add_to(&mut result.shortfall, asset, outcome.debt_written_off);
        }

        self.emit_event(EventPayload::Shortfall(ShortfallEvent {
            asset,
            account,
            covered_by_insurance: cover,
            socialized: outcome.debt_written_off,
            share_price_before: outcome.share_price_before,
            share_price_after: outcome.share_price_after,
        }));
        Ok(())
    }
}

fn add_to(entries: &mut Vec<(AssetId, Decimal)>, asset: AssetId, amount: Decimal) {
    if amount.is_zero() {
        return;
    }
    match entries.iter_mut().find(|(a, _)| *a == asset) {
        Some((_, total)) => *total += amount,
        None => entries.push((asset, amount)),
    }
}
