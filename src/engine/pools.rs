// 8.12: liquidity-provider facade over the lending pools, and the pool parameter setters.
// setters here are not timelocked; each emits a before/after event.

use rust_decimal::Decimal;

use super::core::Engine;
use super::results::EngineError;
use crate::access::Role;
use crate::events::{EventPayload, ParamUpdate, ProvideEvent, WithdrawEvent};
use crate::pool::{LendingPool, ProvideOutcome, WithdrawOutcome};
use crate::types::{Address, AssetId, Bps};

impl Engine {
    fn pool_mut(&mut self, asset: AssetId) -> Result<&mut LendingPool, EngineError> {
        self.pools.get_mut(&asset).ok_or(EngineError::UnsupportedToken(asset))
    }

    /// Deposits `amount` of the pool's asset for deposit shares. The caller
    /// must have approved the pool address.
    pub fn provide_liquidity(&mut self, caller: Address, asset: AssetId, amount: Decimal) -> Result<ProvideOutcome, EngineError> {
        self.transact("provide_liquidity", None, |e| {
            let now = e.current_time;
            let pool = e.pools.get_mut(&asset).ok_or(EngineError::UnsupportedToken(asset))?;
            let outcome = pool.provide(&mut e.ledger, caller, amount, now)?;
            e.emit_event(EventPayload::Provide(ProvideEvent {
                asset,
                provider: caller,
                amount: outcome.amount,
                shares_minted: outcome.shares_minted,
                total_deposits_before: outcome.total_deposits_before,
                total_deposits_after: outcome.total_deposits_after,
                total_liquidity_before: outcome.total_liquidity_before,
                total_liquidity_after: outcome.total_liquidity_after,
            }));
            Ok(outcome)
        })
    }

    pub fn withdraw_liquidity(&mut self, caller: Address, asset: AssetId, shares: Decimal) -> Result<WithdrawOutcome, EngineError> {
        self.transact("withdraw_liquidity", None, |e| {
            let now = e.current_time;
            let pool = e.pools.get_mut(&asset).ok_or(EngineError::UnsupportedToken(asset))?;
            let outcome = pool.withdraw(&mut e.ledger, caller, shares, now)?;
            e.emit_event(EventPayload::Withdraw(WithdrawEvent {
                asset,
                holder: caller,
                amount: outcome.amount,
                shares_burned: outcome.shares_burned,
                total_deposits_before: outcome.total_deposits_before,
                total_deposits_after: outcome.total_deposits_after,
                total_liquidity_before: outcome.total_liquidity_before,
                total_liquidity_after: outcome.total_liquidity_after,
            }));
            Ok(outcome)
        })
    }

    pub fn transfer_pool_shares(&mut self, caller: Address, asset: AssetId, to: Address, shares: Decimal) -> Result<(), EngineError> {
        self.transact("transfer_pool_shares", None, |e| {
            e.pool_mut(asset)?.transfer_shares(caller, to, shares)?;
            Ok(())
        })
    }

    // 8.12.1: pool parameters. Manager on the engine

    pub fn set_interest_rate(&mut self, caller: Address, asset: AssetId, rate: Bps) -> Result<(), EngineError> {
        self.transact("set_interest_rate", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let (engine, now) = (e.address, e.current_time);
            let change = e.pool_mut(asset)?.set_interest_rate(engine, rate, now)?;
            e.emit_event(EventPayload::UpdateInterestRate(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }

    pub fn set_maximum_pool_capacity(&mut self, caller: Address, asset: AssetId, capacity: Decimal) -> Result<(), EngineError> {
        self.transact("set_maximum_pool_capacity", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let engine = e.address;
            let change = e.pool_mut(asset)?.set_maximum_pool_capacity(engine, capacity)?;
            e.emit_event(EventPayload::UpdateMaximumPoolCapacity(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }

    pub fn set_maximum_borrow_multiplier(&mut self, caller: Address, asset: AssetId, multiplier: Bps) -> Result<(), EngineError> {
        self.transact("set_maximum_borrow_multiplier", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let engine = e.address;
            let change = e.pool_mut(asset)?.set_maximum_borrow_multiplier(engine, multiplier)?;
            e.emit_event(EventPayload::UpdateMaximumBorrowMultiplier(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }

    pub fn set_insurance_rate_multiplier(&mut self, caller: Address, asset: AssetId, multiplier: Bps) -> Result<(), EngineError> {
        self.transact("set_insurance_rate_multiplier", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let engine = e.address;
            let change = e.pool_mut(asset)?.set_insurance_rate_multiplier(engine, multiplier)?;
            e.emit_event(EventPayload::UpdateInsuranceRateMultiplier(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }

    pub fn set_insurance_pool(&mut self, caller: Address, asset: AssetId, insurance_pool: Address) -> Result<(), EngineError> {
        self.transact("set_insurance_pool", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let engine = e.address;
            let change = e.pool_mut(asset)?.set_insurance_pool(engine, insurance_pool)?;
            e.emit_event(EventPayload::UpdateInsurancePool(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }

    pub fn set_withdrawal_delay(&mut self, caller: Address, asset: AssetId, delay_millis: i64) -> Result<(), EngineError> {
        self.transact("set_withdrawal_delay", None, |e| {
            e.access.require(Role::Manager, caller)?;
            let engine = e.address;
            let change = e.pool_mut(asset)?.set_withdrawal_delay(engine, delay_millis)?;
            e.emit_event(EventPayload::UpdateWithdrawalDelay(ParamUpdate {
                asset,
                before: change.before,
                after: change.after,
            }));
            Ok(())
        })
    }
}
