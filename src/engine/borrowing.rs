// 8.9: borrow and repay. borrowed funds never leave custody: the pool pays the vault and
// the account is credited, repayments are pulled back out of the vault.

use rust_decimal::Decimal;
use tracing::debug;

use super::core::Engine;
use super::results::EngineError;
use crate::events::{BorrowEvent, EventPayload, RepayEvent};
use crate::pool::{BorrowOutcome, PoolError, RepayOutcome};
use crate::types::{Address, AssetId, MarginAccountId};

impl Engine {
    /// Borrows `amount` of `asset` into the account. Fails unless the
    /// resulting ratio stays at or above the yellow threshold.
    pub fn borrow(&mut self, caller: Address, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<BorrowOutcome, EngineError> {
        self.transact("borrow", Some(account), |e| {
            e.authorize(caller, account)?;
            if !e.vault.is_fungible_available(asset) {
                return Err(EngineError::UnsupportedToken(asset));
            }
            let vault_address = e.vault.address();
            let now = e.current_time;
            let pool = e.pools.get_mut(&asset).ok_or(EngineError::UnsupportedToken(asset))?;
            let outcome = pool.borrow(&mut e.ledger, e.address, account, amount, vault_address, now)?;
            e.vault.credit(account, asset, outcome.amount);

            let ratio_after = e.ratio_of(account)?;
            if ratio_after < e.risk.yellow_coeff {
                return Err(EngineError::BorrowRatio { ratio_after });
            }

            debug!(account = account.0, asset = asset.0, amount = %outcome.amount, %ratio_after, "borrowed");
            e.emit_event(EventPayload::Borrow(BorrowEvent {
                asset,
                account,
                amount: outcome.amount,
                debt_shares_minted: outcome.shares_minted,
                net_debt_before: outcome.net_debt_before,
                net_debt_after: outcome.net_debt_after,
            }));
            Ok(outcome)
        })
    }

    /// Repays from the account's vault balance. `amount == 0` repays the full
    /// accrued debt; larger amounts are capped at the debt. Repaying an
    /// account without debt is a no-op.
    pub fn repay(&mut self, caller: Address, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<RepayOutcome, EngineError> {
        self.transact("repay", Some(account), |e| {
            e.authorize(caller, account)?;
            if amount < Decimal::ZERO {
                return Err(PoolError::ZeroAmount.into());
            }
            e.repay_from_vault(account, asset, amount)
        })
    }

    // shared with liquidation; runs inside the caller's transaction
    pub(super) fn repay_from_vault(&mut self, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<RepayOutcome, EngineError> {
        let vault_address = self.vault.address();
        let now = self.current_time;
        let pool = self.pools.get_mut(&asset).ok_or(EngineError::UnsupportedToken(asset))?;

        let debt = pool.debt_with_accrued_interest(account, now)?;
        if debt.is_zero() {
            return Ok(RepayOutcome {
                net_debt_before: pool.net_debt(),
                net_debt_after: pool.net_debt(),
                ..RepayOutcome::default()
            });
        }
        let to_repay = if amount.is_zero() { debt } else { amount.min(debt) };

        // debit first: the pool pulls straight from custody
        self.vault.debit(account, asset, to_repay)?;
        let outcome = pool.repay(&mut self.ledger, self.address, account, to_repay, vault_address, now)?;
        if outcome.repaid < to_repay {
            // sub-unit dust the pool did not take
            self.vault.credit(account, asset, to_repay - outcome.repaid);
        }

        debug!(
            account = account.0,
            asset = asset.0,
            repaid = %outcome.repaid,
            remaining = %outcome.remaining_debt,
            "repaid"
        );
        self.emit_event(EventPayload::Repay(RepayEvent {
            asset,
            account,
            repaid: outcome.repaid,
            interest: outcome.interest,
            insurance_cut: outcome.insurance_cut,
            remaining_debt: outcome.remaining_debt,
            net_debt_before: outcome.net_debt_before,
            net_debt_after: outcome.net_debt_after,
        }));
        Ok(outcome)
    }
}
