// 8.8: collateral in and out of the vault. deposits are always allowed for listed assets;
// withdrawals must leave the account at or above the yellow threshold.

use rust_decimal::Decimal;
use tracing::debug;

use super::core::Engine;
use super::results::EngineError;
use crate::events::{CollateralEvent, EventPayload, PositionEvent};
use crate::types::{Address, AssetId, CollectionId, MarginAccountId, PositionId};
use crate::vault::VaultError;

impl Engine {
    /// Pulls `amount` from the caller's wallet into the account. The caller
    /// must have approved the vault address.
    pub fn provide_erc20(&mut self, caller: Address, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<(), EngineError> {
        self.transact("provide_erc20", Some(account), |e| {
            e.authorize(caller, account)?;
            let amount = e.quantize(asset, amount)?;
            e.vault
                .deposit_fungible(&mut e.ledger, e.address, account, caller, asset, amount)?;

            let balance_after = e.vault.get_balance(account, asset);
            debug!(account = account.0, asset = asset.0, %amount, %balance_after, "collateral deposited");
            e.emit_event(EventPayload::CollateralDeposited(CollateralEvent {
                account,
                asset,
                amount,
                balance_after,
            }));
            Ok(())
        })
    }

    /// Sends `amount` back to the caller's wallet.
    pub fn withdraw_erc20(&mut self, caller: Address, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<(), EngineError> {
        self.transact("withdraw_erc20", Some(account), |e| {
            e.authorize(caller, account)?;
            let amount = e.quantize(asset, amount)?;
            if amount <= Decimal::ZERO {
                return Err(VaultError::ZeroAmount.into());
            }
            e.vault
                .withdraw_fungible(&mut e.ledger, e.address, account, caller, asset, amount)?;
            e.ensure_withdraw_ratio(account)?;

            let balance_after = e.vault.get_balance(account, asset);
            e.emit_event(EventPayload::CollateralWithdrawn(CollateralEvent {
                account,
                asset,
                amount,
                balance_after,
            }));
            Ok(())
        })
    }

    /// Moves a position the caller owns into custody. Only positions that are
    /// active with a positive payoff are accepted.
    pub fn provide_erc721(&mut self, caller: Address, account: MarginAccountId, collection: CollectionId, position: PositionId) -> Result<(), EngineError> {
        self.transact("provide_erc721", Some(account), |e| {
            e.authorize(caller, account)?;
            if !e.vault.is_non_fungible_available(collection) {
                return Err(VaultError::NotAvailableForDeposit.into());
            }
            if e.ledger.owner_of_position(collection, position)? != caller {
                return Err(EngineError::NotOwner { caller, account });
            }
            if !e
                .router
                .check_validity(&e.quote_context(), collection, e.reference_asset, position)
            {
                return Err(EngineError::InvalidPosition { collection, position });
            }

            e.vault
                .deposit_position(&mut e.ledger, e.address, account, collection, position)?;
            debug!(account = account.0, collection = collection.0, position = position.0, "position deposited");
            e.emit_event(EventPayload::PositionDeposited(PositionEvent {
                account,
                collection,
                position,
            }));
            Ok(())
        })
    }

    pub fn withdraw_erc721(&mut self, caller: Address, account: MarginAccountId, collection: CollectionId, position: PositionId) -> Result<(), EngineError> {
        self.transact("withdraw_erc721", Some(account), |e| {
            e.authorize(caller, account)?;
            e.vault
                .withdraw_position(&mut e.ledger, e.address, account, caller, collection, position)?;
            e.ensure_withdraw_ratio(account)?;

            e.emit_event(EventPayload::PositionWithdrawn(PositionEvent {
                account,
                collection,
                position,
            }));
            Ok(())
        })
    }

    fn ensure_withdraw_ratio(&self, account: MarginAccountId) -> Result<(), EngineError> {
        let ratio_after = self.ratio_of(account)?;
        if ratio_after < self.risk.yellow_coeff {
            return Err(EngineError::WithdrawRatio { ratio_after });
        }
        Ok(())
    }
}
