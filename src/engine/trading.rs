// 8.10: swaps and position exercise inside custody. the input is debited from the account
// before any module runs; the module pays its output back to the vault.

use rust_decimal::Decimal;
use tracing::debug;

use super::core::Engine;
use super::results::{EngineError, SwapResult};
use crate::events::{EventPayload, ExerciseEvent, SwapEvent};
use crate::router::{ModuleContext, RouterError, SwapRequest, SwapRouter};
use crate::types::{Address, AssetId, CollectionId, MarginAccountId, PositionId};
use crate::vault::VaultError;

impl Engine {
    /// Exchanges `amount_in` of the account's `asset_in` for at least
    /// `min_amount_out` of `asset_out`. A swap may not lower the ratio into
    /// the yellow zone or further inside it.
    pub fn swap(
        &mut self,
        caller: Address,
        account: MarginAccountId,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: Decimal,
        min_amount_out: Decimal,
    ) -> Result<SwapResult, EngineError> {
        self.transact("swap", Some(account), |e| {
            e.authorize(caller, account)?;
            if asset_in == asset_out {
                return Err(RouterError::SameAsset.into());
            }
            let amount_in = e.quantize(asset_in, amount_in)?;
            if amount_in <= Decimal::ZERO {
                return Err(RouterError::ZeroAmount.into());
            }
            for asset in [asset_in, asset_out] {
                if !e.vault.is_fungible_available(asset) {
                    return Err(EngineError::TokenNotAvailable(asset));
                }
            }
            let available = e.vault.get_balance(account, asset_in);
            if amount_in > available {
                return Err(EngineError::InsufficientSwapFunds {
                    available,
                    requested: amount_in,
                });
            }

            let ratio_before = e.ratio_of(account)?;
            let amount_out = e.swap_in_custody(account, asset_in, asset_out, amount_in, min_amount_out)?;
            let ratio_after = e.ratio_of(account)?;
            if ratio_after < ratio_before && ratio_after < e.risk.yellow_coeff {
                return Err(EngineError::SwapRatio { ratio_before, ratio_after });
            }

            Ok(SwapResult {
                amount_in,
                amount_out,
                ratio_before,
                ratio_after,
            })
        })
    }

    /// Realizes a held position into the reference asset. Fails when the
    /// position is inactive or has no payoff.
    pub fn exercise(&mut self, caller: Address, account: MarginAccountId, collection: CollectionId, position: PositionId) -> Result<Decimal, EngineError> {
        self.transact("exercise", Some(account), |e| {
            e.authorize(caller, account)?;
            e.exercise_in_custody(account, collection, position)
        })
    }

    pub(super) fn module_context(&mut self) -> (ModuleContext<'_>, &SwapRouter) {
        (
            ModuleContext {
                ledger: &mut self.ledger,
                prices: &self.prices,
                positions: &mut self.options,
                now: self.current_time,
            },
            &self.router,
        )
    }

    // exact-in leg; debits the input, credits the realized output
    pub(super) fn swap_in_custody(
        &mut self,
        account: MarginAccountId,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: Decimal,
        min_amount_out: Decimal,
    ) -> Result<Decimal, EngineError> {
        let module = self
            .router
            .get_module(asset_in, asset_out)
            .map(|m| m.name().to_string())
            .ok_or(RouterError::NoRoute { asset_in, asset_out })?;

        self.vault.debit(account, asset_in, amount_in)?;
        let vault = self.vault.address();
        let request = SwapRequest {
            payer: vault,
            recipient: vault,
            asset_in,
            asset_out,
            amount: amount_in,
            limit: min_amount_out,
        };
        let (mut ctx, router) = self.module_context();
        let amount_out = router.execute(&mut ctx, request)?;
        self.vault.credit(account, asset_out, amount_out);

        debug!(account = account.0, asset_in = asset_in.0, asset_out = asset_out.0, %amount_in, %amount_out, "swap");
        self.emit_event(EventPayload::Swap(SwapEvent {
            account,
            asset_in,
            asset_out,
            amount_in,
            amount_out,
            module,
        }));
        Ok(amount_out)
    }

    // exact-out leg; returns the input spent
    pub(super) fn buy_in_custody(
        &mut self,
        account: MarginAccountId,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_out: Decimal,
    ) -> Result<Decimal, EngineError> {
        let module = self
            .router
            .get_module(asset_in, asset_out)
            .map(|m| m.name().to_string())
            .ok_or(RouterError::NoRoute { asset_in, asset_out })?;
        let amount_in = self
            .router
            .calculate_amount_in(&self.quote_context(), asset_in, asset_out, amount_out)?;

        self.vault.debit(account, asset_in, amount_in)?;
        let vault = self.vault.address();
        let request = SwapRequest {
            payer: vault,
            recipient: vault,
            asset_in,
            asset_out,
            amount: amount_out,
            limit: amount_in,
        };
        let (mut ctx, router) = self.module_context();
        let spent = router.execute_exact_out(&mut ctx, request)?;
        if spent < amount_in {
            self.vault.credit(account, asset_in, amount_in - spent);
        }
        self.vault.credit(account, asset_out, amount_out);

        self.emit_event(EventPayload::Swap(SwapEvent {
            account,
            asset_in,
            asset_out,
            amount_in: spent,
            amount_out,
            module,
        }));
        Ok(spent)
    }

    pub(super) fn exercise_in_custody(&mut self, account: MarginAccountId, collection: CollectionId, position: PositionId) -> Result<Decimal, EngineError> {
        if !self.vault.holds_position(account, collection, position) {
            return Err(VaultError::IdNotFound { collection, position }.into());
        }
        self.vault.remove_position(account, collection, position)?;

        let vault = self.vault.address();
        let reference = self.reference_asset;
        let (mut ctx, router) = self.module_context();
        let payoff = router.exercise(&mut ctx, vault, vault, collection, reference, position)?;
        self.vault.credit(account, reference, payoff);

        debug!(account = account.0, collection = collection.0, position = position.0, %payoff, "position exercised");
        self.emit_event(EventPayload::Exercise(ExerciseEvent {
            account,
            collection,
            position,
            payoff,
        }));
        Ok(payoff)
    }
}
