// 7.3: exercise module for option-like positions. values a position at its payoff while
// it is active, and on exercise takes the position and pays the payoff from its treasury.

use rust_decimal::Decimal;
use tracing::debug;

use super::{ModuleContext, ModuleKind, QuoteContext, RouterError, SwapModule};
use crate::types::{round_down, Address, AssetId, CollectionId, PositionId};

#[derive(Debug, Clone)]
pub struct OptionExerciseModule {
    name: String,
    address: Address,
    settlement_asset: AssetId,
}

impl OptionExerciseModule {
    pub fn new(name: &str, treasury: Address, settlement_asset: AssetId) -> Self {
        Self {
            name: name.to_string(),
            address: treasury,
            settlement_asset,
        }
    }

}

impl SwapModule for OptionExerciseModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Exercise
    }

    fn address(&self) -> Address {
        self.address
    }

    fn settlement_asset(&self) -> Option<AssetId> {
        Some(self.settlement_asset)
    }

    fn check_validity(&self, ctx: &QuoteContext<'_>, collection: CollectionId, position: PositionId) -> bool {
        ctx.positions.is_active(collection, position, ctx.now) && ctx.positions.payoff(collection, position) > Decimal::ZERO
    }

    fn position_value(&self, ctx: &QuoteContext<'_>, collection: CollectionId, position: PositionId) -> Result<Decimal, RouterError> {
        if !ctx.positions.is_active(collection, position, ctx.now) {
            return Ok(Decimal::ZERO);
        }
        let decimals = ctx.ledger.decimals(self.settlement_asset)?;
        Ok(round_down(ctx.positions.payoff(collection, position), decimals))
    }

    fn exercise(
        &self,
        ctx: &mut ModuleContext<'_>,
        holder: Address,
        recipient: Address,
        collection: CollectionId,
        position: PositionId,
    ) -> Result<Decimal, RouterError> {
        if !self.check_validity(&ctx.view(), collection, position) {
            return Err(RouterError::InvalidPosition { collection, position });
        }
        if ctx.ledger.owner_of_position(collection, position)? != holder {
            return Err(RouterError::InvalidPosition { collection, position });
        }

        ctx.ledger.transfer_position(self.address, self.address, collection, position)?;
        let payoff = ctx.positions.settle(collection, position, ctx.now)?;
        let decimals = ctx.ledger.decimals(self.settlement_asset)?;
        let payoff = round_down(payoff, decimals);
        ctx.ledger.transfer(self.address, recipient, self.settlement_asset, payoff)?;

        debug!(module = %self.name, collection = collection.0, position = position.0, %payoff, "position exercised");
        Ok(payoff)
    }
}
