// 7.1: the registry. one module per (asset_in, asset_out) pair and one per
// (collection, asset_out). a module instance can back several pairs.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::{ModuleContext, QuoteContext, RouterError, SwapModule, SwapRequest};
use crate::access::{AccessControl, Role};
use crate::types::{Address, AssetId, CollectionId, PositionId};

pub type ModuleHandle = Arc<dyn SwapModule + Send + Sync>;

#[derive(Clone)]
pub struct SwapRouter {
    access: AccessControl,
    exchange_modules: HashMap<(AssetId, AssetId), ModuleHandle>,
    position_modules: HashMap<(CollectionId, AssetId), ModuleHandle>,
}

// trait objects don't derive Debug
impl fmt::Debug for SwapRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self
            .exchange_modules
            .iter()
            .map(|((i, o), m)| format!("{}->{}: {}", i.0, o.0, m.name()))
            .collect();
        pairs.sort();
        f.debug_struct("SwapRouter")
            .field("exchange_modules", &pairs)
            .field("position_modules", &self.position_modules.len())
            .finish()
    }
}

impl SwapRouter {
    pub fn new(admin: Address) -> Self {
        Self {
            access: AccessControl::new(admin),
            exchange_modules: HashMap::new(),
            position_modules: HashMap::new(),
        }
    }

    pub fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    pub fn set_exchange_module(
        &mut self,
        caller: Address,
        asset_in: AssetId,
        asset_out: AssetId,
        module: ModuleHandle,
    ) -> Result<Option<ModuleHandle>, RouterError> {
        self.access.require(Role::Manager, caller)?;
        if asset_in == asset_out {
            return Err(RouterError::SameAsset);
        }
        info!(asset_in = asset_in.0, asset_out = asset_out.0, module = module.name(), "exchange module set");
        Ok(self.exchange_modules.insert((asset_in, asset_out), module))
    }

    pub fn set_position_module(
        &mut self,
        caller: Address,
        collection: CollectionId,
        asset_out: AssetId,
        module: ModuleHandle,
    ) -> Result<Option<ModuleHandle>, RouterError> {
        self.access.require(Role::Manager, caller)?;
        // an exercise must pay out in the asset the route promises
        let settles_in = module.settlement_asset();
        if settles_in != Some(asset_out) {
            return Err(RouterError::SettlementMismatch {
                module: module.name().to_string(),
                settles_in,
                asset_out,
            });
        }
        info!(collection = collection.0, asset_out = asset_out.0, module = module.name(), "position module set");
        Ok(self.position_modules.insert((collection, asset_out), module))
    }

    pub fn get_module(&self, asset_in: AssetId, asset_out: AssetId) -> Option<&ModuleHandle> {
        self.exchange_modules.get(&(asset_in, asset_out))
    }

    pub fn get_position_module(&self, collection: CollectionId, asset_out: AssetId) -> Option<&ModuleHandle> {
        self.position_modules.get(&(collection, asset_out))
    }

    fn route(&self, asset_in: AssetId, asset_out: AssetId) -> Result<&ModuleHandle, RouterError> {
        if asset_in == asset_out {
            return Err(RouterError::SameAsset);
        }
        self.get_module(asset_in, asset_out)
            .ok_or(RouterError::NoRoute { asset_in, asset_out })
    }

    fn position_route(&self, collection: CollectionId, asset_out: AssetId) -> Result<&ModuleHandle, RouterError> {
        self.get_position_module(collection, asset_out)
            .ok_or(RouterError::NoPositionModule { collection, asset_out })
    }

    pub fn calculate_amount_out(&self, ctx: &QuoteContext<'_>, asset_in: AssetId, asset_out: AssetId, amount_in: Decimal) -> Result<Decimal, RouterError> {
        if amount_in <= Decimal::ZERO {
            return Err(RouterError::ZeroAmount);
        }
        self.route(asset_in, asset_out)?.quote_exact_in(ctx, asset_in, asset_out, amount_in)
    }

    pub fn calculate_amount_in(&self, ctx: &QuoteContext<'_>, asset_in: AssetId, asset_out: AssetId, amount_out: Decimal) -> Result<Decimal, RouterError> {
        if amount_out <= Decimal::ZERO {
            return Err(RouterError::ZeroAmount);
        }
        self.route(asset_in, asset_out)?.quote_exact_out(ctx, asset_in, asset_out, amount_out)
    }

    /// Exact-in exchange; returns the realized output.
    pub fn execute(&self, ctx: &mut ModuleContext<'_>, request: SwapRequest) -> Result<Decimal, RouterError> {
        request.validate()?;
        self.route(request.asset_in, request.asset_out)?.swap_exact_in(ctx, request)
    }

    /// Exact-out exchange; returns the input spent.
    pub fn execute_exact_out(&self, ctx: &mut ModuleContext<'_>, request: SwapRequest) -> Result<Decimal, RouterError> {
        request.validate()?;
        self.route(request.asset_in, request.asset_out)?.swap_exact_out(ctx, request)
    }

    pub fn check_validity(&self, ctx: &QuoteContext<'_>, collection: CollectionId, asset_out: AssetId, position: PositionId) -> bool {
        self.get_position_module(collection, asset_out)
            .is_some_and(|m| m.check_validity(ctx, collection, position))
    }

    pub fn position_value(&self, ctx: &QuoteContext<'_>, collection: CollectionId, asset_out: AssetId, position: PositionId) -> Result<Decimal, RouterError> {
        self.position_route(collection, asset_out)?.position_value(ctx, collection, position)
    }

    pub fn exercise(
        &self,
        ctx: &mut ModuleContext<'_>,
        holder: Address,
        recipient: Address,
        collection: CollectionId,
        asset_out: AssetId,
        position: PositionId,
    ) -> Result<Decimal, RouterError> {
        self.position_route(collection, asset_out)?
            .exercise(ctx, holder, recipient, collection, position)
    }

    pub fn exchange_pairs(&self) -> impl Iterator<Item = &(AssetId, AssetId)> {
        self.exchange_modules.keys()
    }

    pub fn exchange_modules(&self) -> impl Iterator<Item = (&(AssetId, AssetId), &ModuleHandle)> {
        self.exchange_modules.iter()
    }

    pub fn position_modules(&self) -> impl Iterator<Item = (&(CollectionId, AssetId), &ModuleHandle)> {
        self.position_modules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenLedger;
    use crate::options::OptionBook;
    use crate::price_feed::PriceBoard;
    use crate::router::{ModuleKind, OptionExerciseModule, OracleSwapModule};
    use crate::types::{Bps, Timestamp};
    use rust_decimal_macros::dec;

    const ADMIN: Address = Address(1);
    const MODULE: Address = Address(50);

    #[test]
    fn lookup_is_by_ordered_pair() {
        let mut router = SwapRouter::new(ADMIN);
        let module: ModuleHandle = Arc::new(OracleSwapModule::new("oracle", MODULE, Bps::new(0)));
        router.set_exchange_module(ADMIN, AssetId(1), AssetId(2), module).unwrap();

        assert!(router.get_module(AssetId(1), AssetId(2)).is_some());
        assert!(router.get_module(AssetId(2), AssetId(1)).is_none());
        assert_eq!(router.get_module(AssetId(1), AssetId(2)).map(|m| m.kind()), Some(ModuleKind::Swap));
    }

    #[test]
    fn registration_requires_manager() {
        let mut router = SwapRouter::new(ADMIN);
        let module: ModuleHandle = Arc::new(OracleSwapModule::new("oracle", MODULE, Bps::new(0)));
        let result = router.set_exchange_module(Address(9), AssetId(1), AssetId(2), module);
        assert!(matches!(result, Err(RouterError::Access(_))));
    }

    #[test]
    fn position_route_must_match_settlement_asset() {
        let mut router = SwapRouter::new(ADMIN);
        let (usdc, weth) = (AssetId(1), AssetId(2));
        let hegic = CollectionId(1);

        let weth_settled: ModuleHandle = Arc::new(OptionExerciseModule::new("options", MODULE, weth));
        let result = router.set_position_module(ADMIN, hegic, usdc, weth_settled);
        assert!(matches!(
            result,
            Err(RouterError::SettlementMismatch { settles_in: Some(a), asset_out, .. }) if a == weth && asset_out == usdc
        ));

        let swap_only: ModuleHandle = Arc::new(OracleSwapModule::new("oracle", MODULE, Bps::new(0)));
        let result = router.set_position_module(ADMIN, hegic, usdc, swap_only);
        assert!(matches!(result, Err(RouterError::SettlementMismatch { settles_in: None, .. })));
        assert!(router.get_position_module(hegic, usdc).is_none());

        let usdc_settled: ModuleHandle = Arc::new(OptionExerciseModule::new("options", MODULE, usdc));
        assert!(router.set_position_module(ADMIN, hegic, usdc, usdc_settled).is_ok());
        assert!(router.get_position_module(hegic, usdc).is_some());
    }

    #[test]
    fn unrouted_pair_and_unsupported_capability() {
        let mut ledger = TokenLedger::new();
        let usdc = ledger.register_asset("USDC", 6);
        let weth = ledger.register_asset("WETH", 18);
        let prices = PriceBoard::new(1, "chainlink");
        let book = OptionBook::new();
        let ctx = QuoteContext {
            ledger: &ledger,
            prices: &prices,
            positions: &book,
            now: Timestamp::from_secs(0),
        };

        let mut router = SwapRouter::new(ADMIN);
        let err = router.calculate_amount_out(&ctx, usdc, weth, dec!(1)).unwrap_err();
        assert!(matches!(err, RouterError::NoRoute { .. }));

        // an exercise module cannot quote fungible swaps
        let module: ModuleHandle = Arc::new(OptionExerciseModule::new("hegic", MODULE, usdc));
        router.set_exchange_module(ADMIN, usdc, weth, module).unwrap();
        let err = router.calculate_amount_out(&ctx, usdc, weth, dec!(1)).unwrap_err();
        assert!(matches!(err, RouterError::Unsupported { .. }));
        assert!(!router.check_validity(&ctx, CollectionId(1), usdc, PositionId(0)));
    }
}
