// 8.11: privileged configuration. listing assets and collections, wiring modules, and the
// timelocked risk setters. every call requires Manager on the engine unless noted.

use rust_decimal::Decimal;
use tracing::info;

use super::core::Engine;
use super::results::EngineError;
use crate::access::Role;
use crate::events::{EventPayload, RiskParamsUpdatedEvent};
use crate::pool::PoolParams;
use crate::router::{ModuleHandle, SwapRouter};
use crate::types::{Address, AssetId, Bps, CollectionId};

impl Engine {
    // roles: Admin only, enforced by the access list itself

    pub fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> Result<(), EngineError> {
        Ok(self.access.grant_role(caller, role, account)?)
    }

    pub fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> Result<(), EngineError> {
        Ok(self.access.revoke_role(caller, role, account)?)
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.access.has_role(role, account)
    }

    // 8.11.1: listings

    /// Registers a new fungible asset, allowlists it as collateral and
    /// publishes its first price. It has no pool and no routes until added.
    pub fn list_asset(&mut self, caller: Address, symbol: &str, decimals: u32, price: Decimal) -> Result<AssetId, EngineError> {
        self.access.require(Role::Manager, caller)?;
        if decimals > 28 || price <= Decimal::ZERO {
            return Err(EngineError::InvalidRiskParameter("asset needs at most 28 decimals and a positive price"));
        }
        let asset = self.install_asset(symbol, decimals, price)?;
        info!(symbol, asset = asset.0, "asset listed");
        Ok(asset)
    }

    pub fn add_pool(&mut self, caller: Address, asset: AssetId, params: PoolParams) -> Result<Address, EngineError> {
        self.access.require(Role::Manager, caller)?;
        let address = self.install_pool(asset, params)?;
        info!(asset = asset.0, pool = %address, "pool added");
        Ok(address)
    }

    pub fn add_collection(&mut self, caller: Address, collection: CollectionId) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.vault.set_available_non_fungible(self.address, collection, true)?;
        Ok(())
    }

    pub fn set_available_fungible(&mut self, caller: Address, asset: AssetId, available: bool) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.ledger.decimals(asset)?;
        self.vault.set_available_fungible(self.address, asset, available)?;
        Ok(())
    }

    pub fn set_available_non_fungible(&mut self, caller: Address, collection: CollectionId, available: bool) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.vault
            .set_available_non_fungible(self.address, collection, available)?;
        Ok(())
    }

    // 8.11.2: routing. custody approvals follow every module change

    pub fn set_exchange_module(&mut self, caller: Address, asset_in: AssetId, asset_out: AssetId, module: ModuleHandle) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.install_exchange_module(asset_in, asset_out, module)
    }

    /// Routes a collection's positions to `module`, settling in the reference asset.
    pub fn set_position_module(&mut self, caller: Address, collection: CollectionId, module: ModuleHandle) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.install_position_module(collection, module)
    }

    /// Replaces the whole routing registry. The new router must grant the
    /// engine Manager. Timelocked.
    pub fn set_swap_router(&mut self, caller: Address, router: SwapRouter) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.timelock.ensure_open(self.current_time)?;

        let old: Vec<_> = self
            .router
            .exchange_modules()
            .map(|((asset_in, _), m)| (*asset_in, m.address()))
            .collect();
        let old_operators: Vec<_> = self
            .router
            .position_modules()
            .map(|((collection, _), m)| (*collection, m.address()))
            .collect();
        for (asset, spender) in old {
            self.vault
                .approve_fungible(&mut self.ledger, self.address, asset, spender, Decimal::ZERO)?;
        }
        for (collection, operator) in old_operators {
            self.vault
                .approve_non_fungible_for_all(&mut self.ledger, self.address, collection, operator, false)?;
        }

        let approvals: Vec<_> = router
            .exchange_modules()
            .map(|((asset_in, _), m)| (*asset_in, m.address()))
            .collect();
        let operators: Vec<_> = router
            .position_modules()
            .map(|((collection, _), m)| (*collection, m.address()))
            .collect();
        for (asset, spender) in approvals {
            self.vault
                .approve_fungible(&mut self.ledger, self.address, asset, spender, Decimal::MAX)?;
        }
        for (collection, operator) in operators {
            self.vault
                .approve_non_fungible_for_all(&mut self.ledger, self.address, collection, operator, true)?;
        }

        self.router = router;
        info!(routes = self.router.exchange_pairs().count(), "swap router replaced");
        Ok(())
    }

    // 8.11.3: timelock

    /// Starts the timelock timer; protected setters open once it elapses.
    pub fn unlock(&mut self, caller: Address) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        let unlocks_at = self.timelock.unlock(self.current_time);
        self.emit_event(EventPayload::TimelockUnlocked { unlocks_at });
        Ok(())
    }

    pub fn lock(&mut self, caller: Address) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.timelock.lock();
        self.emit_event(EventPayload::TimelockLocked);
        Ok(())
    }

    // 8.11.4: risk parameters. timelocked, yellow > red > 1 always holds

    pub fn set_red_coeff(&mut self, caller: Address, red: Decimal) -> Result<(), EngineError> {
        self.guard_risk_setter(caller)?;
        if red <= Decimal::ONE || red >= self.risk.yellow_coeff {
            return Err(EngineError::InvalidRiskParameter("red coefficient must be above 1.0 and below yellow"));
        }
        let before = std::mem::replace(&mut self.risk.red_coeff, red);
        self.risk_updated("red_coeff", before, red);
        Ok(())
    }

    pub fn set_yellow_coeff(&mut self, caller: Address, yellow: Decimal) -> Result<(), EngineError> {
        self.guard_risk_setter(caller)?;
        if yellow <= self.risk.red_coeff {
            return Err(EngineError::InvalidRiskParameter("yellow coefficient must be above red"));
        }
        let before = std::mem::replace(&mut self.risk.yellow_coeff, yellow);
        self.risk_updated("yellow_coeff", before, yellow);
        Ok(())
    }

    pub fn set_liquidator_fee(&mut self, caller: Address, fee: Bps) -> Result<(), EngineError> {
        self.guard_risk_setter(caller)?;
        if fee.is_negative() || fee > Bps::MAX {
            return Err(EngineError::InvalidRiskParameter("liquidator fee must be within 0..=10000 bps"));
        }
        let before = std::mem::replace(&mut self.risk.liquidator_fee, fee);
        self.risk_updated("liquidator_fee", Decimal::from(before.value()), Decimal::from(fee.value()));
        Ok(())
    }

    fn guard_risk_setter(&self, caller: Address) -> Result<(), EngineError> {
        self.access.require(Role::Manager, caller)?;
        self.timelock.ensure_open(self.current_time)?;
        Ok(())
    }

    fn risk_updated(&mut self, field: &str, before: Decimal, after: Decimal) {
        info!(field, %before, %after, "risk parameter updated");
        self.emit_event(EventPayload::RiskParamsUpdated(RiskParamsUpdatedEvent {
            field: field.to_string(),
            before,
            after,
        }));
    }
}
