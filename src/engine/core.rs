// 8.0 engine/core.rs: the Margin Engine. owns the token ledger and every component,
// and runs each mutating call as one all-or-nothing transaction.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::config::EngineConfig;
use super::results::EngineError;
use crate::access::{AccessControl, Role, Timelock};
use crate::accounts::{AccountRegistry, MarginAccountRegistry};
use crate::config::{ConfigError, ProtocolConfig, RiskConfig};
use crate::events::{Event, EventId, EventPayload, OperationRejectedEvent};
use crate::ledger::TokenLedger;
use crate::options::OptionBook;
use crate::pool::{LendingPool, PoolParams};
use crate::price_feed::PriceBoard;
use crate::router::{ModuleHandle, OracleSwapModule, SwapRouter};
use crate::types::{round_down, Address, AssetId, CollectionId, MarginAccountId, PositionId, Timestamp};
use crate::vault::CollateralVault;

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) address: Address,
    pub(super) access: AccessControl,
    pub(super) risk: RiskConfig,
    pub(super) timelock: Timelock,
    pub(super) reference_asset: AssetId,
    pub(super) ledger: TokenLedger,
    pub(super) pools: BTreeMap<AssetId, LendingPool>,
    pub(super) vault: CollateralVault,
    pub(super) router: SwapRouter,
    pub(super) prices: PriceBoard,
    pub(super) options: OptionBook,
    pub(super) accounts: MarginAccountRegistry,
    pub(super) insurance: Address,
    pub(super) oracle_module: Address,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_address: u64,
    pub(super) next_position: BTreeMap<CollectionId, u64>,
    pub(super) entered: bool,
    pub(super) current_time: Timestamp,
}

// everything a failed transaction must roll back
struct Snapshot {
    ledger: TokenLedger,
    pools: BTreeMap<AssetId, LendingPool>,
    vault: CollateralVault,
    options: OptionBook,
    accounts: MarginAccountRegistry,
    next_event_id: u64,
}

impl Engine {
    /// Builds a protocol from its configuration. `admin` receives the Admin
    /// and Manager roles on the engine; the engine holds every role on the
    /// components it owns.
    pub fn from_config(config: EngineConfig, protocol: &ProtocolConfig, admin: Address) -> Result<Self, EngineError> {
        protocol.validate()?;

        let base = config.system_address_base;
        let address = Address(base);
        let vault_address = Address(base + 1);
        let insurance = Address(base + 2);

        let mut vault = CollateralVault::new(vault_address, address);
        vault.access_mut().grant_role(address, Role::MarginTrading, address)?;

        let timelock = match protocol.timelock_delay_millis {
            Some(delay) => Timelock::new(delay),
            None => Timelock::disabled(),
        };

        let mut engine = Self {
            prices: PriceBoard::new(config.price_source, "engine").with_ttl(protocol.price_ttl_millis),
            config,
            address,
            access: AccessControl::new(admin),
            risk: protocol.risk.clone(),
            timelock,
            reference_asset: AssetId(0),
            ledger: TokenLedger::new(),
            pools: BTreeMap::new(),
            vault,
            router: SwapRouter::new(address),
            options: OptionBook::new(),
            accounts: MarginAccountRegistry::new(),
            insurance,
            oracle_module: Address(base + 3),
            events: Vec::new(),
            next_event_id: 1,
            next_address: base + 4,
            next_position: BTreeMap::new(),
            entered: false,
            current_time: Timestamp::from_millis(0),
        };

        let mut listed = Vec::new();
        for asset in &protocol.assets {
            let id = engine.install_asset(&asset.symbol, asset.decimals, asset.initial_price)?;
            if let Some(params) = &asset.pool {
                engine.install_pool(id, params.clone())?;
            }
            listed.push(id);
        }
        engine.reference_asset = engine
            .ledger
            .asset_by_symbol(&protocol.reference_asset)
            .ok_or_else(|| ConfigError::UnknownReferenceAsset(protocol.reference_asset.clone()))?;

        // one oracle module quotes every listed pair
        let module: ModuleHandle = Arc::new(OracleSwapModule::new("oracle", engine.oracle_module, protocol.swap_fee));
        for &asset_in in &listed {
            for &asset_out in &listed {
                if asset_in != asset_out {
                    engine.install_exchange_module(asset_in, asset_out, module.clone())?;
                }
            }
        }

        info!(
            assets = listed.len(),
            pools = engine.pools.len(),
            reference = %engine.reference_asset,
            "margin engine initialized"
        );
        Ok(engine)
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    /// Hands out a fresh protocol-owned ledger address (module treasuries, sinks).
    pub fn allocate_address(&mut self) -> Address {
        let address = Address(self.next_address);
        self.next_address += 1;
        address
    }

    // 8.2: component wiring without role checks; the public wrappers in admin.rs check roles

    pub(super) fn install_asset(&mut self, symbol: &str, decimals: u32, price: Decimal) -> Result<AssetId, EngineError> {
        let id = self.ledger.register_asset(symbol, decimals);
        self.vault.set_available_fungible(self.address, id, true)?;
        self.prices.set_price(id, price, self.current_time);
        Ok(id)
    }

    pub(super) fn install_pool(&mut self, asset: AssetId, params: PoolParams) -> Result<Address, EngineError> {
        if self.pools.contains_key(&asset) {
            return Err(EngineError::PoolExists(asset));
        }
        let decimals = self.ledger.decimals(asset)?;
        let pool_address = self.allocate_address();
        let mut pool = LendingPool::new(asset, decimals, pool_address, self.address, self.insurance, params, self.current_time);
        pool.access_mut().grant_role(self.address, Role::MarginTrading, self.address)?;

        // repayments are pulled from custody
        self.vault
            .approve_fungible(&mut self.ledger, self.address, asset, pool_address, Decimal::MAX)?;
        self.vault.set_token_to_pool(self.address, asset, pool_address)?;
        self.pools.insert(asset, pool);
        Ok(pool_address)
    }

    pub(super) fn install_exchange_module(&mut self, asset_in: AssetId, asset_out: AssetId, module: ModuleHandle) -> Result<(), EngineError> {
        let spender = module.address();
        self.router.set_exchange_module(self.address, asset_in, asset_out, module)?;
        self.vault
            .approve_fungible(&mut self.ledger, self.address, asset_in, spender, Decimal::MAX)?;
        Ok(())
    }

    pub(super) fn install_position_module(&mut self, collection: CollectionId, module: ModuleHandle) -> Result<(), EngineError> {
        let operator = module.address();
        self.router
            .set_position_module(self.address, collection, self.reference_asset, module)?;
        self.vault
            .approve_non_fungible_for_all(&mut self.ledger, self.address, collection, operator, true)?;
        Ok(())
    }

    // 8.3: margin accounts

    pub fn create_margin_account(&mut self, owner: Address) -> MarginAccountId {
        self.accounts.create(owner)
    }

    pub fn owner_of(&self, account: MarginAccountId) -> Result<Address, EngineError> {
        Ok(self.accounts.owner_of(account)?)
    }

    pub fn approve_account(&mut self, caller: Address, spender: Address, account: MarginAccountId) -> Result<(), EngineError> {
        Ok(self.accounts.approve(caller, spender, account)?)
    }

    pub fn transfer_account(&mut self, caller: Address, to: Address, account: MarginAccountId) -> Result<(), EngineError> {
        Ok(self.accounts.transfer(caller, to, account)?)
    }

    /// Owner or approved delegate; unknown accounts fail as invalid tokens.
    pub(super) fn authorize(&self, caller: Address, account: MarginAccountId) -> Result<Address, EngineError> {
        let owner = self.accounts.owner_of(account)?;
        if !self.accounts.is_approved_or_owner(caller, account) {
            return Err(EngineError::NotOwner { caller, account });
        }
        Ok(owner)
    }

    // user amounts are cut to the asset's decimals before they reach custody or a module
    pub(super) fn quantize(&self, asset: AssetId, amount: Decimal) -> Result<Decimal, EngineError> {
        Ok(round_down(amount, self.ledger.decimals(asset)?))
    }

    // 8.4: prices and option positions. stand-ins for the external collaborators

    pub fn set_price(&mut self, asset: AssetId, price: Decimal) {
        self.prices.set_price(asset, price, self.current_time);
    }

    pub fn prices_mut(&mut self) -> &mut PriceBoard {
        &mut self.prices
    }

    pub fn options_mut(&mut self) -> &mut OptionBook {
        &mut self.options
    }

    /// Mints a new option position to `owner` with the next free id in the collection.
    pub fn issue_option(&mut self, owner: Address, collection: CollectionId, expiry: Timestamp, payoff: Decimal) -> Result<PositionId, EngineError> {
        let next = self.next_position.entry(collection).or_insert(0);
        let position = PositionId(*next);
        *next += 1;
        self.ledger.mint_position(owner, collection, position)?;
        self.options.write(collection, position, expiry);
        self.options.set_payoff(collection, position, payoff)?;
        Ok(position)
    }

    // 8.5: reads

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn reference_asset(&self) -> AssetId {
        self.reference_asset
    }

    pub fn asset_id(&self, symbol: &str) -> Option<AssetId> {
        self.ledger.asset_by_symbol(symbol)
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Direct ledger access for seeding wallets and approvals.
    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    pub fn pool(&self, asset: AssetId) -> Option<&LendingPool> {
        self.pools.get(&asset)
    }

    pub fn pool_address(&self, asset: AssetId) -> Option<Address> {
        self.pools.get(&asset).map(|p| p.address())
    }

    pub fn pools(&self) -> impl Iterator<Item = (&AssetId, &LendingPool)> {
        self.pools.iter()
    }

    pub fn vault(&self) -> &CollateralVault {
        &self.vault
    }

    pub fn vault_address(&self) -> Address {
        self.vault.address()
    }

    pub fn router(&self) -> &SwapRouter {
        &self.router
    }

    pub fn insurance_address(&self) -> Address {
        self.insurance
    }

    /// Treasury of the built-in oracle module. It pays swap outputs, so it
    /// must hold inventory of every asset traded through it.
    pub fn oracle_module_address(&self) -> Address {
        self.oracle_module
    }

    pub fn risk_params(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn timelock(&self) -> &Timelock {
        &self.timelock
    }

    pub fn vault_balance(&self, account: MarginAccountId, asset: AssetId) -> Decimal {
        self.vault.get_balance(account, asset)
    }

    pub fn vault_positions(&self, account: MarginAccountId, collection: CollectionId) -> Vec<PositionId> {
        self.vault.get_positions(account, collection)
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // 8.6: transactions

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ledger: self.ledger.clone(),
            pools: self.pools.clone(),
            vault: self.vault.clone(),
            options: self.options.clone(),
            accounts: self.accounts.clone(),
            next_event_id: self.next_event_id,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.ledger = snapshot.ledger;
        self.pools = snapshot.pools;
        self.vault = snapshot.vault;
        self.options = snapshot.options;
        self.accounts = snapshot.accounts;
        self.events.retain(|e| e.id.0 < snapshot.next_event_id);
        self.next_event_id = snapshot.next_event_id;
    }

    /// Runs `f` as one transaction. A nested call fails with `Reentrant`; any
    /// error restores every ledger to its pre-call state and logs a rejection.
    pub(super) fn transact<T>(
        &mut self,
        operation: &'static str,
        account: Option<MarginAccountId>,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.entered {
            return Err(EngineError::Reentrant);
        }
        self.entered = true;
        let snapshot = self.snapshot();
        let result = f(self);
        self.entered = false;

        if let Err(error) = &result {
            self.restore(snapshot);
            warn!(operation, account = account.map(|a| a.0), %error, "operation rejected");
            self.emit_event(EventPayload::OperationRejected(OperationRejectedEvent {
                operation: operation.to_string(),
                account,
                reason: error.to_string(),
            }));
        }
        result
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            info!(event_id = event.id.0, payload = ?event.payload, "event");
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
