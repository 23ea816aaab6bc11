//! Collateral Vault: custody of every margin account's fungible balances and
//! non-fungible positions.
//!
//! The vault's ledger balance of an asset always equals the sum of the
//! per-account balances it records for that asset. Only the Margin Engine
//! (role `MarginTrading`) moves custody; allowlists and approvals to swap
//! modules are `Manager` operations.

use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::access::{AccessControl, AccessError, Role};
use crate::ledger::{LedgerError, TokenLedger};
use crate::types::{Address, AssetId, CollectionId, MarginAccountId, PositionId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Token you are attempting to deposit is not available for deposit")]
    NotAvailableForDeposit,

    #[error("Insufficient token balance for withdrawal")]
    InsufficientBalance { available: Decimal, requested: Decimal },

    #[error("The ERC721 token you are attempting to withdraw is not available for withdrawal")]
    NotAvailableForWithdrawal { collection: CollectionId, position: PositionId },

    #[error("id not found")]
    IdNotFound { collection: CollectionId, position: PositionId },

    #[error("Amount must be greater than 0!")]
    ZeroAmount,

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct CollateralVault {
    address: Address,
    access: AccessControl,
    balances: HashMap<(MarginAccountId, AssetId), Decimal>,
    positions: HashMap<(MarginAccountId, CollectionId), Vec<PositionId>>,
    available_fungible: BTreeSet<AssetId>,
    available_non_fungible: BTreeSet<CollectionId>,
    token_to_pool: HashMap<AssetId, Address>,
}

impl CollateralVault {
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            access: AccessControl::new(admin),
            balances: HashMap::new(),
            positions: HashMap::new(),
            available_fungible: BTreeSet::new(),
            available_non_fungible: BTreeSet::new(),
            token_to_pool: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    // custody moves, MarginTrading only

    /// Pulls `amount` from `from` (which must have approved the vault) and
    /// credits it to `account`.
    pub fn deposit_fungible(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        from: Address,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<(), VaultError> {
        self.access.require(Role::MarginTrading, caller)?;
        if !self.available_fungible.contains(&asset) {
            return Err(VaultError::NotAvailableForDeposit);
        }
        if amount <= Decimal::ZERO {
            return Err(VaultError::ZeroAmount);
        }
        ledger.transfer_from(self.address, from, self.address, asset, amount)?;
        self.credit(account, asset, amount);
        debug!(account = account.0, asset = asset.0, %amount, "vault deposit");
        Ok(())
    }

    pub fn withdraw_fungible(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        to: Address,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<(), VaultError> {
        self.access.require(Role::MarginTrading, caller)?;
        self.debit(account, asset, amount)?;
        ledger.transfer(self.address, to, asset, amount)?;
        debug!(account = account.0, asset = asset.0, %amount, "vault withdraw");
        Ok(())
    }

    /// Takes the position from its owner. The owner must have approved the
    /// vault for the token or for the whole collection.
    pub fn deposit_position(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        collection: CollectionId,
        position: PositionId,
    ) -> Result<(), VaultError> {
        self.access.require(Role::MarginTrading, caller)?;
        if !self.available_non_fungible.contains(&collection) {
            return Err(VaultError::NotAvailableForDeposit);
        }
        ledger.transfer_position(self.address, self.address, collection, position)?;
        self.add_position(account, collection, position);
        Ok(())
    }

    pub fn withdraw_position(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        to: Address,
        collection: CollectionId,
        position: PositionId,
    ) -> Result<(), VaultError> {
        self.access.require(Role::MarginTrading, caller)?;
        if !self.available_non_fungible.contains(&collection) || !self.holds_position(account, collection, position) {
            return Err(VaultError::NotAvailableForWithdrawal { collection, position });
        }
        self.remove_position(account, collection, position)?;
        ledger.transfer_position(self.address, to, collection, position)?;
        Ok(())
    }

    // bookkeeping only; the matching ledger movement is the caller's job

    pub fn credit(&mut self, account: MarginAccountId, asset: AssetId, amount: Decimal) {
        if amount.is_zero() {
            return;
        }
        *self.balances.entry((account, asset)).or_insert(Decimal::ZERO) += amount;
    }

    pub fn debit(&mut self, account: MarginAccountId, asset: AssetId, amount: Decimal) -> Result<(), VaultError> {
        let available = self.get_balance(account, asset);
        if amount > available || amount < Decimal::ZERO {
            return Err(VaultError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        if remaining.is_zero() {
            self.balances.remove(&(account, asset));
        } else {
            self.balances.insert((account, asset), remaining);
        }
        Ok(())
    }

    pub fn add_position(&mut self, account: MarginAccountId, collection: CollectionId, position: PositionId) {
        self.positions.entry((account, collection)).or_default().push(position);
    }

    pub fn remove_position(&mut self, account: MarginAccountId, collection: CollectionId, position: PositionId) -> Result<(), VaultError> {
        let ids = self
            .positions
            .get_mut(&(account, collection))
            .ok_or(VaultError::IdNotFound { collection, position })?;
        let index = ids
            .iter()
            .position(|id| *id == position)
            .ok_or(VaultError::IdNotFound { collection, position })?;
        ids.swap_remove(index);
        if ids.is_empty() {
            self.positions.remove(&(account, collection));
        }
        Ok(())
    }

    // Manager operations

    pub fn set_available_fungible(&mut self, caller: Address, asset: AssetId, available: bool) -> Result<(), VaultError> {
        self.access.require(Role::Manager, caller)?;
        if available {
            self.available_fungible.insert(asset);
        } else {
            self.available_fungible.remove(&asset);
        }
        Ok(())
    }

    pub fn set_available_non_fungible(&mut self, caller: Address, collection: CollectionId, available: bool) -> Result<(), VaultError> {
        self.access.require(Role::Manager, caller)?;
        if available {
            self.available_non_fungible.insert(collection);
        } else {
            self.available_non_fungible.remove(&collection);
        }
        Ok(())
    }

    pub fn set_token_to_pool(&mut self, caller: Address, asset: AssetId, pool: Address) -> Result<(), VaultError> {
        self.access.require(Role::Manager, caller)?;
        self.token_to_pool.insert(asset, pool);
        Ok(())
    }

    /// Lets a pool or swap module pull the vault's tokens.
    pub fn approve_fungible(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        asset: AssetId,
        spender: Address,
        amount: Decimal,
    ) -> Result<(), VaultError> {
        self.access.require(Role::Manager, caller)?;
        ledger.approve(self.address, spender, asset, amount);
        Ok(())
    }

    pub fn approve_non_fungible_for_all(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        collection: CollectionId,
        spender: Address,
        approved: bool,
    ) -> Result<(), VaultError> {
        self.access.require(Role::Manager, caller)?;
        ledger.set_approval_for_all(self.address, spender, collection, approved);
        Ok(())
    }

    // reads

    pub fn get_balance(&self, account: MarginAccountId, asset: AssetId) -> Decimal {
        self.balances.get(&(account, asset)).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn get_positions(&self, account: MarginAccountId, collection: CollectionId) -> Vec<PositionId> {
        self.positions.get(&(account, collection)).cloned().unwrap_or_default()
    }

    pub fn holds_position(&self, account: MarginAccountId, collection: CollectionId, position: PositionId) -> bool {
        self.positions
            .get(&(account, collection))
            .is_some_and(|ids| ids.contains(&position))
    }

    /// Non-zero balances of one account, sorted by asset id.
    pub fn account_balances(&self, account: MarginAccountId) -> Vec<(AssetId, Decimal)> {
        let mut out: Vec<_> = self
            .balances
            .iter()
            .filter(|((acc, _), amount)| *acc == account && !amount.is_zero())
            .map(|((_, asset), amount)| (*asset, *amount))
            .collect();
        out.sort_by_key(|(asset, _)| *asset);
        out
    }

    /// Every position held for one account, sorted.
    pub fn account_positions(&self, account: MarginAccountId) -> Vec<(CollectionId, PositionId)> {
        let mut out: Vec<_> = self
            .positions
            .iter()
            .filter(|((acc, _), _)| *acc == account)
            .flat_map(|((_, collection), ids)| ids.iter().map(move |id| (*collection, *id)))
            .collect();
        out.sort();
        out
    }

    /// Sum of every account's recorded balance of `asset`.
    pub fn total_recorded(&self, asset: AssetId) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    pub fn is_fungible_available(&self, asset: AssetId) -> bool {
        self.available_fungible.contains(&asset)
    }

    pub fn is_non_fungible_available(&self, collection: CollectionId) -> bool {
        self.available_non_fungible.contains(&collection)
    }

    pub fn fungible_assets(&self) -> impl Iterator<Item = &AssetId> {
        self.available_fungible.iter()
    }

    pub fn non_fungible_collections(&self) -> impl Iterator<Item = &CollectionId> {
        self.available_non_fungible.iter()
    }

    pub fn pool_for(&self, asset: AssetId) -> Option<Address> {
        self.token_to_pool.get(&asset).copied()
    }
}
