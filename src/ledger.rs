// 9.2 ledger.rs: token ledger. every holder (user wallet, pool, vault, module treasury,
// insurance sink) keeps its fungible balances and non-fungible positions here.
// transfers never create or destroy supply; only mint does.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{round_down, Address, AssetId, CollectionId, PositionId};

// Static facts about a registered fungible asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub id: AssetId,
    pub symbol: String,
    pub decimals: u32,
}

// Errors from ledger transfers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown asset {0:?}")]
    UnknownAsset(AssetId),

    #[error("ERC20: transfer amount exceeds balance")]
    InsufficientBalance { available: Decimal, requested: Decimal },

    #[error("ERC20: insufficient allowance")]
    InsufficientAllowance { allowed: Decimal, requested: Decimal },

    #[error("amount must not be negative")]
    InvalidAmount,

    #[error("amount {amount} is finer than the asset's {decimals} decimals")]
    ExcessPrecision { amount: Decimal, decimals: u32 },

    #[error("ERC721: invalid token ID")]
    UnknownPosition { collection: CollectionId, position: PositionId },

    #[error("position already minted")]
    PositionExists { collection: CollectionId, position: PositionId },

    #[error("Transfer not approved")]
    TransferNotApproved,
}

// Balances, allowances and position ownership for every holder.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    assets: HashMap<AssetId, AssetInfo>,
    balances: HashMap<(Address, AssetId), Decimal>,
    // (owner, spender, asset) -> remaining allowance
    allowances: HashMap<(Address, Address, AssetId), Decimal>,
    total_supply: HashMap<AssetId, Decimal>,
    position_owners: HashMap<(CollectionId, PositionId), Address>,
    // single-token approvals
    position_approvals: HashMap<(CollectionId, PositionId), Address>,
    // (owner, operator, collection) operators
    operators: HashSet<(Address, Address, CollectionId)>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_asset(&mut self, symbol: &str, decimals: u32) -> AssetId {
        let id = AssetId(self.assets.len() as u32 + 1);
        self.assets.insert(
            id,
            AssetInfo {
                id,
                symbol: symbol.to_string(),
                decimals,
            },
        );
        self.total_supply.insert(id, Decimal::ZERO);
        id
    }

    pub fn asset(&self, asset: AssetId) -> Result<&AssetInfo, LedgerError> {
        self.assets.get(&asset).ok_or(LedgerError::UnknownAsset(asset))
    }

    pub fn decimals(&self, asset: AssetId) -> Result<u32, LedgerError> {
        Ok(self.asset(asset)?.decimals)
    }

    pub fn asset_by_symbol(&self, symbol: &str) -> Option<AssetId> {
        self.assets.values().find(|a| a.symbol == symbol).map(|a| a.id)
    }

    pub fn balance_of(&self, holder: Address, asset: AssetId) -> Decimal {
        self.balances.get(&(holder, asset)).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_supply(&self, asset: AssetId) -> Decimal {
        self.total_supply.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn mint(&mut self, to: Address, asset: AssetId, amount: Decimal) -> Result<(), LedgerError> {
        let decimals = self.decimals(asset)?;
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let amount = round_down(amount, decimals);
        *self.balances.entry((to, asset)).or_insert(Decimal::ZERO) += amount;
        *self.total_supply.entry(asset).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, asset: AssetId, amount: Decimal) -> Result<(), LedgerError> {
        let decimals = self.decimals(asset)?;
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if round_down(amount, decimals) != amount {
            return Err(LedgerError::ExcessPrecision { amount, decimals });
        }
        if amount.is_zero() || from == to {
            return Ok(());
        }

        let available = self.balance_of(from, asset);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        self.balances.insert((from, asset), available - amount);
        *self.balances.entry((to, asset)).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    pub fn approve(&mut self, owner: Address, spender: Address, asset: AssetId, amount: Decimal) {
        self.allowances.insert((owner, spender, asset), amount);
    }

    pub fn allowance(&self, owner: Address, spender: Address, asset: AssetId) -> Decimal {
        self.allowances
            .get(&(owner, spender, asset))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    // spender moves owner's tokens, consuming allowance. Decimal::MAX is an unlimited approval.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        asset: AssetId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if spender != from {
            let allowed = self.allowance(from, spender, asset);
            if amount > allowed {
                return Err(LedgerError::InsufficientAllowance {
                    allowed,
                    requested: amount,
                });
            }
            self.transfer(from, to, asset, amount)?;
            if allowed != Decimal::MAX {
                self.allowances.insert((from, spender, asset), allowed - amount);
            }
            return Ok(());
        }
        self.transfer(from, to, asset, amount)
    }

    pub fn mint_position(&mut self, to: Address, collection: CollectionId, position: PositionId) -> Result<(), LedgerError> {
        if self.position_owners.contains_key(&(collection, position)) {
            return Err(LedgerError::PositionExists { collection, position });
        }
        self.position_owners.insert((collection, position), to);
        Ok(())
    }

    pub fn owner_of_position(&self, collection: CollectionId, position: PositionId) -> Result<Address, LedgerError> {
        self.position_owners
            .get(&(collection, position))
            .copied()
            .ok_or(LedgerError::UnknownPosition { collection, position })
    }

    pub fn approve_position(
        &mut self,
        owner: Address,
        spender: Address,
        collection: CollectionId,
        position: PositionId,
    ) -> Result<(), LedgerError> {
        if self.owner_of_position(collection, position)? != owner {
            return Err(LedgerError::TransferNotApproved);
        }
        self.position_approvals.insert((collection, position), spender);
        Ok(())
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, collection: CollectionId, approved: bool) {
        if approved {
            self.operators.insert((owner, operator, collection));
        } else {
            self.operators.remove(&(owner, operator, collection));
        }
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address, collection: CollectionId) -> bool {
        self.operators.contains(&(owner, operator, collection))
    }

    // caller must be the owner, the approved spender, or an operator for the owner.
    pub fn transfer_position(
        &mut self,
        caller: Address,
        to: Address,
        collection: CollectionId,
        position: PositionId,
    ) -> Result<(), LedgerError> {
        let owner = self.owner_of_position(collection, position)?;
        let approved = caller == owner
            || self.position_approvals.get(&(collection, position)) == Some(&caller)
            || self.is_approved_for_all(owner, caller, collection);
        if !approved {
            return Err(LedgerError::TransferNotApproved);
        }

        self.position_approvals.remove(&(collection, position));
        self.position_owners.insert((collection, position), to);
        Ok(())
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetInfo> {
        self.assets.values()
    }
}
