// 9.4 accounts.rs: margin-account ownership. each account id is a non-fungible token;
// whoever owns it (or is approved for it) may act on the account's collateral and debt.

use std::collections::{HashMap, HashSet};

use crate::types::{Address, MarginAccountId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountsError {
    #[error("ERC721: invalid token ID")]
    InvalidAccount(MarginAccountId),

    #[error("ERC721: caller is not token owner or approved")]
    NotOwnerOrApproved { caller: Address, account: MarginAccountId },
}

/// `ownerOf` / `isApprovedOrOwner` as seen by the engine.
pub trait AccountRegistry {
    fn owner_of(&self, account: MarginAccountId) -> Result<Address, AccountsError>;
    fn is_approved_or_owner(&self, caller: Address, account: MarginAccountId) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct MarginAccountRegistry {
    owners: HashMap<MarginAccountId, Address>,
    approvals: HashMap<MarginAccountId, Address>,
    operators: HashSet<(Address, Address)>,
    next_id: u64,
}

impl MarginAccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids are sequential from zero.
    pub fn create(&mut self, owner: Address) -> MarginAccountId {
        let id = MarginAccountId(self.next_id);
        self.next_id += 1;
        self.owners.insert(id, owner);
        id
    }

    pub fn approve(&mut self, caller: Address, spender: Address, account: MarginAccountId) -> Result<(), AccountsError> {
        let owner = self.owner_of(account)?;
        if caller != owner && !self.operators.contains(&(owner, caller)) {
            return Err(AccountsError::NotOwnerOrApproved { caller, account });
        }
        self.approvals.insert(account, spender);
        Ok(())
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
    }

    pub fn transfer(&mut self, caller: Address, to: Address, account: MarginAccountId) -> Result<(), AccountsError> {
        if !self.is_approved_or_owner(caller, account) {
            // unknown ids surface as invalid rather than unauthorized
            self.owner_of(account)?;
            return Err(AccountsError::NotOwnerOrApproved { caller, account });
        }
        self.approvals.remove(&account);
        self.owners.insert(account, to);
        Ok(())
    }

    pub fn accounts_of(&self, owner: Address) -> Vec<MarginAccountId> {
        let mut ids: Vec<_> = self
            .owners
            .iter()
            .filter(|(_, o)| **o == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl AccountRegistry for MarginAccountRegistry {
    fn owner_of(&self, account: MarginAccountId) -> Result<Address, AccountsError> {
        self.owners
            .get(&account)
            .copied()
            .ok_or(AccountsError::InvalidAccount(account))
    }

    fn is_approved_or_owner(&self, caller: Address, account: MarginAccountId) -> bool {
        let Some(owner) = self.owners.get(&account).copied() else {
            return false;
        };
        owner == caller
            || self.approvals.get(&account) == Some(&caller)
            || self.operators.contains(&(owner, caller))
    }
}
