//! Role-based access control and the two-phase timelock.
//!
//! Every component (pool, vault, router, engine) owns an [`AccessControl`].
//! Admin holders grant and revoke the other roles. The last admin can never
//! be removed.

use crate::types::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes roles.
    Admin,
    /// Privileged configuration: rates, caps, allowlists, routing.
    Manager,
    /// The Margin Engine itself. Only it may move per-account debt and custody.
    MarginTrading,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("AccessControl: account {account} is missing role {role:?}")]
    MissingRole { account: Address, role: Role },

    #[error("cannot revoke the last admin")]
    LastAdmin,

    #[error("timelock active until {unlocks_at:?}")]
    TimelockActive { unlocks_at: Option<Timestamp> },
}

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    grants: HashSet<(Role, Address)>,
}

impl AccessControl {
    pub fn new(admin: Address) -> Self {
        let mut grants = HashSet::new();
        grants.insert((Role::Admin, admin));
        grants.insert((Role::Manager, admin));
        Self { grants }
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.grants.contains(&(role, account))
    }

    pub fn require(&self, role: Role, account: Address) -> Result<(), AccessError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(AccessError::MissingRole { account, role })
        }
    }

    pub fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> Result<(), AccessError> {
        self.require(Role::Admin, caller)?;
        self.grants.insert((role, account));
        Ok(())
    }

    pub fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> Result<(), AccessError> {
        self.require(Role::Admin, caller)?;
        if role == Role::Admin && self.member_count(Role::Admin) <= 1 && self.has_role(role, account) {
            return Err(AccessError::LastAdmin);
        }
        self.grants.remove(&(role, account));
        Ok(())
    }

    pub fn member_count(&self, role: Role) -> usize {
        self.grants.iter().filter(|(r, _)| *r == role).count()
    }
}

/// Two-phase guard for privileged setters. `unlock` starts a timer, the
/// protected setters fail until the delay has elapsed, `lock` re-arms.
/// Without a delay the guard is disabled and setters apply immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timelock {
    delay_millis: Option<i64>,
    unlocks_at: Option<Timestamp>,
}

impl Timelock {
    pub fn new(delay_millis: i64) -> Self {
        Self {
            delay_millis: Some(delay_millis),
            unlocks_at: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            delay_millis: None,
            unlocks_at: None,
        }
    }

    pub fn delay_millis(&self) -> Option<i64> {
        self.delay_millis
    }

    pub fn unlock(&mut self, now: Timestamp) -> Timestamp {
        let at = now.plus_millis(self.delay_millis.unwrap_or(0));
        self.unlocks_at = Some(at);
        info!(unlocks_at = %at, "timelock unlock requested");
        at
    }

    pub fn lock(&mut self) {
        self.unlocks_at = None;
        info!("timelock locked");
    }

    pub fn is_open(&self, now: Timestamp) -> bool {
        if self.delay_millis.is_none() {
            return true;
        }
        matches!(self.unlocks_at, Some(at) if now >= at)
    }

    pub fn ensure_open(&self, now: Timestamp) -> Result<(), AccessError> {
        if self.is_open(now) {
            Ok(())
        } else {
            Err(AccessError::TimelockActive {
                unlocks_at: self.unlocks_at,
            })
        }
    }

    pub fn unlocks_at(&self) -> Option<Timestamp> {
        self.unlocks_at
    }
}
