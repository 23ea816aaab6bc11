//! Interest-bearing lending pool, one per asset.
//!
//! Liquidity providers hold deposit shares: a proportional claim on
//! `total_liquidity = free_liquidity + net_debt`. Borrowers (margin accounts,
//! through the Margin Engine) hold debt shares: a proportional claim on
//! `net_debt + total_interest_snapshot`. Interest accrues on `net_debt` at the
//! start of every mutating call and only becomes pool liquidity when a repay
//! realizes it, so the deposit share price rises on repay, never on accrual.
//!
//! Every operation validates first, moves tokens second, and commits pool state
//! last. A rejected call leaves the pool untouched.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::access::{AccessControl, AccessError, Role};
use crate::interest::accrued_interest;
use crate::ledger::{LedgerError, TokenLedger};
use crate::types::{round_down, round_up, Address, AssetId, Bps, MarginAccountId, Timestamp};

/// Debt shares are minted with this many decimal places, rounded up.
pub const DEBT_SHARE_DECIMALS: u32 = 12;

/// Insurance may take at most half of realized interest.
pub const MAX_INSURANCE_RATE_MULTIPLIER: Bps = Bps::new(5_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParams {
    /// Annual rate, e.g. 500 = 5%.
    pub interest_rate: Bps,
    /// Share of realized interest routed to the insurance sink.
    pub insurance_rate_multiplier: Bps,
    /// `total_liquidity + amount` may not exceed this on provide.
    pub maximum_pool_capacity: Decimal,
    /// Total borrows are capped at `total_liquidity * multiplier`.
    pub maximum_borrow_multiplier: Bps,
    /// Cooldown between a holder's provide and their next withdraw.
    pub withdrawal_delay_millis: i64,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            interest_rate: Bps::new(500),
            insurance_rate_multiplier: Bps::new(2_000),
            maximum_pool_capacity: dec!(1_000_000_000),
            maximum_borrow_multiplier: Bps::new(8_000),
            withdrawal_delay_millis: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Amount must be greater than 0!")]
    ZeroAmount,

    #[error("Maximum liquidity has been achieved!")]
    CapacityExceeded { capacity: Decimal, requested: Decimal },

    #[error("Liquidity pool has no pool tokens")]
    NoPoolTokens,

    #[error("share amount {requested} exceeds holding {held}")]
    InsufficientShares { held: Decimal, requested: Decimal },

    #[error("Liquidity pool has not enough free tokens!")]
    InsufficientFreeLiquidity { free: Decimal, requested: Decimal },

    #[error("Limit is exceed!")]
    LimitExceeded { limit: Decimal, requested: Decimal },

    #[error("withdrawal locked until {until:?}")]
    WithdrawalLocked { until: Timestamp },

    #[error("pool liquidity is zero while shares are outstanding")]
    EmptyLiquidity,

    #[error("The insurance rate multiplier cannot be more than 50%!")]
    InsuranceRateTooHigh,

    #[error("invalid pool parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("interest computation overflowed")]
    Overflow,

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A privileged setter's before/after pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange<T> {
    pub before: T,
    pub after: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvideOutcome {
    pub amount: Decimal,
    pub shares_minted: Decimal,
    pub total_deposits_before: Decimal,
    pub total_deposits_after: Decimal,
    pub total_liquidity_before: Decimal,
    pub total_liquidity_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub amount: Decimal,
    pub shares_burned: Decimal,
    pub total_deposits_before: Decimal,
    pub total_deposits_after: Decimal,
    pub total_liquidity_before: Decimal,
    pub total_liquidity_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub amount: Decimal,
    pub shares_minted: Decimal,
    pub net_debt_before: Decimal,
    pub net_debt_after: Decimal,
    pub total_borrows_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepayOutcome {
    pub repaid: Decimal,
    pub principal: Decimal,
    pub interest: Decimal,
    pub insurance_cut: Decimal,
    pub shares_burned: Decimal,
    pub remaining_debt: Decimal,
    pub net_debt_before: Decimal,
    pub net_debt_after: Decimal,
}

impl RepayOutcome {
    pub fn is_noop(&self) -> bool {
        self.repaid.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortfallOutcome {
    pub debt_written_off: Decimal,
    pub principal_lost: Decimal,
    pub share_price_before: Decimal,
    pub share_price_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct LendingPool {
    asset: AssetId,
    decimals: u32,
    address: Address,
    access: AccessControl,
    params: PoolParams,
    insurance_pool: Address,

    total_deposits: Decimal,
    deposit_shares: HashMap<Address, Decimal>,
    last_provide: HashMap<Address, Timestamp>,

    free_liquidity: Decimal,
    net_debt: Decimal,
    total_interest_snapshot: Decimal,
    debt_shares_sum: Decimal,
    debt_shares: HashMap<MarginAccountId, Decimal>,
    last_accrual: Timestamp,
}

impl LendingPool {
    pub fn new(
        asset: AssetId,
        decimals: u32,
        address: Address,
        admin: Address,
        insurance_pool: Address,
        params: PoolParams,
        now: Timestamp,
    ) -> Self {
        Self {
            asset,
            decimals,
            address,
            access: AccessControl::new(admin),
            params,
            insurance_pool,
            total_deposits: Decimal::ZERO,
            deposit_shares: HashMap::new(),
            last_provide: HashMap::new(),
            free_liquidity: Decimal::ZERO,
            net_debt: Decimal::ZERO,
            total_interest_snapshot: Decimal::ZERO,
            debt_shares_sum: Decimal::ZERO,
            debt_shares: HashMap::new(),
            last_accrual: now,
        }
    }

    pub fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    // interest on net_debt since the last accrual, not yet folded into the snapshot
    fn pending_interest(&self, at: Timestamp) -> Result<Decimal, PoolError> {
        if at <= self.last_accrual {
            return Ok(Decimal::ZERO);
        }
        accrued_interest(self.net_debt, self.params.interest_rate, self.last_accrual, at).ok_or(PoolError::Overflow)
    }

    fn commit_accrual(&mut self, pending: Decimal, now: Timestamp) {
        self.total_interest_snapshot += pending;
        if now > self.last_accrual {
            self.last_accrual = now;
        }
    }

    /// Folds accrued interest into the snapshot. Every mutating call does this first.
    pub fn accrue(&mut self, now: Timestamp) -> Result<Decimal, PoolError> {
        let pending = self.pending_interest(now)?;
        self.commit_accrual(pending, now);
        Ok(pending)
    }

    // 4.1.1: liquidity side

    pub fn provide(
        &mut self,
        ledger: &mut TokenLedger,
        provider: Address,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<ProvideOutcome, PoolError> {
        let amount = round_down(amount, self.decimals);
        if amount <= Decimal::ZERO {
            return Err(PoolError::ZeroAmount);
        }

        let total_liquidity = self.total_liquidity();
        if total_liquidity + amount > self.params.maximum_pool_capacity {
            return Err(PoolError::CapacityExceeded {
                capacity: self.params.maximum_pool_capacity,
                requested: amount,
            });
        }

        let pending = self.pending_interest(now)?;

        let shares = if self.total_deposits.is_zero() {
            amount
        } else if total_liquidity.is_zero() {
            return Err(PoolError::EmptyLiquidity);
        } else {
            round_down(amount * self.total_deposits / total_liquidity, self.decimals)
        };
        if shares.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        ledger.transfer_from(self.address, provider, self.address, self.asset, amount)?;

        self.commit_accrual(pending, now);
        let total_deposits_before = self.total_deposits;
        self.free_liquidity += amount;
        self.total_deposits += shares;
        *self.deposit_shares.entry(provider).or_insert(Decimal::ZERO) += shares;
        self.last_provide.insert(provider, now);

        debug!(asset = self.asset.0, %provider, %amount, %shares, "pool provide");

        Ok(ProvideOutcome {
            amount,
            shares_minted: shares,
            total_deposits_before,
            total_deposits_after: self.total_deposits,
            total_liquidity_before: total_liquidity,
            total_liquidity_after: self.total_liquidity(),
        })
    }

    pub fn withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        holder: Address,
        share_amount: Decimal,
        now: Timestamp,
    ) -> Result<WithdrawOutcome, PoolError> {
        let held = self.deposit_shares_of(holder);
        if held.is_zero() {
            return Err(PoolError::NoPoolTokens);
        }
        let share_amount = round_down(share_amount, self.decimals);
        if share_amount <= Decimal::ZERO {
            return Err(PoolError::ZeroAmount);
        }
        if share_amount > held {
            return Err(PoolError::InsufficientShares {
                held,
                requested: share_amount,
            });
        }
        if let Some(last) = self.last_provide.get(&holder) {
            let until = last.plus_millis(self.params.withdrawal_delay_millis);
            if now < until {
                return Err(PoolError::WithdrawalLocked { until });
            }
        }

        let pending = self.pending_interest(now)?;
        let total_liquidity = self.total_liquidity();
        let amount = round_down(share_amount * total_liquidity / self.total_deposits, self.decimals);
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        if amount > self.free_liquidity {
            return Err(PoolError::InsufficientFreeLiquidity {
                free: self.free_liquidity,
                requested: amount,
            });
        }

        ledger.transfer(self.address, holder, self.asset, amount)?;

        self.commit_accrual(pending, now);
        let total_deposits_before = self.total_deposits;
        self.free_liquidity -= amount;
        self.total_deposits -= share_amount;
        let remaining = held - share_amount;
        if remaining.is_zero() {
            self.deposit_shares.remove(&holder);
        } else {
            self.deposit_shares.insert(holder, remaining);
        }

        debug!(asset = self.asset.0, %holder, %amount, shares = %share_amount, "pool withdraw");

        Ok(WithdrawOutcome {
            amount,
            shares_burned: share_amount,
            total_deposits_before,
            total_deposits_after: self.total_deposits,
            total_liquidity_before: total_liquidity,
            total_liquidity_after: self.total_liquidity(),
        })
    }

    /// Deposit shares are plain fund units; moving them moves the yield claim.
    pub fn transfer_shares(&mut self, from: Address, to: Address, amount: Decimal) -> Result<(), PoolError> {
        let held = self.deposit_shares_of(from);
        let amount = round_down(amount, self.decimals);
        if amount <= Decimal::ZERO {
            return Err(PoolError::ZeroAmount);
        }
        if amount > held {
            return Err(PoolError::InsufficientShares { held, requested: amount });
        }
        if from == to {
            return Ok(());
        }
        if held == amount {
            self.deposit_shares.remove(&from);
        } else {
            self.deposit_shares.insert(from, held - amount);
        }
        *self.deposit_shares.entry(to).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    // 4.1.2: debt side. only the Margin Engine holds MarginTrading.

    pub fn borrow(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        amount: Decimal,
        recipient: Address,
        now: Timestamp,
    ) -> Result<BorrowOutcome, PoolError> {
        self.access.require(Role::MarginTrading, caller)?;
        let amount = round_down(amount, self.decimals);
        if amount <= Decimal::ZERO {
            return Err(PoolError::ZeroAmount);
        }

        let pending = self.pending_interest(now)?;
        let total_borrows = self.net_debt + self.total_interest_snapshot + pending;

        let limit = self.total_liquidity() * self.params.maximum_borrow_multiplier.as_fraction();
        if total_borrows + amount > limit {
            return Err(PoolError::LimitExceeded { limit, requested: amount });
        }
        if amount > self.free_liquidity {
            return Err(PoolError::InsufficientFreeLiquidity {
                free: self.free_liquidity,
                requested: amount,
            });
        }

        let shares = if self.debt_shares_sum.is_zero() || total_borrows.is_zero() {
            amount
        } else {
            round_up(amount * self.debt_shares_sum / total_borrows, DEBT_SHARE_DECIMALS)
        };

        ledger.transfer(self.address, recipient, self.asset, amount)?;

        self.commit_accrual(pending, now);
        let net_debt_before = self.net_debt;
        self.net_debt += amount;
        self.free_liquidity -= amount;
        self.debt_shares_sum += shares;
        *self.debt_shares.entry(account).or_insert(Decimal::ZERO) += shares;

        debug!(asset = self.asset.0, account = account.0, %amount, %shares, "pool borrow");

        Ok(BorrowOutcome {
            amount,
            shares_minted: shares,
            net_debt_before,
            net_debt_after: self.net_debt,
            total_borrows_after: self.total_borrows(now),
        })
    }

    /// Repays up to `amount_provided` of the account's debt, pulled from `payer`.
    /// A call against an account with no debt is a no-op.
    pub fn repay(
        &mut self,
        ledger: &mut TokenLedger,
        caller: Address,
        account: MarginAccountId,
        amount_provided: Decimal,
        payer: Address,
        now: Timestamp,
    ) -> Result<RepayOutcome, PoolError> {
        self.access.require(Role::MarginTrading, caller)?;

        let debt = self.debt_with_accrued_interest(account, now)?;
        if debt.is_zero() {
            return Ok(RepayOutcome {
                net_debt_before: self.net_debt,
                net_debt_after: self.net_debt,
                ..RepayOutcome::default()
            });
        }
        let provided = round_down(amount_provided, self.decimals);
        if provided <= Decimal::ZERO {
            return Err(PoolError::ZeroAmount);
        }

        let pending = self.pending_interest(now)?;
        let interest_total = self.total_interest_snapshot + pending;
        let total_borrows = self.net_debt + interest_total;

        let repaid = provided.min(debt);
        let held = self.debt_shares_of(account);
        let shares_burned = if repaid == debt {
            held
        } else {
            round_up(repaid * self.debt_shares_sum / total_borrows, DEBT_SHARE_DECIMALS).min(held)
        };

        let principal = (repaid * self.net_debt / total_borrows).min(self.net_debt);
        let interest = repaid - principal;
        let insurance_cut = round_down(interest * self.params.insurance_rate_multiplier.as_fraction(), self.decimals);

        ledger.transfer_from(self.address, payer, self.address, self.asset, repaid)?;
        ledger.transfer(self.address, self.insurance_pool, self.asset, insurance_cut)?;

        self.commit_accrual(pending, now);
        let net_debt_before = self.net_debt;
        self.net_debt = (self.net_debt - principal).max(Decimal::ZERO);
        self.total_interest_snapshot = (self.total_interest_snapshot - interest).max(Decimal::ZERO);
        self.free_liquidity += repaid - insurance_cut;
        self.burn_debt_shares(account, held, shares_burned);

        let remaining_debt = self.debt_with_accrued_interest(account, now)?;
        debug!(
            asset = self.asset.0,
            account = account.0,
            %repaid,
            %interest,
            %insurance_cut,
            %remaining_debt,
            "pool repay"
        );

        Ok(RepayOutcome {
            repaid,
            principal: round_down(principal, self.decimals),
            interest: round_down(interest, self.decimals),
            insurance_cut,
            shares_burned,
            remaining_debt,
            net_debt_before,
            net_debt_after: self.net_debt,
        })
    }

    /// Writes off whatever the account still owes. The lost principal leaves
    /// `total_liquidity`, lowering the deposit share price for every provider.
    pub fn absorb_shortfall(
        &mut self,
        caller: Address,
        account: MarginAccountId,
        now: Timestamp,
    ) -> Result<ShortfallOutcome, PoolError> {
        self.access.require(Role::MarginTrading, caller)?;

        let share_price_before = self.share_price();
        let debt = self.debt_with_accrued_interest(account, now)?;
        let held = self.debt_shares_of(account);
        if held.is_zero() {
            return Ok(ShortfallOutcome {
                debt_written_off: Decimal::ZERO,
                principal_lost: Decimal::ZERO,
                share_price_before,
                share_price_after: share_price_before,
            });
        }

        self.accrue(now)?;
        let fraction = held / self.debt_shares_sum;
        let principal = (self.net_debt * fraction).min(self.net_debt);
        let interest = (self.total_interest_snapshot * fraction).min(self.total_interest_snapshot);

        self.net_debt -= principal;
        self.total_interest_snapshot -= interest;
        self.burn_debt_shares(account, held, held);

        let share_price_after = self.share_price();
        tracing::warn!(
            asset = self.asset.0,
            account = account.0,
            %debt,
            principal_lost = %principal,
            "pool absorbed liquidation shortfall"
        );

        Ok(ShortfallOutcome {
            debt_written_off: debt,
            principal_lost: principal,
            share_price_before,
            share_price_after,
        })
    }

    fn burn_debt_shares(&mut self, account: MarginAccountId, held: Decimal, burned: Decimal) {
        let remaining = held - burned;
        if remaining <= Decimal::ZERO {
            self.debt_shares.remove(&account);
        } else {
            self.debt_shares.insert(account, remaining);
        }
        self.debt_shares_sum -= burned;
        if self.debt_shares_sum <= Decimal::ZERO || self.debt_shares.is_empty() {
            // last borrower gone: clear rounding residue so the next borrow starts 1:1
            self.debt_shares_sum = Decimal::ZERO;
            self.net_debt = Decimal::ZERO;
            self.total_interest_snapshot = Decimal::ZERO;
        }
    }

    // 4.1.3: reads

    /// `debt_shares[account] * total_borrows(at) / debt_shares_sum`, rounded up.
    pub fn debt_with_accrued_interest(&self, account: MarginAccountId, at: Timestamp) -> Result<Decimal, PoolError> {
        let shares = self.debt_shares_of(account);
        if shares.is_zero() || self.debt_shares_sum.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let total = self.net_debt + self.total_interest_snapshot + self.pending_interest(at)?;
        Ok(round_up(shares * total / self.debt_shares_sum, self.decimals))
    }

    pub fn total_borrows(&self, at: Timestamp) -> Decimal {
        self.net_debt + self.total_interest_snapshot + self.pending_interest(at).unwrap_or(Decimal::ZERO)
    }

    pub fn total_liquidity(&self) -> Decimal {
        self.free_liquidity + self.net_debt
    }

    pub fn free_liquidity(&self) -> Decimal {
        self.free_liquidity
    }

    pub fn share_price(&self) -> Decimal {
        if self.total_deposits.is_zero() {
            Decimal::ONE
        } else {
            self.total_liquidity() / self.total_deposits
        }
    }

    pub fn utilization(&self) -> Decimal {
        let total = self.total_liquidity();
        if total.is_zero() {
            Decimal::ZERO
        } else {
            self.net_debt / total
        }
    }

    pub fn deposit_shares_of(&self, holder: Address) -> Decimal {
        self.deposit_shares.get(&holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn deposit_share_holders(&self) -> impl Iterator<Item = (&Address, &Decimal)> {
        self.deposit_shares.iter()
    }

    pub fn debt_shares_of(&self, account: MarginAccountId) -> Decimal {
        self.debt_shares.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn debtors(&self) -> impl Iterator<Item = (&MarginAccountId, &Decimal)> {
        self.debt_shares.iter()
    }

    pub fn total_deposits(&self) -> Decimal {
        self.total_deposits
    }

    pub fn net_debt(&self) -> Decimal {
        self.net_debt
    }

    pub fn total_interest_snapshot(&self) -> Decimal {
        self.total_interest_snapshot
    }

    pub fn debt_shares_sum(&self) -> Decimal {
        self.debt_shares_sum
    }

    pub fn last_accrual(&self) -> Timestamp {
        self.last_accrual
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn insurance_pool(&self) -> Address {
        self.insurance_pool
    }

    // 4.1.4: privileged setters. each returns its before/after pair for the event log.

    pub fn set_interest_rate(&mut self, caller: Address, rate: Bps, now: Timestamp) -> Result<ParamChange<Bps>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        if rate.is_negative() {
            return Err(PoolError::InvalidParameter("interest rate must not be negative"));
        }
        // interest up to now is owed at the old rate
        self.accrue(now)?;
        let before = self.params.interest_rate;
        self.params.interest_rate = rate;
        Ok(ParamChange { before, after: rate })
    }

    pub fn set_maximum_pool_capacity(&mut self, caller: Address, capacity: Decimal) -> Result<ParamChange<Decimal>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        if capacity < Decimal::ZERO {
            return Err(PoolError::InvalidParameter("capacity must not be negative"));
        }
        let before = self.params.maximum_pool_capacity;
        self.params.maximum_pool_capacity = capacity;
        Ok(ParamChange { before, after: capacity })
    }

    pub fn set_maximum_borrow_multiplier(&mut self, caller: Address, multiplier: Bps) -> Result<ParamChange<Bps>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        if multiplier.is_negative() {
            return Err(PoolError::InvalidParameter("borrow multiplier must not be negative"));
        }
        let before = self.params.maximum_borrow_multiplier;
        self.params.maximum_borrow_multiplier = multiplier;
        Ok(ParamChange { before, after: multiplier })
    }

    pub fn set_insurance_rate_multiplier(&mut self, caller: Address, multiplier: Bps) -> Result<ParamChange<Bps>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        if multiplier > MAX_INSURANCE_RATE_MULTIPLIER {
            return Err(PoolError::InsuranceRateTooHigh);
        }
        if multiplier.is_negative() {
            return Err(PoolError::InvalidParameter("insurance multiplier must not be negative"));
        }
        let before = self.params.insurance_rate_multiplier;
        self.params.insurance_rate_multiplier = multiplier;
        Ok(ParamChange { before, after: multiplier })
    }

    pub fn set_insurance_pool(&mut self, caller: Address, insurance_pool: Address) -> Result<ParamChange<Address>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        let before = self.insurance_pool;
        self.insurance_pool = insurance_pool;
        Ok(ParamChange { before, after: insurance_pool })
    }

    pub fn set_withdrawal_delay(&mut self, caller: Address, delay_millis: i64) -> Result<ParamChange<i64>, PoolError> {
        self.access.require(Role::Manager, caller)?;
        if delay_millis < 0 {
            return Err(PoolError::InvalidParameter("withdrawal delay must not be negative"));
        }
        let before = self.params.withdrawal_delay_millis;
        self.params.withdrawal_delay_millis = delay_millis;
        Ok(ParamChange { before, after: delay_millis })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ONE_DAY_MILLIS;

    const ADMIN: Address = Address(1);
    const ENGINE: Address = Address(2);
    const POOL: Address = Address(100);
    const INSURANCE: Address = Address(101);
    const VAULT: Address = Address(102);
    const LP1: Address = Address(10);
    const LP2: Address = Address(11);
    const ACC0: MarginAccountId = MarginAccountId(0);
    const ACC1: MarginAccountId = MarginAccountId(1);

    struct Fixture {
        ledger: TokenLedger,
        pool: LendingPool,
        usdc: AssetId,
    }

    fn setup(params: PoolParams) -> Fixture {
        let mut ledger = TokenLedger::new();
        let usdc = ledger.register_asset("USDC", 6);
        for holder in [LP1, LP2, VAULT] {
            ledger.mint(holder, usdc, dec!(1_000_000)).unwrap();
            ledger.approve(holder, POOL, usdc, Decimal::MAX);
        }
        let mut pool = LendingPool::new(usdc, 6, POOL, ADMIN, INSURANCE, params, Timestamp::from_secs(0));
        pool.access_mut().grant_role(ADMIN, Role::MarginTrading, ENGINE).unwrap();
        Fixture { ledger, pool, usdc }
    }

    fn open_params() -> PoolParams {
        PoolParams {
            maximum_borrow_multiplier: Bps::new(10_000),
            ..PoolParams::default()
        }
    }

    #[test]
    fn first_deposit_mints_one_to_one_and_withdraws_back() {
        let mut f = setup(PoolParams::default());
        let t = Timestamp::from_secs(1);

        let out = f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        assert_eq!(out.shares_minted, dec!(1000));
        assert_eq!(f.pool.total_deposits(), dec!(1000));
        assert_eq!(f.ledger.balance_of(POOL, f.usdc), dec!(1000));

        let out = f.pool.withdraw(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        assert_eq!(out.amount, dec!(1000));
        assert_eq!(f.pool.deposit_shares_of(LP1), Decimal::ZERO);
        assert_eq!(f.ledger.balance_of(LP1, f.usdc), dec!(1_000_000));
    }

    #[test]
    fn provide_beyond_capacity_is_rejected() {
        let mut f = setup(PoolParams {
            maximum_pool_capacity: dec!(1500),
            ..PoolParams::default()
        });
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();

        let err = f.pool.provide(&mut f.ledger, LP2, dec!(501), t).unwrap_err();
        assert_eq!(err.to_string(), "Maximum liquidity has been achieved!");
        assert_eq!(f.pool.total_liquidity(), dec!(1000));
    }

    #[test]
    fn provide_zero_is_rejected() {
        let mut f = setup(PoolParams::default());
        let err = f.pool.provide(&mut f.ledger, LP1, Decimal::ZERO, Timestamp::from_secs(1)).unwrap_err();
        assert_eq!(err, PoolError::ZeroAmount);
    }

    #[test]
    fn provide_without_allowance_fails_atomically() {
        let mut f = setup(PoolParams::default());
        f.ledger.approve(LP1, POOL, f.usdc, dec!(10));
        let err = f.pool.provide(&mut f.ledger, LP1, dec!(100), Timestamp::from_secs(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: insufficient allowance");
        assert_eq!(f.pool.total_deposits(), Decimal::ZERO);
    }

    #[test]
    fn dust_withdraw_burns_nothing() {
        let mut f = setup(PoolParams::default());
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();

        let err = f.pool.withdraw(&mut f.ledger, LP1, dec!(0.0000009), t).unwrap_err();
        assert_eq!(err, PoolError::ZeroAmount);
        assert_eq!(f.pool.deposit_shares_of(LP1), dec!(1000));
        assert_eq!(f.pool.total_deposits(), dec!(1000));

        // shares finer than the asset's decimals are cut before burning
        let out = f.pool.withdraw(&mut f.ledger, LP1, dec!(1.0000009), t).unwrap();
        assert_eq!(out.amount, dec!(1));
        assert_eq!(out.shares_burned, dec!(1));
        assert_eq!(f.pool.deposit_shares_of(LP1), dec!(999));
    }

    #[test]
    fn withdraw_without_shares_fails() {
        let mut f = setup(PoolParams::default());
        let err = f.pool.withdraw(&mut f.ledger, LP2, dec!(1), Timestamp::from_secs(1)).unwrap_err();
        assert_eq!(err.to_string(), "Liquidity pool has no pool tokens");
    }

    #[test]
    fn withdraw_of_lent_liquidity_fails() {
        let mut f = setup(open_params());
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(600), VAULT, t).unwrap();

        let err = f.pool.withdraw(&mut f.ledger, LP1, dec!(500), t).unwrap_err();
        assert_eq!(err.to_string(), "Liquidity pool has not enough free tokens!");
        assert!(f.pool.withdraw(&mut f.ledger, LP1, dec!(400), t).is_ok());
    }

    #[test]
    fn borrow_is_capped_by_multiplier() {
        let mut f = setup(PoolParams::default());
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1500), t).unwrap();

        let err = f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(1201), VAULT, t).unwrap_err();
        assert_eq!(err.to_string(), "Limit is exceed!");
        assert!(f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(1200), VAULT, t).is_ok());
    }

    #[test]
    fn borrow_requires_margin_trading_role() {
        let mut f = setup(open_params());
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        let err = f.pool.borrow(&mut f.ledger, LP1, ACC0, dec!(1), LP1, t).unwrap_err();
        assert!(matches!(err, PoolError::Access(AccessError::MissingRole { .. })));
    }

    #[test]
    fn one_day_repay_splits_interest_to_insurance() {
        let mut f = setup(open_params());
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(5000), t0).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(1000), VAULT, t0).unwrap();

        let t1 = t0.plus_millis(ONE_DAY_MILLIS);
        let out = f.pool.repay(&mut f.ledger, ENGINE, ACC0, dec!(2000), VAULT, t1).unwrap();

        assert_eq!(out.interest, dec!(0.133680));
        assert_eq!(out.insurance_cut, dec!(0.026736));
        assert_eq!(f.ledger.balance_of(INSURANCE, f.usdc), dec!(0.026736));
        assert_eq!(out.remaining_debt, Decimal::ZERO);
        assert_eq!(f.pool.debt_shares_of(ACC0), Decimal::ZERO);
        assert_eq!(f.pool.net_debt(), Decimal::ZERO);
        assert_eq!(f.pool.total_interest_snapshot(), Decimal::ZERO);
        assert_eq!(f.pool.total_borrows(t1), Decimal::ZERO);
        // lenders earned interest minus the insurance cut
        assert!(f.pool.share_price() > Decimal::ONE);
    }

    #[test]
    fn repay_without_debt_is_noop() {
        let mut f = setup(open_params());
        let t = Timestamp::from_secs(5);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        let before = f.ledger.balance_of(VAULT, f.usdc);

        let out = f.pool.repay(&mut f.ledger, ENGINE, ACC0, dec!(100), VAULT, t).unwrap();
        assert!(out.is_noop());
        assert_eq!(f.ledger.balance_of(VAULT, f.usdc), before);
    }

    #[test]
    fn partial_repay_keeps_remaining_debt() {
        let mut f = setup(open_params());
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(5000), t0).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(1000), VAULT, t0).unwrap();

        let out = f.pool.repay(&mut f.ledger, ENGINE, ACC0, dec!(400), VAULT, t0).unwrap();
        assert_eq!(out.repaid, dec!(400));
        assert_eq!(out.remaining_debt, dec!(600));
        assert_eq!(f.pool.debt_shares_sum(), f.pool.debt_shares_of(ACC0));
    }

    #[test]
    fn two_borrowers_carry_their_own_interest() {
        let mut f = setup(open_params());
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(100_000), t0).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(1000), VAULT, t0).unwrap();

        let t1 = t0.plus_millis(10 * ONE_DAY_MILLIS);
        f.pool.borrow(&mut f.ledger, ENGINE, ACC1, dec!(1000), VAULT, t1).unwrap();

        // first borrower carries ten days of interest, second none yet
        let d0 = f.pool.debt_with_accrued_interest(ACC0, t1).unwrap();
        let d1 = f.pool.debt_with_accrued_interest(ACC1, t1).unwrap();
        assert!(d0 > dec!(1001));
        assert!(d1 <= dec!(1000.000001));

        f.pool.repay(&mut f.ledger, ENGINE, ACC0, d0, VAULT, t1).unwrap();
        assert_eq!(f.pool.debt_with_accrued_interest(ACC0, t1).unwrap(), Decimal::ZERO);
        assert!(f.pool.debt_with_accrued_interest(ACC1, t1).unwrap() <= dec!(1000.000001));

        let t2 = t1.plus_millis(ONE_DAY_MILLIS);
        // one more day on roughly 1000 of principal
        let d1_later = f.pool.debt_with_accrued_interest(ACC1, t2).unwrap();
        assert!(d1_later > dec!(1000.13) && d1_later < dec!(1000.14), "got {}", d1_later);
    }

    #[test]
    fn insurance_multiplier_is_capped() {
        let mut f = setup(PoolParams::default());
        assert!(f.pool.set_insurance_rate_multiplier(ADMIN, Bps::new(5000)).is_ok());
        let err = f.pool.set_insurance_rate_multiplier(ADMIN, Bps::new(5001)).unwrap_err();
        assert_eq!(err.to_string(), "The insurance rate multiplier cannot be more than 50%!");
    }

    #[test]
    fn setters_require_manager_and_report_change() {
        let mut f = setup(PoolParams::default());
        let change = f.pool.set_interest_rate(ADMIN, Bps::new(1110), Timestamp::from_secs(1)).unwrap();
        assert_eq!(change.before, Bps::new(500));
        assert_eq!(change.after, Bps::new(1110));

        let err = f.pool.set_maximum_pool_capacity(LP1, dec!(1)).unwrap_err();
        assert!(matches!(err, PoolError::Access(_)));
    }

    #[test]
    fn withdrawal_delay_blocks_early_exit() {
        let mut f = setup(PoolParams {
            withdrawal_delay_millis: 60_000,
            ..PoolParams::default()
        });
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(100), t0).unwrap();

        let err = f.pool.withdraw(&mut f.ledger, LP1, dec!(100), t0.plus_millis(59_999)).unwrap_err();
        assert!(matches!(err, PoolError::WithdrawalLocked { .. }));
        assert!(f.pool.withdraw(&mut f.ledger, LP1, dec!(100), t0.plus_millis(60_000)).is_ok());
    }

    #[test]
    fn shares_transfer_moves_yield_claim() {
        let mut f = setup(PoolParams::default());
        let t = Timestamp::from_secs(1);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t).unwrap();
        f.pool.transfer_shares(LP1, LP2, dec!(250)).unwrap();

        assert_eq!(f.pool.deposit_shares_of(LP1), dec!(750));
        assert_eq!(f.pool.deposit_shares_of(LP2), dec!(250));
        let out = f.pool.withdraw(&mut f.ledger, LP2, dec!(250), t).unwrap();
        assert_eq!(out.amount, dec!(250));
    }

    #[test]
    fn second_depositor_pays_share_price() {
        let mut f = setup(open_params());
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t0).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(500), VAULT, t0).unwrap();
        let t1 = t0.plus_millis(365 * ONE_DAY_MILLIS);
        f.pool.repay(&mut f.ledger, ENGINE, ACC0, dec!(1000), VAULT, t1).unwrap();

        let price = f.pool.share_price();
        assert!(price > Decimal::ONE);
        let out = f.pool.provide(&mut f.ledger, LP2, dec!(1000), t1).unwrap();
        assert!(out.shares_minted < dec!(1000));
        assert!(f.pool.share_price() >= price - dec!(0.000001));
    }

    #[test]
    fn shortfall_is_socialized() {
        let mut f = setup(open_params());
        let t0 = Timestamp::from_secs(0);
        f.pool.provide(&mut f.ledger, LP1, dec!(1000), t0).unwrap();
        f.pool.borrow(&mut f.ledger, ENGINE, ACC0, dec!(400), VAULT, t0).unwrap();

        let out = f.pool.absorb_shortfall(ENGINE, ACC0, t0).unwrap();
        assert_eq!(out.principal_lost, dec!(400));
        assert_eq!(f.pool.debt_shares_of(ACC0), Decimal::ZERO);
        assert_eq!(f.pool.total_liquidity(), dec!(600));
        assert_eq!(out.share_price_after, dec!(0.6));
    }
}
