//! Interest compounding.
//!
//! Debt grows by `(1 + R)^(t / YEAR)` where `R` is the annual rate and `t`
//! the elapsed seconds. The factor is computed as `exp(ln(1 + R) * t / YEAR)`,
//! which is continuous and monotonic in `t`: no discrete jumps between
//! accruals, so splitting an interval into many accrual steps gives the same
//! result as one step.

use crate::types::{Bps, Timestamp};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: i64 = 31_536_000;

/// Compounding factor for `elapsed_secs` at `annual_rate`. Returns 1 for zero
/// time or zero rate. `None` only on overflow (rates and gaps far outside any
/// configurable range).
pub fn compounding_factor(annual_rate: Bps, elapsed_secs: Decimal) -> Option<Decimal> {
    if elapsed_secs <= Decimal::ZERO || annual_rate.value() <= 0 {
        return Some(Decimal::ONE);
    }

    let growth = Decimal::ONE + annual_rate.as_fraction();
    let years = elapsed_secs / Decimal::from(SECONDS_PER_YEAR);
    let exponent = growth.checked_ln()?.checked_mul(years)?;
    let factor = exponent.checked_exp()?;

    // exp rounding can land a hair under 1 for tiny exponents
    Some(factor.max(Decimal::ONE))
}

/// Interest accrued on `principal` between `from` and `to`.
pub fn accrued_interest(principal: Decimal, annual_rate: Bps, from: Timestamp, to: Timestamp) -> Option<Decimal> {
    if principal.is_zero() {
        return Some(Decimal::ZERO);
    }
    let factor = compounding_factor(annual_rate, from.elapsed_secs(&to))?;
    principal.checked_mul(factor - Decimal::ONE)
}

/// Approximate APY for display: the factor over one full year, minus one.
pub fn effective_annual_yield(annual_rate: Bps) -> Decimal {
    compounding_factor(annual_rate, Decimal::from(SECONDS_PER_YEAR))
        .map(|f| f - Decimal::ONE)
        .unwrap_or(dec!(0))
}
