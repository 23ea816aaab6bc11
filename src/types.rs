// 1.0: all the primitives live here. nothing in the protocol works without these types.
// IDs, addresses, prices, reference values, rates, timestamps. each is a newtype so the
// compiler catches type mixups (an asset id is never a collection id).

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// fungible asset registered in the token ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

// non-fungible collection (option positions and similar)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u32);

// id of a single non-fungible position within a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarginAccountId(pub u64);

// any holder in the ledger: users, pools, the vault, module treasuries, insurance sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

impl fmt::Display for MarginAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

// 1.1: price of one whole unit of an asset, in units of the reference asset. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: basis points. 100 bps = 1%, 10_000 bps = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(i32);

impl Bps {
    pub const MAX: Bps = Bps(10_000);

    pub const fn new(bps: i32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.4: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self(self.0 + ms)
    }

    // zero when `later` is not after self. interest never runs backwards.
    pub fn elapsed_secs(&self, later: &Timestamp) -> Decimal {
        let diff_ms = (later.0 - self.0).max(0);
        Decimal::new(diff_ms, 3)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(at) => write!(f, "{}", at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// 1.5: token amount helpers. amounts moving between holders are quantized to asset decimals.
pub fn round_down(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

pub fn round_up(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
}

/// Margin ratios are reported with five decimal places (1e5 fixed point).
pub const RATIO_DECIMALS: u32 = 5;

/// A ratio of `Decimal::MAX` means no debt.
pub const INFINITE_RATIO: Decimal = Decimal::MAX;

pub fn truncate_ratio(ratio: Decimal) -> Decimal {
    round_down(ratio, RATIO_DECIMALS)
}

pub const ONE_DAY_MILLIS: i64 = 86_400_000;

pub fn default_yellow_coeff() -> Decimal {
    dec!(1.10)
}

pub fn default_red_coeff() -> Decimal {
    dec!(1.05)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bps_conversion() {
        let five_percent = Bps::new(500);
        assert_eq!(five_percent.as_fraction(), dec!(0.05));

        let half = Bps::new(5000);
        assert_eq!(half.as_fraction(), dec!(0.5)); // 50%
    }

    #[test]
    fn elapsed_seconds_never_negative() {
        let t0 = Timestamp::from_secs(100);
        let t1 = Timestamp::from_secs(160);
        assert_eq!(t0.elapsed_secs(&t1), dec!(60));
        assert_eq!(t1.elapsed_secs(&t0), Decimal::ZERO);
        assert_eq!(t0.elapsed_secs(&t0.plus_millis(1500)), dec!(1.5));
    }

    #[test]
    fn rounding_directions() {
        assert_eq!(round_down(dec!(1.2345679), 6), dec!(1.234567));
        assert_eq!(round_up(dec!(1.2345671), 6), dec!(1.234568));
        assert_eq!(truncate_ratio(dec!(5000) / dec!(4500)), dec!(1.11111));
    }

    #[test]
    fn timestamps_display_as_utc() {
        assert_eq!(Timestamp::from_secs(86_400).to_string(), "1970-01-02T00:00:00.000Z");
    }

    #[test]
    fn price_must_be_positive() {
        assert!(Price::new(dec!(0)).is_none());
        assert!(Price::new(dec!(-1)).is_none());
        assert_eq!(Price::new(dec!(4000)).map(|p| p.value()), Some(dec!(4000)));
    }
}
