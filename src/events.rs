// 11.0: every state change produces an event. used for audit trails and for rebuilding
// pool and custody ledgers off-line. pool events carry before/after snapshots so the
// deltas can be reconstructed without replaying interest math.

use crate::types::{Address, AssetId, Bps, CollectionId, MarginAccountId, PositionId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Lending pool events
    Provide(ProvideEvent),
    Withdraw(WithdrawEvent),
    Borrow(BorrowEvent),
    Repay(RepayEvent),

    // Pool parameter events
    UpdateInterestRate(ParamUpdate<Bps>),
    UpdateMaximumPoolCapacity(ParamUpdate<Decimal>),
    UpdateMaximumBorrowMultiplier(ParamUpdate<Bps>),
    UpdateInsuranceRateMultiplier(ParamUpdate<Bps>),
    UpdateInsurancePool(ParamUpdate<Address>),
    UpdateWithdrawalDelay(ParamUpdate<i64>),

    // Custody events
    CollateralDeposited(CollateralEvent),
    CollateralWithdrawn(CollateralEvent),
    PositionDeposited(PositionEvent),
    PositionWithdrawn(PositionEvent),

    // Trading events
    Swap(SwapEvent),
    Exercise(ExerciseEvent),

    // Risk events
    Liquidation(LiquidationEvent),
    Shortfall(ShortfallEvent),

    // Governance events
    RiskParamsUpdated(RiskParamsUpdatedEvent),
    TimelockUnlocked { unlocks_at: Timestamp },
    TimelockLocked,

    OperationRejected(OperationRejectedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvideEvent {
    pub asset: AssetId,
    pub provider: Address,
    pub amount: Decimal,
    pub shares_minted: Decimal,
    pub total_deposits_before: Decimal,
    pub total_deposits_after: Decimal,
    pub total_liquidity_before: Decimal,
    pub total_liquidity_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub asset: AssetId,
    pub holder: Address,
    pub amount: Decimal,
    pub shares_burned: Decimal,
    pub total_deposits_before: Decimal,
    pub total_deposits_after: Decimal,
    pub total_liquidity_before: Decimal,
    pub total_liquidity_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub asset: AssetId,
    pub account: MarginAccountId,
    pub amount: Decimal,
    pub debt_shares_minted: Decimal,
    pub net_debt_before: Decimal,
    pub net_debt_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayEvent {
    pub asset: AssetId,
    pub account: MarginAccountId,
    pub repaid: Decimal,
    pub interest: Decimal,
    pub insurance_cut: Decimal,
    pub remaining_debt: Decimal,
    pub net_debt_before: Decimal,
    pub net_debt_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamUpdate<T> {
    pub asset: AssetId,
    pub before: T,
    pub after: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralEvent {
    pub account: MarginAccountId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub account: MarginAccountId,
    pub collection: CollectionId,
    pub position: PositionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub account: MarginAccountId,
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub module: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseEvent {
    pub account: MarginAccountId,
    pub collection: CollectionId,
    pub position: PositionId,
    pub payoff: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub account: MarginAccountId,
    pub liquidator: Address,
    pub owner: Address,
    pub ratio_before: Decimal,
    pub liquidator_fee: Decimal,
    pub surplus_to_owner: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortfallEvent {
    pub asset: AssetId,
    pub account: MarginAccountId,
    pub covered_by_insurance: Decimal,
    pub socialized: Decimal,
    pub share_price_before: Decimal,
    pub share_price_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParamsUpdatedEvent {
    pub field: String,
    pub before: Decimal,
    pub after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRejectedEvent {
    pub operation: String,
    pub account: Option<MarginAccountId>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn provide_event_roundtrips_through_json() {
        let event = Event::new(
            EventId(1),
            Timestamp::from_millis(1000),
            EventPayload::Provide(ProvideEvent {
                asset: AssetId(1),
                provider: Address(10),
                amount: dec!(1000),
                shares_minted: dec!(1000),
                total_deposits_before: Decimal::ZERO,
                total_deposits_after: dec!(1000),
                total_liquidity_before: Decimal::ZERO,
                total_liquidity_after: dec!(1000),
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(1));
        match back.payload {
            EventPayload::Provide(p) => assert_eq!(p.total_deposits_after, dec!(1000)),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn param_update_carries_before_and_after() {
        let update = ParamUpdate {
            asset: AssetId(2),
            before: Bps::new(500),
            after: Bps::new(1110),
        };
        assert!(update.after > update.before);
    }
}
