//! Option-like non-fungible positions and their valuation.
//!
//! Stands in for the external options protocol: each position has an expiry
//! and a payoff denominated in a settlement asset. Zero payoff or an inactive
//! position is a normal terminal state, not an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{CollectionId, PositionId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTerms {
    pub expiry: Timestamp,
    /// Current realizable payoff, in settlement-asset units.
    pub payoff: Decimal,
    pub exercised: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("token id is not valid")]
    UnknownPosition { collection: CollectionId, position: PositionId },

    #[error("position is not active or has no profit")]
    NotExercisable { collection: CollectionId, position: PositionId },
}

/// `isActive` and `payoff` as the engine and modules see them.
pub trait PositionValuation {
    fn is_active(&self, collection: CollectionId, position: PositionId, now: Timestamp) -> bool;
    fn payoff(&self, collection: CollectionId, position: PositionId) -> Decimal;
    /// Marks the position exercised and returns its payoff.
    fn settle(&mut self, collection: CollectionId, position: PositionId, now: Timestamp) -> Result<Decimal, OptionsError>;
}

#[derive(Debug, Clone, Default)]
pub struct OptionBook {
    positions: HashMap<(CollectionId, PositionId), OptionTerms>,
}

impl OptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, collection: CollectionId, position: PositionId, expiry: Timestamp) {
        self.positions.insert(
            (collection, position),
            OptionTerms {
                expiry,
                payoff: Decimal::ZERO,
                exercised: false,
            },
        );
    }

    pub fn set_payoff(&mut self, collection: CollectionId, position: PositionId, payoff: Decimal) -> Result<(), OptionsError> {
        let terms = self
            .positions
            .get_mut(&(collection, position))
            .ok_or(OptionsError::UnknownPosition { collection, position })?;
        terms.payoff = payoff.max(Decimal::ZERO);
        Ok(())
    }

    pub fn terms(&self, collection: CollectionId, position: PositionId) -> Option<&OptionTerms> {
        self.positions.get(&(collection, position))
    }
}

impl PositionValuation for OptionBook {
    fn is_active(&self, collection: CollectionId, position: PositionId, now: Timestamp) -> bool {
        self.positions
            .get(&(collection, position))
            .is_some_and(|t| !t.exercised && now < t.expiry)
    }

    fn payoff(&self, collection: CollectionId, position: PositionId) -> Decimal {
        self.positions
            .get(&(collection, position))
            .filter(|t| !t.exercised)
            .map(|t| t.payoff)
            .unwrap_or(Decimal::ZERO)
    }

    fn settle(&mut self, collection: CollectionId, position: PositionId, now: Timestamp) -> Result<Decimal, OptionsError> {
        if !self.is_active(collection, position, now) || self.payoff(collection, position).is_zero() {
            return Err(OptionsError::NotExercisable { collection, position });
        }
        let terms = self
            .positions
            .get_mut(&(collection, position))
            .ok_or(OptionsError::UnknownPosition { collection, position })?;
        terms.exercised = true;
        Ok(terms.payoff)
    }
}
