//! Runtime options of the engine itself, as opposed to protocol parameters
//! (see [`crate::config::ProtocolConfig`]).

use crate::price_feed::PriceSourceId;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Events kept in memory; older ones are dropped first.
    pub max_events: usize,
    /// Log every emitted event at info level.
    pub verbose: bool,
    /// First ledger address handed to protocol-owned holders (engine, vault,
    /// insurance sink, pools, module treasuries). User addresses stay below it.
    pub system_address_base: u64,
    /// Source id stamped on prices published through the engine's board.
    pub price_source: PriceSourceId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            system_address_base: 0xF000,
            price_source: 1,
        }
    }
}
