// 8.0: margin engine. owns custody, the lending pools and the swap router, values
// accounts in the reference asset and drives liquidation.
// deterministic and event-driven with no external I/O.

mod admin;
mod borrowing;
mod collateral;
mod config;
mod core;
mod liquidations;
mod pools;
mod results;
mod trading;
mod valuation;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, ErrorCategory, LiquidationResult, RiskZone, SwapResult};
