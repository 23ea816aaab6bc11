// margin-core: collateralized margin trading and lending engine.
// risk-first architecture: account valuation and liquidation take priority.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AssetId, Address, Price, Bps, Timestamp
//   2.x  access.rs: roles and the two-phase timelock
//   3.x  interest.rs: per-second compounding
//   4.x  pool.rs: lending pool, deposit and debt shares, insurance cut
//   5.x  vault.rs: collateral custody per margin account
//   6.x  options.rs: option-like positions and their payoff
//   7.x  router/: swap routing registry and the built-in modules
//   8.x  engine/: margin engine: collateral, borrow, swap, valuation, liquidation
//   9.x  price_feed.rs: oracle board with freshness checks
//   9.2  ledger.rs: fungible balances, allowances, position ownership
//   9.4  accounts.rs: margin-account ownership and approvals
//   11.x events.rs: state transition events for audit
//   12.x config.rs: assets, pool params, risk params, env presets

// core protocol modules
pub mod accounts;
pub mod engine;
pub mod events;
pub mod interest;
pub mod pool;
pub mod types;
pub mod vault;

// routing and valuation
pub mod options;
pub mod router;

// integration modules
pub mod access;
pub mod config;
pub mod ledger;
pub mod price_feed;

// re exports for convenience
pub use access::{AccessControl, AccessError, Role, Timelock};
pub use accounts::{AccountRegistry, AccountsError, MarginAccountRegistry};
pub use config::{AssetConfig, ConfigError, Environment, ProtocolConfig, RiskConfig};
pub use engine::*;
pub use events::*;
pub use ledger::{AssetInfo, LedgerError, TokenLedger};
pub use options::{OptionBook, OptionTerms, OptionsError, PositionValuation};
pub use pool::{
    BorrowOutcome, LendingPool, PoolError, PoolParams, ProvideOutcome, RepayOutcome, ShortfallOutcome, WithdrawOutcome,
};
pub use price_feed::{PriceBoard, PriceFeed, PriceFeedError, PriceUpdate};
pub use router::{ModuleHandle, ModuleKind, OptionExerciseModule, OracleSwapModule, RouterError, SwapModule, SwapRouter, Venue};
pub use types::*;
pub use vault::{CollateralVault, VaultError};
