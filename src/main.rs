//! Margin protocol simulation.
//!
//! Walks the engine through its lifecycle: liquidity provision, leveraged
//! borrowing, swaps inside custody, interest accrual, option collateral and
//! liquidation down to a socialized shortfall.

use std::sync::Arc;

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const ADMIN: Address = Address(1);
const LP: Address = Address(2);
const KEEPER: Address = Address(3);
const ALICE: Address = Address(10);
const BOB: Address = Address(11);

fn main() -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("margin_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Margin Protocol Simulation");
    println!("Reference asset USDC, pools for USDC/WETH/WBTC\n");

    scenario_1_lend_and_borrow()?;
    scenario_2_leveraged_swap()?;
    scenario_3_interest_accrual()?;
    scenario_4_option_collateral()?;
    scenario_5_liquidation()?;
    scenario_6_underwater_shortfall()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Engine with funded pools and a stocked oracle module.
fn bootstrap(config: &ProtocolConfig) -> Result<Engine, EngineError> {
    let mut engine = Engine::from_config(EngineConfig::default(), config, ADMIN)?;
    let oracle = engine.oracle_module_address();
    let assets: Vec<AssetId> = engine.pools().map(|(asset, _)| *asset).collect();

    for asset in assets {
        let depth = match engine.ledger().decimals(asset)? {
            d if d >= 18 => dec!(1_000),
            8 => dec!(50),
            _ => dec!(1_000_000),
        };
        engine.ledger_mut().mint(oracle, asset, depth)?;
        engine.ledger_mut().mint(LP, asset, depth)?;
        let pool = engine.pool_address(asset).ok_or(EngineError::UnsupportedToken(asset))?;
        engine.ledger_mut().approve(LP, pool, asset, Decimal::MAX);
        engine.provide_liquidity(LP, asset, depth)?;
    }
    Ok(engine)
}

fn fund(engine: &mut Engine, user: Address, asset: AssetId, amount: Decimal) -> Result<MarginAccountId, EngineError> {
    let vault = engine.vault_address();
    engine.ledger_mut().mint(user, asset, amount)?;
    engine.ledger_mut().approve(user, vault, asset, Decimal::MAX);
    let account = engine.create_margin_account(user);
    engine.provide_erc20(user, account, asset, amount)?;
    Ok(account)
}

fn symbol(engine: &Engine, symbol: &str) -> Result<AssetId, EngineError> {
    let missing = || ConfigError::InvalidAsset {
        symbol: symbol.to_string(),
        reason: "not listed".to_string(),
    };
    engine.asset_id(symbol).ok_or_else(|| missing().into())
}

fn print_account(engine: &Engine, account: MarginAccountId) -> Result<(), EngineError> {
    let ratio = engine.margin_ratio(account)?;
    let shown = if ratio == INFINITE_RATIO { "inf".to_string() } else { ratio.to_string() };
    println!(
        "    collateral ${}, debt ${}, ratio {}, zone {:?}",
        engine.collateral_value(account)?,
        engine.debt_value(account)?,
        shown,
        engine.risk_zone(account)?
    );
    Ok(())
}

/// Deposit, borrow to just above yellow, repay in full.
fn scenario_1_lend_and_borrow() -> Result<(), EngineError> {
    println!("Scenario 1: Lend and Borrow\n");

    let mut engine = bootstrap(&ProtocolConfig::default())?;
    let usdc = engine.reference_asset();
    let account = fund(&mut engine, ALICE, usdc, dec!(500))?;
    println!("  Alice deposits 500 USDC");

    engine.borrow(ALICE, account, usdc, dec!(4_500))?;
    println!("  Alice borrows 4,500 USDC");
    print_account(&engine, account)?;

    match engine.borrow(ALICE, account, usdc, dec!(501)) {
        Ok(_) => println!("  unexpected: second borrow accepted"),
        Err(e) => println!("  Extra 501 USDC rejected: {}", e),
    }

    let repaid = engine.repay(ALICE, account, usdc, Decimal::ZERO)?;
    println!("  Full repayment: {} USDC", repaid.repaid);
    print_account(&engine, account)?;
    println!();
    Ok(())
}

/// Borrowed USDC swapped into WETH without leaving custody.
fn scenario_2_leveraged_swap() -> Result<(), EngineError> {
    println!("Scenario 2: Leveraged Swap\n");

    let mut engine = bootstrap(&ProtocolConfig::testnet())?;
    let usdc = engine.reference_asset();
    let weth = symbol(&engine, "WETH")?;
    let account = fund(&mut engine, ALICE, usdc, dec!(2_000))?;

    engine.borrow(ALICE, account, usdc, dec!(8_000))?;
    let result = engine.swap(ALICE, account, usdc, weth, dec!(8_000), Decimal::ZERO)?;
    println!("  Alice swaps 8,000 borrowed USDC for {} WETH (5 bps fee)", result.amount_out);
    println!("  ratio {} -> {}", result.ratio_before, result.ratio_after);

    engine.set_price(weth, dec!(4_400));
    println!("  WETH rises to $4,400");
    print_account(&engine, account)?;
    println!();
    Ok(())
}

/// Interest compounding per second, insurance cut on repayment.
fn scenario_3_interest_accrual() -> Result<(), EngineError> {
    println!("Scenario 3: Interest Accrual\n");

    let mut engine = bootstrap(&ProtocolConfig::default())?;
    let usdc = engine.reference_asset();
    let account = fund(&mut engine, BOB, usdc, dec!(10_000))?;
    engine.borrow(BOB, account, usdc, dec!(20_000))?;

    engine.advance_time(365 * ONE_DAY_MILLIS);
    engine.set_price(usdc, dec!(1));
    let owed = engine.debt_with_accrued_interest(account, usdc)?;
    println!("  Bob owes {} USDC after one year on 20,000", owed);

    let outcome = engine.repay(BOB, account, usdc, Decimal::ZERO)?;
    println!("  Repaid {}: interest {}, insurance cut {}", outcome.repaid, outcome.interest, outcome.insurance_cut);

    let pool = engine.pool(usdc).ok_or(EngineError::UnsupportedToken(usdc))?;
    println!("  Pool share price now {}", pool.share_price());
    println!("  Pool utilization {}", pool.utilization().round_dp(4));
    println!();
    Ok(())
}

/// An option position counts as collateral and is exercised into USDC.
fn scenario_4_option_collateral() -> Result<(), EngineError> {
    println!("Scenario 4: Option Collateral\n");

    let mut engine = bootstrap(&ProtocolConfig::default())?;
    let usdc = engine.reference_asset();
    let collection = CollectionId(1);
    let treasury = engine.allocate_address();
    engine.add_collection(ADMIN, collection)?;
    engine.set_position_module(ADMIN, collection, Arc::new(OptionExerciseModule::new("options", treasury, usdc)))?;
    engine.ledger_mut().mint(treasury, usdc, dec!(100_000))?;

    let account = fund(&mut engine, ALICE, usdc, dec!(100))?;
    let position = engine.issue_option(ALICE, collection, Timestamp::from_secs(7 * 86_400), dec!(900))?;
    let vault = engine.vault_address();
    engine.ledger_mut().set_approval_for_all(ALICE, vault, collection, true);
    engine.provide_erc721(ALICE, account, collection, position)?;
    println!("  Alice posts an option worth 900 USDC");
    print_account(&engine, account)?;

    engine.borrow(ALICE, account, usdc, dec!(800))?;
    let payoff = engine.exercise(ALICE, account, collection, position)?;
    println!("  Borrowed 800, then exercised for {} USDC", payoff);
    print_account(&engine, account)?;
    println!();
    Ok(())
}

/// Price crash into the red zone, liquidated by a keeper.
fn scenario_5_liquidation() -> Result<(), EngineError> {
    println!("Scenario 5: Liquidation\n");

    let mut engine = bootstrap(&ProtocolConfig::default())?;
    let usdc = engine.reference_asset();
    let weth = symbol(&engine, "WETH")?;
    let account = fund(&mut engine, ALICE, weth, dec!(1))?;
    engine.borrow(ALICE, account, usdc, dec!(3_000))?;
    print_account(&engine, account)?;

    engine.set_price(weth, dec!(100));
    println!("  WETH crashes to $100");
    print_account(&engine, account)?;
    println!("  Liquidatable: {:?}", engine.liquidatable_accounts());

    let result = engine.liquidate(KEEPER, account)?;
    println!("  Debt repaid: {:?}", result.debt_repaid);
    println!("  Keeper fee {} USDC, owner receives {:?}", result.liquidator_fee, result.surplus_to_owner);
    println!();
    Ok(())
}

/// Collateral worth less than the debt: insurance first, then depositors.
fn scenario_6_underwater_shortfall() -> Result<(), EngineError> {
    println!("Scenario 6: Underwater Shortfall\n");

    let mut engine = bootstrap(&ProtocolConfig::default())?;
    let usdc = engine.reference_asset();
    let weth = symbol(&engine, "WETH")?;
    let account = fund(&mut engine, ALICE, weth, dec!(1))?;
    engine.borrow(ALICE, account, usdc, dec!(3_000))?;
    engine.swap(ALICE, account, usdc, weth, dec!(3_000), Decimal::ZERO)?;

    let insurance = engine.insurance_address();
    engine.ledger_mut().mint(insurance, usdc, dec!(500))?;
    engine.set_price(weth, dec!(1_000));
    print_account(&engine, account)?;

    let share_price_before = engine.pool(usdc).map(|p| p.share_price()).unwrap_or_default();
    let result = engine.liquidate(KEEPER, account)?;
    let share_price_after = engine.pool(usdc).map(|p| p.share_price()).unwrap_or_default();
    println!("  Insurance covered {:?}", result.insurance_used);
    println!("  Socialized shortfall {:?}", result.shortfall);
    println!("  USDC share price {} -> {}", share_price_before, share_price_after);

    for event in engine.recent_events(3) {
        println!("    event #{} at {}: {:?}", event.id.0, event.timestamp, event.payload);
    }
    Ok(())
}
