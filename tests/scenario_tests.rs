//! End-to-end protocol scenarios.
//!
//! Each test drives the public engine API the way an LP, a trader, a keeper
//! or an operator would.

use std::sync::Arc;

use margin_core::interest::accrued_interest;
use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ADMIN: Address = Address(1);
const LP: Address = Address(2);
const KEEPER: Address = Address(3);
const ALICE: Address = Address(10);
const BOB: Address = Address(11);

fn engine() -> Engine {
    engine_with(ProtocolConfig::default())
}

fn engine_with(config: ProtocolConfig) -> Engine {
    let mut engine = Engine::from_config(EngineConfig::default(), &config, ADMIN).unwrap();
    let oracle = engine.oracle_module_address();
    for symbol in ["USDC", "WETH", "WBTC"] {
        let asset = engine.asset_id(symbol).unwrap();
        engine.ledger_mut().mint(oracle, asset, dec!(1_000_000)).unwrap();
    }
    engine
}

fn seed_pool(engine: &mut Engine, asset: AssetId, amount: Decimal) {
    let pool = engine.pool_address(asset).unwrap();
    engine.ledger_mut().mint(LP, asset, amount).unwrap();
    engine.ledger_mut().approve(LP, pool, asset, Decimal::MAX);
    engine.provide_liquidity(LP, asset, amount).unwrap();
}

fn open_account(engine: &mut Engine, owner: Address, asset: AssetId, amount: Decimal) -> MarginAccountId {
    let vault = engine.vault_address();
    engine.ledger_mut().mint(owner, asset, amount).unwrap();
    engine.ledger_mut().approve(owner, vault, asset, Decimal::MAX);
    let account = engine.create_margin_account(owner);
    engine.provide_erc20(owner, account, asset, amount).unwrap();
    account
}

mod lending_pool {
    use super::*;

    #[test]
    fn first_deposit_is_one_to_one() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let pool = engine.pool_address(usdc).unwrap();
        engine.ledger_mut().mint(LP, usdc, dec!(1_000)).unwrap();
        engine.ledger_mut().approve(LP, pool, usdc, Decimal::MAX);

        let provided = engine.provide_liquidity(LP, usdc, dec!(1_000)).unwrap();
        assert_eq!(provided.shares_minted, dec!(1_000));
        assert_eq!(provided.total_liquidity_before, Decimal::ZERO);

        let withdrawn = engine.withdraw_liquidity(LP, usdc, dec!(1_000)).unwrap();
        assert_eq!(withdrawn.amount, dec!(1_000));
        assert_eq!(engine.pool(usdc).unwrap().deposit_shares_of(LP), Decimal::ZERO);
        assert_eq!(engine.pool(usdc).unwrap().total_deposits(), Decimal::ZERO);
    }

    #[test]
    fn realized_interest_goes_to_depositors_less_insurance() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(10_000));
        engine.borrow(ALICE, account, usdc, dec!(10_000)).unwrap();

        engine.advance_time(365 * ONE_DAY_MILLIS);
        engine.repay(ALICE, account, usdc, Decimal::ZERO).unwrap();

        // 500 interest, 100 of it to insurance
        let withdrawn = engine.withdraw_liquidity(LP, usdc, dec!(100_000)).unwrap();
        assert!(withdrawn.amount > dec!(100_399) && withdrawn.amount < dec!(100_401), "got {}", withdrawn.amount);
    }

    #[test]
    fn unrealized_interest_does_not_raise_share_price() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(10_000));
        engine.borrow(ALICE, account, usdc, dec!(10_000)).unwrap();
        let price = engine.pool(usdc).unwrap().share_price();

        engine.advance_time(180 * ONE_DAY_MILLIS);
        assert_eq!(engine.pool(usdc).unwrap().share_price(), price);
        assert!(engine.pool(usdc).unwrap().total_borrows(engine.time()) > dec!(10_000));
    }

    #[test]
    fn withdrawal_delay_holds_fresh_deposits() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        engine.set_withdrawal_delay(ADMIN, usdc, 3_600_000).unwrap();
        seed_pool(&mut engine, usdc, dec!(1_000));

        let err = engine.withdraw_liquidity(LP, usdc, dec!(1_000)).unwrap_err();
        assert!(matches!(err, EngineError::Pool(PoolError::WithdrawalLocked { .. })));
        assert_eq!(err.category(), ErrorCategory::CapacityLimit);

        engine.advance_time(3_600_000);
        engine.withdraw_liquidity(LP, usdc, dec!(1_000)).unwrap();
    }

    #[test]
    fn borrows_are_capped_by_the_multiplier() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(1_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(10_000));

        // 80% of 1000
        let err = engine.borrow(ALICE, account, usdc, dec!(801)).unwrap_err();
        assert!(matches!(err, EngineError::Pool(PoolError::LimitExceeded { .. })));
        engine.borrow(ALICE, account, usdc, dec!(800)).unwrap();
    }

    #[test]
    fn lent_out_liquidity_cannot_be_withdrawn() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(1_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(1_000));
        engine.borrow(ALICE, account, usdc, dec!(800)).unwrap();

        let err = engine.withdraw_liquidity(LP, usdc, dec!(1_000)).unwrap_err();
        assert!(matches!(err, EngineError::Pool(PoolError::InsufficientFreeLiquidity { .. })));
        engine.withdraw_liquidity(LP, usdc, dec!(200)).unwrap();
    }
}

mod leverage {
    use super::*;

    #[test]
    fn nine_times_leverage_then_no_more() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(500));

        engine.borrow(ALICE, account, usdc, dec!(4_500)).unwrap();
        assert_eq!(engine.margin_ratio(account).unwrap(), dec!(1.11111));
        assert_eq!(engine.risk_zone(account).unwrap(), RiskZone::Green);

        let err = engine.borrow(ALICE, account, usdc, dec!(501)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::RiskThreshold);
        assert_eq!(engine.debt_with_accrued_interest(account, usdc).unwrap(), dec!(4_500));
    }

    #[test]
    fn each_borrower_owes_only_their_own_interest() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let alice = open_account(&mut engine, ALICE, usdc, dec!(5_000));
        let bob = open_account(&mut engine, BOB, usdc, dec!(5_000));
        engine.borrow(ALICE, alice, usdc, dec!(1_000)).unwrap();
        engine.borrow(BOB, bob, usdc, dec!(1_000)).unwrap();

        let half_year = 180 * ONE_DAY_MILLIS;
        engine.advance_time(half_year);
        let one_period = accrued_interest(
            dec!(1_000),
            Bps::new(500),
            Timestamp::from_millis(0),
            Timestamp::from_millis(half_year),
        )
        .unwrap();

        let bob_before = engine.debt_with_accrued_interest(bob, usdc).unwrap();
        let alice_repaid = engine.repay(ALICE, alice, usdc, Decimal::ZERO).unwrap();
        assert!((alice_repaid.repaid - (dec!(1_000) + one_period)).abs() <= dec!(0.000002));
        assert_eq!(engine.debt_with_accrued_interest(alice, usdc).unwrap(), Decimal::ZERO);

        // alice leaving does not move bob's claim
        let bob_after = engine.debt_with_accrued_interest(bob, usdc).unwrap();
        assert!((bob_after - bob_before).abs() <= dec!(0.000002));

        // the next period accrues on bob's principal alone
        engine.advance_time(half_year);
        let bob_later = engine.debt_with_accrued_interest(bob, usdc).unwrap();
        assert!((bob_later - (bob_after + one_period)).abs() <= dec!(0.000002));
    }

    #[test]
    fn withdrawal_must_keep_the_account_green() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(500));
        engine.borrow(ALICE, account, usdc, dec!(4_500)).unwrap();

        // 4999 / 4500 stays above 1.10, 4900 / 4500 does not
        engine.withdraw_erc20(ALICE, account, usdc, dec!(1)).unwrap();
        let err = engine.withdraw_erc20(ALICE, account, usdc, dec!(99)).unwrap_err();
        assert_eq!(err.to_string(), "portfolioRatio is too low");
        assert_eq!(engine.vault_balance(account, usdc), dec!(4_999));
        assert_eq!(engine.ledger().balance_of(ALICE, usdc), dec!(1));
    }

    #[test]
    fn account_control_follows_ownership() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(1_000));

        let err = engine.borrow(BOB, account, usdc, dec!(100)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);

        engine.approve_account(ALICE, BOB, account).unwrap();
        engine.borrow(BOB, account, usdc, dec!(100)).unwrap();

        engine.transfer_account(ALICE, BOB, account).unwrap();
        assert_eq!(engine.owner_of(account).unwrap(), BOB);
        assert!(engine.repay(ALICE, account, usdc, Decimal::ZERO).is_err());
        engine.repay(BOB, account, usdc, Decimal::ZERO).unwrap();
    }

    #[test]
    fn cross_asset_debt_is_valued_at_the_oracle() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let weth = engine.asset_id("WETH").unwrap();
        seed_pool(&mut engine, weth, dec!(100));
        let account = open_account(&mut engine, ALICE, usdc, dec!(2_000));

        engine.borrow(ALICE, account, weth, dec!(1)).unwrap();
        assert_eq!(engine.debt_value(account).unwrap(), dec!(4_000));
        assert_eq!(engine.collateral_value(account).unwrap(), dec!(6_000));
        assert_eq!(engine.margin_ratio(account).unwrap(), dec!(1.5));

        engine.set_price(weth, dec!(5_000));
        assert_eq!(engine.margin_ratio(account).unwrap(), dec!(1.4));
    }

    #[test]
    fn stale_prices_block_valuation() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let weth = engine.asset_id("WETH").unwrap();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, weth, dec!(1));
        engine.borrow(ALICE, account, usdc, dec!(1_000)).unwrap();

        engine.advance_time(2 * 3_600_000);
        let err = engine.borrow(ALICE, account, usdc, dec!(1)).unwrap_err();
        assert!(matches!(err, EngineError::Router(_) | EngineError::PriceFeed(_)), "got {:?}", err);

        engine.set_price(weth, dec!(4_000));
        assert!(engine.borrow(ALICE, account, usdc, dec!(1)).is_err());
        engine.set_price(usdc, dec!(1));
        engine.borrow(ALICE, account, usdc, dec!(1)).unwrap();
    }
}

mod liquidation {
    use super::*;

    #[test]
    fn price_crash_clears_debt_in_every_pool() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let weth = engine.asset_id("WETH").unwrap();
        let wbtc = engine.asset_id("WBTC").unwrap();
        seed_pool(&mut engine, usdc, dec!(100_000));
        seed_pool(&mut engine, wbtc, dec!(10));

        let account = open_account(&mut engine, ALICE, weth, dec!(2));
        engine.borrow(ALICE, account, usdc, dec!(2_000)).unwrap();
        engine.borrow(ALICE, account, wbtc, dec!(0.05)).unwrap();
        assert_eq!(engine.risk_zone(account).unwrap(), RiskZone::Green);

        // 200 + 2000 + 3000 against 5000 owed
        engine.set_price(weth, dec!(100));
        assert_eq!(engine.risk_zone(account).unwrap(), RiskZone::Red);

        let result = engine.liquidate(KEEPER, account).unwrap();
        assert_eq!(result.debt_repaid, vec![(usdc, dec!(2_000)), (wbtc, dec!(0.05))]);
        assert_eq!(engine.pool(usdc).unwrap().debt_shares_of(account), Decimal::ZERO);
        assert_eq!(engine.pool(wbtc).unwrap().debt_shares_of(account), Decimal::ZERO);
        assert_eq!(result.liquidator_fee, dec!(2));
        assert_eq!(result.surplus_to_owner, vec![(usdc, dec!(198))]);
        assert_eq!(engine.margin_ratio(account).unwrap(), INFINITE_RATIO);

        let logged = engine
            .events()
            .iter()
            .any(|e| matches!(&e.payload, EventPayload::Liquidation(l) if l.account == account && l.liquidator == KEEPER));
        assert!(logged);
    }

    #[test]
    fn worthless_position_goes_back_to_the_owner() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let collection = CollectionId(7);
        let treasury = engine.allocate_address();
        engine.add_collection(ADMIN, collection).unwrap();
        engine
            .set_position_module(ADMIN, collection, Arc::new(OptionExerciseModule::new("options", treasury, usdc)))
            .unwrap();

        let account = open_account(&mut engine, ALICE, usdc, dec!(100));
        let position = engine
            .issue_option(ALICE, collection, Timestamp::from_secs(30 * 86_400), dec!(900))
            .unwrap();
        let vault = engine.vault_address();
        engine.ledger_mut().set_approval_for_all(ALICE, vault, collection, true);
        engine.provide_erc721(ALICE, account, collection, position).unwrap();
        engine.borrow(ALICE, account, usdc, dec!(5_000)).unwrap();

        // payoff gone: 5100 against 5000
        engine.options_mut().set_payoff(collection, position, Decimal::ZERO).unwrap();
        let result = engine.liquidate(KEEPER, account).unwrap();

        assert_eq!(result.positions_returned, vec![(collection, position)]);
        assert!(result.positions_exercised.is_empty());
        assert_eq!(engine.ledger().owner_of_position(collection, position).unwrap(), ALICE);
        assert_eq!(result.liquidator_fee, dec!(1));
        assert_eq!(engine.ledger().balance_of(ALICE, usdc), dec!(99));
    }

    #[test]
    fn live_position_is_exercised_to_cover_debt() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let weth = engine.asset_id("WETH").unwrap();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let collection = CollectionId(7);
        let treasury = engine.allocate_address();
        engine.add_collection(ADMIN, collection).unwrap();
        engine
            .set_position_module(ADMIN, collection, Arc::new(OptionExerciseModule::new("options", treasury, usdc)))
            .unwrap();
        engine.ledger_mut().mint(treasury, usdc, dec!(10_000)).unwrap();

        let account = open_account(&mut engine, ALICE, weth, dec!(1));
        let position = engine
            .issue_option(ALICE, collection, Timestamp::from_secs(30 * 86_400), dec!(500))
            .unwrap();
        let vault = engine.vault_address();
        engine.ledger_mut().set_approval_for_all(ALICE, vault, collection, true);
        engine.provide_erc721(ALICE, account, collection, position).unwrap();
        engine.borrow(ALICE, account, usdc, dec!(4_000)).unwrap();

        // 100 + 50 + 4000 against 4000 owed
        engine.set_price(weth, dec!(100));
        engine.options_mut().set_payoff(collection, position, dec!(50)).unwrap();
        let result = engine.liquidate(KEEPER, account).unwrap();

        assert_eq!(result.positions_exercised, vec![(collection, position, dec!(50))]);
        assert_eq!(engine.ledger().owner_of_position(collection, position).unwrap(), treasury);
        assert_eq!(result.liquidator_fee, dec!(1.5));
        assert_eq!(result.surplus_to_owner, vec![(usdc, dec!(148.5))]);
    }

    #[test]
    fn nobody_can_liquidate_a_green_account() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        seed_pool(&mut engine, usdc, dec!(100_000));
        let account = open_account(&mut engine, ALICE, usdc, dec!(1_000));
        engine.borrow(ALICE, account, usdc, dec!(1_000)).unwrap();

        let err = engine.liquidate(KEEPER, account).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LiquidationState);
        assert!(engine.liquidatable_accounts().is_empty());
    }
}

mod governance {
    use super::*;

    #[test]
    fn mainnet_preset_starts_timelocked() {
        let mut engine = engine_with(Environment::Mainnet.config());
        assert_eq!(engine.risk_params().yellow_coeff, dec!(1.20));

        let err = engine.set_liquidator_fee(ADMIN, Bps::new(200)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);

        engine.unlock(ADMIN).unwrap();
        engine.advance_time(engine.timelock().delay_millis().unwrap());
        engine.set_liquidator_fee(ADMIN, Bps::new(200)).unwrap();
        engine.lock(ADMIN).unwrap();
        assert!(engine.set_liquidator_fee(ADMIN, Bps::new(300)).is_err());
        assert_eq!(engine.risk_params().liquidator_fee, Bps::new(200));
    }

    #[test]
    fn delisting_blocks_deposits_but_not_withdrawals() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        let weth = engine.asset_id("WETH").unwrap();
        let account = open_account(&mut engine, ALICE, weth, dec!(1));
        engine.ledger_mut().mint(ALICE, weth, dec!(1)).unwrap();

        engine.set_available_fungible(ADMIN, weth, false).unwrap();
        assert!(engine.provide_erc20(ALICE, account, weth, dec!(1)).is_err());
        engine.withdraw_erc20(ALICE, account, weth, dec!(1)).unwrap();
        assert_eq!(engine.ledger().balance_of(ALICE, weth), dec!(2));
        assert!(engine.set_available_fungible(ALICE, usdc, false).is_err());
    }

    #[test]
    fn pool_setters_emit_before_and_after() {
        let mut engine = engine();
        let usdc = engine.reference_asset();
        engine.set_interest_rate(ADMIN, usdc, Bps::new(800)).unwrap();

        match &engine.events().last().unwrap().payload {
            EventPayload::UpdateInterestRate(update) => {
                assert_eq!(update.before, Bps::new(500));
                assert_eq!(update.after, Bps::new(800));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(engine.set_interest_rate(ALICE, usdc, Bps::new(1)).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ProtocolConfig::testnet();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = ProtocolConfig::from_json(&json).unwrap();
        assert_eq!(parsed.swap_fee, config.swap_fee);
        assert_eq!(parsed.assets.len(), 3);

        let broken = json.replace("\"USDC\"", "\"DAI\"");
        assert!(ProtocolConfig::from_json(&broken).is_ok());
        let unknown = json.replace("\"reference_asset\":\"USDC\"", "\"reference_asset\":\"EUR\"");
        assert!(matches!(
            ProtocolConfig::from_json(&unknown),
            Err(ConfigError::UnknownReferenceAsset(_))
        ));
    }
}
