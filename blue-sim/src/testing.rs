//! Fixtures shared by the unit tests.
//!
//! Market and vault totals hold exactly as many shares per asset as their virtual offsets, so
//! conversions on them are exact and tests can assert round numbers.

use alloy_primitives::{address, uint, Address, I256, U256};
use blue_sim_common::{
    math::{ORACLE_PRICE_SCALE, WAD},
    models::{
        holding::Holding,
        market::{Market, MarketParams},
        position::Position,
        token::{Token, WrapperConfig, WrapperRate},
        vault::{FlowCaps, PublicAllocatorConfig, Vault, VaultMarketConfig, VaultUser},
        vault_v2::{VaultV2, VaultV2Adapter},
        Chain, MarketId,
    },
};

use crate::{
    action::{AccrueInterestArgs, Action, ActionKind},
    config::AddressRegistry,
    state::{BlockInfo, SimulationState},
};

pub const MORPHO: Address = address!("bbbbbbbbbb9cc5e90e3b3af64bdaf62c37eeffcb");
pub const PERMIT2: Address = address!("000000000022d473030f116ddee9f6b43ac78ba3");
pub const BUNDLER3: Address = address!("6566194141eefa99af43bb5aa71460ca2dc90245");
pub const GENERAL_ADAPTER1: Address = address!("4a6c312ec70e8747a587ee860a0353cd42be0ae0");
pub const PUBLIC_ALLOCATOR: Address = address!("fd32fa2ca22c76dd6e550706ad913fc6ce91c75d");

pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
pub const DAI: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");
pub const STETH: Address = address!("ae7ab96520de3a18e5e111b5eaab095312d7fe84");
pub const WSTETH: Address = address!("7f39c581f595b53c5cb19bd0b3f8da6c935e2ca0");
/// ERC-20 wrapper of USDC.
pub const WRAPPED_USDC: Address = address!("59356f7e9b5e9f1c4bb22e5c8a1d0c04f34ab1ea");

pub const ORACLE: Address = address!("dddd770badd886df3864029e4b377b5f6a2b6b83");
pub const WSTETH_ORACLE: Address = address!("48f7e36eb6b826b2df4b2e630b62cd25e89e40e2");
pub const IRM: Address = address!("870ac11d48b15db9a138cf899d20f13f79ba00bc");

pub const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
pub const BOB: Address = address!("0000000000000000000000000000000000000b0b");
pub const ALLOCATOR: Address = address!("00000000000000000000000000000000a110ca70");
pub const CURATOR: Address = address!("000000000000000000000000000000000c0a7012");
pub const FEE_RECIPIENT: Address = address!("0000000000000000000000000000000000000fee");

pub const VAULT: Address = address!("beef01735c132ada46aa9aa4c54623caa92a64cb");
pub const VAULT_V2: Address = address!("00000000000000000000000000000000000ba012");
pub const VAULT_V2_ADAPTER: Address = address!("00000000000000000000000000000000000ada97");

pub const TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_NUMBER: u64 = 18_580_000;

/// USDC held by Alice.
pub const ALICE_USDC: U256 = uint!(10000000000000_U256);
/// WETH supplied as collateral by Alice on [`market`].
pub const ALICE_COLLATERAL: U256 = uint!(1000000000000000000000_U256);

pub fn registry() -> AddressRegistry {
    AddressRegistry {
        morpho: MORPHO,
        permit2: PERMIT2,
        bundler3: BUNDLER3,
        general_adapter1: GENERAL_ADAPTER1,
        public_allocator: PUBLIC_ALLOCATOR,
        dai: Some(DAI),
    }
}

pub fn u256(value: u128) -> U256 {
    U256::from(value)
}

pub fn i256(value: u128) -> I256 {
    I256::from_raw(U256::from(value))
}

/// USDC loan, WETH collateral at 3000 USDC, 86% LLTV.
pub fn market() -> Market {
    Market {
        params: MarketParams::new(USDC, WETH, ORACLE, IRM, u256(860_000_000_000_000_000)),
        total_supply_assets: u256(1_000_000_000_000),
        total_supply_shares: u256(1_000_000_000_000_000_000),
        total_borrow_assets: u256(800_000_000_000),
        total_borrow_shares: u256(800_000_000_000_000_000),
        last_update: TIMESTAMP,
        fee: WAD / U256::from(10),
        price: Some(ORACLE_PRICE_SCALE * u256(3_000) / u256(1_000_000_000_000)),
        rate_at_target: Some(u256(1_268_391_679)),
    }
}

pub fn market_id() -> MarketId {
    market().id()
}

/// USDC loan, wstETH collateral at 3500 USDC, 94.5% LLTV.
pub fn second_market() -> Market {
    Market {
        params: MarketParams::new(USDC, WSTETH, WSTETH_ORACLE, IRM, u256(945_000_000_000_000_000)),
        total_supply_assets: u256(500_000_000_000),
        total_supply_shares: u256(500_000_000_000_000_000),
        total_borrow_assets: u256(100_000_000_000),
        total_borrow_shares: u256(100_000_000_000_000_000),
        last_update: TIMESTAMP,
        fee: U256::ZERO,
        price: Some(ORACLE_PRICE_SCALE * u256(3_500) / u256(1_000_000_000_000)),
        rate_at_target: Some(u256(1_268_391_679)),
    }
}

pub fn second_market_id() -> MarketId {
    second_market().id()
}

pub fn holding(user: Address, token: Address, balance: U256) -> Holding {
    Holding { balance, ..Holding::new(user, token) }
}

/// A holding whose owner approved the core contract for everything.
pub fn approved_holding(user: Address, token: Address, balance: U256) -> Holding {
    let mut holding = holding(user, token, balance);
    holding.erc20_allowances.morpho = U256::MAX;
    holding
}

pub fn tokens() -> Vec<Token> {
    vec![
        Token::new(USDC, "USDC", 6),
        Token::new(WETH, "WETH", 18),
        Token::new(DAI, "DAI", 18),
        Token::new(STETH, "stETH", 18),
        Token::new(WSTETH, "wstETH", 18).with_wrapper(WrapperConfig {
            underlying: STETH,
            underlying_decimals: 18,
            erc20_wrapper: false,
            rate: WrapperRate::ExchangeRate(u256(1_200_000_000_000_000_000)),
        }),
        Token::new(WRAPPED_USDC, "wUSDC", 6).with_wrapper(WrapperConfig {
            underlying: USDC,
            underlying_decimals: 6,
            erc20_wrapper: true,
            rate: WrapperRate::Constant,
        }),
    ]
}

/// Both markets with Alice's collateral, funded Alice and Bob, and the core contract holding
/// the markets' liquidity and collateral.
pub fn state() -> SimulationState {
    let mut state = SimulationState::new(
        Chain::Ethereum,
        BlockInfo { number: BLOCK_NUMBER, timestamp: TIMESTAMP },
        registry(),
    );

    for token in tokens() {
        state.tokens.insert(token);
    }
    state.markets.insert(market());
    state.markets.insert(second_market());

    let mut collateral = Position::new(ALICE, market_id());
    collateral.collateral = ALICE_COLLATERAL;
    state.positions.insert(collateral);

    let mut alice_usdc = approved_holding(ALICE, USDC, ALICE_USDC);
    alice_usdc.erc2612_nonce = Some(U256::ZERO);
    let mut alice_dai = holding(ALICE, DAI, u256(1_000_000_000_000_000_000_000));
    alice_dai.erc2612_nonce = Some(U256::ZERO);

    for holding in [
        alice_usdc,
        alice_dai,
        approved_holding(ALICE, WETH, u256(10_000_000_000_000_000_000_000)),
        holding(ALICE, STETH, u256(100_000_000_000_000_000_000)),
        holding(ALICE, WSTETH, u256(1_000_000_000_000_000_000)),
        holding(ALICE, WRAPPED_USDC, u256(1_000_000)),
        holding(BOB, USDC, u256(10_000_000_000)),
        holding(MORPHO, USDC, u256(600_000_000_000)),
        holding(MORPHO, WETH, ALICE_COLLATERAL),
    ] {
        state.holdings.insert(holding);
    }

    state
}

/// A vault supplying 100k USDC on each market, all of its shares held by Alice.
pub fn vault() -> Vault {
    let mut vault = Vault::new(VAULT, USDC, 12);
    vault.owner = ALICE;
    vault.curator = CURATOR;
    vault.supply_queue = vec![market_id(), second_market_id()];
    vault.withdraw_queue = vec![market_id(), second_market_id()];
    vault.total_assets = u256(200_000_000_000);
    vault.last_total_assets = u256(200_000_000_000);
    vault.total_supply = u256(200_000_000_000_000_000_000_000);
    vault.public_allocator_config = Some(PublicAllocatorConfig {
        admin: ALICE,
        fee: U256::ZERO,
        accrued_fee: U256::ZERO,
    });
    vault
}

pub fn vault_state() -> SimulationState {
    let mut state = state();
    let vault = vault();

    for (id, cap, flow_caps) in [
        (
            market_id(),
            u256(500_000_000_000),
            FlowCaps { max_in: u256(100_000_000_000), max_out: u256(100_000_000_000) },
        ),
        (
            second_market_id(),
            u256(150_000_000_000),
            FlowCaps { max_in: u256(100_000_000_000), max_out: u256(50_000_000_000) },
        ),
    ] {
        let mut position = state.get_position(VAULT, id);
        position.supply_shares = u256(100_000_000_000_000_000);
        state.positions.insert(position);

        let mut config = VaultMarketConfig::new(VAULT, id, cap);
        config.public_allocator_config = Some(flow_caps);
        state.vault_market_configs.insert(config);
    }

    for (user, is_allocator, allowance) in [
        (ALICE, false, U256::MAX),
        (ALLOCATOR, true, U256::ZERO),
        (PUBLIC_ALLOCATOR, true, U256::ZERO),
    ] {
        state
            .vault_users
            .insert(VaultUser { vault: VAULT, user, is_allocator, allowance });
    }

    state
        .holdings
        .insert(holding(ALICE, VAULT, vault.total_supply));
    state.vaults.insert(vault);

    state
}

/// An empty next-generation USDC vault allocating to a single liquidity adapter.
pub fn vault_v2_state() -> SimulationState {
    let mut state = state();

    let mut vault = VaultV2::new(VAULT_V2, USDC, 12, TIMESTAMP);
    vault.liquidity_adapter = Some(VAULT_V2_ADAPTER);
    state.vault_v2s.insert(vault);
    state
        .vault_v2_adapters
        .insert(VaultV2Adapter::new(VAULT_V2_ADAPTER, VAULT_V2));
    state.vault_users.insert(VaultUser {
        vault: VAULT_V2,
        user: ALICE,
        is_allocator: false,
        allowance: U256::MAX,
    });

    state
}

pub fn accrue_action() -> Action {
    Action::new(
        ALICE,
        MORPHO,
        ActionKind::BlueAccrueInterest(AccrueInterestArgs { id: market_id() }),
    )
}
