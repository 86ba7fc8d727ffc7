//! Core lending contract actions.
//!
//! Every handler accrues its market first. State is mutated before nested actions run and the
//! final token transfer happens last, so a callback can provide the tokens the parent pulls.

use alloy_primitives::{Address, I256, U256};
use blue_sim_common::{
    math::{checked_add, RoundingDirection, RAY},
    models::{error::BlueError, market::Market},
};
use tracing::debug;

use super::{
    check_max_share_price, check_min_share_price,
    erc20::{self, Transfer},
    is_adapter, run_callback,
};
use crate::{
    action::{
        amount, is_max, slippage, CollateralArgs, FlashLoanArgs, MarketArgs,
        SetAuthorizationArgs,
    },
    errors::{BundlerError, ErrorKind},
    state::SimulationState,
};

/// Fails unless `sender` may manage the position of `on_behalf`.
fn check_authorized(
    state: &SimulationState,
    sender: Address,
    on_behalf: Address,
) -> Result<(), ErrorKind> {
    if sender == on_behalf {
        return Ok(());
    }

    if is_adapter(state, sender) {
        if state.get_user(on_behalf).is_bundler_authorized {
            return Ok(());
        }
        return Err(BundlerError::UnauthorizedBundler(on_behalf).into());
    }

    Err(BlueError::Unauthorized { sender, on_behalf }.into())
}

/// Resolves the adapter's "entire balance" sentinel. Only the adapter may use it; for anyone
/// else the sentinel is taken literally and fails on balance or position checks.
fn resolve_max(
    state: &SimulationState,
    sender: Address,
    value: I256,
    available: impl FnOnce(&SimulationState) -> U256,
    zero: BundlerError,
) -> Result<U256, ErrorKind> {
    if !(is_max(value) && is_adapter(state, sender)) {
        return Ok(amount(value));
    }

    let resolved = available(state);
    if resolved.is_zero() {
        return Err(zero.into());
    }
    Ok(resolved)
}

/// Reference supply share price, assets per RAY shares.
fn supply_share_price(market: &Market, rounding: RoundingDirection) -> Result<U256, ErrorKind> {
    Ok(market.to_supply_assets(RAY, rounding)?)
}

fn borrow_share_price(market: &Market, rounding: RoundingDirection) -> Result<U256, ErrorKind> {
    Ok(market.to_borrow_assets(RAY, rounding)?)
}

/// Supplies loan assets on behalf of `on_behalf`. Returns the supplied `(assets, shares)`.
pub fn supply(
    state: &mut SimulationState,
    sender: Address,
    args: &MarketArgs,
) -> Result<(U256, U256), ErrorKind> {
    let mut market = state.accrue_market(&args.id)?;
    let loan_token = market.params.loan_token;

    let assets = resolve_max(
        state,
        sender,
        args.assets,
        |state| state.balance_of(sender, loan_token),
        BundlerError::ZeroAmount,
    )?;
    let reference = supply_share_price(&market, RoundingDirection::Up)?;

    let (assets, shares) = market.supply(assets, amount(args.shares))?;

    let mut position = state.get_position(args.on_behalf, args.id);
    position.supply_shares = checked_add(position.supply_shares, shares)?;
    state.positions.insert(position);
    state.markets.insert(market);

    if is_adapter(state, sender) && args.slippage.is_some() {
        check_max_share_price(assets, shares, reference, slippage(args.slippage))?;
    }

    debug!(market_id = %args.id, %assets, %shares, on_behalf = %args.on_behalf, "Supplied");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    erc20::transfer(state, Transfer::new(loan_token, morpho, sender, morpho, assets))?;

    Ok((assets, shares))
}

/// Withdraws supplied loan assets of `on_behalf`. Returns the withdrawn `(assets, shares)`.
pub fn withdraw(
    state: &mut SimulationState,
    sender: Address,
    args: &MarketArgs,
) -> Result<(U256, U256), ErrorKind> {
    check_authorized(state, sender, args.on_behalf)?;

    let mut market = state.accrue_market(&args.id)?;
    let loan_token = market.params.loan_token;
    let mut position = state.get_position(args.on_behalf, args.id);

    let shares = resolve_max(
        state,
        sender,
        args.shares,
        |_| position.supply_shares,
        BundlerError::ZeroShares,
    )?;
    let reference = supply_share_price(&market, RoundingDirection::Down)?;

    let (assets, shares) = market.withdraw(amount(args.assets), shares)?;

    position.supply_shares = position
        .supply_shares
        .checked_sub(shares)
        .ok_or(BlueError::InsufficientPosition { user: args.on_behalf, market_id: args.id })?;
    if !market.has_enough_liquidity() {
        return Err(BlueError::InsufficientLiquidity(args.id).into());
    }

    state.positions.insert(position);
    state.markets.insert(market);

    if is_adapter(state, sender) && args.slippage.is_some() {
        check_min_share_price(assets, shares, reference, slippage(args.slippage))?;
    }

    debug!(market_id = %args.id, %assets, %shares, on_behalf = %args.on_behalf, "Withdrew");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    let receiver = args.receiver.unwrap_or(sender);
    erc20::transfer(state, Transfer::new(loan_token, morpho, morpho, receiver, assets))?;

    Ok((assets, shares))
}

/// Borrows loan assets against the collateral of `on_behalf`. Returns the borrowed
/// `(assets, shares)`.
pub fn borrow(
    state: &mut SimulationState,
    sender: Address,
    args: &MarketArgs,
) -> Result<(U256, U256), ErrorKind> {
    check_authorized(state, sender, args.on_behalf)?;

    let mut market = state.accrue_market(&args.id)?;
    let reference = borrow_share_price(&market, RoundingDirection::Down)?;

    let (assets, shares) = market.borrow(amount(args.assets), amount(args.shares))?;

    let mut position = state.get_position(args.on_behalf, args.id);
    position.borrow_shares = checked_add(position.borrow_shares, shares)?;

    if !market.is_healthy(&position)? {
        return Err(
            BlueError::InsufficientCollateral { user: args.on_behalf, market_id: args.id }.into()
        );
    }
    if !market.has_enough_liquidity() {
        return Err(BlueError::InsufficientLiquidity(args.id).into());
    }

    let loan_token = market.params.loan_token;
    state.positions.insert(position);
    state.markets.insert(market);

    if is_adapter(state, sender) && args.slippage.is_some() {
        check_min_share_price(assets, shares, reference, slippage(args.slippage))?;
    }

    debug!(market_id = %args.id, %assets, %shares, on_behalf = %args.on_behalf, "Borrowed");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    let receiver = args.receiver.unwrap_or(sender);
    erc20::transfer(state, Transfer::new(loan_token, morpho, morpho, receiver, assets))?;

    Ok((assets, shares))
}

/// Repays debt of `on_behalf`. Returns the repaid `(assets, shares)`.
pub fn repay(
    state: &mut SimulationState,
    sender: Address,
    args: &MarketArgs,
) -> Result<(U256, U256), ErrorKind> {
    let mut market = state.accrue_market(&args.id)?;
    let loan_token = market.params.loan_token;
    let mut position = state.get_position(args.on_behalf, args.id);

    let assets = resolve_max(
        state,
        sender,
        args.assets,
        |state| state.balance_of(sender, loan_token),
        BundlerError::ZeroAmount,
    )?;
    let shares = resolve_max(
        state,
        sender,
        args.shares,
        |_| position.borrow_shares,
        BundlerError::ZeroShares,
    )?;
    let reference = borrow_share_price(&market, RoundingDirection::Up)?;

    let (assets, shares) = market.repay(assets, shares)?;

    position.borrow_shares = position
        .borrow_shares
        .checked_sub(shares)
        .ok_or(BlueError::InsufficientPosition { user: args.on_behalf, market_id: args.id })?;

    state.positions.insert(position);
    state.markets.insert(market);

    if is_adapter(state, sender) && args.slippage.is_some() {
        check_max_share_price(assets, shares, reference, slippage(args.slippage))?;
    }

    debug!(market_id = %args.id, %assets, %shares, on_behalf = %args.on_behalf, "Repaid");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    erc20::transfer(state, Transfer::new(loan_token, morpho, sender, morpho, assets))?;

    Ok((assets, shares))
}

pub fn supply_collateral(
    state: &mut SimulationState,
    sender: Address,
    args: &CollateralArgs,
) -> Result<(), ErrorKind> {
    let market = state.accrue_market(&args.id)?;
    let collateral_token = market.params.collateral_token;

    let assets = resolve_max(
        state,
        sender,
        args.assets,
        |state| state.balance_of(sender, collateral_token),
        BundlerError::ZeroAmount,
    )?;
    if assets.is_zero() {
        return Err(BlueError::ZeroAssets.into());
    }

    let mut position = state.get_position(args.on_behalf, args.id);
    position.collateral = checked_add(position.collateral, assets)?;
    state.positions.insert(position);

    debug!(market_id = %args.id, %assets, on_behalf = %args.on_behalf, "Supplied collateral");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    erc20::transfer(state, Transfer::new(collateral_token, morpho, sender, morpho, assets))
}

pub fn withdraw_collateral(
    state: &mut SimulationState,
    sender: Address,
    args: &CollateralArgs,
) -> Result<(), ErrorKind> {
    check_authorized(state, sender, args.on_behalf)?;

    let market = state.accrue_market(&args.id)?;
    let mut position = state.get_position(args.on_behalf, args.id);

    let assets = resolve_max(
        state,
        sender,
        args.assets,
        |_| position.collateral,
        BundlerError::ZeroAmount,
    )?;
    if assets.is_zero() {
        return Err(BlueError::ZeroAssets.into());
    }

    position.collateral = position
        .collateral
        .checked_sub(assets)
        .ok_or(BlueError::InsufficientPosition { user: args.on_behalf, market_id: args.id })?;
    if !market.is_healthy(&position)? {
        return Err(
            BlueError::InsufficientCollateral { user: args.on_behalf, market_id: args.id }.into()
        );
    }
    state.positions.insert(position);

    debug!(market_id = %args.id, %assets, on_behalf = %args.on_behalf, "Withdrew collateral");

    run_callback(state, args.callback.as_deref())?;

    let morpho = state.registry.morpho;
    let receiver = args.receiver.unwrap_or(sender);
    erc20::transfer(
        state,
        Transfer::new(market.params.collateral_token, morpho, morpho, receiver, assets),
    )
}

/// Lends `assets` of a token to the sender for the duration of the nested actions, which must
/// leave the sender able to pay them back.
pub fn flash_loan(
    state: &mut SimulationState,
    sender: Address,
    args: &FlashLoanArgs,
) -> Result<(), ErrorKind> {
    let assets = amount(args.assets);
    if assets.is_zero() {
        return Err(BlueError::ZeroAssets.into());
    }

    let morpho = state.registry.morpho;
    erc20::transfer(state, Transfer::new(args.token, morpho, morpho, sender, assets))?;

    run_callback(state, args.callback.as_deref())?;

    erc20::transfer(state, Transfer::new(args.token, morpho, sender, morpho, assets))
}

/// Sets whether the bundling adapter may manage the positions of `owner`. Done by anyone else
/// than the owner, it stands for a signed authorization and consumes the owner's nonce.
pub fn set_authorization(
    state: &mut SimulationState,
    sender: Address,
    args: &SetAuthorizationArgs,
) -> Result<(), ErrorKind> {
    let mut user = state.get_user(args.owner);
    if sender != args.owner {
        user.morpho_nonce = checked_add(user.morpho_nonce, U256::from(1))?;
    }
    user.is_bundler_authorized = args.is_bundler_authorized;
    state.users.insert(user);

    Ok(())
}

#[cfg(test)]
mod test {
    use blue_sim_common::models::MarketId;
    use rstest::rstest;

    use super::*;
    use crate::{
        action::{Action, ActionKind, TransferArgs, MAX_AMOUNT},
        errors::Erc20Error,
        testing::{self, i256, u256, ALICE, BOB, GENERAL_ADAPTER1, USDC, WETH},
    };

    fn market_args(assets: u128, shares: u128, on_behalf: Address) -> MarketArgs {
        MarketArgs::new(testing::market_id(), i256(assets), i256(shares), on_behalf)
    }

    fn collateral_args(assets: I256, on_behalf: Address) -> CollateralArgs {
        CollateralArgs {
            id: testing::market_id(),
            assets,
            on_behalf,
            receiver: None,
            callback: None,
        }
    }

    #[test_log::test]
    fn test_borrow() {
        let mut state = testing::state();
        let id = testing::market_id();
        let bob_before = state.balance_of(BOB, USDC);
        let mut args = market_args(10_000_000, 0, ALICE);
        args.receiver = Some(BOB);

        let result = borrow(&mut state, ALICE, &args).unwrap();

        assert_eq!(result, (u256(10_000_000), u256(10_000_000_000_000)));
        let before = testing::market();
        let market = state.get_market(&id, false).unwrap();
        assert_eq!(market.total_borrow_assets - before.total_borrow_assets, u256(10_000_000));
        assert_eq!(
            market.total_borrow_shares - before.total_borrow_shares,
            u256(10_000_000_000_000)
        );
        assert_eq!(state.balance_of(BOB, USDC) - bob_before, u256(10_000_000));
        assert_eq!(state.get_position(ALICE, id).borrow_shares, u256(10_000_000_000_000));
    }

    #[test]
    fn test_borrow_total_supply_fails_on_liquidity() {
        let mut state = testing::state();
        let total_supply = testing::market().total_supply_assets;
        let args =
            MarketArgs::new(testing::market_id(), I256::from_raw(total_supply), I256::ZERO, ALICE);

        let err = borrow(&mut state, ALICE, &args).unwrap_err();

        assert_eq!(err, ErrorKind::Blue(BlueError::InsufficientLiquidity(testing::market_id())));
    }

    #[test]
    fn test_borrow_without_collateral_fails() {
        let mut state = testing::state();

        let err = borrow(&mut state, BOB, &market_args(1, 0, BOB)).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Blue(BlueError::InsufficientCollateral {
                user: BOB,
                market_id: testing::market_id()
            })
        );
    }

    #[test]
    fn test_supply() {
        let mut state = testing::state();
        let id = testing::market_id();

        let result = supply(&mut state, ALICE, &market_args(1_000_000, 0, BOB)).unwrap();

        assert_eq!(result, (u256(1_000_000), u256(1_000_000_000_000)));
        assert_eq!(state.get_position(BOB, id).supply_shares, u256(1_000_000_000_000));
        assert_eq!(state.balance_of(ALICE, USDC), testing::ALICE_USDC - u256(1_000_000));
        assert_eq!(
            state
                .get_market(&id, false)
                .unwrap()
                .total_supply_assets,
            testing::market().total_supply_assets + u256(1_000_000)
        );
    }

    #[rstest]
    #[case::both_zero(0, 0)]
    #[case::both_set(1, 1)]
    fn test_supply_inconsistent_input(#[case] assets: u128, #[case] shares: u128) {
        let mut state = testing::state();

        let err = supply(&mut state, ALICE, &market_args(assets, shares, ALICE)).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Blue(BlueError::InconsistentInput {
                assets: u256(assets),
                shares: u256(shares)
            })
        );
    }

    #[test]
    fn test_withdraw_more_than_position_fails() {
        let mut state = testing::state();

        let err = withdraw(&mut state, BOB, &market_args(1, 0, BOB)).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Blue(BlueError::InsufficientPosition {
                user: BOB,
                market_id: testing::market_id()
            })
        );
    }

    #[rstest]
    #[case::third_party(BOB, BlueError::Unauthorized { sender: BOB, on_behalf: ALICE }.into())]
    #[case::adapter(GENERAL_ADAPTER1, BundlerError::UnauthorizedBundler(ALICE).into())]
    fn test_withdraw_on_behalf_requires_authorization(
        #[case] sender: Address,
        #[case] expected: ErrorKind,
    ) {
        let mut state = testing::state();

        let err = withdraw_collateral(&mut state, sender, &collateral_args(i256(1), ALICE))
            .unwrap_err();

        assert_eq!(err, expected);
    }

    #[test_log::test]
    fn test_authorized_adapter_withdraws_entire_collateral() {
        let mut state = testing::state();
        let weth_before = state.balance_of(ALICE, WETH);
        set_authorization(
            &mut state,
            ALICE,
            &SetAuthorizationArgs { owner: ALICE, is_bundler_authorized: true },
        )
        .unwrap();
        assert_eq!(state.get_user(ALICE).morpho_nonce, U256::ZERO);

        let mut args = collateral_args(MAX_AMOUNT, ALICE);
        args.receiver = Some(ALICE);
        withdraw_collateral(&mut state, GENERAL_ADAPTER1, &args).unwrap();

        assert_eq!(state.get_position(ALICE, testing::market_id()).collateral, U256::ZERO);
        assert_eq!(state.balance_of(ALICE, WETH) - weth_before, testing::ALICE_COLLATERAL);
    }

    #[test]
    fn test_signed_authorization_consumes_nonce() {
        let mut state = testing::state();

        set_authorization(
            &mut state,
            GENERAL_ADAPTER1,
            &SetAuthorizationArgs { owner: ALICE, is_bundler_authorized: true },
        )
        .unwrap();

        let user = state.get_user(ALICE);
        assert!(user.is_bundler_authorized);
        assert_eq!(user.morpho_nonce, U256::from(1));
    }

    #[test]
    fn test_withdraw_collateral_keeps_position_healthy() {
        let mut state = testing::state();
        borrow(&mut state, ALICE, &market_args(100_000_000_000, 0, ALICE)).unwrap();

        let err = withdraw_collateral(
            &mut state,
            ALICE,
            &collateral_args(i256(990_000_000_000_000_000_000), ALICE),
        )
        .unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Blue(BlueError::InsufficientCollateral {
                user: ALICE,
                market_id: testing::market_id()
            })
        );
    }

    #[test]
    fn test_repay_by_shares() {
        let mut state = testing::state();
        let id = testing::market_id();
        borrow(&mut state, ALICE, &market_args(10_000_000, 0, ALICE)).unwrap();

        let result = repay(&mut state, ALICE, &market_args(0, 10_000_000_000_000, ALICE)).unwrap();

        assert_eq!(result, (u256(10_000_000), u256(10_000_000_000_000)));
        assert!(state.get_position(ALICE, id).borrow_shares.is_zero());
        assert_eq!(state.get_market(&id, false).unwrap(), testing::market());
    }

    #[test]
    fn test_adapter_repays_entire_balance_of_nothing() {
        let mut state = testing::state();

        let args = MarketArgs::new(testing::market_id(), MAX_AMOUNT, I256::ZERO, ALICE);
        let err = repay(&mut state, GENERAL_ADAPTER1, &args).unwrap_err();

        assert_eq!(err, ErrorKind::Bundler(BundlerError::ZeroAmount));
    }

    #[test]
    fn test_supply_zero_collateral_fails() {
        let mut state = testing::state();

        let err = supply_collateral(&mut state, ALICE, &collateral_args(I256::ZERO, ALICE))
            .unwrap_err();

        assert_eq!(err, ErrorKind::Blue(BlueError::ZeroAssets));
    }

    #[test_log::test]
    fn test_callback_runs_before_collateral_is_pulled() {
        let mut state = testing::state();
        let id = testing::market_id();
        let mut borrow_args = market_args(1_000_000_000, 0, BOB);
        borrow_args.receiver = Some(BOB);
        let mut args = collateral_args(i256(1_000_000_000_000_000_000), BOB);
        args.callback =
            Some(vec![Action::new(BOB, testing::MORPHO, ActionKind::BlueBorrow(borrow_args))]);

        supply_collateral(&mut state, ALICE, &args).unwrap();

        let position = state.get_position(BOB, id);
        assert_eq!(position.collateral, u256(1_000_000_000_000_000_000));
        assert_eq!(position.borrow_shares, u256(1_000_000_000_000_000));
        assert_eq!(state.balance_of(BOB, USDC), u256(11_000_000_000));
    }

    #[test]
    fn test_flash_loan_must_be_repaid() {
        let mut state = testing::state();
        let drain = Action::new(
            ALICE,
            USDC,
            ActionKind::Erc20Transfer(TransferArgs {
                amount: I256::from_raw(testing::ALICE_USDC + u256(1_000_000)),
                from: ALICE,
                to: BOB,
            }),
        );

        let err = flash_loan(
            &mut state,
            ALICE,
            &FlashLoanArgs { token: USDC, assets: i256(1_000_000), callback: Some(vec![drain]) },
        )
        .unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Erc20(Erc20Error::InsufficientBalance {
                token: USDC,
                user: ALICE,
                balance: U256::ZERO,
                amount: u256(1_000_000)
            })
        );
    }

    #[test]
    fn test_unknown_market() {
        let mut state = testing::state();
        let args = MarketArgs::new(MarketId::ZERO, i256(1), I256::ZERO, ALICE);

        assert!(matches!(supply(&mut state, ALICE, &args), Err(ErrorKind::UnknownData(_))));
    }
}
