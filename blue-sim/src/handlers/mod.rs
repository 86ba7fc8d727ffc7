//! Per-action state transitions and the dispatcher routing actions to them.
//!
//! Handlers mutate the state they are given in place. They are only ever run on a draft: the
//! runner drops the draft when a handler fails, so a failed action commits nothing. Token
//! movements always go through [`erc20::transfer`].

pub mod blue;
pub mod erc20;
pub mod metamorpho;
pub mod paraswap;
pub mod vault_v2;

use alloy_primitives::{Address, U256};
use blue_sim_common::math::{mul_div_down, mul_div_up, w_mul_down, w_mul_up, RAY, WAD};
use tracing::{debug, instrument};

use crate::{
    action::{Action, ActionKind},
    errors::{BundlerError, ErrorKind, SimulationError},
    state::SimulationState,
};

/// Runs `action`, located at `index` in the list it belongs to, on `state`.
#[instrument(level = "debug", skip(state, action), fields(action = action.kind.name()))]
pub fn handle_action(
    state: &mut SimulationState,
    action: &Action,
    index: usize,
) -> Result<(), SimulationError> {
    dispatch(state, action).map_err(|kind| {
        debug!(%kind, "Action failed");
        SimulationError::new(index, action.clone(), kind)
    })
}

/// Runs `actions` in order on `state`, stopping at the first failure.
pub fn handle_actions(
    state: &mut SimulationState,
    actions: &[Action],
) -> Result<(), SimulationError> {
    for (index, action) in actions.iter().enumerate() {
        handle_action(state, action, index)?;
    }
    Ok(())
}

fn dispatch(state: &mut SimulationState, action: &Action) -> Result<(), ErrorKind> {
    action.kind.validate()?;

    let Action { sender, address, kind } = action;
    let (sender, address) = (*sender, *address);

    match kind {
        ActionKind::BlueSupply(args) => blue::supply(state, sender, args).map(drop),
        ActionKind::BlueWithdraw(args) => blue::withdraw(state, sender, args).map(drop),
        ActionKind::BlueBorrow(args) => blue::borrow(state, sender, args).map(drop),
        ActionKind::BlueRepay(args) => blue::repay(state, sender, args).map(drop),
        ActionKind::BlueSupplyCollateral(args) => blue::supply_collateral(state, sender, args),
        ActionKind::BlueWithdrawCollateral(args) => blue::withdraw_collateral(state, sender, args),
        ActionKind::BlueFlashLoan(args) => blue::flash_loan(state, sender, args),
        ActionKind::BlueAccrueInterest(args) => state.accrue_market(&args.id).map(drop),
        ActionKind::BlueSetAuthorization(args) => blue::set_authorization(state, sender, args),
        ActionKind::Erc20Transfer(args) => erc20::handle_transfer(state, sender, address, args),
        ActionKind::Erc20Transfer2(args) => erc20::transfer2(state, sender, address, args),
        ActionKind::Erc20Approve(args) => erc20::approve(state, sender, address, args),
        ActionKind::Erc20Permit(args) => erc20::permit(state, sender, address, args),
        ActionKind::Erc20Permit2(args) => erc20::permit2(state, sender, address, args),
        ActionKind::Erc20Wrap(args) => erc20::wrap(state, sender, address, args),
        ActionKind::Erc20Unwrap(args) => erc20::unwrap(state, sender, address, args),
        ActionKind::MetaMorphoAccrueInterest => {
            metamorpho::accrue_interest(state, address).map(drop)
        }
        ActionKind::MetaMorphoDeposit(args) => metamorpho::deposit(state, sender, address, args),
        ActionKind::MetaMorphoWithdraw(args) => metamorpho::withdraw(state, sender, address, args),
        ActionKind::MetaMorphoReallocate(allocations) => {
            metamorpho::reallocate(state, sender, address, allocations)
        }
        ActionKind::MetaMorphoPublicReallocate(args) => {
            metamorpho::public_reallocate(state, sender, address, args)
        }
        ActionKind::VaultV2AccrueInterest => vault_v2::accrue_interest(state, address).map(drop),
        ActionKind::VaultV2Deposit(args) => vault_v2::deposit(state, sender, address, args),
        ActionKind::VaultV2Withdraw(args) => vault_v2::withdraw(state, sender, address, args),
        ActionKind::ParaswapBuy(args) => paraswap::buy(state, sender, args),
        ActionKind::ParaswapSell(args) => paraswap::sell(state, sender, args),
    }
}

/// Runs the nested actions of a handler against the same draft. A failure is reported as a
/// callback failure of the parent, keeping the nested error intact.
pub(crate) fn run_callback(
    state: &mut SimulationState,
    callback: Option<&[Action]>,
) -> Result<(), ErrorKind> {
    if let Some(actions) = callback {
        handle_actions(state, actions).map_err(|err| ErrorKind::Callback(Box::new(err)))?;
    }
    Ok(())
}

pub(crate) fn is_adapter(state: &SimulationState, sender: Address) -> bool {
    sender == state.registry.general_adapter1
}

/// Share price of an execution, RAY-scaled assets per share.
fn share_price(assets: U256, shares: U256, round_up: bool) -> Result<U256, ErrorKind> {
    Ok(if round_up { mul_div_up(assets, RAY, shares)? } else { mul_div_down(assets, RAY, shares)? })
}

/// Fails if the executed share price is above `reference` (assets per RAY shares) increased by
/// `slippage`. Used where the caller pays assets for shares.
pub(crate) fn check_max_share_price(
    assets: U256,
    shares: U256,
    reference: U256,
    slippage: U256,
) -> Result<(), ErrorKind> {
    if shares.is_zero() {
        return Ok(());
    }

    let limit = w_mul_up(reference, WAD + slippage)?;
    let price = share_price(assets, shares, true)?;
    if price > limit {
        return Err(BundlerError::SlippageExceeded { price, limit }.into());
    }
    Ok(())
}

/// Fails if the executed share price is below `reference` decreased by `slippage`. Used where the
/// caller receives assets for shares.
pub(crate) fn check_min_share_price(
    assets: U256,
    shares: U256,
    reference: U256,
    slippage: U256,
) -> Result<(), ErrorKind> {
    if shares.is_zero() {
        return Ok(());
    }

    let limit = w_mul_down(reference, WAD - slippage)?;
    let price = share_price(assets, shares, false)?;
    if price < limit {
        return Err(BundlerError::SlippageExceeded { price, limit }.into());
    }
    Ok(())
}
