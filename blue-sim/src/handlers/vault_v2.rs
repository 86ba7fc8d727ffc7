//! Next-generation vault actions.
//!
//! Only the liquidity adapter is modelled: deposits are allocated to it and withdrawals
//! deallocate from it when idle assets fall short. Allocation moves tokens between the vault and
//! the adapter and records them on the adapter; caps, rate limits and the adapters' own market
//! interactions are not simulated.

use alloy_primitives::{Address, U256};
use blue_sim_common::{
    math::{checked_add, checked_sub, zero_floor_sub, RoundingDirection, RAY},
    models::vault_v2::VaultV2,
};
use tracing::{debug, instrument};

use super::{
    check_max_share_price, check_min_share_price,
    erc20::{self, Transfer},
    is_adapter,
    metamorpho::resolve_vault_amounts,
};
use crate::{
    action::{amount, is_max, slippage, VaultDepositArgs, VaultWithdrawArgs},
    errors::{BundlerError, ErrorKind, VaultError},
    state::SimulationState,
};

/// Recomputes total assets as idle assets plus the assets recorded on the vault's adapters.
#[instrument(level = "debug", skip(state))]
pub fn accrue_interest(
    state: &mut SimulationState,
    address: Address,
) -> Result<VaultV2, ErrorKind> {
    let mut vault = state.get_vault_v2(address)?.clone();

    let mut total_assets = state.balance_of(address, vault.asset);
    for adapter in state
        .vault_v2_adapters
        .values()
        .filter(|adapter| adapter.parent_vault == address)
    {
        total_assets = checked_add(total_assets, adapter.real_assets)?;
    }

    vault.total_assets = total_assets;
    vault.last_update = state.block.timestamp;
    state.vault_v2s.insert(vault.clone());

    Ok(vault)
}

pub fn deposit(
    state: &mut SimulationState,
    sender: Address,
    address: Address,
    args: &VaultDepositArgs,
) -> Result<(), ErrorKind> {
    let mut vault = accrue_interest(state, address)?;

    let assets = if is_max(args.assets) && is_adapter(state, sender) {
        state.balance_of(sender, vault.asset)
    } else {
        amount(args.assets)
    };
    let (assets, shares) = resolve_vault_amounts(
        assets,
        amount(args.shares),
        |assets| Ok(vault.to_shares(assets, RoundingDirection::Down)?),
        |shares| Ok(vault.to_assets(shares, RoundingDirection::Up)?),
    )?;

    if is_adapter(state, sender) {
        if shares.is_zero() {
            return Err(BundlerError::ZeroShares.into());
        }
        if args.slippage.is_some() {
            let reference = vault.to_assets(RAY, RoundingDirection::Up)?;
            check_max_share_price(assets, shares, reference, slippage(args.slippage))?;
        }
    }

    erc20::transfer(state, Transfer::new(vault.asset, address, sender, address, assets))?;
    erc20::transfer(state, Transfer::mint(address, address, args.owner, shares))?;

    vault.total_supply = checked_add(vault.total_supply, shares)?;
    vault.total_assets = checked_add(vault.total_assets, assets)?;
    state.vault_v2s.insert(vault.clone());

    if let Some(liquidity_adapter) = vault.liquidity_adapter {
        let mut adapter = state
            .get_vault_v2_adapter(liquidity_adapter)?
            .clone();
        erc20::transfer(
            state,
            Transfer::new(vault.asset, address, address, liquidity_adapter, assets),
        )?;
        adapter.real_assets = checked_add(adapter.real_assets, assets)?;
        state.vault_v2_adapters.insert(adapter);
    }

    debug!(vault = %address, %assets, %shares, owner = %args.owner, "Deposited");
    Ok(())
}

pub fn withdraw(
    state: &mut SimulationState,
    sender: Address,
    address: Address,
    args: &VaultWithdrawArgs,
) -> Result<(), ErrorKind> {
    let mut vault = accrue_interest(state, address)?;

    let shares = if is_max(args.shares) && is_adapter(state, sender) {
        let balance = state.balance_of(args.owner, address);
        if balance.is_zero() {
            return Err(BundlerError::ZeroShares.into());
        }
        balance
    } else {
        amount(args.shares)
    };
    let (assets, shares) = resolve_vault_amounts(
        amount(args.assets),
        shares,
        |assets| Ok(vault.to_shares(assets, RoundingDirection::Up)?),
        |shares| Ok(vault.to_assets(shares, RoundingDirection::Down)?),
    )?;

    if is_adapter(state, sender) && args.slippage.is_some() {
        let reference = vault.to_assets(RAY, RoundingDirection::Down)?;
        check_min_share_price(assets, shares, reference, slippage(args.slippage))?;
    }

    let missing = zero_floor_sub(assets, state.balance_of(address, vault.asset));
    if !missing.is_zero() {
        let liquidity_adapter = vault
            .liquidity_adapter
            .ok_or(VaultError::NotEnoughLiquidity { vault: address, remaining: missing })?;
        let mut adapter = state
            .get_vault_v2_adapter(liquidity_adapter)?
            .clone();
        let remaining = zero_floor_sub(missing, adapter.real_assets);
        if !remaining.is_zero() {
            return Err(VaultError::NotEnoughLiquidity { vault: address, remaining }.into());
        }
        adapter.real_assets -= missing;
        erc20::transfer(
            state,
            Transfer::new(vault.asset, liquidity_adapter, liquidity_adapter, address, missing),
        )?;
        state.vault_v2_adapters.insert(adapter);
    }

    erc20::transfer(state, Transfer::new(address, sender, args.owner, Address::ZERO, shares))?;
    erc20::transfer(state, Transfer::new(vault.asset, address, address, args.receiver, assets))?;

    vault.total_supply = checked_sub(vault.total_supply, shares)?;
    vault.total_assets = zero_floor_sub(vault.total_assets, assets);
    state.vault_v2s.insert(vault);

    debug!(vault = %address, %assets, %shares, owner = %args.owner, "Withdrew from vault");
    Ok(())
}
