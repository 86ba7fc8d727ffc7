//! Curated vault actions.
//!
//! A vault holds supply positions on core markets. Deposits are spread along the supply queue up
//! to each market's cap and withdrawals are served along the withdraw queue. Vault shares are
//! tracked as holdings of the vault's own address.

use alloy_primitives::{Address, I256, U256};
use blue_sim_common::{
    display::wad,
    math::{
        checked_add, checked_sub, min, shares::to_shares_with_offset, w_mul_down, zero_floor_sub,
        RoundingDirection, RAY,
    },
    models::{
        vault::{Vault, VaultMarketConfig},
        MarketId,
    },
};
use tracing::{debug, instrument};

use super::{
    blue, check_max_share_price, check_min_share_price,
    erc20::{self, Transfer},
    is_adapter,
};
use crate::{
    action::{
        amount, is_max, slippage, Allocation, MarketArgs, PublicReallocateArgs, VaultDepositArgs,
        VaultWithdrawArgs, MAX_AMOUNT,
    },
    config::NATIVE_ADDRESS,
    errors::{
        BundlerError, ErrorKind, InputError, PublicAllocatorError, UnknownDataError, VaultError,
    },
    state::SimulationState,
};

/// Supply assets of the vault on market `id`, rounded down.
fn supply_assets(
    state: &mut SimulationState,
    vault: Address,
    id: &MarketId,
    rounding: RoundingDirection,
) -> Result<U256, ErrorKind> {
    let market = state.accrue_market(id)?;
    let position = state.get_position(vault, *id);
    Ok(market.to_supply_assets(position.supply_shares, rounding)?)
}

/// Resolves an (assets, shares) pair where exactly one side is set.
pub(crate) fn resolve_vault_amounts(
    assets: U256,
    shares: U256,
    to_shares: impl FnOnce(U256) -> Result<U256, ErrorKind>,
    to_assets: impl FnOnce(U256) -> Result<U256, ErrorKind>,
) -> Result<(U256, U256), ErrorKind> {
    match (assets.is_zero(), shares.is_zero()) {
        (false, true) => Ok((assets, to_shares(assets)?)),
        (true, false) => Ok((to_assets(shares)?, shares)),
        _ => Err(InputError::InconsistentInput { assets, shares }.into()),
    }
}

/// Accrues every market of the vault, recomputes its total assets and mints the performance fee.
#[instrument(level = "debug", skip(state))]
pub fn accrue_interest(state: &mut SimulationState, address: Address) -> Result<Vault, ErrorKind> {
    let mut vault = state.get_vault(address)?.clone();

    let mut ids: Vec<MarketId> = vault.withdraw_queue.clone();
    for id in &vault.supply_queue {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }

    let mut total_assets = state.balance_of(address, vault.asset);
    for id in &ids {
        let supplied = supply_assets(state, address, id, RoundingDirection::Down)?;
        total_assets = checked_add(total_assets, supplied)?;
    }

    let interest = zero_floor_sub(total_assets, vault.last_total_assets);
    if !interest.is_zero() && !vault.fee.is_zero() {
        let fee_assets = w_mul_down(interest, vault.fee)?;
        let fee_shares = to_shares_with_offset(
            fee_assets,
            checked_sub(total_assets, fee_assets)?,
            vault.total_supply,
            vault.virtual_shares(),
            RoundingDirection::Down,
        )?;

        if !fee_shares.is_zero() {
            let mint = Transfer::mint(address, address, vault.fee_recipient, fee_shares);
            erc20::transfer(state, mint)?;
            vault.total_supply = checked_add(vault.total_supply, fee_shares)?;
        }
        debug!(%interest, %fee_shares, fee = wad(vault.fee), "Minted vault fee");
    }

    vault.total_assets = total_assets;
    vault.last_total_assets = total_assets;
    state.vaults.insert(vault.clone());

    Ok(vault)
}

/// Supplies `assets` held idle by the vault along its supply queue.
fn supply_to_markets(
    state: &mut SimulationState,
    vault: &Vault,
    assets: U256,
) -> Result<(), ErrorKind> {
    let mut remaining = assets;

    for id in &vault.supply_queue {
        if remaining.is_zero() {
            break;
        }

        let cap = state
            .get_vault_market_config(vault.address, *id)?
            .cap;
        if cap.is_zero() {
            continue;
        }

        // Rounded up so the amount placed never overshoots the cap.
        let supplied = supply_assets(state, vault.address, id, RoundingDirection::Up)?;
        let to_supply = min(zero_floor_sub(cap, supplied), remaining);
        if to_supply.is_zero() {
            continue;
        }

        blue::supply(
            state,
            vault.address,
            &MarketArgs::new(*id, I256::from_raw(to_supply), I256::ZERO, vault.address),
        )?;
        remaining -= to_supply;
    }

    if !remaining.is_zero() {
        return Err(VaultError::AllCapsReached { vault: vault.address, remaining }.into());
    }
    Ok(())
}

/// Pulls `assets` along the withdraw queue until the vault holds them idle.
fn withdraw_from_markets(
    state: &mut SimulationState,
    vault: &Vault,
    assets: U256,
) -> Result<(), ErrorKind> {
    let idle = state.balance_of(vault.address, vault.asset);
    let mut remaining = zero_floor_sub(assets, idle);

    for id in &vault.withdraw_queue {
        if remaining.is_zero() {
            break;
        }

        let supplied = supply_assets(state, vault.address, id, RoundingDirection::Down)?;
        let liquidity = state.get_market(id, false)?.liquidity();
        let to_withdraw = min(min(supplied, liquidity), remaining);
        if to_withdraw.is_zero() {
            continue;
        }

        let mut args = MarketArgs::new(*id, I256::from_raw(to_withdraw), I256::ZERO, vault.address);
        args.receiver = Some(vault.address);
        blue::withdraw(state, vault.address, &args)?;
        remaining -= to_withdraw;
    }

    if !remaining.is_zero() {
        return Err(VaultError::NotEnoughLiquidity { vault: vault.address, remaining }.into());
    }
    Ok(())
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
    vault.last_total_assets = vault.total_assets;
    state.vaults.insert(vault.clone());

    supply_to_markets(state, &vault, assets)?;

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

    erc20::transfer(state, Transfer::new(address, sender, args.owner, Address::ZERO, shares))?;

    vault.total_supply = checked_sub(vault.total_supply, shares)?;
    vault.total_assets = zero_floor_sub(vault.total_assets, assets);
    vault.last_total_assets = vault.total_assets;
    state.vaults.insert(vault.clone());

    withdraw_from_markets(state, &vault, assets)?;

    erc20::transfer(state, Transfer::new(vault.asset, address, address, args.receiver, assets))?;

    debug!(vault = %address, %assets, %shares, owner = %args.owner, "Withdrew from vault");
    Ok(())
}

/// Moves the vault's supply between markets so each listed market ends at its target.
///
/// Withdrawals and supplies must cancel out. A target of [`MAX_AMOUNT`] supplies whatever was
/// withdrawn and not yet supplied.
pub fn reallocate(
    state: &mut SimulationState,
    sender: Address,
    address: Address,
    allocations: &[Allocation],
) -> Result<(), ErrorKind> {
    let vault = state.get_vault(address)?.clone();
    if !(state.get_vault_user(address, sender).is_allocator || vault.is_manager(sender)) {
        return Err(VaultError::NotAllocatorRole { vault: address, sender }.into());
    }

    let mut total_supplied = U256::ZERO;
    let mut total_withdrawn = U256::ZERO;

    for allocation in allocations {
        let id = allocation.id;
        let config = state
            .get_vault_market_config(address, id)?
            .clone();
        if !config.enabled {
            return Err(VaultError::UnauthorizedMarket { vault: address, market_id: id }.into());
        }

        let supplied = supply_assets(state, address, &id, RoundingDirection::Down)?;
        let target = amount(allocation.assets);
        let withdrawn = zero_floor_sub(supplied, target);

        if !withdrawn.is_zero() {
            let mut args = if target.is_zero() {
                let shares = state.get_position(address, id).supply_shares;
                MarketArgs::new(id, I256::ZERO, I256::from_raw(shares), address)
            } else {
                MarketArgs::new(id, I256::from_raw(withdrawn), I256::ZERO, address)
            };
            args.receiver = Some(address);

            let (withdrawn_assets, _) = blue::withdraw(state, address, &args)?;
            total_withdrawn = checked_add(total_withdrawn, withdrawn_assets)?;
            continue;
        }

        let to_supply = if allocation.assets == MAX_AMOUNT {
            zero_floor_sub(total_withdrawn, total_supplied)
        } else {
            zero_floor_sub(target, supplied)
        };
        if to_supply.is_zero() {
            continue;
        }
        if config.cap.is_zero() {
            return Err(VaultError::UnauthorizedMarket { vault: address, market_id: id }.into());
        }
        if checked_add(supplied, to_supply)? > config.cap {
            return Err(VaultError::SupplyCapExceeded { vault: address, market_id: id }.into());
        }

        let (supplied_assets, _) = blue::supply(
            state,
            address,
            &MarketArgs::new(id, I256::from_raw(to_supply), I256::ZERO, address),
        )?;
        total_supplied = checked_add(total_supplied, supplied_assets)?;
    }

    if total_withdrawn != total_supplied {
        return Err(VaultError::InconsistentReallocation {
            vault: address,
            total_supplied,
            total_withdrawn,
        }
        .into());
    }

    debug!(vault = %address, %total_withdrawn, "Reallocated");
    Ok(())
}

/// Reallocation through the public allocator: anyone pulls liquidity from some markets of the
/// vault into one market, within the flow caps set by the vault's admin, for a flat fee.
pub fn public_reallocate(
    state: &mut SimulationState,
    sender: Address,
    address: Address,
    args: &PublicReallocateArgs,
) -> Result<(), ErrorKind> {
    let public_allocator = state.registry.public_allocator;
    let mut vault = state.get_vault(address)?.clone();
    let mut config = vault
        .public_allocator_config
        .clone()
        .ok_or(PublicAllocatorError::NotConfigured(address))?;

    if !config.fee.is_zero() {
        erc20::transfer(
            state,
            Transfer::new(NATIVE_ADDRESS, sender, sender, public_allocator, config.fee),
        )?;
        config.accrued_fee = checked_add(config.accrued_fee, config.fee)?;
    }
    vault.public_allocator_config = Some(config);
    state.vaults.insert(vault);

    if args.withdrawals.is_empty() {
        return Err(PublicAllocatorError::EmptyWithdrawals.into());
    }

    let supply_id = args.supply_market_id;
    let mut supply_config = enabled_config(state, address, supply_id)?;

    let mut allocations = Vec::with_capacity(args.withdrawals.len() + 1);
    let mut total_withdrawn = U256::ZERO;
    let mut previous: Option<MarketId> = None;

    for withdrawal in &args.withdrawals {
        let id = withdrawal.id;
        if previous.is_some_and(|previous| previous >= id) {
            return Err(PublicAllocatorError::InconsistentWithdrawals.into());
        }
        previous = Some(id);

        let mut market_config = enabled_config(state, address, id)?;
        let withdrawn = amount(withdrawal.assets);
        if withdrawn.is_zero() {
            return Err(PublicAllocatorError::WithdrawZero(id).into());
        }
        if id == supply_id {
            return Err(PublicAllocatorError::DepositMarketInWithdrawals(id).into());
        }

        let mut flow_caps = market_config
            .public_allocator_config
            .clone()
            .unwrap_or_default();
        flow_caps.max_in = checked_add(flow_caps.max_in, withdrawn)?;
        flow_caps.max_out = flow_caps
            .max_out
            .checked_sub(withdrawn)
            .ok_or(PublicAllocatorError::MaxOutflowExceeded(id))?;
        market_config.public_allocator_config = Some(flow_caps);
        state.vault_market_configs.insert(market_config);

        let supplied = supply_assets(state, address, &id, RoundingDirection::Down)?;
        let target = supplied
            .checked_sub(withdrawn)
            .ok_or(PublicAllocatorError::NotEnoughSupply(id))?;

        allocations.push(Allocation { id, assets: I256::from_raw(target) });
        total_withdrawn = checked_add(total_withdrawn, withdrawn)?;
    }

    let mut flow_caps = supply_config
        .public_allocator_config
        .clone()
        .unwrap_or_default();
    flow_caps.max_in = flow_caps
        .max_in
        .checked_sub(total_withdrawn)
        .ok_or(PublicAllocatorError::MaxInflowExceeded(supply_id))?;
    flow_caps.max_out = checked_add(flow_caps.max_out, total_withdrawn)?;
    supply_config.public_allocator_config = Some(flow_caps);
    state.vault_market_configs.insert(supply_config);

    allocations.push(Allocation { id: supply_id, assets: MAX_AMOUNT });

    reallocate(state, public_allocator, address, &allocations)
}

fn enabled_config(
    state: &SimulationState,
    vault: Address,
    id: MarketId,
) -> Result<VaultMarketConfig, ErrorKind> {
    let config = state
        .try_get_vault_market_config(vault, id)
        .ok_or(UnknownDataError::UnknownVaultMarketConfig { vault, market_id: id })?;
    if !config.enabled {
        return Err(PublicAllocatorError::MarketNotEnabled(id).into());
    }
    Ok(config.clone())
}
