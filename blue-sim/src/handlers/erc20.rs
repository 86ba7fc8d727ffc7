//! Token actions.
//!
//! Minting and burning are transfers from and to the zero address. A third party moving tokens
//! consumes the owner's allowance to it: a named allowance for the core contract, the permit
//! router and the bundling adapter, or the owner's allowance to a vault pulling its asset.

use alloy_primitives::{Address, U256};
use blue_sim_common::math::{checked_add, min};
use tracing::trace;

use super::is_adapter;
use crate::{
    action::{
        amount, is_max, slippage, ApproveArgs, Permit2Args, PermitArgs, TransferArgs, UnwrapArgs,
        WrapArgs,
    },
    config::MAX_PERMIT2_AMOUNT,
    errors::{Erc20Error, ErrorKind},
    state::SimulationState,
};

/// A token movement. `sender` is the account calling the token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub token: Address,
    pub sender: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

impl Transfer {
    pub fn new(token: Address, sender: Address, from: Address, to: Address, amount: U256) -> Self {
        Self { token, sender, from, to, amount }
    }

    pub fn mint(token: Address, sender: Address, to: Address, amount: U256) -> Self {
        Self::new(token, sender, Address::ZERO, to, amount)
    }

    pub fn burn(token: Address, from: Address, amount: U256) -> Self {
        Self::new(token, from, from, Address::ZERO, amount)
    }
}

/// Consumes `amount` of the allowance granted by `owner` to `spender` over `token`.
fn spend_allowance(
    state: &mut SimulationState,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
) -> Result<(), ErrorKind> {
    if let Some(named) = state.registry.allowance_spender(spender) {
        if spender == state.registry.morpho && state.approves_morpho(owner) {
            return Ok(());
        }

        let mut holding = state.get_holding(owner, token);
        let allowance = holding.erc20_allowances.get(named);
        if allowance == U256::MAX {
            return Ok(());
        }
        if allowance < amount {
            return Err(Erc20Error::InsufficientAllowance {
                token,
                owner,
                spender,
                allowance,
                amount,
            }
            .into());
        }
        *holding.erc20_allowances.get_mut(named) = allowance - amount;
        state.holdings.insert(holding);
        return Ok(());
    }

    if state.vault_asset(spender) == Some(token) {
        let mut vault_user = state.get_vault_user(spender, owner);
        let allowance = vault_user.allowance;
        if allowance == U256::MAX {
            return Ok(());
        }
        if allowance < amount {
            return Err(Erc20Error::InsufficientAllowance {
                token,
                owner,
                spender,
                allowance,
                amount,
            }
            .into());
        }
        vault_user.allowance = allowance - amount;
        state.vault_users.insert(vault_user);
        return Ok(());
    }

    Err(Erc20Error::UnknownAllowance { token, owner, spender }.into())
}

/// Moves tokens between holdings.
pub fn transfer(state: &mut SimulationState, transfer: Transfer) -> Result<(), ErrorKind> {
    let Transfer { token, sender, from, to, amount } = transfer;
    trace!(%token, %sender, %from, %to, %amount, "Transfer");

    if from != Address::ZERO {
        if sender != from {
            spend_allowance(state, token, from, sender, amount)?;
        }

        let mut holding = state.get_holding(from, token);
        holding.balance = holding
            .balance
            .checked_sub(amount)
            .ok_or(Erc20Error::InsufficientBalance {
                token,
                user: from,
                balance: holding.balance,
                amount,
            })?;
        state.holdings.insert(holding);
    }

    if to != Address::ZERO {
        let mut holding = state.get_holding(to, token);
        if !holding.can_receive() {
            return Err(Erc20Error::UnauthorizedTransfer { token, user: to }.into());
        }
        holding.balance = checked_add(holding.balance, amount)?;
        state.holdings.insert(holding);
    }

    Ok(())
}

pub fn handle_transfer(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    args: &TransferArgs,
) -> Result<(), ErrorKind> {
    let value = if is_max(args.amount) && is_adapter(state, sender) {
        state.balance_of(args.from, token)
    } else {
        amount(args.amount)
    };

    transfer(state, Transfer::new(token, sender, args.from, args.to, value))
}

/// Transfer through the permit router, available to the core contract and the bundling adapter.
pub fn transfer2(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    args: &TransferArgs,
) -> Result<(), ErrorKind> {
    let spender = state
        .registry
        .permit2_spender(sender)
        .ok_or(Erc20Error::UnexpectedTransfer2Sender(sender))?;
    let value = amount(args.amount);

    let mut holding = state.get_holding(args.from, token);
    let allowance = holding.permit2_allowances.get_mut(spender);
    if allowance.available(state.block.timestamp) < value {
        return Err(Erc20Error::InsufficientPermit2Allowance {
            token,
            owner: args.from,
            spender: sender,
        }
        .into());
    }
    if allowance.amount != MAX_PERMIT2_AMOUNT {
        allowance.amount -= value;
    }
    state.holdings.insert(holding);

    let permit2 = state.registry.permit2;
    transfer(state, Transfer::new(token, permit2, args.from, args.to, value))
}

/// Sets the allowance of `owner` to `spender` over `token` to exactly `value`.
fn set_allowance(
    state: &mut SimulationState,
    token: Address,
    owner: Address,
    spender: Address,
    value: U256,
) -> Result<(), ErrorKind> {
    if let Some(named) = state.registry.allowance_spender(spender) {
        let mut holding = state.get_holding(owner, token);
        *holding.erc20_allowances.get_mut(named) = value;
        state.holdings.insert(holding);
        return Ok(());
    }

    // Vault allowances are only tracked for users holding shares of the vault.
    let is_vault_user = !state.balance_of(owner, spender).is_zero() ||
        state
            .try_get_vault_user(spender, owner)
            .is_some();
    if is_vault_user && state.vault_asset(spender) == Some(token) {
        let mut vault_user = state.get_vault_user(spender, owner);
        vault_user.allowance = value;
        state.vault_users.insert(vault_user);
        return Ok(());
    }

    Err(Erc20Error::UnknownAllowance { token, owner, spender }.into())
}

pub fn approve(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    args: &ApproveArgs,
) -> Result<(), ErrorKind> {
    set_allowance(state, token, sender, args.spender, amount(args.amount))
}

/// EIP-2612 permit signed by `sender`.
pub fn permit(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    args: &PermitArgs,
) -> Result<(), ErrorKind> {
    if let Some(deadline) = args.deadline {
        if deadline < state.block.timestamp {
            return Err(Erc20Error::ExpiredPermit { token, owner: sender, deadline }.into());
        }
    }

    let mut holding = state.get_holding(sender, token);
    let expected = holding
        .erc2612_nonce
        .ok_or(Erc20Error::PermitNotSupported(token))?;
    if args.nonce != expected {
        return Err(Erc20Error::InvalidPermitNonce {
            token,
            owner: sender,
            expected,
            nonce: args.nonce,
        }
        .into());
    }
    holding.erc2612_nonce = Some(checked_add(expected, U256::from(1))?);
    state.holdings.insert(holding);

    // DAI permits are boolean: any grant is unlimited.
    let mut value = amount(args.amount);
    if state.registry.is_dai(token) && !value.is_zero() {
        value = U256::MAX;
    }

    set_allowance(state, token, sender, args.spender, value)
}

/// Permit-router allowance signed by `sender`.
pub fn permit2(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    args: &Permit2Args,
) -> Result<(), ErrorKind> {
    let spender = state
        .registry
        .permit2_spender(args.spender)
        .ok_or(Erc20Error::UnknownAllowance { token, owner: sender, spender: args.spender })?;

    let mut holding = state.get_holding(sender, token);
    let allowance = holding.permit2_allowances.get_mut(spender);
    if args.nonce != allowance.nonce {
        return Err(Erc20Error::InvalidPermitNonce {
            token,
            owner: sender,
            expected: allowance.nonce,
            nonce: args.nonce,
        }
        .into());
    }

    allowance.amount = min(amount(args.amount), MAX_PERMIT2_AMOUNT);
    allowance.expiration = args.expiration;
    allowance.nonce = checked_add(allowance.nonce, U256::from(1))?;
    state.holdings.insert(holding);

    Ok(())
}

/// Wraps underlying tokens of the sender into `wrapped`, minted to `args.owner`.
pub fn wrap(
    state: &mut SimulationState,
    sender: Address,
    wrapped: Address,
    args: &WrapArgs,
) -> Result<(), ErrorKind> {
    let token = state.get_token(wrapped)?.clone();
    let wrapper = token
        .wrapper
        .clone()
        .ok_or(Erc20Error::NotWrapper(wrapped))?;

    let assets = if is_max(args.amount) && is_adapter(state, sender) {
        state.balance_of(sender, wrapper.underlying)
    } else {
        amount(args.amount)
    };
    let minted = token
        .to_wrapped_exact_amount_in(assets, slippage(args.slippage))?
        .ok_or(Erc20Error::NotWrapper(wrapped))?;

    transfer(state, Transfer::burn(wrapper.underlying, sender, assets))?;
    transfer(state, Transfer::mint(wrapped, sender, args.owner, minted))
}

/// Unwraps `wrapped` tokens of the sender. Only ERC-20 wrappers pay an arbitrary receiver; the
/// others always pay the sender.
pub fn unwrap(
    state: &mut SimulationState,
    sender: Address,
    wrapped: Address,
    args: &UnwrapArgs,
) -> Result<(), ErrorKind> {
    let token = state.get_token(wrapped)?.clone();
    let wrapper = token
        .wrapper
        .clone()
        .ok_or(Erc20Error::NotWrapper(wrapped))?;

    let shares = if is_max(args.amount) && is_adapter(state, sender) {
        state.balance_of(sender, wrapped)
    } else {
        amount(args.amount)
    };
    let unwrapped = token
        .to_unwrapped_exact_amount_in(shares, slippage(args.slippage))?
        .ok_or(Erc20Error::NotWrapper(wrapped))?;
    let receiver = if wrapper.erc20_wrapper { args.receiver } else { sender };

    transfer(state, Transfer::burn(wrapped, sender, shares))?;
    transfer(state, Transfer::mint(wrapper.underlying, sender, receiver, unwrapped))
}

#[cfg(test)]
mod test {
    use alloy_primitives::I256;
    use rstest::rstest;

    use super::*;
    use crate::testing::{
        self, i256, u256, ALICE, BOB, DAI, GENERAL_ADAPTER1, MORPHO, STETH, TIMESTAMP, USDC,
        VAULT, WRAPPED_USDC, WSTETH,
    };

    fn approve_args(spender: Address, amount: u128) -> ApproveArgs {
        ApproveArgs { spender, amount: i256(amount) }
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut state = testing::state();
        approve(&mut state, ALICE, USDC, &approve_args(GENERAL_ADAPTER1, 500)).unwrap();
        let args = TransferArgs { amount: i256(300), from: ALICE, to: BOB };

        handle_transfer(&mut state, GENERAL_ADAPTER1, USDC, &args).unwrap();

        assert_eq!(
            state
                .get_holding(ALICE, USDC)
                .erc20_allowances
                .general_adapter1,
            u256(200)
        );
        assert_eq!(
            handle_transfer(&mut state, GENERAL_ADAPTER1, USDC, &args),
            Err(ErrorKind::Erc20(Erc20Error::InsufficientAllowance {
                token: USDC,
                owner: ALICE,
                spender: GENERAL_ADAPTER1,
                allowance: u256(200),
                amount: u256(300),
            }))
        );
    }

    #[test]
    fn test_vaults_and_adapter_need_no_approval_for_morpho() {
        let mut state = testing::vault_state();

        for owner in [GENERAL_ADAPTER1, VAULT] {
            state.holdings.insert(testing::holding(owner, USDC, u256(1_000)));
            let pull = Transfer::new(USDC, MORPHO, owner, MORPHO, u256(1_000));
            transfer(&mut state, pull).unwrap();
        }
    }

    #[test]
    fn test_approve_unknown_spender_fails() {
        let mut state = testing::state();

        let err = approve(&mut state, ALICE, USDC, &approve_args(BOB, 1)).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Erc20(Erc20Error::UnknownAllowance {
                token: USDC,
                owner: ALICE,
                spender: BOB
            })
        );
    }

    #[test]
    fn test_approve_vault_sets_vault_allowance() {
        let mut state = testing::vault_state();
        state
            .holdings
            .insert(testing::holding(BOB, VAULT, u256(1_000_000)));

        approve(&mut state, BOB, USDC, &approve_args(VAULT, 1_000)).unwrap();

        assert_eq!(state.get_vault_user(VAULT, BOB).allowance, u256(1_000));
    }

    #[test]
    fn test_approve_vault_without_shares_fails() {
        let mut state = testing::vault_state();
        assert_eq!(state.balance_of(BOB, VAULT), U256::ZERO);

        let err = approve(&mut state, BOB, USDC, &approve_args(VAULT, 1_000)).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Erc20(Erc20Error::UnknownAllowance {
                token: USDC,
                owner: BOB,
                spender: VAULT
            })
        );
        assert_eq!(state.try_get_vault_user(VAULT, BOB), None);
    }

    #[test]
    fn test_restricted_receiver() {
        let mut state = testing::state();
        let mut holding = state.get_holding(BOB, USDC);
        holding.can_transfer = Some(false);
        state.holdings.insert(holding);

        let err =
            transfer(&mut state, Transfer::new(USDC, ALICE, ALICE, BOB, u256(1))).unwrap_err();

        assert_eq!(
            err,
            ErrorKind::Erc20(Erc20Error::UnauthorizedTransfer { token: USDC, user: BOB })
        );
    }

    #[test]
    fn test_permit() {
        let mut state = testing::state();
        let args = PermitArgs {
            spender: GENERAL_ADAPTER1,
            amount: i256(1_000),
            nonce: U256::ZERO,
            deadline: Some(TIMESTAMP),
        };

        permit(&mut state, ALICE, USDC, &args).unwrap();

        let holding = state.get_holding(ALICE, USDC);
        assert_eq!(holding.erc20_allowances.general_adapter1, u256(1_000));
        assert_eq!(holding.erc2612_nonce, Some(U256::from(1)));
        assert_eq!(
            permit(&mut state, ALICE, USDC, &args),
            Err(ErrorKind::Erc20(Erc20Error::InvalidPermitNonce {
                token: USDC,
                owner: ALICE,
                expected: U256::from(1),
                nonce: U256::ZERO,
            }))
        );
    }

    #[rstest]
    #[case::expired(USDC, Some(TIMESTAMP - 1))]
    #[case::unsupported(STETH, None)]
    fn test_permit_fails(#[case] token: Address, #[case] deadline: Option<u64>) {
        let mut state = testing::state();
        let args = PermitArgs { spender: MORPHO, amount: i256(1), nonce: U256::ZERO, deadline };

        let err = permit(&mut state, ALICE, token, &args).unwrap_err();

        let expected = match deadline {
            Some(deadline) => Erc20Error::ExpiredPermit { token, owner: ALICE, deadline },
            None => Erc20Error::PermitNotSupported(token),
        };
        assert_eq!(err, ErrorKind::Erc20(expected));
    }

    #[test]
    fn test_dai_permit_is_unlimited() {
        let mut state = testing::state();
        let args = PermitArgs {
            spender: GENERAL_ADAPTER1,
            amount: i256(1),
            nonce: U256::ZERO,
            deadline: None,
        };

        permit(&mut state, ALICE, DAI, &args).unwrap();

        assert_eq!(state.get_holding(ALICE, DAI).erc20_allowances.general_adapter1, U256::MAX);
    }

    #[test_log::test]
    fn test_permit2_allowance_expires() {
        let mut state = testing::state();
        let mut holding = state.get_holding(ALICE, USDC);
        holding.erc20_allowances.permit2 = U256::MAX;
        state.holdings.insert(holding);
        permit2(
            &mut state,
            ALICE,
            USDC,
            &Permit2Args {
                spender: GENERAL_ADAPTER1,
                amount: i256(1_000),
                expiration: TIMESTAMP + 100,
                nonce: U256::ZERO,
            },
        )
        .unwrap();
        let args = TransferArgs { amount: i256(400), from: ALICE, to: BOB };

        transfer2(&mut state, GENERAL_ADAPTER1, USDC, &args).unwrap();

        let allowance = state
            .get_holding(ALICE, USDC)
            .permit2_allowances
            .general_adapter1;
        assert_eq!(allowance.amount, u256(600));
        assert_eq!(allowance.nonce, U256::from(1));

        state.block.timestamp = TIMESTAMP + 100;
        assert_eq!(
            transfer2(&mut state, GENERAL_ADAPTER1, USDC, &args),
            Err(ErrorKind::Erc20(Erc20Error::InsufficientPermit2Allowance {
                token: USDC,
                owner: ALICE,
                spender: GENERAL_ADAPTER1
            }))
        );
    }

    #[test]
    fn test_transfer2_from_unknown_sender() {
        let mut state = testing::state();
        let args = TransferArgs { amount: i256(1), from: ALICE, to: BOB };

        let err = transfer2(&mut state, BOB, USDC, &args).unwrap_err();

        assert_eq!(err, ErrorKind::Erc20(Erc20Error::UnexpectedTransfer2Sender(BOB)));
    }

    #[test]
    fn test_wrap() {
        let mut state = testing::state();
        let steth_before = state.balance_of(ALICE, STETH);
        let args =
            WrapArgs { amount: i256(1_200_000_000_000_000_000), owner: BOB, slippage: None };

        wrap(&mut state, ALICE, WSTETH, &args).unwrap();

        assert_eq!(
            steth_before - state.balance_of(ALICE, STETH),
            u256(1_200_000_000_000_000_000)
        );
        assert_eq!(state.balance_of(BOB, WSTETH), u256(1_000_000_000_000_000_000));
    }

    #[rstest]
    #[case::pays_sender(
        WSTETH,
        STETH,
        1_000_000_000_000_000_000,
        ALICE,
        1_200_000_000_000_000_000
    )]
    #[case::erc20_wrapper_pays_receiver(WRAPPED_USDC, USDC, 1_000_000, BOB, 1_000_000)]
    fn test_unwrap(
        #[case] wrapped: Address,
        #[case] underlying: Address,
        #[case] amount: u128,
        #[case] paid: Address,
        #[case] expected: u128,
    ) {
        let mut state = testing::state();
        let before = state.balance_of(paid, underlying);
        let args = UnwrapArgs { amount: i256(amount), receiver: BOB, slippage: None };

        unwrap(&mut state, ALICE, wrapped, &args).unwrap();

        assert_eq!(state.balance_of(ALICE, wrapped), U256::ZERO);
        assert_eq!(state.balance_of(paid, underlying) - before, u256(expected));
    }

    #[test]
    fn test_wrap_plain_token_fails() {
        let mut state = testing::state();
        let args = WrapArgs { amount: I256::ONE, owner: ALICE, slippage: None };

        let err = wrap(&mut state, ALICE, USDC, &args).unwrap_err();

        assert_eq!(err, ErrorKind::Erc20(Erc20Error::NotWrapper(USDC)));
    }
}
