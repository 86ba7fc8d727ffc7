//! Swap settlement through the aggregator adapter.
//!
//! The swap itself is not simulated: the quoted counter-amount, adjusted by the slippage
//! tolerance, is taken as the worst acceptable execution and settled as a burn of the source
//! token and a mint of the destination token.

use alloy_primitives::{Address, U256};
use blue_sim_common::math::{mul_div_down, w_mul_down, w_mul_up, WAD};
use tracing::debug;

use super::erc20::{self, Transfer};
use crate::{
    action::{amount, slippage, SwapAmounts, SwapArgs},
    errors::{ErrorKind, InputError},
    state::SimulationState,
};

/// Reads the 32-byte big-endian word starting at `offset`.
fn read_word(data: &[u8], offset: usize) -> Result<U256, InputError> {
    let malformed = InputError::MalformedSwapPayload { offset, len: data.len() };
    let end = offset.checked_add(32).ok_or(malformed.clone())?;
    let word = data.get(offset..end).ok_or(malformed)?;
    Ok(U256::from_be_slice(word))
}

/// Returns the exact amount and the quoted counter-amount of a swap.
fn swap_amounts(amounts: &SwapAmounts) -> Result<(U256, U256), InputError> {
    match amounts {
        SwapAmounts::Explicit { amount: exact, quoted_amount } => {
            Ok((amount(*exact), amount(*quoted_amount)))
        }
        SwapAmounts::Payload { data, offsets } => Ok((
            read_word(data, offsets.exact_amount)?,
            read_word(data, offsets.quoted_amount)?,
        )),
    }
}

/// Buys an exact amount of the destination token, paying at most the quoted source amount
/// increased by the slippage tolerance.
pub fn buy(state: &mut SimulationState, sender: Address, args: &SwapArgs) -> Result<(), ErrorKind> {
    let (bought, quoted) = swap_amounts(&args.amounts)?;
    let paid = w_mul_up(quoted, WAD + slippage(args.slippage))?;

    erc20::transfer(state, Transfer::burn(args.src_token, sender, paid))?;
    erc20::transfer(state, Transfer::mint(args.dst_token, sender, args.receiver, bought))?;

    debug!(src = %args.src_token, dst = %args.dst_token, %paid, %bought, "Bought");
    Ok(())
}

/// Sells an exact amount of the source token, receiving at least the quoted destination amount
/// decreased by the slippage tolerance.
pub fn sell(
    state: &mut SimulationState,
    sender: Address,
    args: &SwapArgs,
) -> Result<(), ErrorKind> {
    let (mut sold, mut quoted) = swap_amounts(&args.amounts)?;

    if args.sell_entire_balance {
        let balance = state.balance_of(sender, args.src_token);
        if !sold.is_zero() {
            quoted = mul_div_down(quoted, balance, sold)?;
        }
        sold = balance;
    }
    let received = w_mul_down(quoted, WAD - slippage(args.slippage))?;

    erc20::transfer(state, Transfer::burn(args.src_token, sender, sold))?;
    erc20::transfer(state, Transfer::mint(args.dst_token, sender, args.receiver, received))?;

    debug!(src = %args.src_token, dst = %args.dst_token, %sold, %received, "Sold");
    Ok(())
}
