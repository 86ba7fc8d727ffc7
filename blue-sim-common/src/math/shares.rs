//! Share/asset conversion with virtual offsets.
//!
//! Both sides of the exchange rate are shifted by a small virtual amount so the rate stays
//! defined on an empty pool and a first depositor cannot inflate it.

use alloy_primitives::{uint, U256};

use super::{checked_add, mul_div_rounded, MathResult, RoundingDirection};

/// Virtual shares added to a market's total shares.
pub const VIRTUAL_SHARES: U256 = uint!(1_000_000_U256);

/// Virtual assets added to a market's or vault's total assets.
pub const VIRTUAL_ASSETS: U256 = uint!(1_U256);

pub fn to_shares(
    assets: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> MathResult<U256> {
    to_shares_with_offset(assets, total_assets, total_shares, VIRTUAL_SHARES, rounding)
}

pub fn to_assets(
    shares: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> MathResult<U256> {
    to_assets_with_offset(shares, total_assets, total_shares, VIRTUAL_SHARES, rounding)
}

/// Converts assets to shares using `virtual_shares` as the share-side offset. Vaults use
/// `10^decimals_offset` here.
pub fn to_shares_with_offset(
    assets: U256,
    total_assets: U256,
    total_shares: U256,
    virtual_shares: U256,
    rounding: RoundingDirection,
) -> MathResult<U256> {
    mul_div_rounded(
        assets,
        checked_add(total_shares, virtual_shares)?,
        checked_add(total_assets, VIRTUAL_ASSETS)?,
        rounding,
    )
}

pub fn to_assets_with_offset(
    shares: U256,
    total_assets: U256,
    total_shares: U256,
    virtual_shares: U256,
    rounding: RoundingDirection,
) -> MathResult<U256> {
    mul_div_rounded(
        shares,
        checked_add(total_assets, VIRTUAL_ASSETS)?,
        checked_add(total_shares, virtual_shares)?,
        rounding,
    )
}

/// `10^decimals_offset`, the virtual shares of a vault.
pub fn virtual_shares_for_offset(decimals_offset: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals_offset))
}
