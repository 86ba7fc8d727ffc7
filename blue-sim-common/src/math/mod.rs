//! Fixed-point arithmetic matching the on-chain math libraries bit for bit.
//!
//! Every multiplication/division takes an explicit [`RoundingDirection`]. Overflow and division
//! by zero are reported as [`MathError`] instead of panicking, mirroring a revert on-chain.

pub mod irm;
pub mod shares;

use alloy_primitives::{uint, I256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scale for ratios (rates, fees, slippage, LLTV).
pub const WAD: U256 = uint!(1_000_000_000_000_000_000_U256);

/// Fixed-point scale used by share prices quoted to the bundling adapter.
pub const RAY: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);

/// Scale of oracle prices (collateral quoted in loan token).
pub const ORACLE_PRICE_SCALE: U256 =
    uint!(1_000_000_000_000_000_000_000_000_000_000_000_000_U256);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Arithmetic underflow")]
    Underflow,
}

pub type MathResult<T> = Result<T, MathError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundingDirection {
    Up,
    Down,
}

pub fn checked_add(x: U256, y: U256) -> MathResult<U256> {
    x.checked_add(y)
        .ok_or(MathError::Overflow)
}

pub fn checked_sub(x: U256, y: U256) -> MathResult<U256> {
    x.checked_sub(y)
        .ok_or(MathError::Underflow)
}

pub fn checked_mul(x: U256, y: U256) -> MathResult<U256> {
    x.checked_mul(y)
        .ok_or(MathError::Overflow)
}

/// `x * y / denominator`, rounded down.
pub fn mul_div_down(x: U256, y: U256, denominator: U256) -> MathResult<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(checked_mul(x, y)? / denominator)
}

/// `x * y / denominator`, rounded up.
pub fn mul_div_up(x: U256, y: U256, denominator: U256) -> MathResult<U256> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let numerator = checked_add(checked_mul(x, y)?, denominator - U256::from(1))?;
    Ok(numerator / denominator)
}

pub fn mul_div_rounded(
    x: U256,
    y: U256,
    denominator: U256,
    rounding: RoundingDirection,
) -> MathResult<U256> {
    match rounding {
        RoundingDirection::Up => mul_div_up(x, y, denominator),
        RoundingDirection::Down => mul_div_down(x, y, denominator),
    }
}

pub fn w_mul_down(x: U256, y: U256) -> MathResult<U256> {
    mul_div_down(x, y, WAD)
}

pub fn w_mul_up(x: U256, y: U256) -> MathResult<U256> {
    mul_div_up(x, y, WAD)
}

pub fn w_mul(x: U256, y: U256, rounding: RoundingDirection) -> MathResult<U256> {
    mul_div_rounded(x, y, WAD, rounding)
}

pub fn w_div_down(x: U256, y: U256) -> MathResult<U256> {
    mul_div_down(x, WAD, y)
}

pub fn w_div_up(x: U256, y: U256) -> MathResult<U256> {
    mul_div_up(x, WAD, y)
}

pub fn w_div(x: U256, y: U256, rounding: RoundingDirection) -> MathResult<U256> {
    mul_div_rounded(x, WAD, y, rounding)
}

pub fn min(x: U256, y: U256) -> U256 {
    if x < y {
        x
    } else {
        y
    }
}

pub fn max(x: U256, y: U256) -> U256 {
    if x > y {
        x
    } else {
        y
    }
}

pub fn abs(x: I256) -> U256 {
    x.unsigned_abs()
}

/// `x - y` floored at zero.
pub fn zero_floor_sub(x: U256, y: U256) -> U256 {
    x.saturating_sub(y)
}

/// First three non-zero terms of the Taylor expansion of `e^(x * n) - 1`, used to approximate
/// continuous compounding of a per-second rate `x` over `n` seconds.
pub fn w_taylor_compounded(x: U256, n: U256) -> MathResult<U256> {
    let first_term = checked_mul(x, n)?;
    let second_term = mul_div_down(first_term, first_term, checked_mul(U256::from(2), WAD)?)?;
    let third_term = mul_div_down(second_term, first_term, checked_mul(U256::from(3), WAD)?)?;

    checked_add(checked_add(first_term, second_term)?, third_term)
}
