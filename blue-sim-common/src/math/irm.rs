//! Adaptive curve interest rate model.
//!
//! The borrow rate follows a curve around a "rate at target" that drifts exponentially while
//! utilization stays away from the 90% target. All intermediate values are signed WAD numbers
//! truncated toward zero, exactly like the deployed contract.

use alloy_primitives::{uint, I256, U256};

const WAD_INT: I256 = I256::from_raw(uint!(1_000_000_000_000_000_000_U256));

/// ln(2), WAD-scaled.
const LN_2_INT: I256 = I256::from_raw(uint!(693_147_180_559_945_309_U256));

/// |ln(1e-18)|, WAD-scaled. Below `-LN_WEI_ABS`, `w_exp` returns zero.
const LN_WEI_ABS: I256 = I256::from_raw(uint!(41_446_531_673_892_822_312_U256));

/// Above this input, `w_exp` saturates to `WEXP_UPPER_VALUE`.
const WEXP_UPPER_BOUND: I256 = I256::from_raw(uint!(93_859_467_695_000_404_319_U256));

const WEXP_UPPER_VALUE: I256 = I256::from_raw(uint!(
    57_716_089_161_558_943_949_701_069_502_944_508_345_128_422_502_756_744_429_568_U256
));

/// Curve steepness (4), WAD-scaled.
pub const CURVE_STEEPNESS: I256 = I256::from_raw(uint!(4_000_000_000_000_000_000_U256));

/// Adjustment speed per second (50/year), WAD-scaled.
pub const ADJUSTMENT_SPEED: I256 = I256::from_raw(uint!(1_585_489_599_188_U256));

/// Target utilization (90%), WAD-scaled.
pub const TARGET_UTILIZATION: I256 = I256::from_raw(uint!(900_000_000_000_000_000_U256));

/// Initial rate at target per second (4% APR).
pub const INITIAL_RATE_AT_TARGET: I256 = I256::from_raw(uint!(1_268_391_679_U256));

/// Minimum rate at target per second (0.1% APR).
pub const MIN_RATE_AT_TARGET: I256 = I256::from_raw(uint!(31_709_791_U256));

/// Maximum rate at target per second (200% APR).
pub const MAX_RATE_AT_TARGET: I256 = I256::from_raw(uint!(63_419_583_967_U256));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowRates {
    /// Average borrow rate per second over the elapsed window, used for compounding.
    pub avg_borrow_rate: U256,
    /// Instantaneous borrow rate per second at the end of the window.
    pub end_borrow_rate: U256,
    /// Rate at target to store after accrual.
    pub end_rate_at_target: U256,
}

fn w_mul_to_zero(x: I256, y: I256) -> I256 {
    x * y / WAD_INT
}

fn w_div_to_zero(x: I256, y: I256) -> I256 {
    x * WAD_INT / y
}

fn bound(x: I256, low: I256, high: I256) -> I256 {
    if x < low {
        low
    } else if x > high {
        high
    } else {
        x
    }
}

fn to_uint(x: I256) -> U256 {
    if x.is_negative() {
        U256::ZERO
    } else {
        x.into_raw()
    }
}

/// Approximation of `e^x` (WAD-scaled) with a second-order expansion after range reduction by
/// ln(2).
pub fn w_exp(x: I256) -> I256 {
    if x < -LN_WEI_ABS {
        return I256::ZERO;
    }
    if x >= WEXP_UPPER_BOUND {
        return WEXP_UPPER_VALUE;
    }

    let half_ln_2 = LN_2_INT / I256::from_raw(U256::from(2));
    let rounding_adjustment = if x.is_negative() { -half_ln_2 } else { half_ln_2 };
    let q = (x + rounding_adjustment) / LN_2_INT;
    let r = x - q * LN_2_INT;
    let exp_r = to_uint(WAD_INT + r + r * r / WAD_INT / I256::from_raw(U256::from(2)));

    let shift = q
        .unsigned_abs()
        .saturating_to::<usize>();
    if q.is_negative() {
        I256::from_raw(exp_r >> shift)
    } else {
        I256::from_raw(exp_r << shift)
    }
}

fn curve(rate_at_target: I256, err: I256) -> I256 {
    let coeff = if err.is_negative() {
        WAD_INT - w_div_to_zero(WAD_INT, CURVE_STEEPNESS)
    } else {
        CURVE_STEEPNESS - WAD_INT
    };

    w_mul_to_zero(w_mul_to_zero(coeff, err) + WAD_INT, rate_at_target)
}

fn new_rate_at_target(start_rate_at_target: I256, linear_adaptation: I256) -> I256 {
    bound(
        w_mul_to_zero(start_rate_at_target, w_exp(linear_adaptation)),
        MIN_RATE_AT_TARGET,
        MAX_RATE_AT_TARGET,
    )
}

/// Computes the borrow rates of a market with the given `utilization` (WAD) whose stored rate at
/// target is `start_rate_at_target`, `elapsed` seconds after its last update.
///
/// A zero `start_rate_at_target` means the market was never touched by the model and starts at
/// [`INITIAL_RATE_AT_TARGET`].
pub fn get_borrow_rate(utilization: U256, start_rate_at_target: U256, elapsed: u64) -> BorrowRates {
    let utilization = I256::from_raw(utilization);
    let start_rate_at_target = I256::from_raw(start_rate_at_target);

    let err_norm_factor = if utilization > TARGET_UTILIZATION {
        WAD_INT - TARGET_UTILIZATION
    } else {
        TARGET_UTILIZATION
    };
    let err = w_div_to_zero(utilization - TARGET_UTILIZATION, err_norm_factor);

    let (avg_rate_at_target, end_rate_at_target) = if start_rate_at_target.is_zero() {
        (INITIAL_RATE_AT_TARGET, INITIAL_RATE_AT_TARGET)
    } else {
        let speed = w_mul_to_zero(ADJUSTMENT_SPEED, err);
        let linear_adaptation = speed * I256::from_raw(U256::from(elapsed));

        if linear_adaptation.is_zero() {
            (start_rate_at_target, start_rate_at_target)
        } else {
            let end = new_rate_at_target(start_rate_at_target, linear_adaptation);
            let mid = new_rate_at_target(
                start_rate_at_target,
                linear_adaptation / I256::from_raw(U256::from(2)),
            );
            let avg = (start_rate_at_target + end + I256::from_raw(U256::from(2)) * mid) /
                I256::from_raw(U256::from(4));
            (avg, end)
        }
    };

    BorrowRates {
        avg_borrow_rate: to_uint(curve(avg_rate_at_target, err)),
        end_borrow_rate: to_uint(curve(end_rate_at_target, err)),
        end_rate_at_target: to_uint(end_rate_at_target),
    }
}
