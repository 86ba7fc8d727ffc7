//! Shared building blocks of the blue-sim lending simulator.
//!
//! This crate holds everything that does not depend on how actions are dispatched:
//!
//! - [`math`]: WAD fixed-point arithmetic with explicit rounding, share/asset conversion and the
//!   adaptive curve interest rate model.
//! - [`models`]: the protocol entities (markets, positions, tokens, holdings, users, vaults) and
//!   their pure state transitions such as interest accrual and health checks.
//!
//! All quantities are `U256` values in token-native decimals or WAD. No floating point is used.

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod display;
pub mod math;
pub mod models;

pub use alloy_primitives::{Address, Bytes, B256, I256, U256};
