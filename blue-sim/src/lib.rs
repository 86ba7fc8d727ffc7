//! Deterministic off-chain simulator for lending-protocol action bundles.
//!
//! Given a [`SimulationState`] snapshot and a list of [`Action`]s, the runner predicts the state
//! after each action or reports the first action that would revert, and why:
//!
//! ```ignore
//! let steps = blue_sim::simulate_actions_stepwise(&state, &actions)?;
//! let terminal = steps.last();
//! ```
//!
//! Supported actions cover the core lending markets, tokens (transfers, approvals, permits and
//! wrappers), vaults with their public allocator, next-generation vaults and swap settlement.

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod action;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod runner;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionKind, MAX_AMOUNT};
pub use config::AddressRegistry;
pub use errors::{ErrorKind, SimulationError, StepwiseFailure};
pub use runner::{simulate_action, simulate_actions, simulate_actions_stepwise};
pub use state::{BlockInfo, SimulationState};
