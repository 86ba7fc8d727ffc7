//! Entry points running actions against a snapshot.
//!
//! The input snapshot is never modified. Each run works on a copy-on-write draft of it; a
//! successful action commits the draft, a failing one drops it, so earlier snapshots only ever
//! observe their own state.

use tracing::{debug, instrument};

use crate::{
    action::Action,
    errors::{SimulationError, StepwiseFailure},
    handlers::{handle_action, handle_actions},
    state::SimulationState,
};

/// Runs a single action and returns the resulting state.
pub fn simulate_action(
    state: &SimulationState,
    action: &Action,
) -> Result<SimulationState, SimulationError> {
    let mut draft = state.clone();
    handle_action(&mut draft, action, 0)?;
    Ok(draft)
}

/// Runs `actions` in order and returns the terminal state.
#[instrument(level = "debug", skip_all, fields(actions = actions.len()))]
pub fn simulate_actions(
    state: &SimulationState,
    actions: &[Action],
) -> Result<SimulationState, SimulationError> {
    let mut draft = state.clone();
    handle_actions(&mut draft, actions)?;
    Ok(draft)
}

/// Runs `actions` in order and returns the state before the first action followed by the state
/// after each action, N + 1 snapshots in total.
///
/// On failure, the snapshots of the successful prefix are returned along with the error.
#[instrument(level = "debug", skip_all, fields(actions = actions.len()))]
pub fn simulate_actions_stepwise(
    state: &SimulationState,
    actions: &[Action],
) -> Result<Vec<SimulationState>, StepwiseFailure> {
    let mut steps = Vec::with_capacity(actions.len() + 1);
    steps.push(state.clone());

    for (index, action) in actions.iter().enumerate() {
        let mut draft = steps[index].clone();
        if let Err(error) = handle_action(&mut draft, action, index) {
            debug!(index, "Stopping after failed action");
            return Err(StepwiseFailure { steps, actions: actions.to_vec(), error });
        }
        steps.push(draft);
    }

    Ok(steps)
}
