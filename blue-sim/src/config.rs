//! Addresses of the contracts the simulator recognises.
//!
//! The registry is supplied with every simulation state instead of being looked up from a
//! process-wide table, so runs on different chains never see each other's configuration.

use alloy_primitives::{address, uint, Address, U256};
use blue_sim_common::models::holding::{AllowanceSpender, Permit2Spender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pseudo-address of the chain's native asset.
pub const NATIVE_ADDRESS: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// Maximum amount of a permit-router allowance (`2^160 - 1`).
pub const MAX_PERMIT2_AMOUNT: U256 = uint!(0xffffffffffffffffffffffffffffffffffffffff_U256);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid address registry: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRegistry {
    /// The core lending contract.
    pub morpho: Address,
    pub permit2: Address,
    pub bundler3: Address,
    /// Adapter executing bundled actions on behalf of users.
    pub general_adapter1: Address,
    pub public_allocator: Address,
    /// Token whose permit grants an unlimited allowance regardless of the signed amount.
    #[serde(default)]
    pub dai: Option<Address>,
}

impl AddressRegistry {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Named ERC-20 allowance slot used when `spender` moves tokens.
    pub fn allowance_spender(&self, spender: Address) -> Option<AllowanceSpender> {
        if spender == self.morpho {
            Some(AllowanceSpender::Morpho)
        } else if spender == self.permit2 {
            Some(AllowanceSpender::Permit2)
        } else if spender == self.general_adapter1 {
            Some(AllowanceSpender::GeneralAdapter1)
        } else {
            None
        }
    }

    /// Permit-router allowance slot of `spender`, if it is one of the privileged spenders.
    pub fn permit2_spender(&self, spender: Address) -> Option<Permit2Spender> {
        if spender == self.morpho {
            Some(Permit2Spender::Morpho)
        } else if spender == self.general_adapter1 {
            Some(Permit2Spender::GeneralAdapter1)
        } else {
            None
        }
    }

    pub fn is_dai(&self, token: Address) -> bool {
        self.dai == Some(token)
    }
}
