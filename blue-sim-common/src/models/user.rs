use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub address: Address,
    /// Whether the bundling adapter may manage this user's positions on the core contract.
    pub is_bundler_authorized: bool,
    /// Nonce of the core contract's signed authorizations.
    pub morpho_nonce: U256,
}

impl User {
    pub fn new(address: Address) -> Self {
        Self { address, is_bundler_authorized: false, morpho_nonce: U256::ZERO }
    }
}
