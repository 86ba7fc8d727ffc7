//! Next-generation vaults.
//!
//! Assets are deployed through adapters instead of a market queue. Only the liquidity adapter,
//! which receives deposits and serves withdrawals, is modelled.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::math::{shares, MathResult, RoundingDirection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultV2 {
    pub address: Address,
    pub asset: Address,
    pub decimals_offset: u8,
    pub total_supply: U256,
    pub total_assets: U256,
    #[serde(default)]
    pub liquidity_adapter: Option<Address>,
    pub last_update: u64,
}

impl VaultV2 {
    pub fn new(address: Address, asset: Address, decimals_offset: u8, last_update: u64) -> Self {
        Self {
            address,
            asset,
            decimals_offset,
            total_supply: U256::ZERO,
            total_assets: U256::ZERO,
            liquidity_adapter: None,
            last_update,
        }
    }

    pub fn to_shares(&self, assets: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_shares_with_offset(
            assets,
            self.total_assets,
            self.total_supply,
            shares::virtual_shares_for_offset(self.decimals_offset),
            rounding,
        )
    }

    pub fn to_assets(&self, shares: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_assets_with_offset(
            shares,
            self.total_assets,
            self.total_supply,
            shares::virtual_shares_for_offset(self.decimals_offset),
            rounding,
        )
    }
}

/// An adapter holding part of a next-generation vault's assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultV2Adapter {
    pub address: Address,
    pub parent_vault: Address,
    /// Assets currently allocated by the parent vault to this adapter.
    pub real_assets: U256,
}

impl VaultV2Adapter {
    pub fn new(address: Address, parent_vault: Address) -> Self {
        Self { address, parent_vault, real_assets: U256::ZERO }
    }
}
