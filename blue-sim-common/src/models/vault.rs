//! Curated vaults allocating a single asset across core markets.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    math::{shares, MathResult, RoundingDirection},
    models::MarketId,
};

/// Configuration of the public allocator on a vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAllocatorConfig {
    pub admin: Address,
    /// Native fee charged per public reallocation.
    pub fee: U256,
    pub accrued_fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub address: Address,
    pub asset: Address,
    pub decimals_offset: u8,
    pub owner: Address,
    pub curator: Address,
    pub guardian: Address,
    /// Performance fee, WAD-scaled.
    pub fee: U256,
    pub fee_recipient: Address,
    pub supply_queue: Vec<MarketId>,
    pub withdraw_queue: Vec<MarketId>,
    pub total_supply: U256,
    pub total_assets: U256,
    /// Total assets at the last fee accrual.
    pub last_total_assets: U256,
    #[serde(default)]
    pub public_allocator_config: Option<PublicAllocatorConfig>,
}

impl Vault {
    pub fn new(address: Address, asset: Address, decimals_offset: u8) -> Self {
        Self {
            address,
            asset,
            decimals_offset,
            owner: Address::ZERO,
            curator: Address::ZERO,
            guardian: Address::ZERO,
            fee: U256::ZERO,
            fee_recipient: Address::ZERO,
            supply_queue: Vec::new(),
            withdraw_queue: Vec::new(),
            total_supply: U256::ZERO,
            total_assets: U256::ZERO,
            last_total_assets: U256::ZERO,
            public_allocator_config: None,
        }
    }

    pub fn virtual_shares(&self) -> U256 {
        shares::virtual_shares_for_offset(self.decimals_offset)
    }

    pub fn to_shares(&self, assets: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_shares_with_offset(
            assets,
            self.total_assets,
            self.total_supply,
            self.virtual_shares(),
            rounding,
        )
    }

    pub fn to_assets(&self, shares: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_assets_with_offset(
            shares,
            self.total_assets,
            self.total_supply,
            self.virtual_shares(),
            rounding,
        )
    }

    /// Whether `user` holds one of the vault's management roles.
    pub fn is_manager(&self, user: Address) -> bool {
        user == self.owner || user == self.curator
    }
}

/// Per-user data of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultUser {
    pub vault: Address,
    pub user: Address,
    pub is_allocator: bool,
    /// Allowance of the vault's asset granted by the user to the vault.
    pub allowance: U256,
}

impl VaultUser {
    pub fn new(vault: Address, user: Address) -> Self {
        Self { vault, user, is_allocator: false, allowance: U256::ZERO }
    }
}

/// Flow caps of a market for the public allocator, in assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowCaps {
    pub max_in: U256,
    pub max_out: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMarketConfig {
    pub vault: Address,
    pub market_id: MarketId,
    /// Maximum supply assets the vault may hold on the market.
    pub cap: U256,
    pub enabled: bool,
    #[serde(default)]
    pub removable_at: u64,
    #[serde(default)]
    pub public_allocator_config: Option<FlowCaps>,
}

impl VaultMarketConfig {
    pub fn new(vault: Address, market_id: MarketId, cap: U256) -> Self {
        Self {
            vault,
            market_id,
            cap,
            enabled: true,
            removable_at: 0,
            public_allocator_config: None,
        }
    }
}
