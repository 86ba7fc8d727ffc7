//! The state a simulation runs on.
//!
//! [`SimulationState`] aggregates every entity keyed by its identity. Optional entities
//! (positions, holdings, users, vault users) are created with empty defaults on first access;
//! markets, tokens, vaults and their configs must be part of the snapshot.

pub mod cow;

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use blue_sim_common::{
    math::checked_add,
    models::{
        holding::Holding,
        market::Market,
        position::Position,
        token::Token,
        user::User,
        vault::{Vault, VaultMarketConfig, VaultUser},
        vault_v2::{VaultV2, VaultV2Adapter},
        Chain, MarketId,
    },
};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use self::cow::{CowMap, Keyed};
use crate::{
    config::AddressRegistry,
    errors::{ErrorKind, UnknownDataError},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    /// Recipient of the fee shares minted on market interest accrual.
    #[serde(default)]
    pub fee_recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub chain_id: u64,
    pub block: BlockInfo,
    pub registry: Arc<AddressRegistry>,
    #[serde(default)]
    pub global: GlobalState,
    #[serde(default)]
    pub markets: CowMap<Market>,
    #[serde(default)]
    pub positions: CowMap<Position>,
    #[serde(default)]
    pub tokens: CowMap<Token>,
    #[serde(default)]
    pub holdings: CowMap<Holding>,
    #[serde(default)]
    pub users: CowMap<User>,
    #[serde(default)]
    pub vaults: CowMap<Vault>,
    #[serde(default)]
    pub vault_users: CowMap<VaultUser>,
    #[serde(default)]
    pub vault_market_configs: CowMap<VaultMarketConfig>,
    #[serde(default)]
    pub vault_v2s: CowMap<VaultV2>,
    #[serde(default)]
    pub vault_v2_adapters: CowMap<VaultV2Adapter>,
}

impl Keyed for Market {
    type Key = MarketId;

    fn key(&self) -> MarketId {
        self.id()
    }
}

impl Keyed for Position {
    type Key = (Address, MarketId);

    fn key(&self) -> Self::Key {
        Position::key(self)
    }
}

impl Keyed for Token {
    type Key = Address;

    fn key(&self) -> Address {
        self.address
    }
}

impl Keyed for Holding {
    type Key = (Address, Address);

    fn key(&self) -> Self::Key {
        Holding::key(self)
    }
}

impl Keyed for User {
    type Key = Address;

    fn key(&self) -> Address {
        self.address
    }
}

impl Keyed for Vault {
    type Key = Address;

    fn key(&self) -> Address {
        self.address
    }
}

impl Keyed for VaultUser {
    type Key = (Address, Address);

    fn key(&self) -> Self::Key {
        (self.vault, self.user)
    }
}

impl Keyed for VaultMarketConfig {
    type Key = (Address, MarketId);

    fn key(&self) -> Self::Key {
        (self.vault, self.market_id)
    }
}

impl Keyed for VaultV2 {
    type Key = Address;

    fn key(&self) -> Address {
        self.address
    }
}

impl Keyed for VaultV2Adapter {
    type Key = Address;

    fn key(&self) -> Address {
        self.address
    }
}

impl SimulationState {
    pub fn new(chain: Chain, block: BlockInfo, registry: AddressRegistry) -> Self {
        Self {
            chain_id: chain.id(),
            block,
            registry: Arc::new(registry),
            global: GlobalState::default(),
            markets: CowMap::new(),
            positions: CowMap::new(),
            tokens: CowMap::new(),
            holdings: CowMap::new(),
            users: CowMap::new(),
            vaults: CowMap::new(),
            vault_users: CowMap::new(),
            vault_market_configs: CowMap::new(),
            vault_v2s: CowMap::new(),
            vault_v2_adapters: CowMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn chain(&self) -> Option<Chain> {
        Chain::from_id(self.chain_id)
    }

    pub fn try_get_market(&self, id: &MarketId) -> Option<&Market> {
        self.markets.get(id)
    }

    /// Returns a copy of the market, accrued up to the block timestamp unless `accrue` is false.
    /// Nothing is written back; see [`SimulationState::accrue_market`].
    pub fn get_market(&self, id: &MarketId, accrue: bool) -> Result<Market, ErrorKind> {
        let market = self
            .try_get_market(id)
            .ok_or(UnknownDataError::UnknownMarket(*id))?;

        if accrue {
            Ok(market.accrued(self.block.timestamp)?)
        } else {
            Ok(market.clone())
        }
    }

    /// Accrues the market up to the block timestamp, credits the minted fee shares to the fee
    /// recipient and returns the accrued market.
    pub fn accrue_market(&mut self, id: &MarketId) -> Result<Market, ErrorKind> {
        let mut market = self.get_market(id, false)?;
        let accrual = market.accrue_interest(self.block.timestamp)?;

        if !accrual.fee_shares.is_zero() {
            let mut position = self.get_position(self.global.fee_recipient, *id);
            position.supply_shares = checked_add(position.supply_shares, accrual.fee_shares)?;
            self.positions.insert(position);
        }

        self.markets.insert(market.clone());
        Ok(market)
    }

    pub fn try_get_position(&self, user: Address, id: MarketId) -> Option<&Position> {
        self.positions.get(&(user, id))
    }

    pub fn get_position(&self, user: Address, id: MarketId) -> Position {
        self.try_get_position(user, id)
            .cloned()
            .unwrap_or_else(|| Position::new(user, id))
    }

    pub fn try_get_token(&self, address: Address) -> Option<&Token> {
        self.tokens.get(&address)
    }

    pub fn get_token(&self, address: Address) -> Result<&Token, UnknownDataError> {
        self.try_get_token(address)
            .ok_or(UnknownDataError::UnknownToken(address))
    }

    pub fn try_get_holding(&self, user: Address, token: Address) -> Option<&Holding> {
        self.holdings.get(&(user, token))
    }

    pub fn get_holding(&self, user: Address, token: Address) -> Holding {
        self.try_get_holding(user, token)
            .cloned()
            .unwrap_or_else(|| {
                trace!(%user, %token, "Defaulting holding");
                Holding::new(user, token)
            })
    }

    pub fn balance_of(&self, user: Address, token: Address) -> U256 {
        self.try_get_holding(user, token)
            .map(|holding| holding.balance)
            .unwrap_or_default()
    }

    pub fn try_get_user(&self, address: Address) -> Option<&User> {
        self.users.get(&address)
    }

    pub fn get_user(&self, address: Address) -> User {
        self.try_get_user(address)
            .cloned()
            .unwrap_or_else(|| User::new(address))
    }

    pub fn try_get_vault(&self, address: Address) -> Option<&Vault> {
        self.vaults.get(&address)
    }

    pub fn get_vault(&self, address: Address) -> Result<&Vault, UnknownDataError> {
        self.try_get_vault(address)
            .ok_or(UnknownDataError::UnknownVault(address))
    }

    pub fn try_get_vault_user(&self, vault: Address, user: Address) -> Option<&VaultUser> {
        self.vault_users.get(&(vault, user))
    }

    pub fn get_vault_user(&self, vault: Address, user: Address) -> VaultUser {
        self.try_get_vault_user(vault, user)
            .cloned()
            .unwrap_or_else(|| VaultUser::new(vault, user))
    }

    pub fn try_get_vault_market_config(
        &self,
        vault: Address,
        id: MarketId,
    ) -> Option<&VaultMarketConfig> {
        self.vault_market_configs.get(&(vault, id))
    }

    pub fn get_vault_market_config(
        &self,
        vault: Address,
        id: MarketId,
    ) -> Result<&VaultMarketConfig, UnknownDataError> {
        self.try_get_vault_market_config(vault, id)
            .ok_or(UnknownDataError::UnknownVaultMarketConfig { vault, market_id: id })
    }

    pub fn try_get_vault_v2(&self, address: Address) -> Option<&VaultV2> {
        self.vault_v2s.get(&address)
    }

    pub fn get_vault_v2(&self, address: Address) -> Result<&VaultV2, UnknownDataError> {
        self.try_get_vault_v2(address)
            .ok_or(UnknownDataError::UnknownVaultV2(address))
    }

    pub fn try_get_vault_v2_adapter(&self, address: Address) -> Option<&VaultV2Adapter> {
        self.vault_v2_adapters.get(&address)
    }

    pub fn get_vault_v2_adapter(
        &self,
        address: Address,
    ) -> Result<&VaultV2Adapter, UnknownDataError> {
        self.try_get_vault_v2_adapter(address)
            .ok_or(UnknownDataError::UnknownVaultV2Adapter(address))
    }

    /// Underlying asset of the vault at `address`, of either generation.
    pub fn vault_asset(&self, address: Address) -> Option<Address> {
        self.try_get_vault(address)
            .map(|vault| vault.asset)
            .or_else(|| {
                self.try_get_vault_v2(address)
                    .map(|vault| vault.asset)
            })
    }

    /// Contracts that approve the core contract for their whole balance at deployment.
    pub fn approves_morpho(&self, user: Address) -> bool {
        user == self.registry.general_adapter1 || self.vault_asset(user).is_some()
    }
}
