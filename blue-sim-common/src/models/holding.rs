//! Token balances and the allowances attached to them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Spenders whose ERC-20 allowance is tracked by name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AllowanceSpender {
    Morpho,
    Permit2,
    GeneralAdapter1,
}

/// Spenders that can hold a permit-router allowance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Permit2Spender {
    Morpho,
    GeneralAdapter1,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc20Allowances {
    pub morpho: U256,
    pub permit2: U256,
    pub general_adapter1: U256,
}

impl Erc20Allowances {
    pub fn get(&self, spender: AllowanceSpender) -> U256 {
        match spender {
            AllowanceSpender::Morpho => self.morpho,
            AllowanceSpender::Permit2 => self.permit2,
            AllowanceSpender::GeneralAdapter1 => self.general_adapter1,
        }
    }

    pub fn get_mut(&mut self, spender: AllowanceSpender) -> &mut U256 {
        match spender {
            AllowanceSpender::Morpho => &mut self.morpho,
            AllowanceSpender::Permit2 => &mut self.permit2,
            AllowanceSpender::GeneralAdapter1 => &mut self.general_adapter1,
        }
    }
}

/// A time-bounded allowance granted through the permit router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Allowance {
    pub amount: U256,
    /// Expiration timestamp. The allowance is void at and after it.
    pub expiration: u64,
    pub nonce: U256,
}

impl Permit2Allowance {
    /// Amount usable at `timestamp`.
    pub fn available(&self, timestamp: u64) -> U256 {
        if timestamp >= self.expiration {
            U256::ZERO
        } else {
            self.amount
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Allowances {
    pub morpho: Permit2Allowance,
    pub general_adapter1: Permit2Allowance,
}

impl Permit2Allowances {
    pub fn get(&self, spender: Permit2Spender) -> &Permit2Allowance {
        match spender {
            Permit2Spender::Morpho => &self.morpho,
            Permit2Spender::GeneralAdapter1 => &self.general_adapter1,
        }
    }

    pub fn get_mut(&mut self, spender: Permit2Spender) -> &mut Permit2Allowance {
        match spender {
            Permit2Spender::Morpho => &mut self.morpho,
            Permit2Spender::GeneralAdapter1 => &mut self.general_adapter1,
        }
    }
}

/// Balance of `token` held by `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub user: Address,
    pub token: Address,
    pub balance: U256,
    #[serde(default)]
    pub erc20_allowances: Erc20Allowances,
    #[serde(default)]
    pub permit2_allowances: Permit2Allowances,
    /// EIP-2612 nonce. `None` if the token does not support permits.
    #[serde(default)]
    pub erc2612_nonce: Option<U256>,
    /// Whether the user may receive the token. `None` when the token has no transfer restriction.
    #[serde(default)]
    pub can_transfer: Option<bool>,
}

impl Holding {
    pub fn new(user: Address, token: Address) -> Self {
        Self {
            user,
            token,
            balance: U256::ZERO,
            erc20_allowances: Erc20Allowances::default(),
            permit2_allowances: Permit2Allowances::default(),
            erc2612_nonce: None,
            can_transfer: None,
        }
    }

    pub fn key(&self) -> (Address, Address) {
        (self.user, self.token)
    }

    pub fn can_receive(&self) -> bool {
        self.can_transfer != Some(false)
    }
}
