use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::models::MarketId;

/// A user's stake in one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub user: Address,
    pub market_id: MarketId,
    pub supply_shares: U256,
    pub borrow_shares: U256,
    pub collateral: U256,
}

impl Position {
    pub fn new(user: Address, market_id: MarketId) -> Self {
        Self {
            user,
            market_id,
            supply_shares: U256::ZERO,
            borrow_shares: U256::ZERO,
            collateral: U256::ZERO,
        }
    }

    pub fn key(&self) -> (Address, MarketId) {
        (self.user, self.market_id)
    }

    pub fn is_empty(&self) -> bool {
        self.supply_shares.is_zero() && self.borrow_shares.is_zero() && self.collateral.is_zero()
    }
}
