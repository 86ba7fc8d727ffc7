use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::{math::MathError, models::MarketId};

/// Failures of the core lending contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlueError {
    #[error(
        "Invalid interest accrual on market {market_id}: timestamp {timestamp} is before last \
         update {last_update}"
    )]
    InvalidInterestAccrual { market_id: MarketId, timestamp: u64, last_update: u64 },
    #[error("Inconsistent input: exactly one of assets ({assets}) and shares ({shares}) must be zero")]
    InconsistentInput { assets: U256, shares: U256 },
    #[error("Zero assets")]
    ZeroAssets,
    #[error("Insufficient liquidity on market {0}")]
    InsufficientLiquidity(MarketId),
    #[error("Insufficient position of {user} on market {market_id}")]
    InsufficientPosition { user: Address, market_id: MarketId },
    #[error("Insufficient collateral of {user} on market {market_id}")]
    InsufficientCollateral { user: Address, market_id: MarketId },
    #[error("{sender} is not authorized to manage the position of {on_behalf}")]
    Unauthorized { sender: Address, on_behalf: Address },
    #[error(transparent)]
    Math(#[from] MathError),
}
